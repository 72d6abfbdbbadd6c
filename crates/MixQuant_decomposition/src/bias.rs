// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Log-transformation bias adjustment.
//!
//! A model fit in log space under-predicts the KPI in level space
//! (Jensen's inequality). Per cross-section, a scalar shift $c$ is found
//! minimizing $\sum_t (e^{\hat{y}_t + c} - e^{y_t})^2$ over
//! $c \in [-1, 1]$ by golden-section search, and added to that section's
//! intercept contribution.

use argmin::core::{CostFunction, Error, Executor};
use argmin::solver::goldensectionsearch::GoldenSectionSearch;
use log::debug;

use MixQuant_error::MixQuantError;

/// Search window for the bias shift.
pub const BIAS_BOUNDS: (f64, f64) = (-1.0, 1.0);

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

struct LogBiasObjective {
    fitted: Vec<f64>,
    actual: Vec<f64>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl CostFunction for LogBiasObjective {
    type Param = f64;
    type Output = f64;

    fn cost(&self, shift: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self
            .fitted
            .iter()
            .zip(&self.actual)
            .map(|(f, a)| ((f + shift).exp() - a.exp()).powi(2))
            .sum())
    }
}

/// Finds the bias shift for one cross-section. Non-finite pairs are
/// dropped before the search.
///
/// # Errors
/// - `MixQuantError::InternalError` if the scalar search fails.
pub fn log_bias_shift(fitted: &[f64], actual: &[f64]) -> Result<f64, MixQuantError> {
    let pairs: (Vec<f64>, Vec<f64>) = fitted
        .iter()
        .zip(actual)
        .filter(|(f, a)| f.is_finite() && a.is_finite())
        .map(|(f, a)| (*f, *a))
        .unzip();

    if pairs.0.is_empty() {
        return Ok(0.0);
    }

    let objective = LogBiasObjective {
        fitted: pairs.0,
        actual: pairs.1,
    };

    let solver = GoldenSectionSearch::new(BIAS_BOUNDS.0, BIAS_BOUNDS.1)
        .and_then(|s| s.with_tolerance(1e-7))
        .map_err(|e| MixQuantError::InternalError(format!("bias search setup: {e}")))?;

    let result = Executor::new(objective, solver)
        .configure(|state| state.param(0.0).max_iters(200))
        .run()
        .map_err(|e| MixQuantError::InternalError(format!("bias search: {e}")))?;

    let shift = result.state().best_param.unwrap_or(0.0);
    debug!("log-bias shift {shift}");
    Ok(shift)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_bias {
    use super::*;
    use MixQuant_utils::assert_approx_equal;

    #[test]
    fn test_shift_recovers_constant_offset() {
        // fitted = actual - 0.3, so the minimizing shift is +0.3.
        let actual = vec![1.0, 1.5, 2.0, 2.5];
        let fitted: Vec<f64> = actual.iter().map(|a| a - 0.3).collect();

        let shift = log_bias_shift(&fitted, &actual).unwrap();
        assert_approx_equal!(shift, 0.3, 1e-4);
    }

    #[test]
    fn test_perfect_fit_needs_no_shift() {
        let actual = vec![1.0, 2.0, 3.0];
        let shift = log_bias_shift(&actual, &actual).unwrap();
        assert_approx_equal!(shift, 0.0, 1e-4);
    }

    #[test]
    fn test_empty_after_filtering_is_zero() {
        let shift = log_bias_shift(&[f64::NAN], &[1.0]).unwrap();
        assert_eq!(shift, 0.0);
    }
}
