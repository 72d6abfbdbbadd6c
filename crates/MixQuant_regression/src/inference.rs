// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Coefficient inference for the bounded least-squares fit.
//!
//! Standard errors come from $\sigma^2 (X^\top X)^{-1}$ with
//! $\sigma^2 = \sum \varepsilon^2 / (n - k)$; when $X^\top X$ is singular
//! the pseudo-inverse is used and the result is flagged with a
//! condition-number warning. t-statistics are $\beta / SE$ with two-tailed
//! p-values from the Student-t distribution on $n - k$ degrees of freedom.

use log::warn;
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use crate::solver::{Bound, BoundedLeastSquares};
use MixQuant_error::MixQuantError;

/// Condition number beyond which the design is reported as
/// ill-conditioned.
pub const CONDITION_WARNING_THRESHOLD: f64 = 1e12;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The full regression result.
#[derive(Clone, Debug)]
pub struct FitResult {
    /// Fitted coefficients, aligned with the design columns.
    pub coefficients: Vec<f64>,

    /// Standard errors.
    pub standard_errors: Vec<f64>,

    /// t-statistics (`beta / SE`).
    pub t_statistics: Vec<f64>,

    /// Two-tailed p-values.
    pub p_values: Vec<f64>,

    /// Fitted values `X beta`.
    pub fitted_values: Vec<f64>,

    /// Residuals `y - X beta`.
    pub residuals: Vec<f64>,

    /// Whether the solver reached its KKT point within the iteration cap.
    pub converged: bool,

    /// Whether the covariance fell back to a pseudo-inverse or the design
    /// is ill-conditioned.
    pub condition_warning: bool,

    /// Number of observations.
    pub n_observations: usize,

    /// Number of design columns.
    pub n_parameters: usize,

    /// Residual degrees of freedom (`n - k`).
    pub df_residual: usize,

    /// Residual sum of squares.
    pub rss: f64,

    /// Coefficient of determination.
    pub r_squared: f64,

    /// Adjusted R-squared.
    pub adjusted_r_squared: f64,

    /// F-statistic of the regression.
    pub f_statistic: f64,

    /// p-value of the F-statistic.
    pub f_pvalue: f64,

    /// Akaike information criterion (`n ln(RSS/n) + 2k`).
    pub aic: f64,

    /// Bayesian information criterion (`n ln(RSS/n) + k ln n`).
    pub bic: f64,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl BoundedLeastSquares {
    /// Fits the model and computes the inference battery.
    ///
    /// # Errors
    /// - `MixQuantError::RegressionError` on shape mismatches, an empty or
    ///   zero-variance design, or zero residual degrees of freedom.
    pub fn fit(
        &self,
        x: &DMatrix<f64>,
        y: &DVector<f64>,
        bounds: &[Bound],
    ) -> Result<FitResult, MixQuantError> {
        let n = x.nrows();
        let k = x.ncols();

        if n <= k {
            return Err(MixQuantError::RegressionError(format!(
                "{n} observations for {k} coefficients leaves no degrees of freedom"
            )));
        }

        let solution = self.solve(x, y, bounds)?;
        if !solution.converged {
            warn!(
                "bounded least squares did not converge in {} iterations",
                solution.iterations
            );
        }

        let beta = &solution.coefficients;
        let fitted = x * beta;
        let residuals = y - &fitted;
        let rss = residuals.dot(&residuals);
        let df_residual = n - k;
        let sigma2 = rss / df_residual as f64;

        let xtx = x.transpose() * x;
        let (xtx_inv, mut condition_warning) = invert_or_pseudo(&xtx)?;

        let covariance = xtx_inv * sigma2;
        let standard_errors: Vec<f64> = covariance.diagonal().iter().map(|v| v.sqrt()).collect();

        if condition_number(&xtx) > CONDITION_WARNING_THRESHOLD {
            warn!("design matrix is ill-conditioned");
            condition_warning = true;
        }

        let t_dist = StudentsT::new(0.0, 1.0, df_residual as f64).map_err(|e| {
            MixQuantError::InternalError(format!("Student-t distribution: {e}"))
        })?;

        let t_statistics: Vec<f64> = beta
            .iter()
            .zip(&standard_errors)
            .map(|(b, se)| b / se)
            .collect();
        let p_values: Vec<f64> = t_statistics
            .iter()
            .map(|t| {
                if t.is_finite() {
                    2.0 * (1.0 - t_dist.cdf(t.abs()))
                } else {
                    0.0
                }
            })
            .collect();

        let y_mean = y.mean();
        let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();
        let r_squared = if tss.abs() < f64::EPSILON {
            0.0
        } else {
            1.0 - rss / tss
        };
        let adjusted_r_squared =
            1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / df_residual as f64;

        let df_model = k.saturating_sub(1);
        let (f_statistic, f_pvalue) = f_test(r_squared, df_model, df_residual);

        let n_f = n as f64;
        let aic = n_f * (rss / n_f).ln() + 2.0 * k as f64;
        let bic = n_f * (rss / n_f).ln() + k as f64 * n_f.ln();

        Ok(FitResult {
            coefficients: beta.iter().copied().collect(),
            standard_errors,
            t_statistics,
            p_values,
            fitted_values: fitted.iter().copied().collect(),
            residuals: residuals.iter().copied().collect(),
            converged: solution.converged,
            condition_warning,
            n_observations: n,
            n_parameters: k,
            df_residual,
            rss,
            r_squared,
            adjusted_r_squared,
            f_statistic,
            f_pvalue,
            aic,
            bic,
        })
    }
}

/// Inverts a Gram matrix, falling back to the pseudo-inverse (with a
/// warning flag) when it is singular.
fn invert_or_pseudo(xtx: &DMatrix<f64>) -> Result<(DMatrix<f64>, bool), MixQuantError> {
    if let Some(inverse) = xtx.clone().try_inverse() {
        return Ok((inverse, false));
    }

    warn!("X'X is singular; using the pseudo-inverse for the covariance");
    let pseudo = xtx
        .clone()
        .pseudo_inverse(f64::EPSILON.sqrt())
        .map_err(|e| MixQuantError::RegressionError(format!("pseudo-inverse failed: {e}")))?;
    Ok((pseudo, true))
}

/// Ratio of the largest to smallest singular value.
fn condition_number(m: &DMatrix<f64>) -> f64 {
    let svd = m.clone().svd(false, false);
    let max = svd.singular_values.iter().cloned().fold(0.0, f64::max);
    let min = svd
        .singular_values
        .iter()
        .cloned()
        .fold(f64::INFINITY, f64::min);
    if min > 0.0 {
        max / min
    } else {
        f64::INFINITY
    }
}

/// F-statistic from R-squared and its p-value.
fn f_test(r_squared: f64, df_model: usize, df_residual: usize) -> (f64, f64) {
    if df_model == 0 || (1.0 - r_squared).abs() < f64::EPSILON {
        return (f64::NAN, f64::NAN);
    }

    let f = (r_squared / df_model as f64) / ((1.0 - r_squared) / df_residual as f64);
    let p = match FisherSnedecor::new(df_model as f64, df_residual as f64) {
        Ok(dist) => 1.0 - dist.cdf(f),
        Err(_) => f64::NAN,
    };
    (f, p)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_inference {
    use super::*;
    use MixQuant_utils::assert_approx_equal;

    fn noisy_line() -> (DMatrix<f64>, DVector<f64>) {
        // y = 2x + 1 with a small deterministic wobble.
        let xs = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let noise = [0.05, -0.03, 0.04, -0.05, 0.02, -0.03];
        let x = DMatrix::from_fn(6, 2, |i, j| if j == 0 { 1.0 } else { xs[i] });
        let y = DVector::from_iterator(
            6,
            xs.iter().zip(&noise).map(|(x, e)| 1.0 + 2.0 * x + e),
        );
        (x, y)
    }

    #[test]
    fn test_fit_recovers_line() {
        let (x, y) = noisy_line();
        let fit = BoundedLeastSquares::default()
            .fit(&x, &y, &[(None, None), (None, None)])
            .unwrap();

        assert!(fit.converged);
        assert!(!fit.condition_warning);
        assert_approx_equal!(fit.coefficients[1], 2.0, 0.05);
        assert!(fit.r_squared > 0.999);
        assert!(fit.p_values[1] < 1e-6);
        assert_eq!(fit.df_residual, 4);
    }

    #[test]
    fn test_identity_fitted_plus_residual() {
        let (x, y) = noisy_line();
        let fit = BoundedLeastSquares::default()
            .fit(&x, &y, &[(None, None), (None, None)])
            .unwrap();

        for i in 0..y.len() {
            assert_approx_equal!(fit.fitted_values[i] + fit.residuals[i], y[i], 1e-8);
        }
    }

    #[test]
    fn test_singular_design_flags_condition_warning() {
        // Second and third columns are identical.
        let x = DMatrix::from_fn(6, 3, |i, j| match j {
            0 => 1.0,
            _ => i as f64,
        });
        let y = DVector::from_fn(6, |i, _| 1.0 + i as f64);

        let fit = BoundedLeastSquares::default()
            .fit(&x, &y, &[(None, None), (None, None), (None, None)])
            .unwrap();
        assert!(fit.condition_warning);
    }

    #[test]
    fn test_zero_degrees_of_freedom_rejected() {
        let x = DMatrix::from_fn(2, 2, |i, j| (i + j) as f64);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(BoundedLeastSquares::default()
            .fit(&x, &y, &[(None, None), (None, None)])
            .is_err());
    }

    #[test]
    fn test_p_values_are_probabilities() {
        let (x, y) = noisy_line();
        let fit = BoundedLeastSquares::default()
            .fit(&x, &y, &[(None, None), (None, None)])
            .unwrap();
        for p in &fit.p_values {
            assert!((0.0..=1.0).contains(p));
        }
        assert!((0.0..=1.0).contains(&fit.f_pvalue));
    }
}
