// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The ordered per-variable transformation pipeline used by the wire API
//! and the transform preview. Order of operations is fixed: pre-transform,
//! temporal shift, carry-over/saturation, reference subtraction,
//! post-transform.

use crate::primitives::{
    adstock, dimret, dimret_adstock, lag, lead, PowerTransform,
};
use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Configuration of one variable's transformation pipeline.
#[derive(Clone, Debug, Default)]
pub struct VariableTransform {
    /// Power transform applied first.
    pub pre_transform: Option<PowerTransform>,

    /// Shift later by this many observations. Takes precedence over `lead`
    /// when both are set.
    pub lag: usize,

    /// Shift earlier by this many observations.
    pub lead: usize,

    /// Adstock decay rate in `[0, 1)`; 0 disables carry-over.
    pub adstock: f64,

    /// Diminishing-returns retention percentage in `[0, 1)`; 0 disables
    /// saturation.
    pub dimret: f64,

    /// Route carry-over and saturation through the combined primitive.
    pub dimret_adstock: bool,

    /// Reference value subtracted after the transforms above.
    pub reference: f64,

    /// Power transform applied last.
    pub post_transform: Option<PowerTransform>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl VariableTransform {
    /// Validates the decay and saturation parameters.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` when `adstock` or `dimret` fall
    ///   outside `[0, 1)`.
    pub fn validate(&self) -> Result<(), MixQuantError> {
        if !(0.0..1.0).contains(&self.adstock) {
            return Err(MixQuantError::InputError(format!(
                "adstock rate {} outside [0, 1)",
                self.adstock
            )));
        }
        if !(0.0..1.0).contains(&self.dimret) {
            return Err(MixQuantError::InputError(format!(
                "dimret percentage {} outside [0, 1)",
                self.dimret
            )));
        }
        Ok(())
    }

    /// Runs the pipeline over a series.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on invalid parameters.
    /// - `MixQuantError::TransformError` if any step produces a non-finite
    ///   value (the variable name is filled in by the caller, which knows
    ///   it).
    pub fn apply(&self, series: &[f64]) -> Result<Vec<f64>, MixQuantError> {
        self.validate()?;

        let mut series = series.to_vec();

        if let Some(pre) = self.pre_transform {
            series = pre.apply(&series);
        }

        if self.lag > 0 {
            series = lag(&series, self.lag);
        } else if self.lead > 0 {
            series = lead(&series, self.lead);
        }

        if self.dimret_adstock && (self.adstock > 0.0 || self.dimret > 0.0) {
            series = dimret_adstock(&series, self.adstock, self.dimret, true);
        } else {
            if self.adstock > 0.0 {
                series = adstock(&series, self.adstock);
            }
            if self.dimret > 0.0 {
                series = dimret(&series, self.dimret, true);
            }
        }

        if self.reference != 0.0 {
            for value in &mut series {
                *value -= self.reference;
            }
        }

        if let Some(post) = self.post_transform {
            series = post.apply(&series);
        }

        if let Some(bad) = series.iter().find(|v| !v.is_finite()) {
            return Err(MixQuantError::transform(
                "<unnamed>",
                format!("transformation produced non-finite value {bad}"),
            ));
        }

        Ok(series)
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_pipeline {
    use super::*;
    use MixQuant_utils::{assert_series_approx_equal, MIXQUANT_EPSILON};

    #[test]
    fn test_identity_configuration_is_identity() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let out = VariableTransform::default().apply(&x).unwrap();
        assert_eq!(out, x.to_vec());
    }

    #[test]
    fn test_order_shift_before_adstock() {
        // lag(1) then adstock(0.5): the impulse decays from position 1.
        let transform = VariableTransform {
            lag: 1,
            adstock: 0.5,
            ..Default::default()
        };
        let out = transform.apply(&[10.0, 0.0, 0.0, 0.0]).unwrap();
        assert_series_approx_equal!(out, [0.0, 10.0, 5.0, 2.5], MIXQUANT_EPSILON);
    }

    #[test]
    fn test_lag_wins_over_lead() {
        let transform = VariableTransform {
            lag: 1,
            lead: 2,
            ..Default::default()
        };
        let out = transform.apply(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_combined_route_uses_dimret_adstock() {
        let transform = VariableTransform {
            adstock: 0.5,
            dimret: 0.5,
            dimret_adstock: true,
            ..Default::default()
        };
        let x = [10.0, 0.0, 0.0];
        let out = transform.apply(&x).unwrap();
        let expected = dimret_adstock(&x, 0.5, 0.5, true);
        assert_series_approx_equal!(out, expected, MIXQUANT_EPSILON);
    }

    #[test]
    fn test_reference_subtraction() {
        let transform = VariableTransform {
            reference: 2.0,
            ..Default::default()
        };
        let out = transform.apply(&[2.0, 3.0, 4.0]).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_out_of_range_rate_rejected() {
        let transform = VariableTransform {
            adstock: 1.0,
            ..Default::default()
        };
        assert!(transform.apply(&[1.0]).is_err());
    }

    #[test]
    fn test_non_finite_output_rejected() {
        // exp overflows to infinity.
        let transform = VariableTransform {
            post_transform: Some(PowerTransform::Exp),
            ..Default::default()
        };
        assert!(transform.apply(&[1000.0]).is_err());
    }
}
