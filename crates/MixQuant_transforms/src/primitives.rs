// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Transform primitives.
//!
//! Carry-over is modelled as geometric-decay adstock,
//! $y_t = x_t + r \cdot y_{t-1}$, and saturation as the concave
//! diminishing-returns map $y = 1 - e^{-\alpha x}$ where $\alpha$ is
//! either given directly or derived from a retention percentage $p$ via
//! $\alpha = -\ln(1-p) / \bar{x}_{+}$ ($\bar{x}_{+}$ being the mean of the
//! strictly positive observations). Normalized variants rescale the output
//! so the series total is preserved.

use MixQuant_error::MixQuantError;

/// Additive floor keeping `log` defined at zero.
pub const LOG_FLOOR: f64 = 1e-10;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Power transform applied before or after the temporal steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerTransform {
    /// `ln(x + 1e-10)`.
    Log,

    /// `sqrt(max(x, 0))`.
    Sqrt,

    /// `e^x`.
    Exp,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl PowerTransform {
    /// Applies the transform element-wise.
    #[must_use]
    pub fn apply(&self, series: &[f64]) -> Vec<f64> {
        match self {
            Self::Log => series.iter().map(|x| (x + LOG_FLOOR).ln()).collect(),
            Self::Sqrt => series.iter().map(|x| x.max(0.0).sqrt()).collect(),
            Self::Exp => series.iter().map(|x| x.exp()).collect(),
        }
    }

    /// Parses the wire spelling (`"log"`, `"sqrt"`, `"exp"`; empty or
    /// `"none"` mean no transform).
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on an unknown spelling.
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, MixQuantError> {
        match raw.map(str::trim).map(str::to_lowercase).as_deref() {
            None | Some("") | Some("none") => Ok(None),
            Some("log") => Ok(Some(Self::Log)),
            Some("sqrt") => Ok(Some(Self::Sqrt)),
            Some("exp") => Ok(Some(Self::Exp)),
            Some(other) => Err(MixQuantError::InputError(format!(
                "unknown transform '{other}'"
            ))),
        }
    }
}

/// Shifts the series `k` positions later, zero-padding the head.
#[must_use]
pub fn lag(series: &[f64], k: usize) -> Vec<f64> {
    if k == 0 || k >= series.len() {
        return if k == 0 {
            series.to_vec()
        } else {
            vec![0.0; series.len()]
        };
    }

    let mut shifted = vec![0.0; series.len()];
    shifted[k..].copy_from_slice(&series[..series.len() - k]);
    shifted
}

/// Shifts the series `k` positions earlier, zero-padding the tail.
#[must_use]
pub fn lead(series: &[f64], k: usize) -> Vec<f64> {
    if k == 0 || k >= series.len() {
        return if k == 0 {
            series.to_vec()
        } else {
            vec![0.0; series.len()]
        };
    }

    let mut shifted = vec![0.0; series.len()];
    shifted[..series.len() - k].copy_from_slice(&series[k..]);
    shifted
}

/// Geometric-decay carry-over: `y[0] = x[0]`, `y[i] = x[i] + r·y[i-1]`.
#[must_use]
pub fn adstock(series: &[f64], rate: f64) -> Vec<f64> {
    if rate == 0.0 {
        return series.to_vec();
    }

    let mut carried = Vec::with_capacity(series.len());
    let mut previous = 0.0;
    for x in series {
        let y = x + rate * previous;
        carried.push(y);
        previous = y;
    }
    carried
}

/// Adstock rescaled so that the series total is preserved.
///
/// # Errors
/// - `MixQuantError::TransformError` when the carried series sums to a
///   non-positive value (the rescale would divide by zero).
pub fn normalized_adstock(series: &[f64], rate: f64) -> Result<Vec<f64>, MixQuantError> {
    if rate == 0.0 {
        return Ok(series.to_vec());
    }

    let carried = adstock(series, rate);
    rescale_to_sum(series, carried, "adstock")
}

/// Diminishing-returns saturation.
///
/// With `pct = true`, `info` is the retention percentage converted to
/// `alpha` through the positive mean; otherwise `info` is `alpha` itself.
/// A series with no positive mass saturates to zero.
#[must_use]
pub fn dimret(series: &[f64], info: f64, pct: bool) -> Vec<f64> {
    if info == 0.0 {
        return series.to_vec();
    }
    if series.iter().sum::<f64>() == 0.0 {
        return vec![0.0; series.len()];
    }

    let alpha = if pct {
        dimret_alpha(series, info)
    } else {
        info
    };

    series.iter().map(|x| 1.0 - (-alpha * x).exp()).collect()
}

/// Diminishing returns rescaled so that the series total is preserved.
///
/// # Errors
/// - `MixQuantError::TransformError` when the saturated series sums to a
///   non-positive value (the rescale would divide by zero).
pub fn normalized_dimret(series: &[f64], info: f64, pct: bool) -> Result<Vec<f64>, MixQuantError> {
    if info == 0.0 {
        return Ok(series.to_vec());
    }

    let saturated = dimret(series, info, pct);
    rescale_to_sum(series, saturated, "dimret")
}

/// Combined carry-over and saturation: adstock first, then diminishing
/// returns with `alpha` derived from the *raw* series' positive mean.
#[must_use]
pub fn dimret_adstock(series: &[f64], rate: f64, info: f64, pct: bool) -> Vec<f64> {
    let carried = adstock(series, rate);
    if info == 0.0 || series.iter().sum::<f64>() == 0.0 {
        return carried;
    }

    let alpha = if pct {
        dimret_alpha(series, info)
    } else {
        info
    };

    carried.iter().map(|x| 1.0 - (-alpha * x).exp()).collect()
}

/// Combined carry-over and saturation rescaled to preserve the series
/// total.
///
/// # Errors
/// - `MixQuantError::TransformError` when the transformed series sums to a
///   non-positive value.
pub fn normalized_dimret_adstock(
    series: &[f64],
    rate: f64,
    info: f64,
    pct: bool,
) -> Result<Vec<f64>, MixQuantError> {
    let transformed = dimret_adstock(series, rate, info, pct);
    rescale_to_sum(series, transformed, "dimret_adstock")
}

/// Alpha from a retention percentage: `-ln(1 - p) / mean(x | x > 0)`.
/// Zero when the series has no positive observations.
fn dimret_alpha(series: &[f64], pct: f64) -> f64 {
    let positives: Vec<f64> = series.iter().copied().filter(|x| *x > 0.0).collect();
    if positives.is_empty() {
        return 0.0;
    }

    let positive_mean = positives.iter().sum::<f64>() / positives.len() as f64;
    if positive_mean > 0.0 {
        -(1.0 - pct).ln() / positive_mean
    } else {
        0.0
    }
}

/// Rescales `transformed` so its sum matches the original series' sum.
fn rescale_to_sum(
    original: &[f64],
    transformed: Vec<f64>,
    name: &str,
) -> Result<Vec<f64>, MixQuantError> {
    let sum_original: f64 = original.iter().sum();
    let sum_transformed: f64 = transformed.iter().sum();

    if sum_transformed <= 0.0 {
        return Err(MixQuantError::transform(
            name,
            format!("cannot normalize: transformed series sums to {sum_transformed}"),
        ));
    }

    let scale = sum_original / sum_transformed;
    Ok(transformed.iter().map(|y| y * scale).collect())
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_primitives {
    use super::*;
    use MixQuant_utils::{assert_approx_equal, assert_series_approx_equal, MIXQUANT_EPSILON};

    #[test]
    fn test_adstock_impulse_decay() {
        let out = adstock(&[10.0, 0.0, 0.0, 0.0], 0.5);
        assert_series_approx_equal!(out, [10.0, 5.0, 2.5, 1.25], MIXQUANT_EPSILON);
    }

    #[test]
    fn test_adstock_dominates_nonnegative_input() {
        let x = [1.0, 2.0, 0.0, 3.0];
        let out = adstock(&x, 0.7);
        for (y, x) in out.iter().zip(x.iter()) {
            assert!(y >= x);
        }
    }

    #[test]
    fn test_adstock_zero_rate_is_identity() {
        let x = [1.0, -2.0, 3.0];
        assert_eq!(adstock(&x, 0.0), x.to_vec());
    }

    #[test]
    fn test_dimret_pct_alpha_from_positive_mean() {
        // mean of positives = 7/3; alpha = -ln(0.5) / (7/3).
        let x = [0.0, 1.0, 2.0, 4.0];
        let alpha = -(0.5_f64.ln()) / (7.0 / 3.0);
        let out = dimret(&x, 0.5, true);

        assert_approx_equal!(out[0], 0.0, MIXQUANT_EPSILON);
        assert_approx_equal!(out[1], 1.0 - (-alpha).exp(), MIXQUANT_EPSILON);
        assert_approx_equal!(out[2], 1.0 - (-2.0 * alpha).exp(), MIXQUANT_EPSILON);
        assert_approx_equal!(out[3], 1.0 - (-4.0 * alpha).exp(), MIXQUANT_EPSILON);
    }

    #[test]
    fn test_dimret_stays_in_unit_interval() {
        let x = [0.0, 5.0, 50.0, 500.0];
        for y in dimret(&x, 0.3, true) {
            assert!((0.0..=1.0).contains(&y));
        }
    }

    #[test]
    fn test_dimret_zero_info_is_identity() {
        let x = [1.0, 2.0, 3.0];
        assert_eq!(dimret(&x, 0.0, true), x.to_vec());
    }

    #[test]
    fn test_dimret_all_zero_series() {
        assert_eq!(dimret(&[0.0, 0.0], 0.5, true), vec![0.0, 0.0]);
    }

    #[test]
    fn test_lag_pads_head_with_zeros() {
        let out = lag(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(out, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_lead_pads_tail_with_zeros() {
        let out = lead(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_lag_and_lead_invert_on_the_interior() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let k = 2;
        let round_trip = lag(&lead(&x, k), k);
        assert_eq!(round_trip[k..x.len() - k], x[k..x.len() - k]);
    }

    #[test]
    fn test_shift_past_series_length_is_all_zero() {
        assert_eq!(lag(&[1.0, 2.0], 5), vec![0.0, 0.0]);
        assert_eq!(lead(&[1.0, 2.0], 5), vec![0.0, 0.0]);
    }

    #[test]
    fn test_normalized_adstock_preserves_sum() {
        let x = [10.0, 0.0, 3.0, 1.0];
        let out = normalized_adstock(&x, 0.5).unwrap();
        assert_approx_equal!(out.iter().sum::<f64>(), x.iter().sum::<f64>(), 1e-10);
    }

    #[test]
    fn test_normalized_dimret_preserves_sum() {
        let x = [0.0, 1.0, 2.0, 4.0];
        let out = normalized_dimret(&x, 0.5, true).unwrap();
        assert_approx_equal!(out.iter().sum::<f64>(), x.iter().sum::<f64>(), 1e-10);
    }

    #[test]
    fn test_normalized_dimret_adstock_preserves_sum() {
        let x = [3.0, 1.0, 4.0, 1.0, 5.0];
        let out = normalized_dimret_adstock(&x, 0.4, 0.5, true).unwrap();
        assert_approx_equal!(out.iter().sum::<f64>(), x.iter().sum::<f64>(), 1e-10);
    }

    #[test]
    fn test_normalized_dimret_rejects_zero_sum() {
        // Positive and negative mass cancel after saturation.
        let x = [1.0, -1.0];
        assert!(normalized_dimret(&x, 0.5, true).is_err());
    }

    #[test]
    fn test_dimret_adstock_uses_raw_positive_mean() {
        // Alpha must come from the raw series, not the adstocked one.
        let x = [10.0, 0.0, 0.0];
        let alpha = -(0.5_f64.ln()) / 10.0;
        let carried = adstock(&x, 0.5);
        let expected: Vec<f64> = carried.iter().map(|v| 1.0 - (-alpha * v).exp()).collect();
        let out = dimret_adstock(&x, 0.5, 0.5, true);
        assert_series_approx_equal!(out, expected, MIXQUANT_EPSILON);
    }

    #[test]
    fn test_power_transforms() {
        let out = PowerTransform::Sqrt.apply(&[4.0, -9.0]);
        assert_eq!(out, vec![2.0, 0.0]);

        let out = PowerTransform::Exp.apply(&[0.0, 1.0]);
        assert_approx_equal!(out[1], std::f64::consts::E, MIXQUANT_EPSILON);

        let out = PowerTransform::Log.apply(&[1.0]);
        assert_approx_equal!(out[0], (1.0_f64 + LOG_FLOOR).ln(), MIXQUANT_EPSILON);
    }

    #[test]
    fn test_power_transform_parse() {
        assert_eq!(PowerTransform::parse(None).unwrap(), None);
        assert_eq!(PowerTransform::parse(Some("none")).unwrap(), None);
        assert_eq!(
            PowerTransform::parse(Some("log")).unwrap(),
            Some(PowerTransform::Log)
        );
        assert!(PowerTransform::parse(Some("cube")).is_err());
    }
}
