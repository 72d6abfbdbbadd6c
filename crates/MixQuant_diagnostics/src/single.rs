// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The single time-series diagnostic battery.

use nalgebra::DMatrix;

use crate::category;
use crate::stats::{
    auxiliary_r_squared, auxiliary_rss, autocorrelation, chi_squared_survival, columns_to_matrix,
    f_survival, kurtosis, matrix_rank, mean, normal_cdf, skewness, variance,
};
use crate::Diagnostic;

/// Ljung-Box lag order.
pub const LJUNG_BOX_LAGS: usize = 10;

/// Breusch-Godfrey autoregressive order.
pub const BREUSCH_GODFREY_ORDER: usize = 1;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Computes the single time-series battery from the dependent variable,
/// the design matrix and the fitted values.
#[must_use]
pub fn single_series_battery(y: &[f64], x: &DMatrix<f64>, fitted: &[f64]) -> Vec<Diagnostic> {
    let residuals: Vec<f64> = y.iter().zip(fitted).map(|(y, f)| y - f).collect();
    let n = y.len();
    let k = x.ncols();
    let dof_model = k.saturating_sub(1);
    let dof_residual = n.saturating_sub(k);

    let rss: f64 = residuals.iter().map(|e| e * e).sum();
    let y_mean = mean(y);
    let tss: f64 = y.iter().map(|v| (v - y_mean).powi(2)).sum();

    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };
    let adj_r_squared = if dof_residual > 0 {
        1.0 - (1.0 - r_squared) * (n as f64 - 1.0) / dof_residual as f64
    } else {
        f64::NAN
    };
    let error_variance = if dof_residual > 0 {
        rss / dof_residual as f64
    } else {
        f64::NAN
    };

    let n_f = n as f64;
    let aic = n_f * (rss / n_f).ln() + 2.0 * k as f64;
    let bic = n_f * (rss / n_f).ln() + k as f64 * n_f.ln();

    vec![
        Diagnostic::stat("R-squared", category::MODEL_FIT, r_squared),
        Diagnostic::stat("Adj R-squared", category::MODEL_FIT, adj_r_squared),
        Diagnostic::stat("Variable Count", category::MODEL_FIT, k as f64),
        Diagnostic::stat("Observation Count", category::TOPLINE, n as f64),
        Diagnostic::stat(
            "Degrees of Freedom (Model)",
            category::TOPLINE,
            dof_model as f64,
        ),
        Diagnostic::stat(
            "Degrees of Freedom (Residuals)",
            category::TOPLINE,
            dof_residual as f64,
        ),
        Diagnostic::stat("Model Error Variance", category::MODEL_FIT, error_variance),
        Diagnostic::stat(
            "Model Standard Error",
            category::MODEL_FIT,
            error_variance.sqrt(),
        ),
        Diagnostic::stat("AIC", category::MODEL_FIT, aic),
        Diagnostic::stat("BIC", category::MODEL_FIT, bic),
        Diagnostic::stat(
            "Durbin-Watson Statistic",
            category::SERIAL_CORRELATION,
            durbin_watson(&residuals),
        ),
        Diagnostic::test(
            "Ljung-Box Stat",
            category::SERIAL_CORRELATION,
            ljung_box(&residuals, LJUNG_BOX_LAGS),
        ),
        Diagnostic::test(
            "Breusch-Godfrey Stat",
            category::SERIAL_CORRELATION,
            breusch_godfrey(&residuals, x, BREUSCH_GODFREY_ORDER),
        ),
        Diagnostic::test(
            "Breusch-Pagan Stat",
            category::HETEROSCEDASTICITY,
            breusch_pagan(&residuals, x),
        ),
        Diagnostic::test(
            "White Test Stat",
            category::HETEROSCEDASTICITY,
            white(&residuals, x),
        ),
        Diagnostic::test(
            "ARCH1 Stat",
            category::HETEROSCEDASTICITY,
            arch(&residuals),
        ),
        Diagnostic::test(
            "Ramsey RESET Stat",
            category::FUNCTIONAL_FORM,
            ramsey_reset(y, x, fitted),
        ),
        Diagnostic::test(
            "Jarque-Bera Stat",
            category::NORMALITY,
            jarque_bera(&residuals),
        ),
        Diagnostic::test(
            "Lilliefors Stat",
            category::NORMALITY,
            lilliefors(&residuals),
        ),
    ]
}

/// Durbin-Watson first-order autocorrelation statistic.
#[must_use]
pub fn durbin_watson(residuals: &[f64]) -> f64 {
    let denominator: f64 = residuals.iter().map(|e| e * e).sum();
    if denominator <= 0.0 {
        return f64::NAN;
    }
    let numerator: f64 = residuals
        .windows(2)
        .map(|w| (w[1] - w[0]).powi(2))
        .sum();
    numerator / denominator
}

/// Ljung-Box portmanteau test at the given lag order.
#[must_use]
pub fn ljung_box(residuals: &[f64], lags: usize) -> Option<(f64, f64)> {
    let n = residuals.len();
    if n <= lags + 1 {
        return None;
    }

    let n_f = n as f64;
    let q: f64 = (1..=lags)
        .map(|k| {
            let r = autocorrelation(residuals, k);
            r * r / (n_f - k as f64)
        })
        .sum::<f64>()
        * n_f
        * (n_f + 2.0);

    chi_squared_survival(q, lags).map(|p| (q, p))
}

/// Breusch-Godfrey LM test on the residual regression.
#[must_use]
pub fn breusch_godfrey(
    residuals: &[f64],
    x: &DMatrix<f64>,
    order: usize,
) -> Option<(f64, f64)> {
    let n = residuals.len();
    if n <= x.ncols() + order {
        return None;
    }

    // Augment the design with lagged residuals (zero-padded heads).
    let mut columns: Vec<Vec<f64>> = (0..x.ncols())
        .map(|j| x.column(j).iter().copied().collect())
        .collect();
    for lag in 1..=order {
        let mut lagged = vec![0.0; n];
        lagged[lag..].copy_from_slice(&residuals[..n - lag]);
        columns.push(lagged);
    }

    let aux = columns_to_matrix(&columns);
    let r2 = auxiliary_r_squared(&aux, residuals)?;
    let lm = n as f64 * r2;
    chi_squared_survival(lm, order).map(|p| (lm, p))
}

/// Breusch-Pagan LM test for heteroscedasticity.
#[must_use]
pub fn breusch_pagan(residuals: &[f64], x: &DMatrix<f64>) -> Option<(f64, f64)> {
    let df = x.ncols().checked_sub(1)?;
    if df == 0 {
        return None;
    }

    let squared: Vec<f64> = residuals.iter().map(|e| e * e).collect();
    let r2 = auxiliary_r_squared(x, &squared)?;
    let lm = residuals.len() as f64 * r2;
    chi_squared_survival(lm, df).map(|p| (lm, p))
}

/// White test with squares and cross products. `None` when the augmented
/// design is rank-deficient.
#[must_use]
pub fn white(residuals: &[f64], x: &DMatrix<f64>) -> Option<(f64, f64)> {
    let n = residuals.len();

    // Split the intercept (zero-variance columns) from the regressors.
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
    let mut regressors: Vec<Vec<f64>> = Vec::new();
    for j in 0..x.ncols() {
        let column: Vec<f64> = x.column(j).iter().copied().collect();
        if variance(&column) > 0.0 {
            regressors.push(column);
        }
    }

    for r in &regressors {
        columns.push(r.clone());
    }
    for r in &regressors {
        columns.push(r.iter().map(|v| v * v).collect());
    }
    for i in 0..regressors.len() {
        for j in i + 1..regressors.len() {
            columns.push(
                regressors[i]
                    .iter()
                    .zip(&regressors[j])
                    .map(|(a, b)| a * b)
                    .collect(),
            );
        }
    }

    let aux = columns_to_matrix(&columns);
    if n <= aux.ncols() || matrix_rank(&aux) < aux.ncols() {
        // Singular augmented design; Diagnostic::test logs the N/A.
        return None;
    }

    let squared: Vec<f64> = residuals.iter().map(|e| e * e).collect();
    let r2 = auxiliary_r_squared(&aux, &squared)?;
    let lm = n as f64 * r2;
    chi_squared_survival(lm, aux.ncols() - 1).map(|p| (lm, p))
}

/// First-order ARCH LM test.
#[must_use]
pub fn arch(residuals: &[f64]) -> Option<(f64, f64)> {
    let n = residuals.len();
    if n < 4 {
        return None;
    }

    let squared: Vec<f64> = residuals.iter().map(|e| e * e).collect();
    let lagged: Vec<f64> = squared[..n - 1].to_vec();
    let current: Vec<f64> = squared[1..].to_vec();

    let aux = columns_to_matrix(&[vec![1.0; n - 1], lagged]);
    let r2 = auxiliary_r_squared(&aux, &current)?;
    let lm = (n as f64 - 1.0) * r2;
    chi_squared_survival(lm, 1).map(|p| (lm, p))
}

/// Ramsey RESET test at power 2: F-test on adding the squared fitted
/// values to the design.
#[must_use]
pub fn ramsey_reset(y: &[f64], x: &DMatrix<f64>, fitted: &[f64]) -> Option<(f64, f64)> {
    let n = y.len();
    let k = x.ncols();
    if n <= k + 1 {
        return None;
    }

    let rss_restricted = auxiliary_rss(x, y)?;

    let mut columns: Vec<Vec<f64>> = (0..k)
        .map(|j| x.column(j).iter().copied().collect())
        .collect();
    columns.push(fitted.iter().map(|f| f * f).collect());
    let augmented = columns_to_matrix(&columns);
    let rss_full = auxiliary_rss(&augmented, y)?;

    let df2 = n - k - 1;
    if rss_full <= 0.0 {
        return None;
    }
    let f = (rss_restricted - rss_full).max(0.0) / (rss_full / df2 as f64);
    f_survival(f, 1, df2).map(|p| (f, p))
}

/// Jarque-Bera normality test.
#[must_use]
pub fn jarque_bera(residuals: &[f64]) -> Option<(f64, f64)> {
    let n = residuals.len();
    if n < 4 {
        return None;
    }

    let s = skewness(residuals);
    let k = kurtosis(residuals);
    let jb = n as f64 / 6.0 * (s * s + (k - 3.0).powi(2) / 4.0);
    chi_squared_survival(jb, 2).map(|p| (jb, p))
}

/// Lilliefors normality test with the Dallal-Wilkinson p-value
/// approximation.
#[must_use]
pub fn lilliefors(residuals: &[f64]) -> Option<(f64, f64)> {
    let n = residuals.len();
    if n < 4 {
        return None;
    }

    let m = mean(residuals);
    let s2 = residuals.iter().map(|e| (e - m).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    if s2 <= 0.0 {
        return None;
    }
    let s = s2.sqrt();

    let mut standardized: Vec<f64> = residuals.iter().map(|e| (e - m) / s).collect();
    standardized.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n_f = n as f64;
    let mut d: f64 = 0.0;
    for (i, z) in standardized.iter().enumerate() {
        let cdf = normal_cdf(*z);
        let upper = (i as f64 + 1.0) / n_f - cdf;
        let lower = cdf - i as f64 / n_f;
        d = d.max(upper.max(lower));
    }

    // Dallal & Wilkinson (1986) approximation.
    let nd = n_f + 2.78019;
    let p = (-7.01256 * d * d * nd + 2.99587 * d * nd.sqrt() - 0.122119
        + 0.974598 / n_f.sqrt()
        + 1.67997 / n_f)
        .exp();

    Some((d, p.clamp(0.0, 1.0)))
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_single {
    use super::*;
    use crate::stats::with_intercept;
    use MixQuant_utils::assert_approx_equal;

    /// Deterministic hash-style noise, roughly white with mean zero.
    fn residual_like(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let v = ((i as f64 + 1.0).sin() * 43_758.545_3).abs();
                v - v.floor() - 0.5
            })
            .collect()
    }

    fn design(n: usize) -> DMatrix<f64> {
        with_intercept(&[(0..n).map(|i| i as f64).collect()], n)
    }

    #[test]
    fn test_durbin_watson_near_two_for_white_noise() {
        let dw = durbin_watson(&residual_like(200));
        assert!(dw > 1.5 && dw < 2.5, "dw = {dw}");
    }

    #[test]
    fn test_durbin_watson_near_zero_for_trending_residuals() {
        let trending: Vec<f64> = (0..100).map(|i| i as f64).collect();
        assert!(durbin_watson(&trending) < 0.1);
    }

    #[test]
    fn test_ljung_box_flags_strong_autocorrelation() {
        let persistent: Vec<f64> = (0..120).map(|i| (i as f64 * 0.05).sin()).collect();
        let (_, p) = ljung_box(&persistent, 10).unwrap();
        assert!(p < 0.01);
    }

    #[test]
    fn test_battery_shapes_and_p_value_ranges() {
        let n = 60;
        let x = design(n);
        let residuals = residual_like(n);
        let fitted: Vec<f64> = (0..n).map(|i| 1.0 + 0.5 * i as f64).collect();
        let y: Vec<f64> = fitted.iter().zip(&residuals).map(|(f, e)| f + e).collect();

        let battery = single_series_battery(&y, &x, &fitted);
        assert_eq!(battery.len(), 19);

        for diagnostic in &battery {
            if let Some(p) = diagnostic.p_value {
                assert!((0.0..=1.0).contains(&p), "{}: p = {p}", diagnostic.name);
            }
        }

        let r2 = &battery[0];
        assert_eq!(r2.name, "R-squared");
        assert!(r2.statistic > 0.99);
    }

    #[test]
    fn test_jarque_bera_small_for_symmetric_residuals() {
        let symmetric: Vec<f64> = (0..200)
            .map(|i| if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let (jb, _) = jarque_bera(&symmetric).unwrap();
        // No skew; kurtosis of a two-point symmetric distribution is 1.
        assert_approx_equal!(jb, 200.0 / 6.0, 1.0);
    }

    #[test]
    fn test_white_degenerate_design_is_not_applicable() {
        // Two identical regressors make the augmented design singular.
        let n = 30;
        let base: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let x = with_intercept(&[base.clone(), base], n);
        assert!(white(&residual_like(n), &x).is_none());
    }

    #[test]
    fn test_too_short_series_yield_none() {
        let x = design(3);
        assert!(ljung_box(&[0.1, -0.1, 0.2], 10).is_none());
        assert!(breusch_godfrey(&[0.1, -0.1, 0.2], &x, 1).is_none());
        assert!(arch(&[0.1, -0.1, 0.2]).is_none());
    }
}
