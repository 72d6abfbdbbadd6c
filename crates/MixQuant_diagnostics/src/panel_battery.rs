// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The panel diagnostic battery: the stacked-data subset of the
//! single-series statistics plus cross-sectional dependence (Pesaran CD),
//! Wooldridge first-difference serial correlation, and a Hausman-style
//! pooled-versus-fixed-effects contrast.

use nalgebra::{DMatrix, DVector};

use crate::category;
use crate::single::{breusch_pagan, ramsey_reset};
use crate::stats::{
    chi_squared_survival, f_survival, mean, normal_two_tailed, pearson, with_intercept,
};
use crate::{jarque_bera, Diagnostic};
use MixQuant_regression::least_squares;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Computes the panel battery. `section_ids` gives the cross-section of
/// each stacked row; `slope_columns` indexes the design columns that are
/// not intercept or fixed-effect dummies (used by the Hausman-style
/// contrast).
#[must_use]
pub fn panel_battery(
    y: &[f64],
    x: &DMatrix<f64>,
    fitted: &[f64],
    section_ids: &[usize],
    slope_columns: &[usize],
) -> Vec<Diagnostic> {
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
        Diagnostic::test(
            "Pesaran's CD Test Stat",
            category::CROSS_SECTIONAL_DEPENDENCE,
            pesaran_cd(&residuals, section_ids),
        ),
        Diagnostic::test(
            "Wooldridge Stat",
            category::SERIAL_CORRELATION,
            wooldridge(&residuals, section_ids),
        ),
        Diagnostic::test(
            "Breusch-Pagan Stat",
            category::HETEROSCEDASTICITY,
            breusch_pagan(&residuals, x),
        ),
        Diagnostic::test(
            "Ramsey RESET Stat",
            category::FUNCTIONAL_FORM,
            ramsey_reset(y, x, fitted),
        ),
        Diagnostic::test(
            "Hausman Test Stat",
            category::FIXED_VS_RANDOM,
            hausman(y, x, slope_columns),
        ),
        Diagnostic::test(
            "Jarque-Bera Stat",
            category::NORMALITY,
            jarque_bera(&residuals),
        ),
    ]
}

/// Splits a stacked series into per-section series, in section-id order.
fn split_by_section(values: &[f64], section_ids: &[usize]) -> Vec<Vec<f64>> {
    let groups = section_ids.iter().copied().max().map_or(0, |m| m + 1);
    let mut split = vec![Vec::new(); groups];
    for (value, id) in values.iter().zip(section_ids) {
        split[*id].push(*value);
    }
    split
}

/// Pesaran's CD test for cross-sectional dependence. Requires a balanced
/// panel with at least two sections.
#[must_use]
pub fn pesaran_cd(residuals: &[f64], section_ids: &[usize]) -> Option<(f64, f64)> {
    let groups = split_by_section(residuals, section_ids);
    let n_sections = groups.len();
    if n_sections < 2 {
        return None;
    }

    let t = groups[0].len();
    if t < 2 || groups.iter().any(|g| g.len() != t) {
        return None;
    }

    let mut correlation_sum = 0.0;
    for i in 0..n_sections {
        for j in i + 1..n_sections {
            correlation_sum += pearson(&groups[i], &groups[j]);
        }
    }

    let scale = (2.0 * t as f64 / (n_sections as f64 * (n_sections as f64 - 1.0))).sqrt();
    let cd = scale * correlation_sum;
    normal_two_tailed(cd).map(|p| (cd, p))
}

/// Wooldridge's first-difference test for serial correlation in panel
/// residuals: under the null the first-differenced residuals have
/// lag-one correlation -0.5.
#[must_use]
pub fn wooldridge(residuals: &[f64], section_ids: &[usize]) -> Option<(f64, f64)> {
    let groups = split_by_section(residuals, section_ids);

    let mut current = Vec::new();
    let mut lagged = Vec::new();
    for group in &groups {
        if group.len() < 3 {
            continue;
        }
        let diffs: Vec<f64> = group.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in diffs.windows(2) {
            lagged.push(pair[0]);
            current.push(pair[1]);
        }
    }

    let m = current.len();
    if m < 3 {
        return None;
    }

    // Slope of current on lagged through the origin.
    let sxx: f64 = lagged.iter().map(|x| x * x).sum();
    if sxx <= 0.0 {
        return None;
    }
    let sxy: f64 = lagged.iter().zip(&current).map(|(x, y)| x * y).sum();
    let b = sxy / sxx;

    let rss: f64 = current
        .iter()
        .zip(&lagged)
        .map(|(y, x)| (y - b * x).powi(2))
        .sum();
    let sigma2 = rss / (m as f64 - 1.0);
    let se = (sigma2 / sxx).sqrt();
    if se <= 0.0 {
        return None;
    }

    let t_stat = (b + 0.5) / se;
    let f = t_stat * t_stat;
    f_survival(f, 1, m - 1).map(|p| (f, p))
}

/// Hausman-style contrast between the fixed-effects fit (the full design,
/// dummies included) and the pooled fit (intercept plus slope columns).
#[must_use]
pub fn hausman(y: &[f64], x: &DMatrix<f64>, slope_columns: &[usize]) -> Option<(f64, f64)> {
    let q = slope_columns.len();
    if q == 0 {
        return None;
    }

    let (beta_fe, cov_fe) = ols_with_covariance(x, y)?;

    let slopes: Vec<Vec<f64>> = slope_columns
        .iter()
        .map(|j| x.column(*j).iter().copied().collect())
        .collect();
    let pooled = with_intercept(&slopes, y.len());
    let (beta_pooled, cov_pooled) = ols_with_covariance(&pooled, y)?;

    let mut contrast = DVector::zeros(q);
    let mut contrast_cov = DMatrix::zeros(q, q);
    for (a, ja) in slope_columns.iter().enumerate() {
        contrast[a] = beta_fe[*ja] - beta_pooled[a + 1];
        for (b, jb) in slope_columns.iter().enumerate() {
            contrast_cov[(a, b)] = cov_fe[(*ja, *jb)] - cov_pooled[(a + 1, b + 1)];
        }
    }

    let inverse = contrast_cov.try_inverse()?;
    let statistic = (contrast.transpose() * inverse * contrast)[(0, 0)];
    if statistic < 0.0 {
        return None;
    }
    chi_squared_survival(statistic, q).map(|p| (statistic, p))
}

/// OLS coefficients and their (non-robust) covariance.
fn ols_with_covariance(x: &DMatrix<f64>, y: &[f64]) -> Option<(DVector<f64>, DMatrix<f64>)> {
    let n = x.nrows();
    let k = x.ncols();
    if n <= k {
        return None;
    }

    let y_vec = DVector::from_column_slice(y);
    let beta = least_squares(x, &y_vec).ok()?;
    let residuals = &y_vec - x * &beta;
    let sigma2 = residuals.dot(&residuals) / (n - k) as f64;

    let xtx_inv = (x.transpose() * x).try_inverse()?;
    Some((beta, xtx_inv * sigma2))
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_panel {
    use super::*;
    use crate::stats::columns_to_matrix;

    fn hash_noise(i: usize, salt: f64) -> f64 {
        let v = ((i as f64 + salt).sin() * 43_758.545_3).abs();
        v - v.floor() - 0.5
    }

    #[test]
    fn test_pesaran_cd_detects_common_shock() {
        // Two sections sharing the same residual path are maximally
        // dependent.
        let t = 40;
        let shared: Vec<f64> = (0..t).map(|i| hash_noise(i, 1.0)).collect();
        let mut residuals = shared.clone();
        residuals.extend_from_slice(&shared);
        let ids: Vec<usize> = std::iter::repeat(0)
            .take(t)
            .chain(std::iter::repeat(1).take(t))
            .collect();

        let (cd, p) = pesaran_cd(&residuals, &ids).unwrap();
        assert!(cd > 5.0, "cd = {cd}");
        assert!(p < 0.001);
    }

    #[test]
    fn test_pesaran_cd_unbalanced_is_not_applicable() {
        let residuals = vec![0.1, -0.2, 0.3, 0.4, -0.1];
        let ids = vec![0, 0, 0, 1, 1];
        assert!(pesaran_cd(&residuals, &ids).is_none());
    }

    #[test]
    fn test_wooldridge_accepts_white_noise() {
        let t = 80;
        let mut residuals = Vec::new();
        let mut ids = Vec::new();
        for section in 0..2 {
            for i in 0..t {
                residuals.push(hash_noise(i, section as f64 * 17.3 + 3.0));
                ids.push(section);
            }
        }
        let (_, p) = wooldridge(&residuals, &ids).unwrap();
        assert!(p > 0.01, "p = {p}");
    }

    #[test]
    fn test_battery_shape() {
        let t = 30;
        let n = 2 * t;
        let mut y = Vec::new();
        let mut ids = Vec::new();
        for section in 0..2 {
            for i in 0..t {
                y.push(1.0 + section as f64 + 0.5 * i as f64 + hash_noise(i, section as f64));
                ids.push(section);
            }
        }

        // Design: two section dummies plus a shared trend column.
        let dummy_a: Vec<f64> = ids.iter().map(|id| f64::from(*id == 0)).collect();
        let dummy_b: Vec<f64> = ids.iter().map(|id| f64::from(*id == 1)).collect();
        let trend: Vec<f64> = (0..n).map(|row| (row % t) as f64).collect();
        let x = columns_to_matrix(&[dummy_a, dummy_b, trend.clone()]);

        let y_vec = DVector::from_column_slice(&y);
        let beta = least_squares(&x, &y_vec).unwrap();
        let fitted: Vec<f64> = (&x * &beta).iter().copied().collect();

        let battery = panel_battery(&y, &x, &fitted, &ids, &[2]);
        assert_eq!(battery.len(), 16);
        for diagnostic in &battery {
            if let Some(p) = diagnostic.p_value {
                assert!((0.0..=1.0).contains(&p), "{}: p = {p}", diagnostic.name);
            }
        }
    }
}
