// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Shared statistical helpers for the diagnostic batteries: sample
//! moments, autocorrelations, auxiliary regressions, and distribution
//! tail probabilities.

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ChiSquared, ContinuousCDF, FisherSnedecor, Normal};

use MixQuant_regression::least_squares;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Sample mean.
#[must_use]
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Biased (population) variance.
#[must_use]
pub fn variance(xs: &[f64]) -> f64 {
    let m = mean(xs);
    mean(&xs.iter().map(|x| (x - m).powi(2)).collect::<Vec<f64>>())
}

/// Sample skewness (biased moment estimator).
#[must_use]
pub fn skewness(xs: &[f64]) -> f64 {
    let m = mean(xs);
    let s2 = variance(xs);
    if s2 <= 0.0 {
        return 0.0;
    }
    let m3 = mean(&xs.iter().map(|x| (x - m).powi(3)).collect::<Vec<f64>>());
    m3 / s2.powf(1.5)
}

/// Sample kurtosis (biased moment estimator; normal = 3).
#[must_use]
pub fn kurtosis(xs: &[f64]) -> f64 {
    let m = mean(xs);
    let s2 = variance(xs);
    if s2 <= 0.0 {
        return 3.0;
    }
    let m4 = mean(&xs.iter().map(|x| (x - m).powi(4)).collect::<Vec<f64>>());
    m4 / s2.powi(2)
}

/// Lag-k autocorrelation of a mean-centered series.
#[must_use]
pub fn autocorrelation(xs: &[f64], k: usize) -> f64 {
    let n = xs.len();
    if k >= n {
        return 0.0;
    }

    let m = mean(xs);
    let denominator: f64 = xs.iter().map(|x| (x - m).powi(2)).sum();
    if denominator <= 0.0 {
        return 0.0;
    }

    let numerator: f64 = (k..n).map(|t| (xs[t] - m) * (xs[t - k] - m)).sum();
    numerator / denominator
}

/// Pearson correlation of two equal-length series.
#[must_use]
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (ma, mb) = (mean(a), mean(b));
    let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
    let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
    if va <= 0.0 || vb <= 0.0 {
        return 0.0;
    }
    cov / (va * vb).sqrt()
}

/// R-squared of an auxiliary OLS regression of `y` on `x`. `None` when
/// the regression is degenerate (no variance in `y` or a failed solve).
#[must_use]
pub fn auxiliary_r_squared(x: &DMatrix<f64>, y: &[f64]) -> Option<f64> {
    let y_vec = DVector::from_column_slice(y);
    let beta = least_squares(x, &y_vec).ok()?;
    let fitted = x * beta;
    let residuals = &y_vec - &fitted;
    let rss = residuals.dot(&residuals);

    let m = mean(y);
    let tss: f64 = y.iter().map(|v| (v - m).powi(2)).sum();
    if tss <= 0.0 {
        return None;
    }
    Some(1.0 - rss / tss)
}

/// Residual sum of squares of an auxiliary OLS regression.
#[must_use]
pub fn auxiliary_rss(x: &DMatrix<f64>, y: &[f64]) -> Option<f64> {
    let y_vec = DVector::from_column_slice(y);
    let beta = least_squares(x, &y_vec).ok()?;
    let fitted = x * beta;
    let residuals = &y_vec - &fitted;
    Some(residuals.dot(&residuals))
}

/// Numeric rank of a matrix by SVD.
#[must_use]
pub fn matrix_rank(m: &DMatrix<f64>) -> usize {
    let svd = m.clone().svd(false, false);
    let max = svd.singular_values.iter().cloned().fold(0.0, f64::max);
    if max == 0.0 {
        return 0;
    }
    let tolerance = max * f64::EPSILON.sqrt();
    svd.singular_values.iter().filter(|s| **s > tolerance).count()
}

/// Upper-tail chi-squared probability.
#[must_use]
pub fn chi_squared_survival(statistic: f64, df: usize) -> Option<f64> {
    if df == 0 || !statistic.is_finite() {
        return None;
    }
    let dist = ChiSquared::new(df as f64).ok()?;
    Some(1.0 - dist.cdf(statistic.max(0.0)))
}

/// Upper-tail F probability.
#[must_use]
pub fn f_survival(statistic: f64, df1: usize, df2: usize) -> Option<f64> {
    if df1 == 0 || df2 == 0 || !statistic.is_finite() {
        return None;
    }
    let dist = FisherSnedecor::new(df1 as f64, df2 as f64).ok()?;
    Some(1.0 - dist.cdf(statistic.max(0.0)))
}

/// Two-tailed standard-normal probability.
#[must_use]
pub fn normal_two_tailed(statistic: f64) -> Option<f64> {
    if !statistic.is_finite() {
        return None;
    }
    let dist = Normal::new(0.0, 1.0).ok()?;
    Some(2.0 * (1.0 - dist.cdf(statistic.abs())))
}

/// Standard-normal CDF.
#[must_use]
pub fn normal_cdf(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(dist) => dist.cdf(z),
        Err(_) => f64::NAN,
    }
}

/// Prepends an all-ones intercept column.
#[must_use]
pub fn with_intercept(columns: &[Vec<f64>], n: usize) -> DMatrix<f64> {
    let mut all = vec![vec![1.0; n]];
    all.extend_from_slice(columns);
    columns_to_matrix(&all)
}

/// Stacks column vectors into a matrix.
#[must_use]
pub fn columns_to_matrix(columns: &[Vec<f64>]) -> DMatrix<f64> {
    let n = columns.first().map_or(0, Vec::len);
    DMatrix::from_fn(n, columns.len(), |i, j| columns[j][i])
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_stats {
    use super::*;
    use MixQuant_utils::{assert_approx_equal, MIXQUANT_EPSILON};

    #[test]
    fn test_moments() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx_equal!(mean(&xs), 5.0, MIXQUANT_EPSILON);
        assert_approx_equal!(variance(&xs), 4.0, MIXQUANT_EPSILON);
    }

    #[test]
    fn test_autocorrelation_of_constant_is_zero() {
        assert_eq!(autocorrelation(&[1.0, 1.0, 1.0], 1), 0.0);
    }

    #[test]
    fn test_pearson_perfect_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert_approx_equal!(pearson(&a, &b), 1.0, MIXQUANT_EPSILON);
    }

    #[test]
    fn test_auxiliary_r_squared_perfect_fit() {
        let x = with_intercept(&[vec![1.0, 2.0, 3.0, 4.0]], 4);
        let y = [3.0, 5.0, 7.0, 9.0];
        let r2 = auxiliary_r_squared(&x, &y).unwrap();
        assert_approx_equal!(r2, 1.0, 1e-10);
    }

    #[test]
    fn test_matrix_rank_detects_duplicates() {
        let x = columns_to_matrix(&[
            vec![1.0, 1.0, 1.0],
            vec![1.0, 2.0, 3.0],
            vec![1.0, 2.0, 3.0],
        ]);
        assert_eq!(matrix_rank(&x), 2);
    }

    #[test]
    fn test_tail_probabilities_are_probabilities() {
        assert!((0.0..=1.0).contains(&chi_squared_survival(3.2, 2).unwrap()));
        assert!((0.0..=1.0).contains(&f_survival(1.7, 2, 10).unwrap()));
        assert!((0.0..=1.0).contains(&normal_two_tailed(-1.3).unwrap()));
        assert!(chi_squared_survival(f64::NAN, 2).is_none());
    }
}
