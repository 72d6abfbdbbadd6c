// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Variance inflation factors: each design column regressed on all the
//! others.

use nalgebra::DMatrix;

use crate::stats::{auxiliary_r_squared, variance};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// VIF per design column. Zero-variance columns (the intercept) report
/// `NaN`; callers exclude them when serializing.
#[must_use]
pub fn variance_inflation_factors(x: &DMatrix<f64>) -> Vec<f64> {
    let k = x.ncols();
    let columns: Vec<Vec<f64>> = (0..k)
        .map(|j| x.column(j).iter().copied().collect())
        .collect();

    (0..k)
        .map(|j| {
            if variance(&columns[j]) <= 0.0 {
                return f64::NAN;
            }

            let others: Vec<Vec<f64>> = (0..k)
                .filter(|m| *m != j)
                .map(|m| columns[m].clone())
                .collect();
            if others.is_empty() {
                return 1.0;
            }

            let design = crate::stats::columns_to_matrix(&others);
            match auxiliary_r_squared(&design, &columns[j]) {
                Some(r2) if r2 < 1.0 => 1.0 / (1.0 - r2),
                Some(_) => f64::INFINITY,
                None => f64::NAN,
            }
        })
        .collect()
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
