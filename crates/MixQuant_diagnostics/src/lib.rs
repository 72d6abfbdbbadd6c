// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Econometric diagnostics: the single-series battery, the panel battery,
//! and variance inflation factors. A diagnostic that cannot be computed on
//! the given data reports an absent p-value (`N/A` on the wire) instead of
//! failing the request.

use log::warn;

/// Shared statistical helpers.
pub mod stats;
pub use stats::*;

/// The single time-series battery.
pub mod single;
pub use single::*;

/// The panel battery.
pub mod panel_battery;
pub use panel_battery::*;

/// Variance inflation factors.
pub mod vif;
pub use vif::*;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// One diagnostic entry.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Test or statistic name.
    pub name: &'static str,

    /// Fixed reporting category.
    pub category: &'static str,

    /// The statistic value.
    pub statistic: f64,

    /// The p-value, absent when the test has no p-value or could not be
    /// computed.
    pub p_value: Option<f64>,
}

/// Reporting categories.
pub mod category {
    /// Goodness-of-fit statistics.
    pub const MODEL_FIT: &str = "Model fit";
    /// Counts and degrees of freedom.
    pub const TOPLINE: &str = "Topline";
    /// Serial-correlation tests.
    pub const SERIAL_CORRELATION: &str = "Serial correlation";
    /// Heteroscedasticity tests.
    pub const HETEROSCEDASTICITY: &str = "Heteroscedasticity";
    /// Functional-form tests.
    pub const FUNCTIONAL_FORM: &str = "Functional form";
    /// Residual-normality tests.
    pub const NORMALITY: &str = "Normality of residual";
    /// Cross-sectional dependence tests.
    pub const CROSS_SECTIONAL_DEPENDENCE: &str = "Cross-sectional dependence";
    /// Fixed-versus-random-effects comparison.
    pub const FIXED_VS_RANDOM: &str = "Fixed vs Random Effects";
}

impl Diagnostic {
    /// A statistic-only entry (no p-value).
    #[must_use]
    pub fn stat(name: &'static str, category: &'static str, statistic: f64) -> Self {
        Self {
            name,
            category,
            statistic,
            p_value: None,
        }
    }

    /// A full test entry; `None` marks an uncomputable test, which is
    /// logged and reported as `N/A` rather than failing the request.
    #[must_use]
    pub fn test(
        name: &'static str,
        category: &'static str,
        outcome: Option<(f64, f64)>,
    ) -> Self {
        match outcome {
            Some((statistic, p_value)) => Self {
                name,
                category,
                statistic,
                p_value: Some(p_value),
            },
            None => {
                warn!("{name} could not be computed on this data; reporting N/A");
                Self {
                    name,
                    category,
                    statistic: f64::NAN,
                    p_value: None,
                }
            }
        }
    }
}
