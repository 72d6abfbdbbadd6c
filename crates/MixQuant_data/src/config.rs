// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Model configuration: the KPI expression, the modelling window, optional
//! per-section weights, and the decomposition switches.

use time::Date;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Model configuration record.
#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// The dependent variable expression, possibly wrapped in `log(...)`.
    pub kpi: String,

    /// First date of the modelling window (inclusive).
    pub start: Date,

    /// Last date of the modelling window (inclusive).
    pub end: Date,

    /// Name of the cross-section dimension holding per-section weights,
    /// if weighting is enabled.
    pub weights_column: Option<String>,

    /// Whether the Jensen-inequality bias of a log-space fit is corrected
    /// during decomposition.
    pub log_trans_bias_adjustment: bool,

    /// Whether decomposition exponentiates at midpoints (alpha = 1/2)
    /// rather than endpoints (alpha = 1).
    pub anti_logs_at_midpoints: bool,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl ModelConfig {
    /// Whether the KPI is fit in log space (the expression is wrapped in a
    /// single outer `log(...)` call).
    #[must_use]
    pub fn kpi_is_logged(&self) -> bool {
        let kpi = self.kpi.trim();
        kpi.starts_with("log(") && kpi.ends_with(')')
    }

    /// The exponentiation parameters `(alpha_plus, alpha_minus)` used by
    /// the decomposition's post-exponential step.
    #[must_use]
    pub fn anti_log_parameters(&self) -> (f64, f64) {
        if self.anti_logs_at_midpoints {
            (0.5, -0.5)
        } else {
            (1.0, 0.0)
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_config {
    use super::*;
    use time::macros::date;

    fn config(kpi: &str) -> ModelConfig {
        ModelConfig {
            kpi: kpi.to_string(),
            start: date!(2024 - 01 - 01),
            end: date!(2024 - 12 - 31),
            weights_column: None,
            log_trans_bias_adjustment: false,
            anti_logs_at_midpoints: true,
        }
    }

    #[test]
    fn test_kpi_is_logged() {
        assert!(config("log(sales)").kpi_is_logged());
        assert!(config("log(sales_.crosssection.)").kpi_is_logged());
        assert!(!config("sales").kpi_is_logged());
    }

    #[test]
    fn test_anti_log_parameters() {
        let mut cfg = config("log(sales)");
        assert_eq!(cfg.anti_log_parameters(), (0.5, -0.5));
        cfg.anti_logs_at_midpoints = false;
        assert_eq!(cfg.anti_log_parameters(), (1.0, 0.0));
    }
}
