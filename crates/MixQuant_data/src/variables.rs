// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The variable specification table: one row per modelled variable, carrying
//! the transformation expression, the decomposition interval, coefficient
//! bounds, and panel grouping metadata.

use MixQuant_error::MixQuantError;

/// The expression of the intercept variable.
pub const CONSTANT: &str = "constant";

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Reference value subtracted from a transformed series to set its
/// effective zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum ReferencePoint {
    /// No subtraction.
    #[default]
    None,

    /// Subtract the minimum of the date-filtered series.
    Min,

    /// Subtract the maximum of the date-filtered series.
    Max,

    /// Subtract a fixed value.
    Value(f64),
}

/// One row of the variable specification table.
#[derive(Clone, Debug)]
pub struct VariableSpec {
    /// The variable's transformation expression (may contain `.marker.`
    /// substitutions and `¬n` permutation slots).
    pub variable: String,

    /// Grouping dimension whose sections each get their own coefficient,
    /// or `None` for a single pooled coefficient.
    pub xs_grouping: Option<String>,

    /// Reference point subtracted after all other transforms.
    pub reference_point: ReferencePoint,

    /// Decomposition interval (1 is the intercept phase).
    pub interval: u32,

    /// Decomposition roll-up label.
    pub category: String,

    /// Lower coefficient bound.
    pub coeff_min: Option<f64>,

    /// Upper coefficient bound.
    pub coeff_max: Option<f64>,

    /// Prior weight. Carried for the caller's benefit; unused by the core.
    pub importance: Option<f64>,

    /// Short display name used in decomposition output.
    pub short_name: String,

    /// Permutation grid declaration, e.g. `¬1(0.1,0.3,0.5)`.
    pub substitution: Option<String>,

    /// Free-form notes. Unused by the core.
    pub notes: Option<String>,
}

/// The validated variable table.
#[derive(Clone, Debug)]
pub struct VariableTable {
    rows: Vec<VariableSpec>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl ReferencePoint {
    /// Parses the spreadsheet-style reference cell: empty / `nan` means
    /// none, `min`/`max` select the filtered extremum, anything else must
    /// be numeric.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on a non-numeric, non-keyword value.
    pub fn parse(raw: Option<&str>) -> Result<Self, MixQuantError> {
        let Some(raw) = raw else {
            return Ok(Self::None);
        };

        match raw.trim().to_lowercase().as_str() {
            "" | "nan" | "none" => Ok(Self::None),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            other => other
                .parse::<f64>()
                .map(Self::Value)
                .map_err(|_| {
                    MixQuantError::InputError(format!("invalid reference point '{other}'"))
                }),
        }
    }

    /// Resolves the reference value over the rows selected by `mask`.
    #[must_use]
    pub fn resolve(&self, series: &[f64], mask: &[bool]) -> f64 {
        let filtered = || {
            series
                .iter()
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| *v)
        };

        match self {
            Self::None => 0.0,
            Self::Min => filtered().fold(f64::INFINITY, f64::min),
            Self::Max => filtered().fold(f64::NEG_INFINITY, f64::max),
            Self::Value(v) => *v,
        }
    }
}

impl VariableSpec {
    /// Whether this row is the intercept.
    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.variable.trim() == CONSTANT
    }

    /// Whether this row carries coefficient bounds.
    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.coeff_min.is_some() || self.coeff_max.is_some()
    }
}

impl VariableTable {
    /// Validates and wraps the variable rows.
    ///
    /// # Errors
    /// `MixQuantError::InputError` when:
    /// - no row, or more than one row, is the intercept (`constant`);
    /// - the intercept is not in interval 1;
    /// - intervals are not a contiguous `1..=N` sequence;
    /// - a bound pair is inverted (`coeff_min > coeff_max`).
    pub fn new(rows: Vec<VariableSpec>) -> Result<Self, MixQuantError> {
        let constants = rows.iter().filter(|r| r.is_constant()).count();
        if constants != 1 {
            return Err(MixQuantError::InputError(format!(
                "expected exactly one 'constant' variable, found {constants}"
            )));
        }

        if let Some(row) = rows.iter().find(|r| r.is_constant() && r.interval != 1) {
            return Err(MixQuantError::InputError(format!(
                "'constant' must be in interval 1, found interval {}",
                row.interval
            )));
        }

        let mut intervals: Vec<u32> = rows.iter().map(|r| r.interval).collect();
        intervals.sort_unstable();
        intervals.dedup();
        let contiguous = intervals
            .iter()
            .enumerate()
            .all(|(i, v)| *v == i as u32 + 1);
        if intervals.is_empty() || !contiguous {
            return Err(MixQuantError::InputError(format!(
                "intervals must form a contiguous sequence starting at 1, found {intervals:?}"
            )));
        }

        for row in &rows {
            if let (Some(lo), Some(hi)) = (row.coeff_min, row.coeff_max) {
                if lo > hi {
                    return Err(MixQuantError::InputError(format!(
                        "variable '{}' has coeff min {lo} above coeff max {hi}",
                        row.variable
                    )));
                }
            }
        }

        Ok(Self { rows })
    }

    /// The rows, in table order.
    #[must_use]
    pub fn rows(&self) -> &[VariableSpec] {
        &self.rows
    }

    /// The intercept row.
    #[must_use]
    pub fn constant(&self) -> &VariableSpec {
        // Guaranteed by `new`.
        self.rows
            .iter()
            .find(|r| r.is_constant())
            .unwrap_or(&self.rows[0])
    }

    /// The number of distinct intervals.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        let mut intervals: Vec<u32> = self.rows.iter().map(|r| r.interval).collect();
        intervals.sort_unstable();
        intervals.dedup();
        intervals.len()
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_variables {
    use super::*;

    fn row(variable: &str, interval: u32) -> VariableSpec {
        VariableSpec {
            variable: variable.to_string(),
            xs_grouping: None,
            reference_point: ReferencePoint::None,
            interval,
            category: "base".to_string(),
            coeff_min: None,
            coeff_max: None,
            importance: None,
            short_name: variable.to_string(),
            substitution: None,
            notes: None,
        }
    }

    #[test]
    fn test_valid_table() {
        let table =
            VariableTable::new(vec![row("constant", 1), row("tv", 2), row("price", 2)]).unwrap();
        assert_eq!(table.interval_count(), 2);
        assert!(table.constant().is_constant());
    }

    #[test]
    fn test_missing_constant_rejected() {
        assert!(VariableTable::new(vec![row("tv", 1)]).is_err());
    }

    #[test]
    fn test_gap_in_intervals_rejected() {
        assert!(VariableTable::new(vec![row("constant", 1), row("tv", 3)]).is_err());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut bad = row("tv", 2);
        bad.coeff_min = Some(1.0);
        bad.coeff_max = Some(0.5);
        assert!(VariableTable::new(vec![row("constant", 1), bad]).is_err());
    }

    #[test]
    fn test_reference_point_parse_and_resolve() {
        assert_eq!(ReferencePoint::parse(None).unwrap(), ReferencePoint::None);
        assert_eq!(
            ReferencePoint::parse(Some("min")).unwrap(),
            ReferencePoint::Min
        );
        assert_eq!(
            ReferencePoint::parse(Some("2.5")).unwrap(),
            ReferencePoint::Value(2.5)
        );
        assert!(ReferencePoint::parse(Some("bogus")).is_err());

        let series = [5.0, 1.0, 9.0];
        let mask = [true, true, false];
        assert_eq!(ReferencePoint::Min.resolve(&series, &mask), 1.0);
        assert_eq!(ReferencePoint::Max.resolve(&series, &mask), 5.0);
        assert_eq!(ReferencePoint::Value(2.0).resolve(&series, &mask), 2.0);
        assert_eq!(ReferencePoint::None.resolve(&series, &mask), 0.0);
    }
}
