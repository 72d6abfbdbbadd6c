// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The raw panel dataset: one date-typed observation column plus numeric
//! columns keyed by lowercase identifiers. Panel data arrives as wide
//! columns (`sales_region_a`); the expression layer resolves them per
//! cross-section, so the raw panel itself is a plain column store.

use std::collections::BTreeMap;

use time::macros::format_description;
use time::Date;

use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The raw dataset: a parsed observation column and a lowercase-keyed map of
/// numeric columns, all of equal length.
#[derive(Clone, Debug, Default)]
pub struct RawPanel {
    /// Parsed observation dates, one per base row.
    pub obs: Vec<Date>,

    /// Numeric columns keyed by lowercase identifier.
    pub columns: BTreeMap<String, Vec<f64>>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl RawPanel {
    /// Builds a raw panel from an observation column and named numeric
    /// columns. Column names are lowercased.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` if any column's length differs from the
    ///   observation column's.
    pub fn new(
        obs: Vec<Date>,
        columns: BTreeMap<String, Vec<f64>>,
    ) -> Result<Self, MixQuantError> {
        let n = obs.len();
        let mut lowered = BTreeMap::new();

        for (name, values) in columns {
            if values.len() != n {
                return Err(MixQuantError::InputError(format!(
                    "column '{}' has {} rows, observation column has {}",
                    name,
                    values.len(),
                    n
                )));
            }
            lowered.insert(name.to_lowercase(), values);
        }

        Ok(Self {
            obs,
            columns: lowered,
        })
    }

    /// Number of base rows (observations per cross-section).
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.obs.len()
    }

    /// Look up a column by (lowercase) name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Whether the panel has a column of this name.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Row mask for the inclusive date window `[start, end]`.
    #[must_use]
    pub fn date_mask(&self, start: Date, end: Date) -> Vec<bool> {
        self.obs.iter().map(|d| *d >= start && *d <= end).collect()
    }
}

/// Parses a wire date string: ISO `YYYY-MM-DD` first, then `dd/mm/yyyy`.
///
/// # Errors
/// - `MixQuantError::InputError` if the string matches neither format.
pub fn parse_wire_date(text: &str) -> Result<Date, MixQuantError> {
    let iso = format_description!("[year]-[month]-[day]");
    let dmy = format_description!("[day]/[month]/[year]");

    Date::parse(text, &iso)
        .or_else(|_| Date::parse(text, &dmy))
        .map_err(|_| MixQuantError::InputError(format!("unparsable date '{text}'")))
}

/// Formats a date as ISO `YYYY-MM-DD` for response payloads.
#[must_use]
pub fn format_wire_date(date: Date) -> String {
    let iso = format_description!("[year]-[month]-[day]");
    // The ISO description cannot fail for a valid Date.
    date.format(&iso).unwrap_or_default()
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_panel {
    use super::*;
    use time::macros::date;

    fn sample() -> RawPanel {
        let obs = vec![
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 08),
            date!(2024 - 01 - 15),
        ];
        let mut columns = BTreeMap::new();
        columns.insert("Sales".to_string(), vec![1.0, 2.0, 3.0]);
        RawPanel::new(obs, columns).unwrap()
    }

    #[test]
    fn test_columns_are_lowercased() {
        let panel = sample();
        assert!(panel.has_column("sales"));
        assert!(!panel.has_column("Sales"));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let obs = vec![date!(2024 - 01 - 01)];
        let mut columns = BTreeMap::new();
        columns.insert("sales".to_string(), vec![1.0, 2.0]);
        assert!(RawPanel::new(obs, columns).is_err());
    }

    #[test]
    fn test_date_mask_is_inclusive() {
        let panel = sample();
        let mask = panel.date_mask(date!(2024 - 01 - 01), date!(2024 - 01 - 08));
        assert_eq!(mask, vec![true, true, false]);
    }

    #[test]
    fn test_parse_wire_date_formats() {
        assert_eq!(
            parse_wire_date("2024-03-05").unwrap(),
            date!(2024 - 03 - 05)
        );
        assert_eq!(
            parse_wire_date("05/03/2024").unwrap(),
            date!(2024 - 03 - 05)
        );
        assert!(parse_wire_date("03-05-2024x").is_err());
    }

    #[test]
    fn test_format_wire_date_is_iso() {
        assert_eq!(format_wire_date(date!(2024 - 03 - 05)), "2024-03-05");
    }
}
