// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The transformed dataset: a dense matrix whose rows are (observation,
//! cross-section) pairs stacked section-major, with column metadata carried
//! alongside the values. Downstream stages consume the metadata instead of
//! re-parsing column names; the `_μ_` sentinel of the legacy format is
//! emitted only by [`ColumnSource::column_name`] at the serialization
//! boundary.

use time::Date;

use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Where a design column comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnSource {
    /// A pooled column shared by all cross-sections, keyed by the variable
    /// expression it was evaluated from.
    Raw(String),

    /// A per-section slice of a grouped variable: equal to the transformed
    /// parent within `section`, zero elsewhere.
    PanelSlice {
        /// The parent variable expression.
        parent: String,
        /// The cross-section this slice belongs to.
        section: String,
    },
}

/// Metadata carried by each design column.
#[derive(Clone, Debug)]
pub struct ColumnMeta {
    /// Provenance of the column.
    pub source: ColumnSource,

    /// Decomposition interval inherited from the parent variable.
    pub interval: u32,

    /// Short display name of the parent variable.
    pub short_name: String,

    /// Decomposition roll-up label of the parent variable.
    pub category: String,

    /// Whether the parent variable is the intercept.
    pub is_constant: bool,
}

/// The dense transformed dataset.
#[derive(Clone, Debug)]
pub struct TransformedPanel {
    /// Observation date per row.
    pub obs: Vec<Date>,

    /// Cross-section id per row.
    pub sections: Vec<String>,

    /// Name of the KPI column (the KPI expression).
    pub kpi_name: String,

    /// KPI values per row.
    pub kpi: Vec<f64>,

    columns: Vec<(ColumnMeta, Vec<f64>)>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl ColumnSource {
    /// The parent variable expression.
    #[must_use]
    pub fn parent(&self) -> &str {
        match self {
            Self::Raw(name) => name,
            Self::PanelSlice { parent, .. } => parent,
        }
    }

    /// The section a slice belongs to, if this is a slice.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Raw(_) => None,
            Self::PanelSlice { section, .. } => Some(section),
        }
    }

    /// The backward-compatible column name: the parent expression for
    /// pooled columns, `<parent>_μ_<section>` for slices.
    #[must_use]
    pub fn column_name(&self) -> String {
        match self {
            Self::Raw(name) => name.clone(),
            Self::PanelSlice { parent, section } => format!("{parent}_μ_{section}"),
        }
    }
}

impl TransformedPanel {
    /// Creates an empty panel with the given row index.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` if the row index columns disagree in
    ///   length.
    pub fn new(
        obs: Vec<Date>,
        sections: Vec<String>,
        kpi_name: String,
        kpi: Vec<f64>,
    ) -> Result<Self, MixQuantError> {
        if obs.len() != sections.len() || obs.len() != kpi.len() {
            return Err(MixQuantError::InputError(format!(
                "transformed panel index mismatch: {} obs, {} sections, {} kpi rows",
                obs.len(),
                sections.len(),
                kpi.len()
            )));
        }

        Ok(Self {
            obs,
            sections,
            kpi_name,
            kpi,
            columns: Vec::new(),
        })
    }

    /// Number of rows (observation × section pairs).
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.obs.len()
    }

    /// Number of design columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Appends a design column.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` if the column length disagrees with the
    ///   row index.
    pub fn push_column(&mut self, meta: ColumnMeta, values: Vec<f64>) -> Result<(), MixQuantError> {
        if values.len() != self.n_rows() {
            return Err(MixQuantError::InputError(format!(
                "column '{}' has {} rows, panel has {}",
                meta.source.column_name(),
                values.len(),
                self.n_rows()
            )));
        }
        self.columns.push((meta, values));
        Ok(())
    }

    /// The design columns with their metadata, in insertion order.
    #[must_use]
    pub fn columns(&self) -> &[(ColumnMeta, Vec<f64>)] {
        &self.columns
    }

    /// The serialized column names, in insertion order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(meta, _)| meta.source.column_name())
            .collect()
    }

    /// The distinct section ids in first-appearance order.
    #[must_use]
    pub fn unique_sections(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for section in &self.sections {
            if !seen.contains(section) {
                seen.push(section.clone());
            }
        }
        seen
    }

    /// Row mask selecting one section's rows.
    #[must_use]
    pub fn section_mask(&self, section: &str) -> Vec<bool> {
        self.sections.iter().map(|s| s == section).collect()
    }

    /// Whether the panel stacks more than one section.
    #[must_use]
    pub fn is_panel(&self) -> bool {
        self.unique_sections().len() > 1
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_matrix {
    use super::*;
    use time::macros::date;

    fn panel() -> TransformedPanel {
        let obs = vec![date!(2024 - 01 - 01), date!(2024 - 01 - 08)];
        let sections = vec!["north".to_string(), "north".to_string()];
        TransformedPanel::new(obs, sections, "sales".to_string(), vec![1.0, 2.0]).unwrap()
    }

    #[test]
    fn test_column_name_round_trip() {
        assert_eq!(ColumnSource::Raw("tv".to_string()).column_name(), "tv");
        let slice = ColumnSource::PanelSlice {
            parent: "tv".to_string(),
            section: "north".to_string(),
        };
        assert_eq!(slice.column_name(), "tv_μ_north");
        assert_eq!(slice.parent(), "tv");
        assert_eq!(slice.section(), Some("north"));
    }

    #[test]
    fn test_push_column_checks_length() {
        let mut panel = panel();
        let meta = ColumnMeta {
            source: ColumnSource::Raw("tv".to_string()),
            interval: 2,
            short_name: "tv".to_string(),
            category: "media".to_string(),
            is_constant: false,
        };
        assert!(panel.push_column(meta.clone(), vec![1.0]).is_err());
        assert!(panel.push_column(meta, vec![1.0, 2.0]).is_ok());
        assert_eq!(panel.n_columns(), 1);
        assert_eq!(panel.column_names(), vec!["tv".to_string()]);
    }

    #[test]
    fn test_unique_sections_and_masks() {
        let obs = vec![
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 01),
            date!(2024 - 01 - 08),
        ];
        let sections = vec![
            "north".to_string(),
            "south".to_string(),
            "north".to_string(),
        ];
        let panel =
            TransformedPanel::new(obs, sections, "sales".to_string(), vec![1.0, 2.0, 3.0]).unwrap();

        assert!(panel.is_panel());
        assert_eq!(panel.unique_sections(), vec!["north", "south"]);
        assert_eq!(panel.section_mask("south"), vec![false, true, false]);
    }
}
