// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The cross-section specification: the ordered list of panel units and the
//! grouping dimensions that map sections to string values. A weights column
//! is a dimension like any other whose values parse as numbers.

use std::collections::BTreeMap;

use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Cross-section specification table.
#[derive(Clone, Debug, Default)]
pub struct CrossSectionSpec {
    /// Ordered unique lowercase section identifiers.
    sections: Vec<String>,

    /// Grouping dimensions: dimension name -> (section -> value). A section
    /// absent from a dimension's map is not part of that dimension.
    dimensions: BTreeMap<String, BTreeMap<String, String>>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl CrossSectionSpec {
    /// Builds a specification from ordered section ids and dimension maps.
    /// All identifiers and values are lowercased.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on duplicate section ids or a dimension
    ///   entry referencing an unknown section.
    pub fn new(
        sections: Vec<String>,
        dimensions: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<Self, MixQuantError> {
        let sections: Vec<String> = sections.iter().map(|s| s.to_lowercase()).collect();

        for (i, section) in sections.iter().enumerate() {
            if sections[..i].contains(section) {
                return Err(MixQuantError::InputError(format!(
                    "duplicate cross-section '{section}'"
                )));
            }
        }

        let mut lowered = BTreeMap::new();
        for (dim, map) in dimensions {
            let mut entries = BTreeMap::new();
            for (section, value) in map {
                let section = section.to_lowercase();
                if !sections.contains(&section) {
                    return Err(MixQuantError::InputError(format!(
                        "dimension '{dim}' references unknown cross-section '{section}'"
                    )));
                }
                entries.insert(section, value.to_lowercase());
            }
            lowered.insert(dim.to_lowercase(), entries);
        }

        Ok(Self {
            sections,
            dimensions: lowered,
        })
    }

    /// A specification with a single anonymous section, for plain
    /// time-series models.
    #[must_use]
    pub fn single(section: &str) -> Self {
        Self {
            sections: vec![section.to_lowercase()],
            dimensions: BTreeMap::new(),
        }
    }

    /// The ordered section identifiers.
    #[must_use]
    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// Whether the specification describes a panel (more than one section).
    #[must_use]
    pub fn is_panel(&self) -> bool {
        self.sections.len() > 1
    }

    /// Whether a grouping dimension of this name exists.
    #[must_use]
    pub fn has_dimension(&self, dimension: &str) -> bool {
        self.dimensions.contains_key(dimension)
    }

    /// The value a section takes in a dimension, if the section is mapped
    /// into it.
    #[must_use]
    pub fn dimension_value(&self, dimension: &str, section: &str) -> Option<&str> {
        self.dimensions
            .get(dimension)?
            .get(section)
            .map(String::as_str)
    }

    /// The weight of a section under the named weights dimension.
    /// Unmapped sections weigh 1.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` if the mapped value does not parse as a
    ///   number.
    pub fn weight(&self, weights_column: &str, section: &str) -> Result<f64, MixQuantError> {
        match self.dimension_value(weights_column, section) {
            None => Ok(1.0),
            Some(raw) => raw.parse::<f64>().map_err(|_| {
                MixQuantError::InputError(format!(
                    "weight '{raw}' for cross-section '{section}' is not numeric"
                ))
            }),
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_sections {
    use super::*;

    fn spec() -> CrossSectionSpec {
        let mut dims = BTreeMap::new();
        let mut region = BTreeMap::new();
        region.insert("north".to_string(), "ang".to_string());
        region.insert("south".to_string(), "sax".to_string());
        dims.insert("region".to_string(), region);

        let mut weights = BTreeMap::new();
        weights.insert("north".to_string(), "2.0".to_string());
        dims.insert("weights".to_string(), weights);

        CrossSectionSpec::new(vec!["north".to_string(), "south".to_string()], dims).unwrap()
    }

    #[test]
    fn test_dimension_lookup() {
        let spec = spec();
        assert_eq!(spec.dimension_value("region", "north"), Some("ang"));
        assert_eq!(spec.dimension_value("region", "east"), None);
        assert!(spec.is_panel());
    }

    #[test]
    fn test_weight_lookup_defaults_to_one() {
        let spec = spec();
        assert_eq!(spec.weight("weights", "north").unwrap(), 2.0);
        assert_eq!(spec.weight("weights", "south").unwrap(), 1.0);
    }

    #[test]
    fn test_duplicate_sections_rejected() {
        let result = CrossSectionSpec::new(
            vec!["north".to_string(), "North".to_string()],
            BTreeMap::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_section_in_dimension_rejected() {
        let mut dims = BTreeMap::new();
        let mut region = BTreeMap::new();
        region.insert("west".to_string(), "cym".to_string());
        dims.insert("region".to_string(), region);
        assert!(CrossSectionSpec::new(vec!["north".to_string()], dims).is_err());
    }
}
