// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Permutation grids: `¬n(v1, v2, ...)` declarations in the variable
//! table's substitution column, and the deterministic Cartesian product
//! over all declared slots. One regression is run per binding; bindings
//! are indexed from 1 in product order (ascending slot number, values in
//! declaration order), so permutation indices are reproducible.

use std::collections::BTreeMap;

use MixQuant_data::VariableTable;
use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// One assignment of values to permutation slots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PermutationBinding {
    values: BTreeMap<u32, f64>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl PermutationBinding {
    /// The empty binding (no slots declared).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binds a slot to a value.
    pub fn bind(&mut self, slot: u32, value: f64) {
        self.values.insert(slot, value);
    }

    /// The value bound to a slot, if any.
    #[must_use]
    pub fn value(&self, slot: u32) -> Option<f64> {
        self.values.get(&slot).copied()
    }

    /// Whether no slots are bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Rewrites `¬n` occurrences in an expression string with their bound
    /// values. Used for cache keys and response column names; unbound
    /// slots are left in place.
    #[must_use]
    pub fn render(&self, expression: &str) -> String {
        let mut out = String::with_capacity(expression.len());
        let mut chars = expression.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '¬' {
                out.push(c);
                continue;
            }

            let mut digits = String::new();
            while let Some(d) = chars.peek() {
                if d.is_ascii_digit() {
                    digits.push(*d);
                    chars.next();
                } else {
                    break;
                }
            }

            match digits.parse::<u32>().ok().and_then(|slot| self.value(slot)) {
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    out.push('¬');
                    out.push_str(&digits);
                }
            }
        }

        out
    }
}

/// Parses the `¬n(v1, v2, ...)` grids declared in one substitution cell.
///
/// # Errors
/// - `MixQuantError::InputError` on malformed grids or non-numeric values.
pub fn parse_substitution_grids(text: &str) -> Result<BTreeMap<u32, Vec<f64>>, MixQuantError> {
    let mut grids = BTreeMap::new();
    let bad = |detail: String| MixQuantError::InputError(format!("bad substitution '{text}': {detail}"));

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '¬' {
            continue;
        }

        let mut digits = String::new();
        while let Some(d) = chars.peek() {
            if d.is_ascii_digit() {
                digits.push(*d);
                chars.next();
            } else {
                break;
            }
        }
        let slot = digits
            .parse::<u32>()
            .map_err(|_| bad("missing slot number after ¬".to_string()))?;

        if chars.next() != Some('(') {
            return Err(bad(format!("expected '(' after ¬{slot}")));
        }

        let mut body = String::new();
        let mut closed = false;
        for d in chars.by_ref() {
            if d == ')' {
                closed = true;
                break;
            }
            body.push(d);
        }
        if !closed {
            return Err(bad(format!("unterminated grid for ¬{slot}")));
        }

        let values = body
            .split(',')
            .map(|v| {
                v.trim()
                    .parse::<f64>()
                    .map_err(|_| bad(format!("non-numeric grid value '{}'", v.trim())))
            })
            .collect::<Result<Vec<f64>, MixQuantError>>()?;

        if values.is_empty() {
            return Err(bad(format!("empty grid for ¬{slot}")));
        }

        grids.insert(slot, values);
    }

    Ok(grids)
}

/// Collects every grid declared in the variable table and expands the
/// Cartesian product over all slots into bindings.
///
/// Returns a single empty binding when no grids are declared, so callers
/// always have at least one permutation to run.
///
/// # Errors
/// - `MixQuantError::InputError` on malformed grids or a slot declared
///   twice with different values.
pub fn permutation_bindings(
    table: &VariableTable,
) -> Result<Vec<PermutationBinding>, MixQuantError> {
    let mut grids: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

    for row in table.rows() {
        let Some(substitution) = row.substitution.as_deref() else {
            continue;
        };
        for (slot, values) in parse_substitution_grids(substitution)? {
            match grids.get(&slot) {
                None => {
                    grids.insert(slot, values);
                }
                Some(existing) if *existing == values => {}
                Some(_) => {
                    return Err(MixQuantError::InputError(format!(
                        "permutation slot ¬{slot} declared with conflicting grids"
                    )))
                }
            }
        }
    }

    if grids.is_empty() {
        return Ok(vec![PermutationBinding::empty()]);
    }

    let slots: Vec<u32> = grids.keys().copied().collect();
    let mut bindings = vec![PermutationBinding::empty()];

    for slot in slots {
        let values = &grids[&slot];
        let mut expanded = Vec::with_capacity(bindings.len() * values.len());
        for binding in &bindings {
            for value in values {
                let mut next = binding.clone();
                next.bind(slot, *value);
                expanded.push(next);
            }
        }
        bindings = expanded;
    }

    Ok(bindings)
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
