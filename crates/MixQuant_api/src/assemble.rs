// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! Panel assembly: evaluates each variable expression per cross-section,
//! applies reference points, realizes fixed effects and slope splits as
//! slice columns, and stacks everything into the transformed matrix.
//! Evaluations are cached per (substituted expression, cross-section)
//! within one permutation.

use std::collections::HashMap;

use log::warn;
use time::Date;

use MixQuant_data::{
    ColumnMeta, ColumnSource, CrossSectionSpec, ModelConfig, RawPanel, TransformedPanel,
    VariableSpec, VariableTable, CONSTANT,
};
use MixQuant_error::MixQuantError;
use MixQuant_expression::{evaluate_series, parse, EvalContext, Expr, PermutationBinding};
use MixQuant_regression::Bound;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Per-permutation cache of transformed series, keyed by the substituted
/// expression and cross-section. Owned by one request; dropped with it.
#[derive(Debug, Default)]
pub struct TransformCache {
    entries: HashMap<(String, String), Vec<f64>>,
}

/// The assembled matrix and the coefficient bounds aligned with its
/// columns.
#[derive(Clone, Debug)]
pub struct AssembledPanel {
    /// The transformed matrix.
    pub panel: TransformedPanel,

    /// `(coeff_min, coeff_max)` per design column, inherited from the
    /// parent variable.
    pub bounds: Vec<Bound>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl TransformCache {
    /// Cache hits recorded so far (for logging).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds the transformed matrix for one permutation binding.
///
/// # Errors
/// - `MixQuantError::InputError` when the date window (or KPI validity)
///   filters out every row.
/// - `MixQuantError::ExpressionError` on unparsable or unevaluable
///   expressions.
/// - `MixQuantError::TransformError` when a variable column contains a
///   non-finite value inside the modelling window.
pub fn build_panel(
    raw: &RawPanel,
    config: &ModelConfig,
    sections: &CrossSectionSpec,
    variables: &VariableTable,
    binding: &PermutationBinding,
    cache: &mut TransformCache,
) -> Result<AssembledPanel, MixQuantError> {
    let date_mask = raw.date_mask(config.start, config.end);
    if !date_mask.iter().any(|keep| *keep) {
        return Err(MixQuantError::InputError(format!(
            "date window {} .. {} selects no rows",
            config.start, config.end
        )));
    }

    // Evaluate the KPI per section; rows with a non-finite KPI are
    // dropped from that section.
    let kpi_expr = parse(&config.kpi)?;
    let mut keep_masks: Vec<Vec<bool>> = Vec::new();
    let mut obs_rows: Vec<Date> = Vec::new();
    let mut section_rows: Vec<String> = Vec::new();
    let mut kpi_rows: Vec<f64> = Vec::new();

    for section in sections.sections() {
        let ctx = EvalContext {
            panel: raw,
            section,
            spec: sections,
            binding,
        };
        let series = evaluate_series(&kpi_expr, &ctx)?;

        let mask: Vec<bool> = date_mask
            .iter()
            .zip(&series)
            .map(|(keep, v)| *keep && v.is_finite())
            .collect();

        let dropped = date_mask.iter().filter(|k| **k).count()
            - mask.iter().filter(|k| **k).count();
        if dropped > 0 {
            warn!("dropping {dropped} rows with non-finite KPI in '{section}'");
        }

        for (i, keep) in mask.iter().enumerate() {
            if *keep {
                obs_rows.push(raw.obs[i]);
                section_rows.push(section.clone());
                kpi_rows.push(series[i]);
            }
        }
        keep_masks.push(mask);
    }

    if kpi_rows.is_empty() {
        return Err(MixQuantError::InputError(
            "all rows filtered out before fitting".to_string(),
        ));
    }

    let mut panel = TransformedPanel::new(obs_rows, section_rows, config.kpi.clone(), kpi_rows)?;
    let mut bounds: Vec<Bound> = Vec::new();

    for row in variables.rows() {
        if row.is_constant() {
            push_constant(&mut panel, &mut bounds, row, sections, &keep_masks)?;
            continue;
        }

        let rendered = binding.render(&row.variable);
        let expr = parse(&rendered)?;

        if row.xs_grouping.is_some() {
            // One slice column per section, zero outside its block.
            for owner in sections.sections() {
                let series = transformed_series(
                    raw, sections, binding, cache, &expr, &rendered, owner, row, &date_mask,
                )?;

                let mut values = Vec::with_capacity(panel.n_rows());
                for (section, mask) in sections.sections().iter().zip(&keep_masks) {
                    for (i, keep) in mask.iter().enumerate() {
                        if *keep {
                            values.push(if section == owner { series[i] } else { 0.0 });
                        }
                    }
                }

                check_finite(&rendered, &values)?;
                panel.push_column(
                    column_meta(
                        ColumnSource::PanelSlice {
                            parent: rendered.clone(),
                            section: owner.clone(),
                        },
                        row,
                    ),
                    values,
                )?;
                bounds.push((row.coeff_min, row.coeff_max));
            }
        } else {
            let mut values = Vec::with_capacity(panel.n_rows());
            for (section, mask) in sections.sections().iter().zip(&keep_masks) {
                let series = transformed_series(
                    raw, sections, binding, cache, &expr, &rendered, section, row, &date_mask,
                )?;
                for (i, keep) in mask.iter().enumerate() {
                    if *keep {
                        values.push(series[i]);
                    }
                }
            }

            check_finite(&rendered, &values)?;
            panel.push_column(column_meta(ColumnSource::Raw(rendered.clone()), row), values)?;
            bounds.push((row.coeff_min, row.coeff_max));
        }
    }

    Ok(AssembledPanel { panel, bounds })
}

/// Intercept columns: a pooled all-ones column, or fixed-effect slices
/// with the first section as the all-ones reference category.
fn push_constant(
    panel: &mut TransformedPanel,
    bounds: &mut Vec<Bound>,
    row: &VariableSpec,
    sections: &CrossSectionSpec,
    keep_masks: &[Vec<bool>],
) -> Result<(), MixQuantError> {
    let n = panel.n_rows();

    if sections.is_panel() && row.xs_grouping.is_some() {
        for (index, owner) in sections.sections().iter().enumerate() {
            let mut values = Vec::with_capacity(n);
            for (section, mask) in sections.sections().iter().zip(keep_masks) {
                let kept = mask.iter().filter(|k| **k).count();
                let one = index == 0 || section == owner;
                values.extend(std::iter::repeat(f64::from(one)).take(kept));
            }
            panel.push_column(
                column_meta(
                    ColumnSource::PanelSlice {
                        parent: CONSTANT.to_string(),
                        section: owner.clone(),
                    },
                    row,
                ),
                values,
            )?;
            bounds.push((row.coeff_min, row.coeff_max));
        }
    } else {
        panel.push_column(
            column_meta(ColumnSource::Raw(CONSTANT.to_string()), row),
            vec![1.0; n],
        )?;
        bounds.push((row.coeff_min, row.coeff_max));
    }

    Ok(())
}

/// Evaluates (or recalls) a variable's transformed full-length series for
/// one section, reference point applied.
#[allow(clippy::too_many_arguments)]
fn transformed_series(
    raw: &RawPanel,
    sections: &CrossSectionSpec,
    binding: &PermutationBinding,
    cache: &mut TransformCache,
    expr: &Expr,
    rendered: &str,
    section: &str,
    row: &VariableSpec,
    date_mask: &[bool],
) -> Result<Vec<f64>, MixQuantError> {
    let key = (rendered.to_string(), section.to_string());
    if let Some(hit) = cache.entries.get(&key) {
        return Ok(hit.clone());
    }

    let ctx = EvalContext {
        panel: raw,
        section,
        spec: sections,
        binding,
    };
    let mut series = evaluate_series(expr, &ctx)?;

    let reference = row.reference_point.resolve(&series, date_mask);
    if reference != 0.0 {
        for value in &mut series {
            *value -= reference;
        }
    }

    cache.entries.insert(key, series.clone());
    Ok(series)
}

fn column_meta(source: ColumnSource, row: &VariableSpec) -> ColumnMeta {
    ColumnMeta {
        source,
        interval: row.interval,
        short_name: row.short_name.clone(),
        category: row.category.clone(),
        is_constant: row.is_constant(),
    }
}

/// Classifies non-finite cells that survive evaluation as a transform
/// failure for this variable. Expression-level arithmetic already raised
/// its own errors, so anything caught here came out of a transform
/// primitive (or arrived as bad raw data).
fn check_finite(variable: &str, values: &[f64]) -> Result<(), MixQuantError> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(MixQuantError::transform(
            variable,
            format!("transformed series contains non-finite value {bad}"),
        ));
    }
    Ok(())
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
