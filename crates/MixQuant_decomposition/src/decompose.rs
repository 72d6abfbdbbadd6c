// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The decomposition driver: multiplied series, intercept absorption,
//! bias adjustment, interval refinement, post-exponential contributions,
//! synergy reconciliation, panel roll-up and category roll-up.
//!
//! The invariant maintained throughout: for every row, the contributions
//! sum to the anti-logged fitted KPI. Each interval's reconciled total is
//! exactly $e^{S_i} - e^{S_{<i}}$, which telescopes to $e^{\hat y} - 1$;
//! the leading unit is restored on the intercept column at the end.

use std::collections::BTreeMap;

use log::info;
use time::Date;

use crate::bias::log_bias_shift;
use crate::intervals::{cumulative_interval_sums, refine_intervals};
use MixQuant_data::{ColumnSource, ModelConfig, TransformedPanel};
use MixQuant_error::MixQuantError;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// The decomposition output: per-variable and per-category contribution
/// tables over the same row index as the transformed panel.
#[derive(Clone, Debug)]
pub struct DecompositionTables {
    /// Observation date per row.
    pub obs: Vec<Date>,

    /// Cross-section id per row.
    pub sections: Vec<String>,

    /// Per-variable contributions, short-named, in first-appearance order.
    pub variables: Vec<(String, Vec<f64>)>,

    /// Per-category contributions.
    pub categories: Vec<(String, Vec<f64>)>,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Decomposes the fitted KPI into per-variable contributions.
///
/// `panel`, `coefficients` and `fitted` must be in unweighted units
/// (weights reversed by the caller).
///
/// # Errors
/// - `MixQuantError::DecompositionError` when fewer than two intervals
///   exist or, for a log-KPI model, when a non-intercept variable sits in
///   interval 1.
/// - `MixQuantError::InputError` on shape mismatches.
pub fn decompose(
    panel: &TransformedPanel,
    coefficients: &[f64],
    fitted: &[f64],
    config: &ModelConfig,
) -> Result<DecompositionTables, MixQuantError> {
    let n = panel.n_rows();
    let columns = panel.columns();

    if coefficients.len() != columns.len() {
        return Err(MixQuantError::InputError(format!(
            "{} coefficients for {} transformed columns",
            coefficients.len(),
            columns.len()
        )));
    }
    if fitted.len() != n {
        return Err(MixQuantError::InputError(format!(
            "{} fitted values for {n} rows",
            fitted.len()
        )));
    }

    validate_intervals(panel, config)?;

    let mut multiplied = multiplied_series(panel, coefficients);

    if config.log_trans_bias_adjustment {
        adjust_log_bias(panel, fitted, &mut multiplied)?;
    }

    let base: Vec<u32> = columns.iter().map(|(meta, _)| meta.interval).collect();
    let refined = refine_intervals(&base, &multiplied);
    let sums = cumulative_interval_sums(&refined, &multiplied, n);

    let (alpha_plus, alpha_minus) = config.anti_log_parameters();
    let zeros = vec![0.0; n];

    // Post-exponential contribution of each column.
    let mut post_exp: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for (j, series) in multiplied.iter().enumerate() {
        let interval = refined[j];
        let mut out = Vec::with_capacity(n);
        if interval == 1 {
            for m in series {
                let p = (alpha_plus * m).exp() - (alpha_minus * m).exp()
                    + f64::from(*m != 0.0);
                out.push(p);
            }
        } else {
            let below = sums.below.get(&interval).unwrap_or(&zeros);
            for (m, b) in series.iter().zip(below) {
                out.push((b + alpha_plus * m).exp() - (b + alpha_minus * m).exp());
            }
        }
        post_exp.push(out);
    }

    // Within-interval synergy: redistribute the interval residual in
    // proportion to the multiplied magnitudes.
    let mut contributions = post_exp.clone();
    for interval in &sums.intervals {
        let members: Vec<usize> = (0..columns.len())
            .filter(|j| refined[*j] == *interval)
            .collect();

        let below = &sums.below[interval];
        let through = &sums.through[interval];

        for row in 0..n {
            let group_total: f64 = members.iter().map(|j| post_exp[*j][row]).sum();
            let residual = through[row].exp() - below[row].exp() - group_total;
            let magnitude: f64 = members.iter().map(|j| multiplied[*j][row].abs()).sum();

            if magnitude <= 0.0 {
                continue;
            }
            for j in &members {
                let m = multiplied[*j][row];
                if m != 0.0 {
                    contributions[*j][row] += residual * m.abs() / magnitude;
                }
            }
        }
    }

    let variables = roll_up_panels(panel, &contributions);
    let categories = roll_up_categories(panel, &variables);

    info!(
        "decomposed {} columns into {} variables over {n} rows",
        columns.len(),
        variables.len()
    );

    Ok(DecompositionTables {
        obs: panel.obs.clone(),
        sections: panel.sections.clone(),
        variables,
        categories,
    })
}

/// Interval layout checks.
fn validate_intervals(panel: &TransformedPanel, config: &ModelConfig) -> Result<(), MixQuantError> {
    let mut distinct: Vec<u32> = panel.columns().iter().map(|(m, _)| m.interval).collect();
    distinct.sort_unstable();
    distinct.dedup();

    if distinct.len() < 2 {
        return Err(MixQuantError::DecompositionError(
            "decomposition needs at least two intervals".to_string(),
        ));
    }

    if config.kpi_is_logged() {
        if let Some((meta, _)) = panel
            .columns()
            .iter()
            .find(|(meta, _)| meta.interval == 1 && !meta.is_constant)
        {
            return Err(MixQuantError::DecompositionError(format!(
                "with a log-transformed KPI the constant must be alone in interval 1; \
                 found '{}'",
                meta.source.column_name()
            )));
        }
    }

    Ok(())
}

/// Multiplied series `beta * column`, with panel fixed-effect absorption:
/// the reference section's intercept coefficient is folded into the other
/// sections' offsets and the reference all-ones column is re-sliced to
/// its own section, so every intercept column is section-local.
fn multiplied_series(panel: &TransformedPanel, coefficients: &[f64]) -> Vec<Vec<f64>> {
    let columns = panel.columns();

    let constant_slices: Vec<usize> = columns
        .iter()
        .enumerate()
        .filter(|(_, (meta, _))| {
            meta.is_constant && matches!(meta.source, ColumnSource::PanelSlice { .. })
        })
        .map(|(j, _)| j)
        .collect();

    let reference_coefficient = constant_slices.first().map(|j| coefficients[*j]);

    columns
        .iter()
        .enumerate()
        .map(|(j, (meta, values))| {
            if constant_slices.contains(&j) {
                let own_section = meta.source.section().unwrap_or_default().to_string();
                let total = if Some(j) == constant_slices.first().copied() {
                    coefficients[j]
                } else {
                    coefficients[j] + reference_coefficient.unwrap_or(0.0)
                };
                panel
                    .sections
                    .iter()
                    .map(|s| if *s == own_section { total } else { 0.0 })
                    .collect()
            } else {
                values.iter().map(|v| coefficients[j] * v).collect()
            }
        })
        .collect()
}

/// Adds the per-section log-bias shift to that section's intercept
/// column.
fn adjust_log_bias(
    panel: &TransformedPanel,
    fitted: &[f64],
    multiplied: &mut [Vec<f64>],
) -> Result<(), MixQuantError> {
    let columns = panel.columns();

    for section in panel.unique_sections() {
        let mask = panel.section_mask(&section);
        let fitted_section: Vec<f64> = fitted
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| *v)
            .collect();
        let actual_section: Vec<f64> = panel
            .kpi
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| *v)
            .collect();

        let shift = log_bias_shift(&fitted_section, &actual_section)?;

        // The section's own intercept slice, or the pooled constant.
        let target = columns
            .iter()
            .position(|(meta, _)| {
                meta.is_constant && meta.source.section() == Some(section.as_str())
            })
            .or_else(|| columns.iter().position(|(meta, _)| meta.is_constant));

        if let Some(target) = target {
            for (value, keep) in multiplied[target].iter_mut().zip(&mask) {
                if *keep {
                    *value += shift;
                }
            }
        }
    }

    Ok(())
}

/// Merges per-section slices back into their parent variable, gated by
/// the row's section, and restores the baseline unit on the intercept.
fn roll_up_panels(
    panel: &TransformedPanel,
    contributions: &[Vec<f64>],
) -> Vec<(String, Vec<f64>)> {
    let n = panel.n_rows();
    let columns = panel.columns();

    let mut order: Vec<String> = Vec::new();
    let mut merged: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut constant_name: Option<String> = None;

    for (j, (meta, _)) in columns.iter().enumerate() {
        let name = meta.short_name.clone();
        if !order.contains(&name) {
            order.push(name.clone());
            merged.insert(name.clone(), vec![0.0; n]);
        }
        if meta.is_constant {
            constant_name = Some(name.clone());
        }

        let target = merged.get_mut(&name).unwrap_or_else(|| unreachable!());
        match &meta.source {
            ColumnSource::Raw(_) => {
                for (out, c) in target.iter_mut().zip(&contributions[j]) {
                    *out += c;
                }
            }
            ColumnSource::PanelSlice { section, .. } => {
                for ((out, c), row_section) in target
                    .iter_mut()
                    .zip(&contributions[j])
                    .zip(&panel.sections)
                {
                    if row_section == section {
                        *out += c;
                    }
                }
            }
        }
    }

    if let Some(constant_name) = constant_name {
        if let Some(column) = merged.get_mut(&constant_name) {
            for value in column.iter_mut() {
                *value += 1.0;
            }
        }
    }

    order
        .into_iter()
        .map(|name| {
            let column = merged.remove(&name).unwrap_or_default();
            (name, column)
        })
        .collect()
}

/// Sums variable contributions into their category labels.
fn roll_up_categories(
    panel: &TransformedPanel,
    variables: &[(String, Vec<f64>)],
) -> Vec<(String, Vec<f64>)> {
    let n = panel.n_rows();

    // Short name -> category, from the column metadata.
    let mut category_of: BTreeMap<&str, &str> = BTreeMap::new();
    for (meta, _) in panel.columns() {
        category_of.insert(&meta.short_name, &meta.category);
    }

    let mut order: Vec<String> = Vec::new();
    let mut merged: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for (name, column) in variables {
        let category = category_of.get(name.as_str()).copied().unwrap_or("other");
        if !order.contains(&category.to_string()) {
            order.push(category.to_string());
            merged.insert(category.to_string(), vec![0.0; n]);
        }
        let target = merged
            .get_mut(category)
            .unwrap_or_else(|| unreachable!());
        for (out, c) in target.iter_mut().zip(column) {
            *out += c;
        }
    }

    order
        .into_iter()
        .map(|name| {
            let column = merged.remove(&name).unwrap_or_default();
            (name, column)
        })
        .collect()
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_decompose {
    use super::*;
    use time::macros::date;
    use MixQuant_data::{ColumnMeta, ModelConfig};
    use MixQuant_utils::assert_approx_equal;

    fn meta(source: ColumnSource, interval: u32, short: &str, is_constant: bool) -> ColumnMeta {
        ColumnMeta {
            source,
            interval,
            short_name: short.to_string(),
            category: if is_constant { "base" } else { "media" }.to_string(),
            is_constant,
        }
    }

    fn config(log_kpi: bool, midpoints: bool, bias: bool) -> ModelConfig {
        ModelConfig {
            kpi: if log_kpi { "log(sales)" } else { "sales" }.to_string(),
            start: date!(2024 - 01 - 01),
            end: date!(2024 - 12 - 31),
            weights_column: None,
            log_trans_bias_adjustment: bias,
            anti_logs_at_midpoints: midpoints,
        }
    }

    /// Single series: constant in interval 1, two drivers in interval 2
    /// with coefficients of opposite sign.
    fn single_series_panel() -> (TransformedPanel, Vec<f64>, Vec<f64>) {
        let n = 5;
        let obs: Vec<Date> = (0..n)
            .map(|i| date!(2024 - 01 - 01) + time::Duration::weeks(i))
            .collect();
        let sections = vec!["total".to_string(); n as usize];

        let x1 = vec![1.0, 2.0, 0.5, 1.5, 1.0];
        let x2 = vec![0.5, 0.0, 1.0, 2.0, 0.5];
        let coefficients = vec![0.8, 0.3, -0.2];

        let fitted: Vec<f64> = (0..n as usize)
            .map(|i| 0.8 + 0.3 * x1[i] - 0.2 * x2[i])
            .collect();

        let mut panel = TransformedPanel::new(
            obs,
            sections,
            "log(sales)".to_string(),
            fitted.clone(),
        )
        .unwrap();

        panel
            .push_column(
                meta(ColumnSource::Raw("constant".to_string()), 1, "constant", true),
                vec![1.0; n as usize],
            )
            .unwrap();
        panel
            .push_column(
                meta(ColumnSource::Raw("tv".to_string()), 2, "tv", false),
                x1,
            )
            .unwrap();
        panel
            .push_column(
                meta(ColumnSource::Raw("price".to_string()), 2, "price", false),
                x2,
            )
            .unwrap();

        (panel, coefficients, fitted)
    }

    #[test]
    fn test_contributions_sum_to_anti_logged_fit() {
        let (panel, coefficients, fitted) = single_series_panel();
        let tables = decompose(&panel, &coefficients, &fitted, &config(true, true, false)).unwrap();

        for row in 0..panel.n_rows() {
            let total: f64 = tables.variables.iter().map(|(_, c)| c[row]).sum();
            assert_approx_equal!(total, fitted[row].exp(), 1e-6);
        }
    }

    #[test]
    fn test_identity_holds_at_endpoints_too() {
        let (panel, coefficients, fitted) = single_series_panel();
        let tables =
            decompose(&panel, &coefficients, &fitted, &config(true, false, false)).unwrap();

        for row in 0..panel.n_rows() {
            let total: f64 = tables.variables.iter().map(|(_, c)| c[row]).sum();
            assert_approx_equal!(total, fitted[row].exp(), 1e-6);
        }
    }

    #[test]
    fn test_category_roll_up_matches_variable_totals() {
        let (panel, coefficients, fitted) = single_series_panel();
        let tables = decompose(&panel, &coefficients, &fitted, &config(true, true, false)).unwrap();

        for row in 0..panel.n_rows() {
            let by_variable: f64 = tables.variables.iter().map(|(_, c)| c[row]).sum();
            let by_category: f64 = tables.categories.iter().map(|(_, c)| c[row]).sum();
            assert_approx_equal!(by_variable, by_category, 1e-10);
        }
    }

    #[test]
    fn test_misplaced_variable_in_interval_one_rejected() {
        let (mut panel, mut coefficients, fitted) = single_series_panel();
        panel
            .push_column(
                meta(ColumnSource::Raw("radio".to_string()), 1, "radio", false),
                vec![0.1; 5],
            )
            .unwrap();
        coefficients.push(0.05);

        let result = decompose(&panel, &coefficients, &fitted, &config(true, true, false));
        assert!(matches!(
            result,
            Err(MixQuantError::DecompositionError(_))
        ));
    }

    #[test]
    fn test_single_interval_rejected() {
        let n = 4;
        let obs: Vec<Date> = (0..n)
            .map(|i| date!(2024 - 01 - 01) + time::Duration::weeks(i))
            .collect();
        let mut panel = TransformedPanel::new(
            obs,
            vec!["total".to_string(); n as usize],
            "log(sales)".to_string(),
            vec![1.0; n as usize],
        )
        .unwrap();
        panel
            .push_column(
                meta(ColumnSource::Raw("constant".to_string()), 1, "constant", true),
                vec![1.0; n as usize],
            )
            .unwrap();

        let result = decompose(&panel, &[1.0], &[1.0; 4], &config(true, true, false));
        assert!(matches!(
            result,
            Err(MixQuantError::DecompositionError(_))
        ));
    }

    #[test]
    fn test_panel_intercept_absorption_and_gating() {
        // Two sections with fixed effects and one pooled driver.
        let t = 3;
        let mut obs = Vec::new();
        let mut sections = Vec::new();
        for section in ["north", "south"] {
            for i in 0..t {
                obs.push(date!(2024 - 01 - 01) + time::Duration::weeks(i));
                sections.push(section.to_string());
            }
        }

        let ind_north: Vec<f64> = sections.iter().map(|s| f64::from(s == "north")).collect();
        let ind_south: Vec<f64> = sections.iter().map(|s| f64::from(s == "south")).collect();
        let x: Vec<f64> = vec![1.0, 2.0, 3.0, 0.5, 1.5, 2.5];

        // Reference-category encoding: the first intercept column is
        // all-ones, the second is the south indicator.
        let coefficients = vec![0.5, 0.3, 0.2];
        let fitted: Vec<f64> = (0..2 * t as usize)
            .map(|row| 0.5 + 0.3 * ind_south[row] + 0.2 * x[row])
            .collect();

        let mut panel = TransformedPanel::new(
            obs,
            sections.clone(),
            "log(sales)".to_string(),
            fitted.clone(),
        )
        .unwrap();

        panel
            .push_column(
                meta(
                    ColumnSource::PanelSlice {
                        parent: "constant".to_string(),
                        section: "north".to_string(),
                    },
                    1,
                    "constant",
                    true,
                ),
                vec![1.0; 2 * t as usize],
            )
            .unwrap();
        panel
            .push_column(
                meta(
                    ColumnSource::PanelSlice {
                        parent: "constant".to_string(),
                        section: "south".to_string(),
                    },
                    1,
                    "constant",
                    true,
                ),
                ind_south.clone(),
            )
            .unwrap();
        panel
            .push_column(meta(ColumnSource::Raw("x".to_string()), 2, "x", false), x)
            .unwrap();

        let tables = decompose(&panel, &coefficients, &fitted, &config(true, true, false)).unwrap();

        // Identity per row.
        for row in 0..panel.n_rows() {
            let total: f64 = tables.variables.iter().map(|(_, c)| c[row]).sum();
            assert_approx_equal!(total, fitted[row].exp(), 1e-6);
        }

        // The merged constant column is a single column named "constant".
        let names: Vec<&str> = tables.variables.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["constant", "x"]);
    }

    #[test]
    fn test_log_bias_shifts_intercept_contribution() {
        let (panel, coefficients, fitted) = single_series_panel();
        // The KPI equals the fitted values, so the optimal shift is ~0 and
        // the identity still holds after the adjustment path runs.
        let tables = decompose(&panel, &coefficients, &fitted, &config(true, true, true)).unwrap();

        for row in 0..panel.n_rows() {
            let total: f64 = tables.variables.iter().map(|(_, c)| c[row]).sum();
            assert_approx_equal!(total, fitted[row].exp(), 1e-4);
        }
    }
}
