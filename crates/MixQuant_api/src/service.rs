// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The flat regression service: the wire path for single-series requests
//! whose variables are plain columns with config-driven transformations
//! (no expressions, no panel). Also hosts the transform preview.

use std::collections::BTreeMap;

use log::info;
use nalgebra::{DMatrix, DVector};
use time::Date;

use crate::sanitize::{finite, finite_series_map, finite_slice, finite_statistic_map};
use crate::wire::{
    DiagnosticEntryWire, DiagnosticsWire, PValueWire, RegressionRequest, RegressionResponse,
    TransformPreviewRequest, TransformPreviewResponse,
};
use MixQuant_data::parse_wire_date;
use MixQuant_diagnostics::{durbin_watson, single_series_battery, variance_inflation_factors};
use MixQuant_error::MixQuantError;
use MixQuant_regression::BoundedLeastSquares;

/// Recognized observation column names (after lowercasing).
const OBSERVATION_COLUMNS: [&str; 2] = ["obs", "date"];

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS, FUNCTIONS, AND MACROS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Runs the flat regression request end to end.
///
/// # Errors
/// - `MixQuantError::InputError` on malformed data, an unknown KPI, or a
///   window that filters out every row.
/// - `MixQuantError::TransformError` when a variable transformation
///   produces non-finite values.
/// - `MixQuantError::RegressionError` on an unusable design.
pub fn run_regression(request: &RegressionRequest) -> Result<RegressionResponse, MixQuantError> {
    let config = &request.model_configuration;
    let start = parse_wire_date(&config.start_date)?;
    let end = parse_wire_date(&config.end_date)?;

    let (dates, columns) = split_data(request)?;
    let mask: Vec<bool> = dates.iter().map(|d| *d >= start && *d <= end).collect();
    if !mask.iter().any(|keep| *keep) {
        return Err(MixQuantError::InputError(format!(
            "date window {} .. {} selects no rows",
            config.start_date, config.end_date
        )));
    }

    let filter = |series: &[f64]| -> Vec<f64> {
        series
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(v, _)| *v)
            .collect()
    };

    let kpi_name = config.kpi.to_lowercase();
    let Some(kpi_raw) = columns.get(&kpi_name) else {
        return Err(MixQuantError::InputError(format!(
            "KPI '{}' not found in data",
            config.kpi
        )));
    };

    // The KPI itself may carry a transformation entry.
    let kpi_config = request
        .variable_transformations
        .iter()
        .find(|t| t.include && t.variable.to_lowercase() == kpi_name);
    let kpi = match kpi_config {
        Some(record) => {
            let transformed = record
                .to_transform()?
                .apply(&filter(kpi_raw))
                .map_err(|e| rename_transform_error(e, &record.variable))?;
            transformed
        }
        None => filter(kpi_raw),
    };

    // Transform the driver columns, preserving request order.
    let mut names: Vec<String> = Vec::new();
    let mut transformed: Vec<Vec<f64>> = Vec::new();
    for record in &request.variable_transformations {
        if !record.include {
            continue;
        }
        let name = record.variable.to_lowercase();
        if name == kpi_name {
            continue;
        }
        let Some(raw) = columns.get(&name) else {
            continue;
        };

        let series = record
            .to_transform()?
            .apply(&filter(raw))
            .map_err(|e| rename_transform_error(e, &record.variable))?;

        // Drop columns that are identically zero after transformation.
        if series.iter().all(|v| *v == 0.0) {
            continue;
        }

        names.push(name);
        transformed.push(series);
    }

    let n = kpi.len();
    let k = transformed.len() + 1;
    info!("flat regression: {n} rows, {k} design columns");

    let x = DMatrix::from_fn(n, k, |i, j| {
        if j == 0 {
            1.0
        } else {
            transformed[j - 1][i]
        }
    });
    let y = DVector::from_column_slice(&kpi);

    let bounds = vec![(None, None); k];
    let fit = BoundedLeastSquares::default().fit(&x, &y, &bounds)?;

    // Coefficient maps keyed "const" then the column names.
    let mut keyed_names = vec!["const".to_string()];
    keyed_names.extend(names.iter().cloned());

    let mut coefficients = BTreeMap::new();
    let mut std_errors = BTreeMap::new();
    let mut t_stats = BTreeMap::new();
    let mut p_values = BTreeMap::new();
    for (i, name) in keyed_names.iter().enumerate() {
        coefficients.insert(name.clone(), fit.coefficients[i]);
        std_errors.insert(name.clone(), fit.standard_errors[i]);
        t_stats.insert(name.clone(), fit.t_statistics[i]);
        p_values.insert(name.clone(), fit.p_values[i]);
    }
    finite_statistic_map(&mut coefficients);
    finite_statistic_map(&mut std_errors);
    finite_statistic_map(&mut t_stats);
    finite_statistic_map(&mut p_values);

    // Per-observation contributions.
    let mut variable_contributions = BTreeMap::new();
    variable_contributions.insert("const".to_string(), vec![fit.coefficients[0]; n]);
    for (j, name) in names.iter().enumerate() {
        let contribution: Vec<f64> = transformed[j]
            .iter()
            .map(|v| v * fit.coefficients[j + 1])
            .collect();
        variable_contributions.insert(name.clone(), contribution);
    }

    // Diagnostics battery and VIFs.
    let battery = single_series_battery(&kpi, &x, &fit.fitted_values);
    let mut tests = BTreeMap::new();
    for diagnostic in &battery {
        tests.insert(
            diagnostic.name.to_string(),
            DiagnosticEntryWire {
                category: diagnostic.category.to_string(),
                statistic: finite(diagnostic.statistic),
                p_value: match diagnostic.p_value {
                    Some(p) => PValueWire::Number(finite(p)),
                    None => PValueWire::NotApplicable("N/A"),
                },
            },
        );
    }

    let vif_all = variance_inflation_factors(&x);
    let mut vif_values = BTreeMap::new();
    for (j, name) in names.iter().enumerate() {
        vif_values.insert(name.clone(), finite(vif_all[j + 1]));
    }

    let mut transformed_data: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    transformed_data.insert(kpi_name.clone(), kpi.clone());
    for (name, series) in names.iter().zip(&transformed) {
        transformed_data.insert(name.clone(), series.clone());
    }

    let mut residuals = fit.residuals.clone();
    let mut fitted_values = fit.fitted_values.clone();
    finite_slice(&mut residuals);
    finite_slice(&mut fitted_values);
    finite_series_map(&mut transformed_data);
    finite_series_map(&mut variable_contributions);

    Ok(RegressionResponse {
        coefficients,
        std_errors,
        t_stats,
        p_values,
        r_squared: finite(fit.r_squared),
        adjusted_r_squared: finite(fit.adjusted_r_squared),
        f_statistic: finite(fit.f_statistic),
        f_pvalue: finite(fit.f_pvalue),
        aic: finite(fit.aic),
        bic: finite(fit.bic),
        durbin_watson: finite(durbin_watson(&fit.residuals)),
        n_observations: fit.n_observations,
        degrees_of_freedom: fit.df_residual,
        residuals,
        fitted_values,
        transformed_data,
        variable_contributions,
        diagnostics: DiagnosticsWire { tests, vif_values },
        optimization_success: fit.converged,
    })
}

/// Applies one transformation record to one plain series.
///
/// # Errors
/// - `MixQuantError::InputError` on invalid parameters.
/// - `MixQuantError::TransformError` on non-finite output.
pub fn preview_transform(
    request: &TransformPreviewRequest,
) -> Result<TransformPreviewResponse, MixQuantError> {
    let transformed = request
        .transformation
        .to_transform()?
        .apply(&request.data)
        .map_err(|e| rename_transform_error(e, &request.variable_name))?;

    Ok(TransformPreviewResponse {
        variable: request.variable_name.clone(),
        original: request.data.clone(),
        transformed,
    })
}

/// Splits the wire data map into the parsed observation column and the
/// numeric columns (lowercased names).
fn split_data(
    request: &RegressionRequest,
) -> Result<(Vec<Date>, BTreeMap<String, Vec<f64>>), MixQuantError> {
    let mut dates: Option<Vec<Date>> = None;
    let mut columns = BTreeMap::new();

    for (name, values) in &request.data {
        let lowered = name.to_lowercase();

        if OBSERVATION_COLUMNS.contains(&lowered.as_str()) && dates.is_none() {
            let parsed = values
                .iter()
                .map(|v| parse_wire_date(&v.as_text()))
                .collect::<Result<Vec<Date>, MixQuantError>>()?;
            dates = Some(parsed);
            continue;
        }

        let numeric = values
            .iter()
            .map(|v| v.as_number(&lowered))
            .collect::<Result<Vec<f64>, MixQuantError>>()?;
        columns.insert(lowered, numeric);
    }

    let Some(dates) = dates else {
        return Err(MixQuantError::InputError(
            "no observation column ('obs' or 'date') in data".to_string(),
        ));
    };

    for (name, values) in &columns {
        if values.len() != dates.len() {
            return Err(MixQuantError::InputError(format!(
                "column '{}' has {} rows, observation column has {}",
                name,
                values.len(),
                dates.len()
            )));
        }
    }

    Ok((dates, columns))
}

/// Fills the offending variable name into a transform error raised by the
/// name-agnostic pipeline.
fn rename_transform_error(error: MixQuantError, variable: &str) -> MixQuantError {
    match error {
        MixQuantError::TransformError { message, .. } => {
            MixQuantError::transform(variable, message)
        }
        other => other,
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_service {
    use super::*;
    use crate::wire::{DataValue, ModelConfigurationWire, VariableTransformationWire};
    use MixQuant_utils::assert_approx_equal;

    fn transformation(variable: &str) -> VariableTransformationWire {
        VariableTransformationWire {
            variable: variable.to_string(),
            include: true,
            pre_transform: None,
            lag: 0,
            lead: 0,
            adstock: 0.0,
            dimret: 0.0,
            dimret_adstock: false,
            post_transform: None,
        }
    }

    fn request(y: Vec<f64>, x: Vec<f64>) -> RegressionRequest {
        let n = y.len();
        let mut data = BTreeMap::new();
        data.insert(
            "obs".to_string(),
            (0..n)
                .map(|i| DataValue::Text(format!("{:02}/01/2024", i + 1)))
                .collect(),
        );
        data.insert(
            "sales".to_string(),
            y.into_iter().map(DataValue::Number).collect(),
        );
        data.insert(
            "tv".to_string(),
            x.into_iter().map(DataValue::Number).collect(),
        );

        RegressionRequest {
            model_configuration: ModelConfigurationWire {
                kpi: "sales".to_string(),
                start_date: "2024-01-01".to_string(),
                end_date: "2024-12-31".to_string(),
                xs_weights: None,
                log_trans_bias: false,
                take_anti_logs_at_midpoints: true,
            },
            variable_transformations: vec![transformation("tv")],
            data,
        }
    }

    #[test]
    fn test_trivial_ols_through_the_wire() {
        let response = run_regression(&request(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        ))
        .unwrap();

        assert_approx_equal!(response.coefficients["tv"], 1.0, 1e-10);
        assert_approx_equal!(response.coefficients["const"], 0.0, 1e-10);
        assert_approx_equal!(response.r_squared, 1.0, 1e-12);
        assert!(response.optimization_success);
        assert_eq!(response.n_observations, 5);

        // Fitted plus residual reproduces the KPI.
        for i in 0..5 {
            assert_approx_equal!(
                response.fitted_values[i] + response.residuals[i],
                (i + 1) as f64,
                1e-8
            );
        }
    }

    #[test]
    fn test_adstock_transforms_the_design() {
        let mut request = request(
            vec![10.0, 5.0, 2.5, 1.25, 1.0],
            vec![10.0, 0.0, 0.0, 0.0, 0.0],
        );
        request.variable_transformations[0].adstock = 0.5;

        let response = run_regression(&request).unwrap();
        let transformed = &response.transformed_data["tv"];
        assert_approx_equal!(transformed[1], 5.0, 1e-10);
        assert_approx_equal!(transformed[3], 1.25, 1e-10);
    }

    #[test]
    fn test_date_window_filters_rows() {
        let mut req = request(
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            vec![1.0, 2.0, 3.0, 4.0, 6.0],
        );
        req.model_configuration.start_date = "2024-01-02".to_string();
        req.model_configuration.end_date = "2024-01-04".to_string();

        let response = run_regression(&req).unwrap();
        assert_eq!(response.n_observations, 3);
    }

    #[test]
    fn test_unknown_kpi_rejected() {
        let mut req = request(vec![1.0, 2.0, 3.0], vec![1.0, 2.0, 3.0]);
        req.model_configuration.kpi = "revenue".to_string();
        assert!(matches!(
            run_regression(&req),
            Err(MixQuantError::InputError(_))
        ));
    }

    #[test]
    fn test_diagnostics_include_battery_and_vif() {
        let y: Vec<f64> = (0..40)
            .map(|i| {
                let wobble = ((i as f64 + 1.0).sin() * 43_758.545_3).abs();
                1.0 + 0.5 * i as f64 + (wobble - wobble.floor() - 0.5) * 0.1
            })
            .collect();
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();

        let response = run_regression(&request(y, x)).unwrap();
        assert!(response.diagnostics.tests.contains_key("Ljung-Box Stat"));
        assert!(response.diagnostics.vif_values.contains_key("tv"));

        for entry in response.diagnostics.tests.values() {
            if let PValueWire::Number(p) = entry.p_value {
                assert!((0.0..=1.0).contains(&p));
            }
        }
    }

    #[test]
    fn test_preview_applies_lag() {
        let preview = preview_transform(&TransformPreviewRequest {
            variable_name: "tv".to_string(),
            data: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            transformation: VariableTransformationWire {
                lag: 2,
                ..transformation("tv")
            },
        })
        .unwrap();

        assert_eq!(preview.transformed, vec![0.0, 0.0, 1.0, 2.0, 3.0]);
        assert_eq!(preview.original.len(), 5);
    }
}
