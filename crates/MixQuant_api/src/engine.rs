// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The pipeline engine: TRANSFORM → FIT → DIAGNOSE → DECOMPOSE, with a
//! stage tag on every failure. Permutation batches fan out in parallel
//! and are keyed by a deterministic permutation index; decomposition is
//! computed for the first permutation's dataset.

use std::collections::BTreeMap;
use std::fmt;

use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::assemble::{build_panel, AssembledPanel, TransformCache};
use MixQuant_data::{CrossSectionSpec, ModelConfig, RawPanel, VariableTable};
use MixQuant_decomposition::{decompose, DecompositionTables};
use MixQuant_diagnostics::{
    panel_battery, single_series_battery, variance_inflation_factors, Diagnostic,
};
use MixQuant_error::MixQuantError;
use MixQuant_expression::{permutation_bindings, PermutationBinding};
use MixQuant_regression::{BoundedLeastSquares, FitResult};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// Pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    /// Expression evaluation and matrix assembly.
    Transform,

    /// Bounded least-squares fitting.
    Fit,

    /// The diagnostic battery.
    Diagnose,

    /// Contribution decomposition.
    Decompose,
}

/// A pipeline failure, tagged with the stage that produced it.
#[derive(Debug)]
pub struct StageError {
    /// The failing stage.
    pub stage: Stage,

    /// The underlying error.
    pub error: MixQuantError,
}

/// A full engine request: the raw dataset plus the three specification
/// tables.
#[derive(Clone, Debug)]
pub struct EngineRequest {
    /// The raw panel dataset.
    pub data: RawPanel,

    /// Model configuration.
    pub config: ModelConfig,

    /// Cross-section specification.
    pub sections: CrossSectionSpec,

    /// Variable specification.
    pub variables: VariableTable,
}

/// The outcome of one permutation's regression.
#[derive(Clone, Debug)]
pub struct PermutationResult {
    /// The slot binding that produced this permutation.
    pub binding: PermutationBinding,

    /// Design column names, aligned with the fit vectors.
    pub column_names: Vec<String>,

    /// The regression fit (in weighted space when weights apply).
    pub fit: FitResult,

    /// Fitted values in original (unweighted) KPI units.
    pub fitted_values: Vec<f64>,

    /// Residuals in original (unweighted) KPI units.
    pub residuals: Vec<f64>,

    /// The diagnostic battery, computed in original (unweighted) KPI
    /// units.
    pub diagnostics: Vec<Diagnostic>,

    /// VIF per non-intercept design column.
    pub vif: Vec<(String, f64)>,
}

/// The engine's response: one result per permutation index, the indices
/// that failed to converge, and the decomposition of the first
/// permutation.
#[derive(Clone, Debug)]
pub struct EngineReport {
    /// Permutation index (from 1) to result.
    pub results: BTreeMap<usize, PermutationResult>,

    /// Permutations whose optimizer did not converge.
    pub failed_permutations: Vec<usize>,

    /// Contribution decomposition of the first permutation.
    pub decomposition: Option<DecompositionTables>,
}

/// The pipeline engine.
#[derive(Clone, Debug, Default)]
pub struct Engine {
    /// The bounded solver configuration.
    pub solver: BoundedLeastSquares,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Transform => "transform",
            Self::Fit => "fit",
            Self::Diagnose => "diagnose",
            Self::Decompose => "decompose",
        };
        write!(f, "{name}")
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage: {}", self.stage, self.error)
    }
}

impl std::error::Error for StageError {}

impl StageError {
    fn new(stage: Stage, error: MixQuantError) -> Self {
        Self { stage, error }
    }

    /// The HTTP status of the underlying error.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.error.status()
    }
}

impl Engine {
    /// Runs the full pipeline over every permutation.
    ///
    /// # Errors
    /// - [`StageError`] tagged with the stage that failed; permutations
    ///   that merely fail to converge are reported, not fatal.
    pub fn run(&self, request: &EngineRequest) -> Result<EngineReport, StageError> {
        let bindings = permutation_bindings(&request.variables)
            .map_err(|e| StageError::new(Stage::Transform, e))?;
        info!("running {} permutation(s)", bindings.len());

        let outcomes: Vec<(usize, Result<(PermutationResult, AssembledPanel), StageError>)> =
            bindings
                .par_iter()
                .enumerate()
                .map(|(i, binding)| (i + 1, self.run_permutation(request, binding)))
                .collect();

        let mut results = BTreeMap::new();
        let mut failed_permutations = Vec::new();
        let mut first_panel: Option<AssembledPanel> = None;

        for (index, outcome) in outcomes {
            let (result, assembled) = outcome?;
            if !result.fit.converged {
                failed_permutations.push(index);
            }
            if index == 1 {
                first_panel = Some(assembled);
            }
            results.insert(index, result);
        }

        if !failed_permutations.is_empty() {
            warn!(
                "permutations without an optimal solution: {failed_permutations:?}"
            );
        }

        let decomposition = match first_panel {
            Some(assembled) => {
                let first = results
                    .get(&1)
                    .ok_or_else(|| {
                        StageError::new(
                            Stage::Decompose,
                            MixQuantError::InternalError(
                                "first permutation missing".to_string(),
                            ),
                        )
                    })?;
                let tables = decompose(
                    &assembled.panel,
                    &first.fit.coefficients,
                    &first.fitted_values,
                    &request.config,
                )
                .map_err(|e| StageError::new(Stage::Decompose, e))?;
                Some(tables)
            }
            None => None,
        };

        Ok(EngineReport {
            results,
            failed_permutations,
            decomposition,
        })
    }

    /// TRANSFORM, FIT and DIAGNOSE for one permutation. Returns the
    /// (unweighted) assembled panel for the decomposition stage.
    fn run_permutation(
        &self,
        request: &EngineRequest,
        binding: &PermutationBinding,
    ) -> Result<(PermutationResult, AssembledPanel), StageError> {
        let mut cache = TransformCache::default();
        let assembled = build_panel(
            &request.data,
            &request.config,
            &request.sections,
            &request.variables,
            binding,
            &mut cache,
        )
        .map_err(|e| StageError::new(Stage::Transform, e))?;

        let panel = &assembled.panel;
        let n = panel.n_rows();

        // Per-row weights from the cross-section specification.
        let weights: Vec<f64> = match &request.config.weights_column {
            Some(column) => panel
                .sections
                .iter()
                .map(|s| request.sections.weight(column, s))
                .collect::<Result<Vec<f64>, MixQuantError>>()
                .map_err(|e| StageError::new(Stage::Transform, e))?,
            None => vec![1.0; n],
        };

        // The fit runs on the weighted copies; everything reported —
        // fitted values, residuals and the diagnostics — is in the
        // original (unweighted) KPI units.
        let y_weighted: Vec<f64> = panel
            .kpi
            .iter()
            .zip(&weights)
            .map(|(v, w)| v * w)
            .collect();
        let x_weighted = DMatrix::from_fn(n, panel.n_columns(), |i, j| {
            panel.columns()[j].1[i] * weights[i]
        });

        let y_vec = DVector::from_column_slice(&y_weighted);
        let fit = self
            .solver
            .fit(&x_weighted, &y_vec, &assembled.bounds)
            .map_err(|e| StageError::new(Stage::Fit, e))?;

        // Reverse the weights out of the predictions.
        let fitted_values: Vec<f64> = fit
            .fitted_values
            .iter()
            .zip(&weights)
            .map(|(f, w)| f / w)
            .collect();
        let residuals: Vec<f64> = panel
            .kpi
            .iter()
            .zip(&fitted_values)
            .map(|(actual, fitted)| actual - fitted)
            .collect();

        // DIAGNOSE consumes the unweighted design and predictions.
        let x = DMatrix::from_fn(n, panel.n_columns(), |i, j| panel.columns()[j].1[i]);
        let section_ids: Vec<usize> = panel
            .sections
            .iter()
            .map(|s| {
                request
                    .sections
                    .sections()
                    .iter()
                    .position(|known| known == s)
                    .unwrap_or(0)
            })
            .collect();
        let slope_columns: Vec<usize> = panel
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, (meta, _))| !meta.is_constant)
            .map(|(j, _)| j)
            .collect();

        let diagnostics = if panel.is_panel() {
            panel_battery(
                &panel.kpi,
                &x,
                &fitted_values,
                &section_ids,
                &slope_columns,
            )
        } else {
            single_series_battery(&panel.kpi, &x, &fitted_values)
        };

        let vif_all = variance_inflation_factors(&x);
        let vif: Vec<(String, f64)> = panel
            .columns()
            .iter()
            .zip(vif_all)
            .filter(|((meta, _), _)| !meta.is_constant)
            .map(|((meta, _), v)| (meta.source.column_name(), v))
            .collect();

        let result = PermutationResult {
            binding: binding.clone(),
            column_names: panel.column_names(),
            fit,
            fitted_values,
            residuals,
            diagnostics,
            vif,
        };

        Ok((result, assembled))
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
