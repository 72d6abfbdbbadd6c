// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The JSON wire contract: regression request/response, transform
//! preview, and the error body. Field names match the service's
//! historical API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use MixQuant_error::MixQuantError;
use MixQuant_transforms::{PowerTransform, VariableTransform};

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// A cell of the wire `data` map: numeric, or text for the observation
/// column.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum DataValue {
    /// A number.
    Number(f64),

    /// A string (dates, or numerics in string form).
    Text(String),
}

/// Wire model configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ModelConfigurationWire {
    /// The KPI column or expression.
    pub kpi: String,

    /// Window start, ISO or `dd/mm/yyyy`.
    pub start_date: String,

    /// Window end, inclusive.
    pub end_date: String,

    /// Cross-section weights dimension, if any.
    #[serde(default)]
    pub xs_weights: Option<String>,

    /// Correct the log-transformation bias during decomposition.
    #[serde(default)]
    pub log_trans_bias: bool,

    /// Exponentiate at midpoints during decomposition.
    #[serde(default = "default_true")]
    pub take_anti_logs_at_midpoints: bool,
}

/// Wire configuration of one variable's transformation.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VariableTransformationWire {
    /// The variable (column) name.
    pub variable: String,

    /// Whether the variable enters the model.
    #[serde(default = "default_true")]
    pub include: bool,

    /// Power transform applied first: `log`, `sqrt`, `exp` or null.
    #[serde(default)]
    pub pre_transform: Option<String>,

    /// Lag in observations.
    #[serde(default)]
    pub lag: u32,

    /// Lead in observations.
    #[serde(default)]
    pub lead: u32,

    /// Adstock decay rate in `[0, 1)`.
    #[serde(default)]
    pub adstock: f64,

    /// Diminishing-returns percentage in `[0, 1)`.
    #[serde(default)]
    pub dimret: f64,

    /// Route carry-over and saturation through the combined primitive.
    #[serde(default)]
    pub dimret_adstock: bool,

    /// Power transform applied last.
    #[serde(default)]
    pub post_transform: Option<String>,
}

/// The regression request.
#[derive(Clone, Debug, Deserialize)]
pub struct RegressionRequest {
    /// Model configuration.
    pub model_configuration: ModelConfigurationWire,

    /// Per-variable transformation settings.
    pub variable_transformations: Vec<VariableTransformationWire>,

    /// Column name to values. One column is the observation column.
    pub data: BTreeMap<String, Vec<DataValue>>,
}

/// A diagnostic p-value: a number, or the literal `"N/A"` when the test
/// does not apply.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum PValueWire {
    /// A numeric p-value.
    Number(f64),

    /// The test does not apply.
    NotApplicable(&'static str),
}

/// One diagnostic entry of the response.
#[derive(Clone, Debug, Serialize)]
pub struct DiagnosticEntryWire {
    /// Reporting category.
    pub category: String,

    /// The statistic.
    pub statistic: f64,

    /// The p-value or `"N/A"`.
    pub p_value: PValueWire,
}

/// The diagnostics block: named tests plus variance inflation factors.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DiagnosticsWire {
    /// Test name to entry.
    #[serde(flatten)]
    pub tests: BTreeMap<String, DiagnosticEntryWire>,

    /// Column name to VIF.
    pub vif_values: BTreeMap<String, f64>,
}

/// The regression response.
#[derive(Clone, Debug, Serialize)]
pub struct RegressionResponse {
    /// Coefficient per design column.
    pub coefficients: BTreeMap<String, f64>,

    /// Standard error per design column.
    pub std_errors: BTreeMap<String, f64>,

    /// t-statistic per design column.
    pub t_stats: BTreeMap<String, f64>,

    /// Two-tailed p-value per design column.
    pub p_values: BTreeMap<String, f64>,

    /// Coefficient of determination.
    pub r_squared: f64,

    /// Adjusted R-squared.
    pub adjusted_r_squared: f64,

    /// Regression F-statistic.
    pub f_statistic: f64,

    /// p-value of the F-statistic.
    pub f_pvalue: f64,

    /// Akaike information criterion.
    pub aic: f64,

    /// Bayesian information criterion.
    pub bic: f64,

    /// Durbin-Watson statistic of the residuals.
    pub durbin_watson: f64,

    /// Rows entering the fit.
    pub n_observations: usize,

    /// Residual degrees of freedom.
    pub degrees_of_freedom: usize,

    /// Residuals in filtered observation order.
    pub residuals: Vec<f64>,

    /// Fitted values in filtered observation order.
    pub fitted_values: Vec<f64>,

    /// Transformed columns (KPI included).
    pub transformed_data: BTreeMap<String, Vec<f64>>,

    /// Per-observation `beta * x` per design column.
    pub variable_contributions: BTreeMap<String, Vec<f64>>,

    /// The diagnostic battery.
    pub diagnostics: DiagnosticsWire,

    /// Whether the bounded solver converged.
    pub optimization_success: bool,
}

/// Transform preview request.
#[derive(Clone, Debug, Deserialize)]
pub struct TransformPreviewRequest {
    /// Display name of the variable.
    pub variable_name: String,

    /// The raw series.
    pub data: Vec<f64>,

    /// The transformation to apply.
    pub transformation: VariableTransformationWire,
}

/// Transform preview response.
#[derive(Clone, Debug, Serialize)]
pub struct TransformPreviewResponse {
    /// Display name of the variable.
    pub variable: String,

    /// The raw series, echoed.
    pub original: Vec<f64>,

    /// The transformed series.
    pub transformed: Vec<f64>,
}

/// The failure body returned with a 400 or 500 status.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable failure description.
    pub detail: String,
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

fn default_true() -> bool {
    true
}

impl DataValue {
    /// The cell as a number, parsing numeric strings.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` when the cell is non-numeric text.
    pub fn as_number(&self, column: &str) -> Result<f64, MixQuantError> {
        match self {
            Self::Number(v) => Ok(*v),
            Self::Text(text) => text.trim().parse::<f64>().map_err(|_| {
                MixQuantError::InputError(format!(
                    "non-numeric value '{text}' in column '{column}'"
                ))
            }),
        }
    }

    /// The cell as text.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(v) => v.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl VariableTransformationWire {
    /// Converts the wire record into the typed transform pipeline.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on unknown transform names or
    ///   out-of-range parameters.
    pub fn to_transform(&self) -> Result<VariableTransform, MixQuantError> {
        let transform = VariableTransform {
            pre_transform: PowerTransform::parse(self.pre_transform.as_deref())?,
            lag: self.lag as usize,
            lead: self.lead as usize,
            adstock: self.adstock,
            dimret: self.dimret,
            dimret_adstock: self.dimret_adstock,
            reference: 0.0,
            post_transform: PowerTransform::parse(self.post_transform.as_deref())?,
        };
        transform.validate()?;
        Ok(transform)
    }
}

impl RegressionRequest {
    /// Parses a request from its JSON body.
    ///
    /// # Errors
    /// - `MixQuantError::InputError` on malformed JSON.
    pub fn from_json(body: &str) -> Result<Self, MixQuantError> {
        serde_json::from_str(body)
            .map_err(|e| MixQuantError::InputError(format!("malformed request: {e}")))
    }
}

impl RegressionResponse {
    /// Serializes the response to JSON.
    ///
    /// # Errors
    /// - `MixQuantError::InternalError` if serialization fails (it cannot
    ///   once outputs are sanitized to finite numbers).
    pub fn to_json(&self) -> Result<String, MixQuantError> {
        serde_json::to_string(self)
            .map_err(|e| MixQuantError::InternalError(format!("serializing response: {e}")))
    }
}

impl ErrorBody {
    /// Builds the failure body for an error, with its HTTP status.
    /// Internal errors are reported with a generic detail; the full
    /// message is logged by the pipeline.
    #[must_use]
    pub fn from_error(error: &MixQuantError) -> (u16, Self) {
        let status = error.status();
        let detail = if status == 500 {
            "internal error".to_string()
        } else {
            error.to_string()
        };
        (status, Self { detail })
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_wire {
    use super::*;

    #[test]
    fn test_request_round_trip() {
        let json = r#"{
            "model_configuration": {
                "kpi": "sales",
                "start_date": "2024-01-01",
                "end_date": "2024-06-30"
            },
            "variable_transformations": [
                {"variable": "tv", "adstock": 0.5, "dimret": 0.3}
            ],
            "data": {
                "obs": ["2024-01-01", "2024-01-08"],
                "sales": [10.0, 12.0],
                "tv": [100.0, "200"]
            }
        }"#;

        let request: RegressionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.model_configuration.kpi, "sales");
        assert!(request.model_configuration.take_anti_logs_at_midpoints);
        assert!(request.variable_transformations[0].include);
        assert_eq!(
            request.data["tv"][1].as_number("tv").unwrap(),
            200.0
        );
    }

    #[test]
    fn test_p_value_wire_serialization() {
        let number = serde_json::to_string(&PValueWire::Number(0.25)).unwrap();
        assert_eq!(number, "0.25");
        let na = serde_json::to_string(&PValueWire::NotApplicable("N/A")).unwrap();
        assert_eq!(na, "\"N/A\"");
    }

    #[test]
    fn test_error_body_hides_internal_detail() {
        let (status, body) =
            ErrorBody::from_error(&MixQuantError::InternalError("secret".to_string()));
        assert_eq!(status, 500);
        assert_eq!(body.detail, "internal error");

        let (status, body) =
            ErrorBody::from_error(&MixQuantError::InputError("bad column".to_string()));
        assert_eq!(status, 400);
        assert!(body.detail.contains("bad column"));
    }

    #[test]
    fn test_wire_transform_validation() {
        let record = VariableTransformationWire {
            variable: "tv".to_string(),
            include: true,
            pre_transform: Some("log".to_string()),
            lag: 1,
            lead: 0,
            adstock: 0.5,
            dimret: 0.0,
            dimret_adstock: false,
            post_transform: None,
        };
        assert!(record.to_transform().is_ok());

        let bad = VariableTransformationWire {
            adstock: 1.5,
            ..record
        };
        assert!(bad.to_transform().is_err());
    }
}
