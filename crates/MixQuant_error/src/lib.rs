// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// MixQuant: A Rust library for econometric marketing-mix modelling.
// Copyright (C) 2025 https://github.com/mixquant
// Dual licensed under Apache 2.0 and MIT.
// See:
//      - LICENSE-APACHE.md
//      - LICENSE-MIT.md
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

//! The shared error type for the MixQuant workspace.
//!
//! Every fallible operation in the engine returns
//! `Result<T, MixQuantError>`. The variants mirror the engine's failure
//! classes: input validation, expression evaluation, variable
//! transformation, regression, decomposition, and internal faults. The
//! request boundary maps each variant to an HTTP status via
//! [`MixQuantError::status`].

use thiserror::Error;

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// STRUCTS, ENUMS, AND TRAITS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

/// MixQuant error enum.
#[derive(Debug, Error)]
pub enum MixQuantError {
    /// Malformed request, unknown column, unparsable date, invalid interval
    /// sequence, or a dataset that filters down to nothing.
    #[error("input error: {0}")]
    InputError(String),

    /// An expression failed to lex, parse, or evaluate.
    #[error("expression error: {0}")]
    ExpressionError(String),

    /// A legal transform step produced a non-finite value for a variable.
    #[error("transform error on variable '{variable}': {message}")]
    TransformError {
        /// The variable whose transformation failed.
        variable: String,
        /// What went wrong.
        message: String,
    },

    /// The design matrix is unusable: shape mismatch, no rows, or no
    /// variance.
    #[error("regression error: {0}")]
    RegressionError(String),

    /// The interval layout of the variable table cannot be decomposed.
    #[error("decomposition error: {0}")]
    DecompositionError(String),

    /// Anything unexpected. Surfaced to the caller with a generic message.
    #[error("internal error: {0}")]
    InternalError(String),
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// IMPLEMENTATIONS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

impl MixQuantError {
    /// The HTTP status code the host should attach to this error.
    ///
    /// Input-class failures (bad request shape, bad data, impossible
    /// interval layouts) are the caller's fault and map to 400; everything
    /// else maps to 500.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::InputError(_)
            | Self::ExpressionError(_)
            | Self::TransformError { .. }
            | Self::RegressionError(_)
            | Self::DecompositionError(_) => 400,
            Self::InternalError(_) => 500,
        }
    }

    /// Build a [`MixQuantError::TransformError`] for a named variable.
    #[must_use]
    pub fn transform(variable: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransformError {
            variable: variable.into(),
            message: message.into(),
        }
    }
}

// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~
// UNIT TESTS
// ~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~~

#[cfg(test)]
mod tests_error {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MixQuantError::InputError("bad".into()).status(), 400);
        assert_eq!(MixQuantError::transform("tv", "non-finite").status(), 400);
        assert_eq!(MixQuantError::InternalError("boom".into()).status(), 500);
    }

    #[test]
    fn test_transform_error_message_names_the_variable() {
        let err = MixQuantError::transform("tv_spend", "log of non-positive");
        assert!(err.to_string().contains("tv_spend"));
    }
}
