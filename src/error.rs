//! Typed error hierarchy for the public planning API.
//!
//! Internal helpers use `anyhow::Result` throughout (matching the rest of
//! this crate); `CoreError` exists only at the boundary the host talks to,
//! so a `{error:{kind, message, detail}}` envelope can be built without
//! string-matching an `anyhow::Error`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors the core's public API can return.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum CoreError {
    #[error("objective blocked by safety validator: {threats:?}")]
    SafetyViolation {
        threat_level: String,
        threats: Vec<String>,
    },

    #[error("plan violates constraints: {reason}")]
    ConstraintViolation { reason: String },

    #[error("confidence {confidence:.2} below threshold and no fallback available")]
    LowConfidence {
        confidence: f64,
        warnings: Vec<String>,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// The `kind` discriminant used in the §6 error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::SafetyViolation { .. } => "safety_violation",
            CoreError::ConstraintViolation { .. } => "constraint_violation",
            CoreError::LowConfidence { .. } => "low_confidence",
            CoreError::InvalidInput { .. } => "invalid_input",
            CoreError::Internal { .. } => "internal",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CoreError::Internal {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Internal {
            message: err.to_string(),
        }
    }
}

/// The JSON-shaped envelope described in §6 (`{error:{kind, message, detail?}}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
    pub detail: Option<serde_json::Value>,
}

impl From<&CoreError> for ErrorEnvelope {
    fn from(err: &CoreError) -> Self {
        ErrorEnvelope {
            kind: err.kind().to_string(),
            message: err.to_string(),
            detail: None,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
