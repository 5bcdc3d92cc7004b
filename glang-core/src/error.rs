//! Core error types.
//!
//! Two kinds of failure exist in the engine. Hard failures (registry misuse,
//! illegal transitions) are returned as [`CoreError`]. Problems with an
//! untrusted document are returned as data, a list of [`Diagnostic`]s.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from the registry and the state machine runtime.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown state machine: {kind}")]
    UnknownMachine { kind: String },

    #[error("invalid transition: cannot apply '{event}' in state '{state}'")]
    InvalidTransition { state: String, event: String },

    #[error("invalid machine definition: {reason}")]
    InvalidDefinition { reason: String },

    #[error("extension already registered: {name}")]
    ExtensionExists { name: String },

    #[error("invalid extension: {reason}")]
    InvalidExtension { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns an error code suitable for adapter responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::UnknownMachine { .. } => "UNKNOWN_MACHINE",
            CoreError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreError::InvalidDefinition { .. } => "BAD_DEFINITION",
            CoreError::ExtensionExists { .. } => "EXTENSION_EXISTS",
            CoreError::InvalidExtension { .. } => "BAD_EXTENSION",
            CoreError::Json(_) => "BAD_REQUEST",
        }
    }
}

/// A parse or validation problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub message: String,

    /// Positional path of the offending node, e.g. `children[0].tool.@name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Byte offset into the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            position: None,
        }
    }

    pub fn at_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Some(path.into()),
            position: None,
        }
    }

    pub fn at_position(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            path: None,
            position: Some(position),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        match (&self.path, self.position) {
            (Some(path), _) if !path.is_empty() => write!(f, " (at {})", path),
            (_, Some(pos)) => write!(f, " (at offset {})", pos),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoreError::InvalidTransition {
            state: "idle".to_string(),
            event: "pause".to_string(),
        };
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot apply 'pause' in state 'idle'"
        );

        let err = CoreError::ExtensionExists {
            name: "charts".to_string(),
        };
        assert_eq!(err.error_code(), "EXTENSION_EXISTS");
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::at_path("Unknown attribute: foo", "children[0].tool.@foo");
        assert_eq!(
            d.to_string(),
            "Unknown attribute: foo (at children[0].tool.@foo)"
        );

        let d = Diagnostic::at_position("unclosed element <tool>", 12);
        assert_eq!(d.to_string(), "unclosed element <tool> (at offset 12)");

        let d = Diagnostic::at_path("Root must be a document node", "");
        assert_eq!(d.to_string(), "Root must be a document node");
    }
}
