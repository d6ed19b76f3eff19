//! Error types for ZeptoGate
//!
//! This module defines the error taxonomy shared by every subsystem.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use thiserror::Error;

/// The primary error type for ZeptoGate operations.
#[derive(Error, Debug)]
pub enum GateError {
    /// Malformed or missing fields on an integration, policy or request.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blacklisted name, disallowed type or incompatible license.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// The security scan did not pass. Nothing was stored.
    #[error("Security scan rejected '{name}' (score {score}): {reason}")]
    SecurityRejected {
        /// Name of the rejected integration or artifact.
        name: String,
        /// Scan score (0-100) at the time of rejection.
        score: u8,
        /// Short human-readable summary of the blocking findings.
        reason: String,
    },

    /// Unknown integration id (or other unknown resource).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Handler, monitor or update failure.
    #[error("Operation failed: {0}")]
    Operation(String),

    /// Configuration-related errors (unreadable file, invalid values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl GateError {
    /// Short machine-friendly label for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::Validation(_) => "validation",
            GateError::PolicyViolation(_) => "policy_violation",
            GateError::SecurityRejected { .. } => "security_rejected",
            GateError::NotFound(_) => "not_found",
            GateError::Operation(_) => "operation",
            GateError::Config(_) => "config",
            GateError::Io(_) => "io",
            GateError::Json(_) => "json",
            GateError::Http(_) => "http",
        }
    }
}

/// A specialized `Result` type for ZeptoGate operations.
pub type Result<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GateError::PolicyViolation("'left-pad' is blacklisted".to_string());
        assert_eq!(err.to_string(), "Policy violation: 'left-pad' is blacklisted");
    }

    #[test]
    fn test_security_rejected_display() {
        let err = GateError::SecurityRejected {
            name: "lodash".into(),
            score: 80,
            reason: "1 high vulnerability".into(),
        };
        assert_eq!(
            err.to_string(),
            "Security scan rejected 'lodash' (score 80): 1 high vulnerability"
        );
        assert_eq!(err.kind(), "security_rejected");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: GateError = io_err.into();
        assert!(matches!(err, GateError::Io(_)));
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: GateError = json_err.into();
        assert!(matches!(err, GateError::Json(_)));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(GateError::Validation("x".into()).kind(), "validation");
        assert_eq!(GateError::NotFound("x".into()).kind(), "not_found");
        assert_eq!(GateError::Operation("x".into()).kind(), "operation");
        assert_eq!(GateError::Config("x".into()).kind(), "config");
    }
}
