//! # Configuration Errors
//!
//! Error taxonomy for the load/reload pipeline.
//!
//! Every variant except [`ConfigError::WatchSetup`] is surfaced synchronously
//! to the caller of `load`/`reload`. Watch setup failures are logged and the
//! process keeps running on its last good snapshot.

use crate::manager::LifecycleState;
use crate::source::SourceType;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A raw value that could not be coerced into its declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub key_path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(key_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key_path: key_path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key_path, self.message)
    }
}

/// Configuration pipeline errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load from source {source_type}: {reason}")]
    SourceRead {
        source_type: SourceType,
        reason: String,
    },

    #[error("structural conflict at {key_path}: cannot replace {existing} value with {incoming} value")]
    MergeConflict {
        key_path: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("failed to decode configuration: {}", join_field_errors(.errors))]
    Decode { errors: Vec<FieldError> },

    #[error("configuration validation failed: {}", join_violations(.violations))]
    Validation { violations: Vec<String> },

    #[error("configuration validation failed: {}", join_violations(.violations))]
    CrossField { violations: Vec<String> },

    #[error("failed to watch {path:?}: {reason}")]
    WatchSetup { path: PathBuf, reason: String },

    #[error("cannot {operation} while configuration manager is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("a default configuration manager is already initialized")]
    AlreadyInitialized,

    #[error("configuration manager is closed")]
    Closed,
}

impl ConfigError {
    /// Every individual violation carried by a decode or validation error.
    pub fn violations(&self) -> Vec<String> {
        match self {
            Self::Decode { errors } => errors.iter().map(ToString::to_string).collect(),
            Self::Validation { violations } | Self::CrossField { violations } => violations.clone(),
            other => vec![other.to_string()],
        }
    }
}

fn join_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_violations(violations: &[String]) -> String {
    violations.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_lists_every_field() {
        let error = ConfigError::Decode {
            errors: vec![
                FieldError::new("server.port", "expected integer, got \"abc\""),
                FieldError::new("server.timeout", "unknown unit \"parsecs\""),
            ],
        };
        let message = error.to_string();
        assert!(message.contains("server.port"));
        assert!(message.contains("server.timeout"));
        assert_eq!(error.violations().len(), 2);
    }

    #[test]
    fn test_validation_error_prefix() {
        let error = ConfigError::CrossField {
            violations: vec!["dispatcher heartbeat TTL must be greater than heartbeat interval".to_string()],
        };
        assert!(error
            .to_string()
            .starts_with("configuration validation failed"));
    }

    #[test]
    fn test_invalid_state_message() {
        let error = ConfigError::InvalidState {
            operation: "reload",
            state: LifecycleState::Unloaded,
        };
        assert_eq!(
            error.to_string(),
            "cannot reload while configuration manager is unloaded"
        );
    }
}
