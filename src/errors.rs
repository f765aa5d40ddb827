use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Typed error hierarchy for burrow.
///
/// Use at module boundaries (provider calls, cache construction, session
/// operations). Internal/leaf functions can continue using `anyhow::Result` —
/// the `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum BurrowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider error: {message}")]
    Provider { message: String, retryable: bool },

    #[error("Tool error: {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using BurrowError.
pub type BurrowResult<T> = std::result::Result<T, BurrowError>;

impl BurrowError {
    /// Whether this error is retryable (transient provider errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            BurrowError::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

/// Failure classification attached to an `ExecutionResult`.
///
/// These tags travel back to the LLM as tool errors; the taxonomy is closed
/// so downstream consumers can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    CommandNotAllowed,
    PathTraversal,
    Timeout,
    FileTooLarge,
    ParseError,
    ExecutionError,
    Unexpected,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self {
            ToolErrorKind::CommandNotAllowed => "command_not_allowed",
            ToolErrorKind::PathTraversal => "path_traversal",
            ToolErrorKind::Timeout => "timeout",
            ToolErrorKind::FileTooLarge => "file_too_large",
            ToolErrorKind::ParseError => "parse_error",
            ToolErrorKind::ExecutionError => "execution_error",
            ToolErrorKind::Unexpected => "unexpected",
        };
        write!(f, "{}", tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = BurrowError::Config("bad value".into());
        assert_eq!(err.to_string(), "Configuration error: bad value");
    }

    #[test]
    fn provider_error_retryable() {
        let err = BurrowError::Provider {
            message: "timeout".into(),
            retryable: true,
        };
        assert_eq!(err.to_string(), "Provider error: timeout");
        assert!(err.is_retryable());
    }

    #[test]
    fn tool_error_display() {
        let err = BurrowError::Tool {
            tool: "grep".into(),
            message: "bad pattern".into(),
        };
        assert_eq!(err.to_string(), "Tool error: grep: bad pattern");
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_from_anyhow() {
        let anyhow_err = anyhow::anyhow!("something broke");
        let err: BurrowError = anyhow_err.into();
        assert!(matches!(err, BurrowError::Internal(_)));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ToolErrorKind::CommandNotAllowed).unwrap();
        assert_eq!(json, "\"command_not_allowed\"");
        assert_eq!(ToolErrorKind::PathTraversal.to_string(), "path_traversal");
    }
}
