//! Error types for crmrelay.
//!
//! Library crates use [`CrmRelayError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! Per-item failures inside a batch are *not* errors: they are absorbed
//! into the [`crate::types::BatchResult`] as `Failed` outcomes and never
//! propagate past the result classifier. Only whole-operation problems
//! (transport, validation, decode) surface through this type.

use std::path::PathBuf;

/// Top-level error type for all crmrelay operations.
#[derive(Debug, thiserror::Error)]
pub enum CrmRelayError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure: the remote call failed before any
    /// per-entity information existed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote API answered with a non-success HTTP status.
    #[error("api error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be decoded into the expected shape.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Malformed request rejected before dispatch (e.g. empty selection).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Another bulk submission is still running on this coordinator.
    #[error("a bulk submission is already in progress")]
    Busy,

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CrmRelayError>;

impl CrmRelayError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures that happened before any per-entity information
    /// existed, i.e. the whole batch must be treated as failed.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Api { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = CrmRelayError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = CrmRelayError::validation("selection is empty");
        assert!(err.to_string().contains("selection is empty"));

        let err = CrmRelayError::Api {
            status: 403,
            message: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "api error: HTTP 403: forbidden");
    }

    #[test]
    fn transport_classification() {
        assert!(CrmRelayError::Transport("connection refused".into()).is_transport());
        assert!(
            CrmRelayError::Api {
                status: 500,
                message: "oops".into()
            }
            .is_transport()
        );
        assert!(!CrmRelayError::validation("empty").is_transport());
        assert!(!CrmRelayError::Busy.is_transport());
    }
}
