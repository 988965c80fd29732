//! Error taxonomy shared by every component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Broad category of a [`SignalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    AuthorizationDenied,
    Conflict,
    NotFound,
    Timeout,
    PersistenceFailure,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::AuthorizationDenied => "authorization_denied",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PersistenceFailure => "persistence_failure",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

/// Errors reported to callers.
///
/// Every variant carries a stable snake_case code identifying the concrete
/// condition within its kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Malformed command, headers or payload.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    /// Rejected by pre-enforcement.
    #[error("{message}")]
    AuthorizationDenied { code: &'static str, message: String },

    /// Stale expected revision, storage-side revision mismatch, or a create
    /// against an existing thing.
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// The thing, or a part of it the command requires, does not exist.
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// The command did not complete before its deadline.
    #[error("no response within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The journal is unavailable.
    #[error("persistence failure: {message}")]
    PersistenceFailure { message: String },

    /// Unexpected condition, including undecodable journal contents.
    #[error("internal error: {message}")]
    Internal { message: String, retryable: bool },
}

impl SignalError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        SignalError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn authorization_denied(code: &'static str, message: impl Into<String>) -> Self {
        SignalError::AuthorizationDenied {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        SignalError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        SignalError::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        SignalError::PersistenceFailure {
            message: message.into(),
        }
    }

    /// A non-retryable internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        SignalError::Internal {
            message: message.into(),
            retryable: false,
        }
    }

    /// An internal error the caller may retry, e.g. an execution context that
    /// died while handling the command.
    pub fn internal_retryable(message: impl Into<String>) -> Self {
        SignalError::Internal {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::Validation { .. } => ErrorKind::Validation,
            SignalError::AuthorizationDenied { .. } => ErrorKind::AuthorizationDenied,
            SignalError::Conflict { .. } => ErrorKind::Conflict,
            SignalError::NotFound { .. } => ErrorKind::NotFound,
            SignalError::Timeout { .. } => ErrorKind::Timeout,
            SignalError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            SignalError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SignalError::Validation { code, .. }
            | SignalError::AuthorizationDenied { code, .. }
            | SignalError::Conflict { code, .. }
            | SignalError::NotFound { code, .. } => *code,
            SignalError::Timeout { .. } => "timeout",
            SignalError::PersistenceFailure { .. } => "persistence_failure",
            SignalError::Internal { .. } => "internal_error",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SignalError::Timeout { .. } | SignalError::PersistenceFailure { .. } => true,
            SignalError::Internal { retryable, .. } => *retryable,
            SignalError::Validation { .. }
            | SignalError::AuthorizationDenied { .. }
            | SignalError::Conflict { .. }
            | SignalError::NotFound { .. } => false,
        }
    }
}
