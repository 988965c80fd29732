//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID has an invalid prefix.
    #[error("invalid ID prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The ID is missing its separator (`_` for generated IDs, `:` for entity IDs).
    #[error("ID missing '{0}' separator")]
    MissingSeparator(char),

    /// The ULID portion of the ID is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// The namespace portion of an entity ID is invalid.
    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace {
        namespace: String,
        reason: &'static str,
    },

    /// The name portion of an entity ID is invalid.
    #[error("invalid entity name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The ID exceeds the maximum length.
    #[error("ID is {len} characters long, maximum is {max}")]
    TooLong { len: usize, max: usize },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }

    /// Returns true if this error concerns the namespace part of an entity ID.
    pub fn is_namespace_error(&self) -> bool {
        matches!(self, IdError::InvalidNamespace { .. })
    }
}
