//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID is not a valid number in any accepted encoding.
    #[error("invalid {kind} ID: '{input}'")]
    InvalidNumber { kind: &'static str, input: String },

    /// A dothex ID does not have exactly four 4-digit groups.
    #[error("invalid dothex job ID: '{0}'")]
    InvalidDothex(String),

    /// A KVS key suffix is empty or contains a path separator.
    #[error("invalid KVS key suffix: '{0}'")]
    InvalidKeySuffix(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
