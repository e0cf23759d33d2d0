//! Error types shared by every Fabula repository

use thiserror::Error;

/// Domain error type
///
/// Driver errors never escape the store as-is: they are folded into one of
/// these kinds at the leaf of each repository method.
#[derive(Debug, Error)]
pub enum Error {
    /// No row matched a lookup, or a mutation targeted a missing row
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Resource kind (e.g. `character`)
        resource: String,
        /// Identifier that was looked up
        id: String,
    },

    /// Unique constraint violation
    #[error("{resource} already exists ({field} = {value})")]
    AlreadyExists {
        /// Resource kind
        resource: String,
        /// Field or composite key that collided
        field: String,
        /// Offending value
        value: String,
    },

    /// Foreign-key violation or a rule broken at the persistence boundary
    #[error("{resource} conflict: {reason}")]
    Conflict {
        /// Resource kind
        resource: String,
        /// Human-readable reason
        reason: String,
    },

    /// Argument precondition failure
    #[error("invalid {field}: {reason}")]
    Validation {
        /// Offending argument
        field: String,
        /// Human-readable reason
        reason: String,
    },

    /// A migration statement failed with a non-idempotent error
    #[error("migration {file} failed: {cause}")]
    Migration {
        /// Migration file name
        file: String,
        /// Underlying driver message
        cause: String,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else, including driver errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `NotFound` error
    pub fn not_found(resource: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.to_string(),
        }
    }

    /// Build an `AlreadyExists` error
    pub fn already_exists(
        resource: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    /// Build a `Conflict` error
    pub fn conflict(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Build a `Validation` error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build an `Internal` error
    pub fn internal(cause: impl ToString) -> Self {
        Self::Internal(cause.to_string())
    }

    /// True for `NotFound`
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for `AlreadyExists`
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// True for `Conflict`
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True for `Validation`
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Reject an empty (or whitespace-only) required string field
pub(crate) fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}
