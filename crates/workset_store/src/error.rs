//! Error types for stores and finders.

use crate::reference::EntityReference;
use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by entity stores and store handles.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No state exists for the requested reference.
    #[error("no entity state for reference {reference}")]
    NotFound {
        /// The reference that was looked up.
        reference: EntityReference,
    },

    /// State already exists for a reference being allocated.
    #[error("entity state for reference {reference} already exists")]
    AlreadyExists {
        /// The reference that was being allocated.
        reference: EntityReference,
    },

    /// Stored versions differ from the versions captured at load time.
    #[error("version conflict on {} entities", references.len())]
    VersionConflict {
        /// Every reference whose stored version moved under the session.
        references: Vec<EntityReference>,
    },

    /// The store backend failed.
    #[error("store backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(reference: EntityReference) -> Self {
        Self::NotFound { reference }
    }

    /// Creates an already-exists error.
    pub fn already_exists(reference: EntityReference) -> Self {
        Self::AlreadyExists { reference }
    }

    /// Creates a version-conflict error.
    pub fn version_conflict(references: Vec<EntityReference>) -> Self {
        Self::VersionConflict { references }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true if this error means "no such entity".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors raised by entity finders.
#[derive(Debug, Error)]
pub enum FinderError {
    /// The finder backend failed.
    #[error("finder backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The finder cannot evaluate the given query.
    #[error("unsupported query: {message}")]
    Unsupported {
        /// Description of what is unsupported.
        message: String,
    },
}

impl FinderError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates an unsupported-query error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}
