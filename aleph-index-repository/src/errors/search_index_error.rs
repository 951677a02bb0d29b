//! Search index error types.
//!
//! This module defines the error types that can occur during search index operations.

use thiserror::Error;

/// Errors that can occur during search index operations.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Validation error (e.g., missing required fields).
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to index a document.
    #[error("Index error: {0}")]
    IndexError(String),

    /// The named index or alias does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),

    /// Failed to create an index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// An existing index was created with a different mapping version.
    /// Fatal: the index must be deleted and rebuilt.
    #[error("Schema mismatch on {index}: stored version {stored:?}, expected {expected}")]
    SchemaMismatch {
        index: String,
        stored: Option<u32>,
        expected: u32,
    },

    /// Search query execution failed.
    #[error("Query error: {0}")]
    QueryError(String),

    /// Failed to delete a document or an index.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Delete-by-query hit version conflicts with `conflicts=abort`.
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Refresh failed; prior writes may not be visible.
    #[error("Refresh error: {0}")]
    RefreshError(String),

    /// Bulk operation had failures.
    #[error("Bulk operation error: {0}")]
    BulkOperationError(String),

    /// Batch size exceeds configured maximum.
    #[error("Batch size {provided} exceeds maximum {max}")]
    BatchSizeExceeded { provided: usize, max: usize },

    /// Failed to parse a response from the search engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Unknown error.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl SearchIndexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index error.
    pub fn index(msg: impl Into<String>) -> Self {
        Self::IndexError(msg.into())
    }

    /// Create an index not found error.
    pub fn index_not_found(name: impl Into<String>) -> Self {
        Self::IndexNotFound(name.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a schema mismatch error.
    pub fn schema_mismatch(index: impl Into<String>, stored: Option<u32>, expected: u32) -> Self {
        Self::SchemaMismatch {
            index: index.into(),
            stored,
            expected,
        }
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a version conflict error.
    pub fn version_conflict(msg: impl Into<String>) -> Self {
        Self::VersionConflict(msg.into())
    }

    /// Create a refresh error.
    pub fn refresh(msg: impl Into<String>) -> Self {
        Self::RefreshError(msg.into())
    }

    /// Create a bulk operation error.
    pub fn bulk_operation(msg: impl Into<String>) -> Self {
        Self::BulkOperationError(msg.into())
    }

    /// Create a batch size exceeded error.
    pub fn batch_size_exceeded(provided: usize, max: usize) -> Self {
        Self::BatchSizeExceeded { provided, max }
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an unknown error.
    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Whether this error means the configuration is unusable and must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}
