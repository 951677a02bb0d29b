//! Error types for the index pipeline.

use aleph_index_repository::SearchIndexError;
use aleph_store::StoreError;
use thiserror::Error;

/// Errors that can occur in the index pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the relational store.
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    /// Error from the search index.
    #[error("Search index error: {0}")]
    SearchIndexError(#[from] SearchIndexError),

    /// Error from the writer component.
    #[error("Loader error: {0}")]
    LoaderError(String),

    /// The consistency barrier could not be established. Fatal to the caller:
    /// earlier writes may not be visible.
    #[error("Barrier error: {0}")]
    BarrierError(String),

    /// A row the operation depends on does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error serializing a search document.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PipelineError {
    /// Create a loader error.
    pub fn loader(msg: impl Into<String>) -> Self {
        Self::LoaderError(msg.into())
    }

    /// Create a barrier error.
    pub fn barrier(msg: impl Into<String>) -> Self {
        Self::BarrierError(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether retrying cannot help.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::SearchIndexError(e) => e.is_fatal(),
            Self::BarrierError(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
