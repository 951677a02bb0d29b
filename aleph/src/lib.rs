//! # Aleph
//!
//! Application crate for the aleph index core.
//!
//! This crate provides the typed configuration, the dependency wiring that
//! turns it into a running [`App`], logging setup, and the [`harness`] used by
//! integration tests.

pub mod config;
pub mod harness;
pub mod logging;

pub use config::{App, AppConfig, ArchiveType, SearchBackend};
pub use harness::TestCase;

use thiserror::Error;

/// Errors that can occur during application setup or while serving calls.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The request carried credentials that match no role.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] aleph_index_pipeline::PipelineError),

    /// Search index error.
    #[error("Search index error: {0}")]
    SearchIndexError(#[from] aleph_index_repository::SearchIndexError),

    /// Store error.
    #[error("Store error: {0}")]
    StoreError(#[from] aleph_store::StoreError),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create an unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Whether the process should give up rather than carry on.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigError(_) => true,
            Self::PipelineError(e) => e.is_fatal(),
            Self::SearchIndexError(e) => e.is_fatal(),
            _ => false,
        }
    }
}
