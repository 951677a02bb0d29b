//! Store error types.

use thiserror::Error;

/// Errors raised by the relational store, the fixture loader and the archive.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row the caller asked for does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input rejected before reaching the database.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A fixture set could not be parsed or applied. Nothing was committed.
    #[error("Fixture error: {0}")]
    Fixture(String),

    /// Reading or writing archived content failed.
    #[error("Archive error: {0}")]
    Archive(String),

    /// A stored value could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn fixture(msg: impl Into<String>) -> Self {
        Self::Fixture(msg.into())
    }

    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<aleph_index_shared::ParseStatusError> for StoreError {
    fn from(err: aleph_index_shared::ParseStatusError) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
