//! # Aleph Index Repository
//!
//! This crate provides the provider interface for the search engine, the
//! index admin operations built on it, and two concrete providers: OpenSearch
//! and an in-memory near-real-time index used by tests.

pub mod admin;
pub mod client;
pub mod config;
pub mod errors;
pub mod interfaces;
pub mod mappings;
pub mod memory;
pub mod opensearch;
pub mod types;

pub use admin::UpgradeOutcome;
pub use client::SearchIndexClient;
pub use config::IndexConfig;
pub use errors::SearchIndexError;
pub use interfaces::SearchIndexProvider;
pub use memory::MemorySearchProvider;
pub use opensearch::OpenSearchProvider;
pub use types::{
    BatchOperationResult, BatchOperationSummary, Conflicts, DeleteByQueryOptions,
    DeleteByQuerySummary,
};
