//! OpenSearch implementation of the search index provider.
//!
//! This module provides a concrete implementation of `SearchIndexProvider`
//! using OpenSearch as the backend.

mod client;
mod queries;

pub use client::OpenSearchProvider;
pub use queries::{build_filter_query, build_search_query};
