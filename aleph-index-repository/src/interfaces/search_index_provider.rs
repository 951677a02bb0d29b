//! Search index provider trait definition.
//!
//! This module defines the abstract interface for search index operations,
//! allowing for different backend implementations (OpenSearch, in-memory, etc.).

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{BatchOperationSummary, DeleteByQueryOptions, DeleteByQuerySummary};
use aleph_index_shared::{DocumentFilter, IndexAction, SearchQuery, SearchResponse};

/// Abstracts the underlying search index implementation (OpenSearch, in-memory, etc.).
///
/// Index arguments are concrete index names or aliases; resolving an
/// [`aleph_index_shared::IndexKind`] to a name is the job of
/// [`crate::SearchIndexClient`].
///
/// Writes follow near-real-time semantics: after `bulk_index` or
/// `delete_document` return, `get_document` sees the change but `search`
/// only does after a `refresh` of that index.
///
/// All methods return `Result<T, SearchIndexError>` for consistent error handling across
/// different backend implementations.
#[async_trait]
pub trait SearchIndexProvider: Send + Sync {
    /// Create an index from a settings/mappings/aliases body.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the index was created
    /// * `Err(SearchIndexError::IndexCreationError)` - If it exists or the body is rejected
    async fn create_index(&self, name: &str, body: &Value) -> Result<(), SearchIndexError>;

    /// Check whether an index (or alias) exists.
    async fn index_exists(&self, name: &str) -> Result<bool, SearchIndexError>;

    /// Read the mapping version stored in `_meta.version` of an existing index.
    ///
    /// Returns `Ok(None)` if the index has no version metadata.
    async fn mapping_version(&self, name: &str) -> Result<Option<u32>, SearchIndexError>;

    /// Concrete indices an alias currently points to.
    ///
    /// Returns an empty list if no such alias exists.
    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Delete an index.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the index existed and was deleted
    /// * `Ok(false)` - If there was nothing to delete
    async fn delete_index(&self, name: &str) -> Result<bool, SearchIndexError>;

    /// Index multiple documents in bulk, replacing documents with the same id.
    ///
    /// # Returns
    ///
    /// * `Ok(BatchOperationSummary)` - Contains aggregate statistics and individual results
    /// * `Err(SearchIndexError)` - If the bulk operation fails entirely
    async fn bulk_index(
        &self,
        index: &str,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError>;

    /// Delete a document by id. Deleting a missing document is not an error.
    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError>;

    /// Delete every document matching `filter` in the given indices.
    ///
    /// Matching runs against the last refreshed state. Documents written after
    /// that snapshot are version conflicts, handled per `options.conflicts`.
    async fn delete_by_query(
        &self,
        indices: &[String],
        filter: &DocumentFilter,
        options: DeleteByQueryOptions,
    ) -> Result<DeleteByQuerySummary, SearchIndexError>;

    /// Make all writes issued so far visible to search.
    async fn refresh(&self, indices: &[String]) -> Result<(), SearchIndexError>;

    /// Execute a search against the refreshed state of an index.
    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchIndexError>;

    /// Realtime get of a document source by id.
    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchIndexError>;

    /// Check if the search engine is healthy and reachable.
    async fn health_check(&self) -> Result<bool, SearchIndexError>;
}
