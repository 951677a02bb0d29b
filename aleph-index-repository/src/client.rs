//! Search index client implementation.
//!
//! This module provides the main client for interacting with the search index.
//! Application code uses this to write, delete, refresh and query documents by
//! [`IndexKind`]; the client resolves kinds to aliases via [`IndexConfig`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::config::IndexConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::types::{BatchOperationSummary, DeleteByQueryOptions, DeleteByQuerySummary};
use aleph_index_shared::{DocumentFilter, IndexAction, IndexKind, SearchQuery, SearchResponse};

/// The main client for interacting with the search index.
#[derive(Clone)]
pub struct SearchIndexClient {
    provider: Arc<dyn SearchIndexProvider>,
    config: IndexConfig,
}

impl SearchIndexClient {
    /// Create a new SearchIndexClient.
    pub fn new(provider: Arc<dyn SearchIndexProvider>, config: IndexConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn SearchIndexProvider> {
        &self.provider
    }

    /// Check if batch size exceeds the configured limit.
    fn validate_batch_size(&self, size: usize) -> Result<(), SearchIndexError> {
        if let Some(max) = self.config.max_batch_size {
            if size > max {
                return Err(SearchIndexError::batch_size_exceeded(size, max));
            }
        }
        Ok(())
    }

    fn aliases(&self, kinds: &[IndexKind]) -> Vec<String> {
        kinds.iter().map(|k| self.config.alias(*k)).collect()
    }

    /// Write a batch of documents, routed to their index by kind.
    /// Input: Vec<IndexAction> (any mix of kinds)
    /// Output: Result<BatchOperationSummary, SearchIndexError>
    ///
    /// Individual failures are reported in the summary. The batch size is
    /// limited by the configured max_batch_size (default: 1000).
    pub async fn bulk_index(
        &self,
        actions: Vec<IndexAction>,
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if actions.is_empty() {
            return Ok(BatchOperationSummary::empty());
        }

        self.validate_batch_size(actions.len())?;

        for action in &actions {
            if action.id.is_empty() {
                return Err(SearchIndexError::validation(
                    "All documents must have an id",
                ));
            }
        }

        let mut by_kind: BTreeMap<IndexKind, Vec<IndexAction>> = BTreeMap::new();
        for action in actions {
            by_kind.entry(action.kind).or_default().push(action);
        }

        let mut summary = BatchOperationSummary::empty();
        for (kind, batch) in by_kind {
            let alias = self.config.alias(kind);
            debug!(index = %alias, count = batch.len(), "Bulk indexing");
            summary.merge(self.provider.bulk_index(&alias, &batch).await?);
        }
        Ok(summary)
    }

    /// Delete one document. Missing documents are not an error.
    pub async fn delete_document(&self, kind: IndexKind, id: &str) -> Result<(), SearchIndexError> {
        if id.is_empty() {
            return Err(SearchIndexError::validation("id is required"));
        }
        self.provider
            .delete_document(&self.config.alias(kind), id)
            .await
    }

    /// Delete every document of the given kinds matching `filter`.
    pub async fn delete_by_filter(
        &self,
        kinds: &[IndexKind],
        filter: &DocumentFilter,
        options: DeleteByQueryOptions,
    ) -> Result<DeleteByQuerySummary, SearchIndexError> {
        self.provider
            .delete_by_query(&self.aliases(kinds), filter, options)
            .await
    }

    /// Make every write issued so far to the given kinds visible to search.
    pub async fn refresh(&self, kinds: &[IndexKind]) -> Result<(), SearchIndexError> {
        self.provider.refresh(&self.aliases(kinds)).await
    }

    /// Refresh the collection, entity and record indices.
    pub async fn refresh_all(&self) -> Result<(), SearchIndexError> {
        self.refresh(&IndexKind::ALL).await
    }

    /// Query the search index.
    /// Input: SearchQuery (index kind, text, filters, authorization)
    /// Output: Result<SearchResponse, SearchIndexError>
    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, SearchIndexError> {
        if query.limit == 0 && query.offset > 0 {
            return Err(SearchIndexError::validation(
                "offset without a page size is meaningless",
            ));
        }
        self.provider
            .search(&self.config.alias(query.index), query)
            .await
    }

    /// Realtime read of one document source.
    pub async fn get_document(
        &self,
        kind: IndexKind,
        id: &str,
    ) -> Result<Option<Value>, SearchIndexError> {
        self.provider
            .get_document(&self.config.alias(kind), id)
            .await
    }

    pub async fn health_check(&self) -> Result<bool, SearchIndexError> {
        self.provider.health_check().await
    }
}
