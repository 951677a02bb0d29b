//! Flush / consistency barrier.
//!
//! The barrier is the only point at which queries are guaranteed to see
//! every earlier write.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::errors::PipelineError;
use crate::loader::IndexWriter;
use aleph_index_repository::DeleteByQueryOptions;
use aleph_index_shared::{DocumentFilter, IndexKind};

/// Outcome of [`IndexBarrier::purge_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub deleted: u64,
    /// Documents skipped because they changed under the purge.
    pub version_conflicts: u64,
}

pub struct IndexBarrier {
    writer: Arc<IndexWriter>,
}

impl IndexBarrier {
    pub fn new(writer: Arc<IndexWriter>) -> Self {
        Self { writer }
    }

    /// Write everything buffered, then refresh all three indices.
    ///
    /// On success every write issued before the call is searchable.
    #[instrument(skip(self))]
    pub async fn flush_index(&self) -> Result<(), PipelineError> {
        let written = self.writer.flush_pending().await.map_err(|e| {
            error!(error = %e, "Flush failed while draining writes");
            PipelineError::barrier(format!("draining pending writes: {}", e))
        })?;

        self.writer.client().refresh_all().await.map_err(|e| {
            error!(error = %e, "Flush failed while refreshing");
            PipelineError::barrier(format!("refreshing indices: {}", e))
        })?;

        info!(written = written.total, "Flushed search indices");
        Ok(())
    }

    /// Delete every document from the three indices.
    ///
    /// Flushes first so the match-all snapshot covers every earlier write.
    /// Documents changed under the purge are counted, not fatal, and the
    /// indices are refreshed before returning.
    #[instrument(skip(self))]
    pub async fn purge_all(&self) -> Result<PurgeSummary, PipelineError> {
        self.flush_index().await?;

        let deleted = self
            .writer
            .client()
            .delete_by_filter(
                &IndexKind::ALL,
                &DocumentFilter::MatchAll,
                DeleteByQueryOptions::purge(),
            )
            .await
            .map_err(|e| {
                error!(error = %e, "Purge failed");
                PipelineError::barrier(format!("purging indices: {}", e))
            })?;

        let summary = PurgeSummary {
            deleted: deleted.deleted,
            version_conflicts: deleted.version_conflicts,
        };
        info!(
            deleted = summary.deleted,
            version_conflicts = summary.version_conflicts,
            "Purged search indices"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::WriterConfig;
    use aleph_index_repository::{
        BatchOperationSummary, DeleteByQuerySummary, IndexConfig, MemorySearchProvider,
        SearchIndexClient, SearchIndexError, SearchIndexProvider,
    };
    use aleph_index_shared::{IndexAction, RecordDocument, SearchQuery, SearchResponse};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Memory provider whose bulk writes stall after announcing themselves.
    struct SlowBulkProvider {
        inner: MemorySearchProvider,
        bulk_started: Notify,
    }

    #[async_trait]
    impl SearchIndexProvider for SlowBulkProvider {
        async fn create_index(&self, name: &str, body: &Value) -> Result<(), SearchIndexError> {
            self.inner.create_index(name, body).await
        }

        async fn index_exists(&self, name: &str) -> Result<bool, SearchIndexError> {
            self.inner.index_exists(name).await
        }

        async fn mapping_version(&self, name: &str) -> Result<Option<u32>, SearchIndexError> {
            self.inner.mapping_version(name).await
        }

        async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
            self.inner.alias_targets(alias).await
        }

        async fn delete_index(&self, name: &str) -> Result<bool, SearchIndexError> {
            self.inner.delete_index(name).await
        }

        async fn bulk_index(
            &self,
            index: &str,
            actions: &[IndexAction],
        ) -> Result<BatchOperationSummary, SearchIndexError> {
            self.bulk_started.notify_one();
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.inner.bulk_index(index, actions).await
        }

        async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
            self.inner.delete_document(index, id).await
        }

        async fn delete_by_query(
            &self,
            indices: &[String],
            filter: &DocumentFilter,
            options: DeleteByQueryOptions,
        ) -> Result<DeleteByQuerySummary, SearchIndexError> {
            self.inner.delete_by_query(indices, filter, options).await
        }

        async fn refresh(&self, indices: &[String]) -> Result<(), SearchIndexError> {
            self.inner.refresh(indices).await
        }

        async fn search(
            &self,
            index: &str,
            query: &SearchQuery,
        ) -> Result<SearchResponse, SearchIndexError> {
            self.inner.search(index, query).await
        }

        async fn get_document(
            &self,
            index: &str,
            id: &str,
        ) -> Result<Option<Value>, SearchIndexError> {
            self.inner.get_document(index, id).await
        }

        async fn health_check(&self) -> Result<bool, SearchIndexError> {
            self.inner.health_check().await
        }
    }

    async fn setup() -> (Arc<MemorySearchProvider>, Arc<IndexWriter>, IndexBarrier) {
        let provider = Arc::new(MemorySearchProvider::new());
        let client = SearchIndexClient::new(provider.clone(), IndexConfig::new("t"));
        client.upgrade_search().await.unwrap();
        let writer = Arc::new(IndexWriter::new(client));
        let barrier = IndexBarrier::new(writer.clone());
        (provider, writer, barrier)
    }

    fn record(document_id: i64) -> RecordDocument {
        RecordDocument {
            id: RecordDocument::record_id(document_id, 0),
            document_id,
            collection_id: 1,
            index: 0,
            text: "banana".to_string(),
            roles: vec![1],
        }
    }

    async fn total(writer: &IndexWriter) -> usize {
        writer
            .client()
            .search(&SearchQuery::new(IndexKind::Record))
            .await
            .unwrap()
            .total
    }

    #[tokio::test]
    async fn test_flush_makes_writes_visible() {
        let (_, writer, barrier) = setup().await;
        writer.add(&record(1)).await.unwrap();
        assert_eq!(total(&writer).await, 0);

        barrier.flush_index().await.unwrap();
        assert_eq!(total(&writer).await, 1);
    }

    #[tokio::test]
    async fn test_purge_removes_unflushed_writes_too() {
        let (_, writer, barrier) = setup().await;
        writer.add(&record(1)).await.unwrap();
        barrier.flush_index().await.unwrap();
        writer.add(&record(2)).await.unwrap();

        let summary = barrier.purge_all().await.unwrap();
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.version_conflicts, 0);
        assert_eq!(total(&writer).await, 0);
    }

    #[tokio::test]
    async fn test_barrier_failure_is_fatal() {
        let (provider, writer, barrier) = setup().await;
        writer.add(&record(1)).await.unwrap();
        provider.set_available(false);

        let err = barrier.flush_index().await.unwrap_err();
        assert!(matches!(err, PipelineError::BarrierError(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_flush_waits_for_batch_in_flight() {
        let provider = Arc::new(SlowBulkProvider {
            inner: MemorySearchProvider::new(),
            bulk_started: Notify::new(),
        });
        let client = SearchIndexClient::new(provider.clone(), IndexConfig::new("t"));
        client.upgrade_search().await.unwrap();
        let writer = Arc::new(IndexWriter::with_config(client, WriterConfig { batch_size: 2 }));
        let barrier = IndexBarrier::new(writer.clone());

        writer.add(&record(1)).await.unwrap();
        let filler = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.add(&record(2)).await })
        };
        provider.bulk_started.notified().await;

        barrier.flush_index().await.unwrap();
        assert_eq!(total(&writer).await, 2);
        filler.await.unwrap().unwrap();
    }
}
