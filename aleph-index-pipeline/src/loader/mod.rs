//! Loader module for the index pipeline.
//!
//! Buffers search documents and writes them to the index in bulk.

use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::errors::PipelineError;
use aleph_index_repository::{BatchOperationSummary, SearchIndexClient};
use aleph_index_shared::{IndexAction, IndexKind, SearchDocument};

/// Configuration for the index writer.
#[derive(Debug, Clone, Copy)]
pub struct WriterConfig {
    /// Number of documents to buffer before writing a bulk request.
    pub batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

/// Writer that indexes documents into the search engine.
///
/// Documents are buffered and written once `batch_size` is reached or when
/// [`IndexWriter::flush_pending`] is called. A write that has been buffered
/// is not visible to anyone until it is flushed and the index refreshed.
///
/// Only the holder of `write_lock` takes actions out of `pending`, and it
/// keeps the lock until they are written. `flush_pending` therefore returns
/// only once every action buffered before it was called has reached the
/// engine, including batches another caller was already writing. Actions
/// from a failed write go back to the front of the buffer.
pub struct IndexWriter {
    client: SearchIndexClient,
    config: WriterConfig,
    pending: Mutex<Vec<IndexAction>>,
    write_lock: Mutex<()>,
}

impl IndexWriter {
    /// Create a new writer with the default configuration.
    pub fn new(client: SearchIndexClient) -> Self {
        Self::with_config(client, WriterConfig::default())
    }

    /// Create a new writer with custom configuration.
    pub fn with_config(client: SearchIndexClient, config: WriterConfig) -> Self {
        let batch_size = config.batch_size.max(1);
        Self {
            client,
            config: WriterConfig { batch_size },
            pending: Mutex::new(Vec::with_capacity(batch_size)),
            write_lock: Mutex::new(()),
        }
    }

    pub fn client(&self) -> &SearchIndexClient {
        &self.client
    }

    /// Serialize and buffer one typed document.
    pub async fn add<D: SearchDocument>(&self, document: &D) -> Result<(), PipelineError> {
        let action = IndexAction::from_document(document)?;
        self.load(vec![action]).await
    }

    /// Buffer a batch of actions, writing full batches as they fill up.
    #[instrument(skip(self, actions), fields(action_count = actions.len()))]
    pub async fn load(&self, actions: Vec<IndexAction>) -> Result<(), PipelineError> {
        let full = {
            let mut pending = self.pending.lock().await;
            pending.extend(actions);
            pending.len() >= self.config.batch_size
        };

        if full {
            let _writing = self.write_lock.lock().await;
            // Someone else may have written the batch while we waited.
            let actions = {
                let mut pending = self.pending.lock().await;
                if pending.len() < self.config.batch_size {
                    return Ok(());
                }
                std::mem::take(&mut *pending)
            };
            self.write(actions).await?;
        }
        Ok(())
    }

    /// Delete one document, after writing whatever is buffered so that an
    /// earlier buffered write cannot resurrect it.
    pub async fn delete(&self, kind: IndexKind, id: &str) -> Result<(), PipelineError> {
        self.flush_pending().await?;
        self.client.delete_document(kind, id).await?;
        debug!(index = %kind, id, "Deleted document");
        Ok(())
    }

    /// Number of actions buffered and not yet written.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Write every buffered action to the index.
    ///
    /// Waits for any batch that is being written concurrently.
    #[instrument(skip(self))]
    pub async fn flush_pending(&self) -> Result<BatchOperationSummary, PipelineError> {
        let _writing = self.write_lock.lock().await;
        let actions = std::mem::take(&mut *self.pending.lock().await);
        if actions.is_empty() {
            return Ok(BatchOperationSummary::empty());
        }
        self.write(actions).await
    }

    /// Write `actions`, putting them back in front of the buffer on failure.
    /// Caller holds `write_lock`.
    async fn write(&self, actions: Vec<IndexAction>) -> Result<BatchOperationSummary, PipelineError> {
        match self.write_chunks(&actions).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                let mut pending = self.pending.lock().await;
                let later = std::mem::replace(&mut *pending, actions);
                pending.extend(later);
                warn!(requeued = pending.len(), "Write failed; actions kept for the next flush");
                Err(e)
            }
        }
    }

    async fn write_chunks(
        &self,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, PipelineError> {
        let mut summary = BatchOperationSummary::empty();
        for chunk in actions.chunks(self.config.batch_size) {
            summary.merge(self.client.bulk_index(chunk.to_vec()).await?);
        }

        info!(
            total = summary.total,
            failed = summary.failed,
            "Wrote documents to search index"
        );

        if summary.failed > 0 {
            let failed = summary.failed_ids();
            error!(count = failed.len(), ids = ?failed, "Failed to index documents");
            return Err(PipelineError::loader(format!(
                "Failed to index {} documents",
                failed.len()
            )));
        }
        Ok(summary)
    }
}
