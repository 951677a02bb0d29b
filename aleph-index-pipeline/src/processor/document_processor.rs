//! Document processor implementation.
//!
//! Moves a stored document through `pending → processing → done | failed`,
//! replacing its records in the store and in the record index.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::builders::{document_entity, record_document};
use crate::errors::PipelineError;
use crate::loader::IndexWriter;
use crate::processor::extractor::ContentExtractor;
use aleph_index_shared::{DocumentStatus, IndexAction, IndexKind};
use aleph_store::{Archive, Collection, Document, Record, Store, StoreError};

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Records were extracted and indexed.
    Done { document_id: i64, records: usize },
    /// Extraction failed; the message is stored on the document.
    Failed { document_id: i64, error: String },
    /// The document was already being processed.
    Skipped { document_id: i64 },
}

impl ProcessOutcome {
    pub fn document_id(&self) -> i64 {
        match self {
            Self::Done { document_id, .. }
            | Self::Failed { document_id, .. }
            | Self::Skipped { document_id } => *document_id,
        }
    }
}

/// Outcome of processing a batch of documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingReport {
    pub done: Vec<i64>,
    pub failed: Vec<(i64, String)>,
    pub skipped: Vec<i64>,
    /// Records written across the batch.
    pub records: usize,
}

impl ProcessingReport {
    pub fn record(&mut self, outcome: ProcessOutcome) {
        match outcome {
            ProcessOutcome::Done {
                document_id,
                records,
            } => {
                self.done.push(document_id);
                self.records += records;
            }
            ProcessOutcome::Failed { document_id, error } => {
                self.failed.push((document_id, error));
            }
            ProcessOutcome::Skipped { document_id } => self.skipped.push(document_id),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Processor that extracts document content into searchable records.
///
/// Extraction errors belong to the document and end up in its status.
/// Store and index errors are returned to the caller.
pub struct DocumentProcessor {
    store: Store,
    archive: Arc<dyn Archive>,
    writer: Arc<IndexWriter>,
    extractor: Arc<dyn ContentExtractor>,
}

impl DocumentProcessor {
    pub fn new(
        store: Store,
        archive: Arc<dyn Archive>,
        writer: Arc<IndexWriter>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            store,
            archive,
            writer,
            extractor,
        }
    }

    /// Process one document. Reprocessing yields the same records.
    #[instrument(skip(self))]
    pub async fn process_document(&self, document_id: i64) -> Result<ProcessOutcome, PipelineError> {
        let document = {
            let mut conn = self.store.acquire().await?;
            let document = Document::by_id(&mut conn, document_id)
                .await?
                .ok_or_else(|| PipelineError::not_found(format!("document {}", document_id)))?;
            if !Document::claim_for_processing(&mut conn, document_id).await? {
                debug!(document_id, "Document already processing, skipping");
                return Ok(ProcessOutcome::Skipped { document_id });
            }
            document
        };

        match self.extract_and_store(&document).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Never leave the document claimed.
                self.release(document_id, &e).await;
                Err(e)
            }
        }
    }

    async fn extract_and_store(&self, document: &Document) -> Result<ProcessOutcome, PipelineError> {
        let document_id = document.id;
        let content = match &document.content_hash {
            Some(hash) => self.archive.load(hash).await?,
            None => None,
        };

        match self.extractor.extract(document, content.as_deref()) {
            Ok(texts) => self.store_records(document, texts).await,
            Err(e) => {
                let error = e.to_string();
                warn!(document_id, error = %error, "Extraction failed");
                {
                    let mut conn = self.store.acquire().await?;
                    let status = DocumentStatus::Failed;
                    Document::set_status(&mut conn, document_id, status, Some(&error)).await?;
                }
                self.index_document_entity(document_id).await?;
                Ok(ProcessOutcome::Failed { document_id, error })
            }
        }
    }

    async fn release(&self, document_id: i64, cause: &PipelineError) {
        warn!(document_id, error = %cause, "Processing aborted");
        let message = cause.to_string();
        let status = DocumentStatus::Failed;
        let result = match self.store.acquire().await {
            Ok(mut conn) => Document::set_status(&mut conn, document_id, status, Some(&message)).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(document_id, error = %e, "Failed to release document");
        }
    }

    /// Process documents in order. One failing document does not stop the rest.
    #[instrument(skip(self, document_ids), fields(count = document_ids.len()))]
    pub async fn process_documents(
        &self,
        document_ids: &[i64],
    ) -> Result<ProcessingReport, PipelineError> {
        let mut report = ProcessingReport::default();
        for &document_id in document_ids {
            report.record(self.process_document(document_id).await?);
        }
        info!(
            done = report.done.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Processed documents"
        );
        Ok(report)
    }

    async fn store_records(
        &self,
        document: &Document,
        texts: Vec<String>,
    ) -> Result<ProcessOutcome, PipelineError> {
        let (replaced, acl, stored) = {
            let mut tx = self.store.begin().await?;
            let replaced =
                Record::replace_for_document(&mut tx, document.id, document.collection_id, &texts)
                    .await?;
            Document::set_status(&mut tx, document.id, DocumentStatus::Done, None).await?;
            let acl = Collection::acl(&mut tx, document.collection_id).await?;
            let stored = Document::by_id(&mut tx, document.id)
                .await?
                .ok_or_else(|| PipelineError::not_found(format!("document {}", document.id)))?;
            tx.commit().await.map_err(StoreError::from)?;
            (replaced, acl, stored)
        };

        for id in &replaced.removed {
            self.writer.delete(IndexKind::Record, id).await?;
        }

        let roles = acl.readers.as_slice();
        let mut actions = Vec::with_capacity(replaced.records.len() + 1);
        for record in &replaced.records {
            actions.push(IndexAction::from_document(&record_document(record, roles))?);
        }
        actions.push(IndexAction::from_document(&document_entity(&stored, roles))?);
        self.writer.load(actions).await?;

        debug!(
            document_id = document.id,
            records = replaced.records.len(),
            removed = replaced.removed.len(),
            "Stored records"
        );
        Ok(ProcessOutcome::Done {
            document_id: document.id,
            records: replaced.records.len(),
        })
    }

    async fn index_document_entity(&self, document_id: i64) -> Result<(), PipelineError> {
        let (document, acl) = {
            let mut tx = self.store.begin().await?;
            let document = Document::by_id(&mut tx, document_id)
                .await?
                .ok_or_else(|| PipelineError::not_found(format!("document {}", document_id)))?;
            let acl = Collection::acl(&mut tx, document.collection_id).await?;
            tx.commit().await.map_err(StoreError::from)?;
            (document, acl)
        };
        self.writer
            .add(&document_entity(&document, &acl.readers))
            .await
    }
}
