//! # Aleph Index Pipeline
//!
//! This crate turns relational state into search documents and controls when
//! those documents become visible.
//!
//! ## Architecture
//!
//! 1. **Reindexer**: rebuilds collection and entity documents from the store
//! 2. **Processor**: extracts document content into records
//! 3. **Loader**: buffers and bulk-writes search documents
//! 4. **Barrier**: drains the loader and refreshes the indices
//! 5. **Orchestrator**: the `IndexService` tying them together, with job dispatch

pub mod barrier;
pub mod builders;
pub mod errors;
pub mod jobs;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod reindexer;

pub use barrier::{IndexBarrier, PurgeSummary};
pub use errors::PipelineError;
pub use jobs::{Job, JobDispatcher, JobOutcome, JobRunner};
pub use loader::{IndexWriter, WriterConfig};
pub use orchestrator::{IndexService, ServiceConfig};
pub use processor::{
    ContentExtractor, DocumentProcessor, ExtractionError, ProcessOutcome, ProcessingReport,
    TextExtractor,
};
pub use reindexer::{CollectionLocks, EntityReindexer, ReindexSummary};
