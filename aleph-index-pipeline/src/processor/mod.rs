//! Processor module for the index pipeline.

pub mod document_processor;
pub mod extractor;

pub use document_processor::{DocumentProcessor, ProcessOutcome, ProcessingReport};
pub use extractor::{ContentExtractor, ExtractionError, TextExtractor};
