//! # Aleph Index Shared
//!
//! Types shared by every crate of the aleph index core: the three kinds of
//! search documents, the query model used to read them back, and the
//! document processing status that both the store and the index carry.

pub mod documents;
pub mod query;
pub mod status;

pub use documents::{
    CollectionDocument, EntityDocument, IndexAction, IndexKind, RecordDocument, SearchDocument,
};
pub use query::{Authz, DocumentFilter, SearchHit, SearchQuery, SearchResponse, TermFilter};
pub use status::{DocumentStatus, ParseStatusError};
