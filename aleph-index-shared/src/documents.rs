//! Search document types.
//!
//! Every document is built from relational rows only. None of them carries a
//! wall-clock "indexed at" field: `updated_at` is copied from the source row,
//! so building the same document twice from unchanged rows yields the same
//! bytes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::DocumentStatus;

/// The three indices maintained by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// One summary document per collection.
    Collection,
    /// Entities and documents (as schema `Document`).
    Entity,
    /// Extracted records of processed documents.
    Record,
}

impl IndexKind {
    /// All index kinds, in the order they are created.
    pub const ALL: [IndexKind; 3] = [IndexKind::Collection, IndexKind::Entity, IndexKind::Record];

    /// Name fragment used to build index names and aliases.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Entity => "entity",
            Self::Record => "record",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed document that knows which index it belongs to.
pub trait SearchDocument: Serialize {
    /// The index this document type is written to.
    const KIND: IndexKind;

    /// The `_id` of the document within its index.
    fn document_id(&self) -> String;
}

/// One write destined for the search engine.
///
/// Providers only see JSON sources; the typed documents are converted at the
/// edge with [`IndexAction::from_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexAction {
    pub kind: IndexKind,
    pub id: String,
    pub source: Value,
}

impl IndexAction {
    /// Serialize a typed document into an index action.
    pub fn from_document<D: SearchDocument>(document: &D) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind: D::KIND,
            id: document.document_id(),
            source: serde_json::to_value(document)?,
        })
    }
}

/// Summary document of a collection, carrying its ACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDocument {
    pub collection_id: i64,
    pub foreign_id: String,
    pub label: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub creator_id: Option<i64>,
    /// Role ids with read access, ascending.
    pub roles: Vec<i64>,
    /// Role ids with write access, ascending.
    pub writers: Vec<i64>,
    pub count_documents: i64,
    pub count_entities: i64,
    pub updated_at: DateTime<Utc>,
}

impl SearchDocument for CollectionDocument {
    const KIND: IndexKind = IndexKind::Collection;

    fn document_id(&self) -> String {
        self.collection_id.to_string()
    }
}

/// An entity (or a document seen as an entity) with its collection's ACL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDocument {
    pub id: String,
    pub collection_id: i64,
    pub schema: String,
    pub name: Option<String>,
    pub properties: BTreeMap<String, Vec<String>>,
    /// De-duplicated property values, sorted, for full-text matching.
    pub text: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DocumentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub roles: Vec<i64>,
    pub updated_at: DateTime<Utc>,
}

impl EntityDocument {
    /// Schema name under which stored documents appear in the entity index.
    pub const DOCUMENT_SCHEMA: &'static str = "Document";

    /// Entity id used for a stored document.
    pub fn document_entity_id(document_id: i64) -> String {
        format!("doc.{}", document_id)
    }

    /// Flatten property values into the sorted, de-duplicated `text` field.
    pub fn text_from_properties(properties: &BTreeMap<String, Vec<String>>) -> Vec<String> {
        properties
            .values()
            .flatten()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

impl SearchDocument for EntityDocument {
    const KIND: IndexKind = IndexKind::Entity;

    fn document_id(&self) -> String {
        self.id.clone()
    }
}

/// One unit of extracted content of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDocument {
    pub id: String,
    pub document_id: i64,
    pub collection_id: i64,
    pub index: i64,
    pub text: String,
    pub roles: Vec<i64>,
}

impl RecordDocument {
    /// Record ids are positional so reprocessing overwrites instead of adding.
    pub fn record_id(document_id: i64, index: i64) -> String {
        format!("{}.{}", document_id, index)
    }
}

impl SearchDocument for RecordDocument {
    const KIND: IndexKind = IndexKind::Record;

    fn document_id(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_entity() -> EntityDocument {
        let mut properties = BTreeMap::new();
        properties.insert("name".to_string(), vec!["Banana Republic".to_string()]);
        properties.insert(
            "country".to_string(),
            vec!["pa".to_string(), "pa".to_string(), " ".to_string()],
        );
        EntityDocument {
            id: "ent-1".to_string(),
            collection_id: 7,
            schema: "Company".to_string(),
            name: Some("Banana Republic".to_string()),
            text: EntityDocument::text_from_properties(&properties),
            properties,
            document_id: None,
            status: None,
            error_message: None,
            roles: vec![1, 2],
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_text_from_properties_dedups_and_sorts() {
        let doc = sample_entity();
        assert_eq!(doc.text, vec!["Banana Republic".to_string(), "pa".to_string()]);
    }

    #[test]
    fn test_index_action_is_stable() {
        let doc = sample_entity();
        let first = IndexAction::from_document(&doc).unwrap();
        let second = IndexAction::from_document(&doc.clone()).unwrap();

        assert_eq!(first.kind, IndexKind::Entity);
        assert_eq!(first.id, "ent-1");
        assert_eq!(
            serde_json::to_vec(&first.source).unwrap(),
            serde_json::to_vec(&second.source).unwrap()
        );
        assert!(first.source.get("status").is_none());
    }

    #[test]
    fn test_document_ids() {
        assert_eq!(EntityDocument::document_entity_id(12), "doc.12");
        assert_eq!(RecordDocument::record_id(12, 3), "12.3");
    }

    #[test]
    fn test_index_kind_names() {
        let names: Vec<&str> = IndexKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["collection", "entity", "record"]);
    }
}
