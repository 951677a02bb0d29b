//! Search documents built from store rows.
//!
//! Each builder is a pure function of its inputs. Role lists are passed in
//! already sorted, as [`Collection::acl`] returns them.
//!
//! [`Collection::acl`]: aleph_store::Collection::acl

use std::collections::BTreeMap;

use aleph_index_shared::{CollectionDocument, EntityDocument, RecordDocument};
use aleph_store::{Collection, CollectionAcl, Document, Entity, Record};

pub fn collection_document(
    collection: &Collection,
    acl: &CollectionAcl,
    count_documents: i64,
    count_entities: i64,
) -> CollectionDocument {
    CollectionDocument {
        collection_id: collection.id,
        foreign_id: collection.foreign_id.clone(),
        label: collection.label.clone(),
        summary: collection.summary.clone(),
        category: collection.category.clone(),
        creator_id: collection.creator_id,
        roles: acl.readers.clone(),
        writers: acl.writers.clone(),
        count_documents,
        count_entities,
        updated_at: collection.updated_at,
    }
}

pub fn entity_document(entity: &Entity, roles: &[i64]) -> EntityDocument {
    EntityDocument {
        id: entity.id.clone(),
        collection_id: entity.collection_id,
        schema: entity.schema.clone(),
        name: entity.name().map(str::to_string),
        text: EntityDocument::text_from_properties(&entity.properties),
        properties: entity.properties.clone(),
        document_id: entity.document_id,
        status: None,
        error_message: None,
        roles: roles.to_vec(),
        updated_at: entity.updated_at,
    }
}

/// A stored document seen as an entity of schema `Document`.
pub fn document_entity(document: &Document, roles: &[i64]) -> EntityDocument {
    let mut properties = BTreeMap::new();
    let mut put = |key: &str, value: &Option<String>| {
        if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            properties.insert(key.to_string(), vec![value.to_string()]);
        }
    };
    put("title", &document.title);
    put("fileName", &document.file_name);
    put("mimeType", &document.content_type);
    put("contentHash", &document.content_hash);
    put("sourceUrl", &document.source_url);

    EntityDocument {
        id: EntityDocument::document_entity_id(document.id),
        collection_id: document.collection_id,
        schema: EntityDocument::DOCUMENT_SCHEMA.to_string(),
        name: document.display_title().map(str::to_string),
        text: EntityDocument::text_from_properties(&properties),
        properties,
        document_id: Some(document.id),
        status: Some(document.status),
        error_message: document.error_message.clone(),
        roles: roles.to_vec(),
        updated_at: document.updated_at,
    }
}

pub fn record_document(record: &Record, roles: &[i64]) -> RecordDocument {
    RecordDocument {
        id: record.id.clone(),
        document_id: record.document_id,
        collection_id: record.collection_id,
        index: record.index,
        text: record.text.clone(),
        roles: roles.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aleph_index_shared::{DocumentStatus, IndexAction};
    use chrono::{TimeZone, Utc};

    fn document() -> Document {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Document {
            id: 3,
            collection_id: 1,
            title: None,
            file_name: Some("memo.txt".to_string()),
            content_type: Some("text/plain".to_string()),
            content_hash: None,
            source_url: Some(" ".to_string()),
            status: DocumentStatus::Failed,
            error_message: Some("no content".to_string()),
            uploader_id: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_document_entity() {
        let doc = document_entity(&document(), &[2, 4]);

        assert_eq!(doc.id, "doc.3");
        assert_eq!(doc.schema, "Document");
        assert_eq!(doc.name.as_deref(), Some("memo.txt"));
        assert_eq!(doc.status, Some(DocumentStatus::Failed));
        assert_eq!(
            doc.properties.keys().collect::<Vec<_>>(),
            vec!["fileName", "mimeType"]
        );
        assert_eq!(doc.roles, vec![2, 4]);
    }

    #[test]
    fn test_builders_are_deterministic() {
        let first = IndexAction::from_document(&document_entity(&document(), &[1])).unwrap();
        let second = IndexAction::from_document(&document_entity(&document(), &[1])).unwrap();
        assert_eq!(
            serde_json::to_string(&first.source).unwrap(),
            serde_json::to_string(&second.source).unwrap()
        );
    }
}
