//! Index settings and mappings.
//!
//! This module defines the settings and mappings of the collection, entity and
//! record indices. Every mapping stores its version in `_meta.version` so
//! `upgrade_search` can tell a current index from a stale one.

use serde_json::{json, Value};

use aleph_index_shared::IndexKind;

/// Get the settings and mappings body for creating an index of `kind`.
///
/// The body includes the alias so the index is addressable by
/// `{prefix}-{kind}` as soon as it exists.
///
/// # Sharding Configuration
///
/// - 1 primary shard, 0 replicas: the indices are small and rebuilt from the store.
pub fn get_index_settings(kind: IndexKind, version: u32, alias: &str) -> Value {
    let properties = match kind {
        IndexKind::Collection => collection_properties(),
        IndexKind::Entity => entity_properties(),
        IndexKind::Record => record_properties(),
    };

    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 0
        },
        "mappings": {
            "dynamic": "strict",
            "_meta": {
                "version": version
            },
            "properties": properties
        },
        "aliases": {
            alias: {}
        }
    })
}

fn collection_properties() -> Value {
    json!({
        "collection_id": { "type": "long" },
        "foreign_id": { "type": "keyword" },
        "label": {
            "type": "text",
            "fields": { "raw": { "type": "keyword" } }
        },
        "summary": { "type": "text" },
        "category": { "type": "keyword" },
        "creator_id": { "type": "long" },
        "roles": { "type": "long" },
        "writers": { "type": "long" },
        "count_documents": { "type": "long" },
        "count_entities": { "type": "long" },
        "updated_at": { "type": "date" }
    })
}

fn entity_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "collection_id": { "type": "long" },
        "schema": { "type": "keyword" },
        "name": {
            "type": "text",
            "fields": { "raw": { "type": "keyword" } }
        },
        // Property names are schema-dependent; values are exact-match keywords
        "properties": { "type": "object", "dynamic": true },
        "text": { "type": "text" },
        "document_id": { "type": "long" },
        "status": { "type": "keyword" },
        "error_message": { "type": "keyword", "index": false },
        "roles": { "type": "long" },
        "updated_at": { "type": "date" }
    })
}

fn record_properties() -> Value {
    json!({
        "id": { "type": "keyword" },
        "document_id": { "type": "long" },
        "collection_id": { "type": "long" },
        "index": { "type": "long" },
        "text": { "type": "text" },
        "roles": { "type": "long" }
    })
}

/// Read the mapping version out of a settings body or a stored mapping.
pub fn version_of(mappings: &Value) -> Option<u32> {
    mappings
        .get("_meta")
        .and_then(|meta| meta.get("version"))
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_settings_structure() {
        let settings = get_index_settings(IndexKind::Entity, 3, "aleph-entity");

        assert!(settings["settings"]["number_of_shards"].is_number());
        assert_eq!(settings["mappings"]["dynamic"], "strict");
        assert_eq!(version_of(&settings["mappings"]), Some(3));
        assert!(settings["aliases"]["aleph-entity"].is_object());

        let properties = &settings["mappings"]["properties"];
        assert_eq!(properties["roles"]["type"], "long");
        assert_eq!(properties["schema"]["type"], "keyword");
        assert_eq!(properties["properties"]["dynamic"], true);
    }

    #[test]
    fn test_every_kind_denormalizes_roles() {
        for kind in IndexKind::ALL {
            let settings = get_index_settings(kind, 1, "alias");
            assert_eq!(
                settings["mappings"]["properties"]["roles"]["type"], "long",
                "{} index lacks roles",
                kind
            );
        }
    }

    #[test]
    fn test_version_of_missing_meta() {
        assert_eq!(version_of(&json!({ "properties": {} })), None);
    }
}
