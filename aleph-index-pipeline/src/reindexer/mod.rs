//! Reindexer module for the index pipeline.
//!
//! Recomputes search documents from the relational store. Reindexing is a
//! total function of the rows: running it twice without intervening writes
//! produces byte-identical documents.

mod locks;

pub use locks::CollectionLocks;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument};

use crate::builders::{collection_document, document_entity, entity_document, record_document};
use crate::errors::PipelineError;
use crate::loader::IndexWriter;
use aleph_index_shared::IndexAction;
use aleph_store::{Collection, CollectionAcl, Document, Entity, Record, Store, StoreError};

/// Documents written by one reindex call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReindexSummary {
    pub collections: usize,
    pub entities: usize,
    pub records: usize,
}

impl ReindexSummary {
    pub fn merge(&mut self, other: ReindexSummary) {
        self.collections += other.collections;
        self.entities += other.entities;
        self.records += other.records;
    }

    pub fn total(&self) -> usize {
        self.collections + self.entities + self.records
    }
}

/// Reads rows and emits their search documents through the writer.
pub struct EntityReindexer {
    store: Store,
    writer: Arc<IndexWriter>,
    locks: Arc<CollectionLocks>,
}

impl EntityReindexer {
    pub fn new(store: Store, writer: Arc<IndexWriter>, locks: Arc<CollectionLocks>) -> Self {
        Self {
            store,
            writer,
            locks,
        }
    }

    /// Rewrite the entity document of every entity and every stored
    /// document, optionally limited to one collection.
    ///
    /// Rows and ACLs are read in one transaction, so every document carries
    /// the roles that were current for the rows it was built from.
    #[instrument(skip(self))]
    pub async fn reindex_entities(
        &self,
        collection_id: Option<i64>,
    ) -> Result<ReindexSummary, PipelineError> {
        let actions = {
            let mut tx = self.store.begin().await?;
            let collection_ids = match collection_id {
                Some(id) => vec![id],
                None => Collection::ids(&mut tx).await?,
            };
            let mut acls: HashMap<i64, CollectionAcl> = HashMap::new();
            for id in collection_ids {
                acls.insert(id, Collection::acl(&mut tx, id).await?);
            }
            let entities = Entity::all(&mut tx, collection_id).await?;
            let documents = Document::all(&mut tx, collection_id).await?;
            tx.commit().await.map_err(StoreError::from)?;

            let mut actions = Vec::with_capacity(entities.len() + documents.len());
            for entity in &entities {
                let roles = readers(&acls, entity.collection_id);
                actions.push(IndexAction::from_document(&entity_document(entity, roles))?);
            }
            for document in &documents {
                let roles = readers(&acls, document.collection_id);
                actions.push(IndexAction::from_document(&document_entity(document, roles))?);
            }
            actions
        };

        let summary = ReindexSummary {
            entities: actions.len(),
            ..ReindexSummary::default()
        };
        self.writer.load(actions).await?;

        info!(entities = summary.entities, "Reindexed entities");
        Ok(summary)
    }

    /// Rewrite the collection document and every entity and record document
    /// of the collection, so that their `roles` follow the grant table.
    ///
    /// Holds the collection lock for the whole call.
    #[instrument(skip(self))]
    pub async fn reindex_collection(
        &self,
        collection_id: i64,
    ) -> Result<ReindexSummary, PipelineError> {
        let _guard = self.locks.lock(collection_id).await;

        let (summary, actions) = {
            let mut tx = self.store.begin().await?;
            let collection = Collection::by_id(&mut tx, collection_id)
                .await?
                .ok_or_else(|| PipelineError::not_found(format!("collection {}", collection_id)))?;
            let acl = Collection::acl(&mut tx, collection_id).await?;
            let count_documents = Collection::count_documents(&mut tx, collection_id).await?;
            let count_entities = Collection::count_entities(&mut tx, collection_id).await?;
            let entities = Entity::all(&mut tx, Some(collection_id)).await?;
            let documents = Document::all(&mut tx, Some(collection_id)).await?;
            let records = Record::all(&mut tx, Some(collection_id)).await?;
            tx.commit().await.map_err(StoreError::from)?;

            let roles = acl.readers.as_slice();
            let mut actions = Vec::with_capacity(1 + entities.len() + documents.len() + records.len());
            actions.push(IndexAction::from_document(&collection_document(
                &collection,
                &acl,
                count_documents,
                count_entities,
            ))?);
            for entity in &entities {
                actions.push(IndexAction::from_document(&entity_document(entity, roles))?);
            }
            for document in &documents {
                actions.push(IndexAction::from_document(&document_entity(document, roles))?);
            }
            for record in &records {
                actions.push(IndexAction::from_document(&record_document(record, roles))?);
            }

            let summary = ReindexSummary {
                collections: 1,
                entities: entities.len() + documents.len(),
                records: records.len(),
            };
            (summary, actions)
        };

        self.writer.load(actions).await?;

        info!(
            collection_id,
            entities = summary.entities,
            records = summary.records,
            "Reindexed collection"
        );
        Ok(summary)
    }

    /// Reindex every collection in turn.
    pub async fn reindex_collections(&self) -> Result<ReindexSummary, PipelineError> {
        let ids = {
            let mut conn = self.store.acquire().await?;
            Collection::ids(&mut conn).await?
        };
        let mut summary = ReindexSummary::default();
        for id in ids {
            summary.merge(self.reindex_collection(id).await?);
        }
        Ok(summary)
    }
}

fn readers(acls: &HashMap<i64, CollectionAcl>, collection_id: i64) -> &[i64] {
    acls.get(&collection_id)
        .map(|acl| acl.readers.as_slice())
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use aleph_index_repository::{IndexConfig, MemorySearchProvider, SearchIndexClient};
    use aleph_index_shared::IndexKind;
    use aleph_store::{NewCollection, NewEntity, NewRole, Permission, Properties, Role, StoreConfig};

    struct Fixture {
        store: Store,
        writer: Arc<IndexWriter>,
        reindexer: EntityReindexer,
        collection_id: i64,
        owner_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = Store::connect(&StoreConfig::default()).await.unwrap();
        store.create_all().await.unwrap();
        let client = SearchIndexClient::new(
            Arc::new(MemorySearchProvider::new()),
            IndexConfig::new("t"),
        );
        client.upgrade_search().await.unwrap();
        let writer = Arc::new(IndexWriter::new(client));

        let (collection_id, owner_id) = {
            let mut conn = store.acquire().await.unwrap();
            let owner = Role::load_or_create(&mut conn, &NewRole::user("owner", "Owner"))
                .await
                .unwrap();
            let collection =
                Collection::create(&mut conn, &NewCollection::new("c", "C"), Some(owner.id))
                    .await
                    .unwrap();
            let mut properties = Properties::new();
            properties.insert("name".to_string(), vec!["Banana".to_string()]);
            Entity::create(
                &mut conn,
                &NewEntity {
                    id: "banana".to_string(),
                    collection_id: collection.id,
                    schema: "Thing".to_string(),
                    properties,
                    document_id: None,
                },
            )
            .await
            .unwrap();
            (collection.id, owner.id)
        };

        let reindexer = EntityReindexer::new(
            store.clone(),
            writer.clone(),
            Arc::new(CollectionLocks::new()),
        );
        Fixture {
            store,
            writer,
            reindexer,
            collection_id,
            owner_id,
        }
    }

    async fn entity_source(writer: &IndexWriter, id: &str) -> serde_json::Value {
        writer.flush_pending().await.unwrap();
        writer
            .client()
            .get_document(IndexKind::Entity, id)
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reindex_entities_is_idempotent() {
        let f = fixture().await;

        let first = f.reindexer.reindex_entities(None).await.unwrap();
        let before = entity_source(&f.writer, "banana").await;
        let second = f.reindexer.reindex_entities(None).await.unwrap();
        let after = entity_source(&f.writer, "banana").await;

        assert_eq!(first, second);
        assert_eq!(first.entities, 1);
        assert_eq!(
            serde_json::to_vec(&before).unwrap(),
            serde_json::to_vec(&after).unwrap()
        );
        assert_eq!(before["roles"], serde_json::json!([f.owner_id]));
    }

    #[tokio::test]
    async fn test_reindex_collection_follows_grants() {
        let f = fixture().await;
        let reader = {
            let mut conn = f.store.acquire().await.unwrap();
            let reader = Role::load_or_create(&mut conn, &NewRole::user("reader", "Reader"))
                .await
                .unwrap();
            Permission::grant(&mut conn, f.collection_id, reader.id, true, false)
                .await
                .unwrap();
            reader
        };

        let summary = f.reindexer.reindex_collection(f.collection_id).await.unwrap();
        assert_eq!(summary.collections, 1);
        assert_eq!(summary.entities, 1);

        let mut expected = vec![f.owner_id, reader.id];
        expected.sort();
        let source = entity_source(&f.writer, "banana").await;
        assert_eq!(source["roles"], serde_json::json!(expected));

        let collection = f
            .writer
            .client()
            .get_document(IndexKind::Collection, &f.collection_id.to_string())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(collection["writers"], serde_json::json!([f.owner_id]));
        assert_eq!(collection["count_entities"], 1);
    }

    #[tokio::test]
    async fn test_reindex_missing_collection() {
        let f = fixture().await;
        let err = f.reindexer.reindex_collection(999).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
