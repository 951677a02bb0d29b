//! Orchestrator module for the index pipeline.
//!
//! [`IndexService`] owns the writer, reindexer, processor, barrier and job
//! dispatcher and is the single entry point the application and the test
//! harness drive. Every store write here commits before the matching index
//! work is dispatched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::barrier::{IndexBarrier, PurgeSummary};
use crate::errors::PipelineError;
use crate::jobs::{Job, JobDispatcher, JobOutcome, JobRunner};
use crate::loader::{IndexWriter, WriterConfig};
use crate::processor::{ContentExtractor, DocumentProcessor, ProcessOutcome, ProcessingReport};
use crate::reindexer::{CollectionLocks, EntityReindexer, ReindexSummary};
use aleph_index_repository::{SearchIndexClient, UpgradeOutcome};
use aleph_index_shared::{SearchQuery, SearchResponse};
use aleph_store::{
    load_fixtures, Archive, Collection, CollectionStatus, Document, FixtureSet, FixtureSummary,
    NewCollection, NewDocument, Permission, Store,
};

/// Configuration for the index service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub writer: WriterConfig,
    /// Run dispatched jobs immediately instead of queueing them.
    pub run_jobs_inline: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            run_jobs_inline: true,
        }
    }
}

pub struct IndexService {
    store: Store,
    archive: Arc<dyn Archive>,
    writer: Arc<IndexWriter>,
    locks: Arc<CollectionLocks>,
    reindexer: EntityReindexer,
    processor: DocumentProcessor,
    barrier: IndexBarrier,
    dispatcher: JobDispatcher,
}

impl IndexService {
    pub fn new(
        store: Store,
        archive: Arc<dyn Archive>,
        client: SearchIndexClient,
        extractor: Arc<dyn ContentExtractor>,
        config: ServiceConfig,
    ) -> Self {
        let writer = Arc::new(IndexWriter::with_config(client, config.writer));
        let locks = Arc::new(CollectionLocks::new());

        Self {
            reindexer: EntityReindexer::new(store.clone(), writer.clone(), locks.clone()),
            processor: DocumentProcessor::new(
                store.clone(),
                archive.clone(),
                writer.clone(),
                extractor,
            ),
            barrier: IndexBarrier::new(writer.clone()),
            dispatcher: JobDispatcher::new(config.run_jobs_inline),
            store,
            archive,
            writer,
            locks,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    pub fn client(&self) -> &SearchIndexClient {
        self.writer.client()
    }

    pub fn writer(&self) -> &Arc<IndexWriter> {
        &self.writer
    }

    // Index admin

    pub async fn upgrade_search(&self) -> Result<UpgradeOutcome, PipelineError> {
        Ok(self.client().upgrade_search().await?)
    }

    pub async fn delete_index(&self) -> Result<Vec<String>, PipelineError> {
        Ok(self.client().delete_index().await?)
    }

    // Store writes

    /// Apply a fixture set to the store. Nothing is indexed.
    pub async fn load_fixtures(&self, set: &FixtureSet) -> Result<FixtureSummary, PipelineError> {
        Ok(load_fixtures(&self.store, &self.archive, set).await?)
    }

    /// Create a collection and dispatch its reindex.
    #[instrument(skip(self, new), fields(foreign_id = %new.foreign_id))]
    pub async fn create_collection(
        &self,
        new: &NewCollection,
        creator_id: Option<i64>,
    ) -> Result<Collection, PipelineError> {
        let collection = {
            let mut conn = self.store.acquire().await?;
            Collection::create(&mut conn, new, creator_id).await?
        };
        self.dispatch(Job::UpdateCollection(collection.id)).await?;
        Ok(collection)
    }

    /// Change a role's access to a collection and dispatch the collection
    /// reindex. Granting neither read nor write revokes.
    #[instrument(skip(self))]
    pub async fn grant(
        &self,
        collection_id: i64,
        role_id: i64,
        read: bool,
        write: bool,
    ) -> Result<Option<Permission>, PipelineError> {
        let permission = {
            let _guard = self.locks.lock(collection_id).await;
            let mut conn = self.store.acquire().await?;
            if Collection::by_id(&mut conn, collection_id).await?.is_none() {
                return Err(PipelineError::not_found(format!("collection {}", collection_id)));
            }
            Permission::grant(&mut conn, collection_id, role_id, read, write).await?
        };
        self.dispatch(Job::UpdateCollection(collection_id)).await?;
        Ok(permission)
    }

    /// Store a document, archiving `content` when given, and dispatch its
    /// processing.
    #[instrument(skip(self, new, content), fields(collection_id = new.collection_id))]
    pub async fn add_document(
        &self,
        new: &NewDocument,
        content: Option<&[u8]>,
    ) -> Result<Document, PipelineError> {
        let mut new = new.clone();
        if let Some(content) = content {
            new.content_hash = Some(self.archive.archive(content).await?);
        }
        let document = {
            let mut conn = self.store.acquire().await?;
            Document::create(&mut conn, &new).await?
        };
        self.dispatch(Job::ProcessDocument(document.id)).await?;
        Ok(document)
    }

    // Index writes

    pub async fn reindex_entities(
        &self,
        collection_id: Option<i64>,
    ) -> Result<ReindexSummary, PipelineError> {
        self.reindexer.reindex_entities(collection_id).await
    }

    pub async fn reindex_collection(&self, collection_id: i64) -> Result<ReindexSummary, PipelineError> {
        self.reindexer.reindex_collection(collection_id).await
    }

    pub async fn reindex_collections(&self) -> Result<ReindexSummary, PipelineError> {
        self.reindexer.reindex_collections().await
    }

    pub async fn process_document(&self, document_id: i64) -> Result<ProcessOutcome, PipelineError> {
        self.processor.process_document(document_id).await
    }

    pub async fn process_documents(
        &self,
        document_ids: &[i64],
    ) -> Result<ProcessingReport, PipelineError> {
        self.processor.process_documents(document_ids).await
    }

    /// Process every document in the store, optionally one collection.
    pub async fn process_all(&self, collection_id: Option<i64>) -> Result<ProcessingReport, PipelineError> {
        let ids = {
            let mut conn = self.store.acquire().await?;
            Document::ids(&mut conn, collection_id).await?
        };
        self.process_documents(&ids).await
    }

    // Barrier

    pub async fn flush_index(&self) -> Result<(), PipelineError> {
        self.barrier.flush_index().await
    }

    pub async fn purge_all(&self) -> Result<PurgeSummary, PipelineError> {
        self.barrier.purge_all().await
    }

    // Reads

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, PipelineError> {
        Ok(self.client().search(query).await?)
    }

    pub async fn collection_status(&self, collection_id: i64) -> Result<CollectionStatus, PipelineError> {
        let mut conn = self.store.acquire().await?;
        if Collection::by_id(&mut conn, collection_id).await?.is_none() {
            return Err(PipelineError::not_found(format!("collection {}", collection_id)));
        }
        Ok(Collection::status(&mut conn, collection_id).await?)
    }

    // Jobs

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Run `job` now or queue it, depending on the dispatcher mode.
    pub async fn dispatch(&self, job: Job) -> Result<Option<JobOutcome>, PipelineError> {
        self.dispatcher.dispatch(self, job).await
    }

    pub async fn run_pending(&self) -> Result<Vec<JobOutcome>, PipelineError> {
        self.dispatcher.run_pending(self).await
    }
}

#[async_trait]
impl JobRunner for IndexService {
    async fn run_job(&self, job: Job) -> Result<JobOutcome, PipelineError> {
        info!(job = %job, "Running job");
        match job {
            Job::UpdateCollection(id) => self.reindex_collection(id).await.map(JobOutcome::Reindexed),
            Job::ReindexEntities(scope) => self.reindex_entities(scope).await.map(JobOutcome::Reindexed),
            Job::ProcessDocument(id) => self.process_document(id).await.map(JobOutcome::Processed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::TextExtractor;
    use aleph_index_repository::{IndexConfig, MemorySearchProvider};
    use aleph_index_shared::{Authz, DocumentStatus, IndexKind};
    use aleph_store::{MemoryArchive, NewRole, Role, StoreConfig};

    async fn service(run_jobs_inline: bool) -> IndexService {
        let store = Store::connect(&StoreConfig::default()).await.unwrap();
        store.create_all().await.unwrap();
        {
            let mut conn = store.acquire().await.unwrap();
            Role::create_system_roles(&mut conn).await.unwrap();
        }
        let client = SearchIndexClient::new(
            Arc::new(MemorySearchProvider::new()),
            IndexConfig::new("test"),
        );
        let service = IndexService::new(
            store,
            Arc::new(MemoryArchive::new()),
            client,
            Arc::new(TextExtractor::new()),
            ServiceConfig {
                run_jobs_inline,
                ..ServiceConfig::default()
            },
        );
        service.upgrade_search().await.unwrap();
        service
    }

    async fn user(service: &IndexService, foreign_id: &str) -> (Role, Authz) {
        let mut conn = service.store().acquire().await.unwrap();
        let role = Role::load_or_create(&mut conn, &NewRole::user(foreign_id, foreign_id))
            .await
            .unwrap();
        let authz = Role::authz(&mut conn, &role).await.unwrap();
        (role, authz)
    }

    async fn visible(service: &IndexService, authz: &Authz, collection: &Collection) -> bool {
        let query = SearchQuery::new(IndexKind::Collection).authorized(authz.clone());
        service
            .search(&query)
            .await
            .unwrap()
            .contains(&collection.id.to_string())
    }

    #[tokio::test]
    async fn test_grant_and_revoke_follow_flush() {
        let service = service(true).await;
        let (owner, owner_authz) = user(&service, "p1").await;
        let (reader, reader_authz) = user(&service, "p2").await;

        let collection = service
            .create_collection(&NewCollection::new("c", "C"), Some(owner.id))
            .await
            .unwrap();
        service.flush_index().await.unwrap();
        assert!(visible(&service, &owner_authz, &collection).await);
        assert!(!visible(&service, &reader_authz, &collection).await);

        service.grant(collection.id, reader.id, true, false).await.unwrap();
        service.flush_index().await.unwrap();
        assert!(visible(&service, &reader_authz, &collection).await);

        service.grant(collection.id, reader.id, false, false).await.unwrap();
        service.flush_index().await.unwrap();
        assert!(!visible(&service, &reader_authz, &collection).await);
        assert!(visible(&service, &owner_authz, &collection).await);
    }

    #[tokio::test]
    async fn test_grant_racing_reindex_leaves_current_roles() {
        let service = service(true).await;
        let (owner, _) = user(&service, "p1").await;
        let (reader, reader_authz) = user(&service, "p2").await;
        let collection = service
            .create_collection(&NewCollection::new("c", "C"), Some(owner.id))
            .await
            .unwrap();

        for round in 0..10 {
            let read = round % 2 == 0;
            let (reindexed, granted) = tokio::join!(
                service.reindex_collection(collection.id),
                service.grant(collection.id, reader.id, read, false),
            );
            granted.unwrap();
            reindexed.unwrap();
            service.flush_index().await.unwrap();

            let indexed = service
                .client()
                .get_document(IndexKind::Collection, &collection.id.to_string())
                .await
                .unwrap()
                .unwrap();
            let roles: Vec<i64> = serde_json::from_value(indexed["roles"].clone()).unwrap();
            assert_eq!(roles.contains(&reader.id), read, "round {}", round);
            assert!(roles.contains(&owner.id));
            assert_eq!(visible(&service, &reader_authz, &collection).await, read);
        }
    }

    #[tokio::test]
    async fn test_queued_grant_applies_on_run_pending() {
        let service = service(false).await;
        let (owner, _) = user(&service, "p1").await;
        let (reader, reader_authz) = user(&service, "p2").await;

        let collection = service
            .create_collection(&NewCollection::new("c", "C"), Some(owner.id))
            .await
            .unwrap();
        service.grant(collection.id, reader.id, true, false).await.unwrap();
        service.flush_index().await.unwrap();
        assert!(!visible(&service, &reader_authz, &collection).await);
        assert_eq!(service.dispatcher().pending().await.len(), 2);

        service.run_pending().await.unwrap();
        service.flush_index().await.unwrap();
        assert!(visible(&service, &reader_authz, &collection).await);
    }

    #[tokio::test]
    async fn test_added_document_is_searchable_after_flush() {
        let service = service(true).await;
        let (owner, authz) = user(&service, "p1").await;
        let collection = service
            .create_collection(&NewCollection::new("c", "C"), Some(owner.id))
            .await
            .unwrap();

        let document = service
            .add_document(
                &NewDocument {
                    collection_id: collection.id,
                    content_type: Some("text/plain".to_string()),
                    ..Default::default()
                },
                Some(b"Banana bread".as_slice()),
            )
            .await
            .unwrap();

        let query = SearchQuery::new(IndexKind::Record)
            .with_text("banana")
            .authorized(authz);
        assert_eq!(service.search(&query).await.unwrap().total, 0);
        service.flush_index().await.unwrap();
        let response = service.search(&query).await.unwrap();
        assert_eq!(response.ids(), vec![format!("{}.0", document.id).as_str()]);

        let status = service.collection_status(collection.id).await.unwrap();
        assert_eq!(status.done, 1);
        assert_eq!(status.total(), 1);

        let mut conn = service.store().acquire().await.unwrap();
        let stored = Document::by_id(&mut conn, document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Done);
    }

    #[tokio::test]
    async fn test_grant_on_missing_collection() {
        let service = service(true).await;
        let (role, _) = user(&service, "p1").await;
        let err = service.grant(42, role.id, true, false).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
        assert!(matches!(
            service.collection_status(42).await.unwrap_err(),
            PipelineError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_purge_empties_every_index() {
        let service = service(true).await;
        let (owner, _) = user(&service, "p1").await;
        service
            .create_collection(&NewCollection::new("c", "C"), Some(owner.id))
            .await
            .unwrap();

        let summary = service.purge_all().await.unwrap();
        assert_eq!(summary.deleted, 1);
        for kind in IndexKind::ALL {
            let response = service.search(&SearchQuery::new(kind)).await.unwrap();
            assert_eq!(response.total, 0);
        }
    }
}
