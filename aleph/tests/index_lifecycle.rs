use aleph::{AppError, TestCase};
use aleph_index_pipeline::{PipelineError, ProcessOutcome};
use aleph_index_shared::{DocumentStatus, IndexKind, SearchQuery};
use aleph_store::{Collection, Document, NewCollection, Record, Role, StoreError};

async fn role(case: &TestCase, foreign_id: &str) -> Role {
    let mut conn = case.service().store().acquire().await.unwrap();
    Role::by_foreign_id(&mut conn, foreign_id)
        .await
        .unwrap()
        .unwrap()
}

async fn ids(case: &TestCase, query: SearchQuery) -> Vec<String> {
    let mut ids: Vec<String> = case
        .search(&query)
        .await
        .unwrap()
        .ids()
        .into_iter()
        .map(str::to_string)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_loaded_fixtures_are_searchable() {
    let case = TestCase::setup().await.unwrap();
    let summary = case.load_fixtures("kitchen.yaml", true).await.unwrap();
    assert_eq!(summary.collections, 2);
    assert_eq!(summary.documents, 3);

    let p1 = case.authz(&role(&case, "p1").await).await.unwrap();
    let p2 = case.authz(&role(&case, "p2").await).await.unwrap();

    let collections = SearchQuery::new(IndexKind::Collection);
    assert_eq!(ids(&case, collections.clone().authorized(p1.clone())).await, vec!["1", "2"]);
    assert_eq!(ids(&case, collections.authorized(p2.clone())).await, vec!["2"]);

    let records = SearchQuery::new(IndexKind::Record).with_text("banana");
    assert_eq!(ids(&case, records.clone().authorized(p1.clone())).await, vec!["1.0"]);
    assert!(ids(&case, records.authorized(p2.clone())).await.is_empty());

    let tomato = SearchQuery::new(IndexKind::Record)
        .with_text("tomato")
        .authorized(p2.clone());
    assert_eq!(ids(&case, tomato).await, vec!["3.1"]);

    let entities = SearchQuery::new(IndexKind::Entity).with_text("yellow");
    assert_eq!(ids(&case, entities.clone().authorized(p1)).await, vec!["banana"]);
    assert!(ids(&case, entities.authorized(p2)).await.is_empty());

    let status = case.service().collection_status(1).await.unwrap();
    assert_eq!(status.done, 1);
    assert_eq!(status.failed, 1);
    assert_eq!(status.pending, 0);
}

#[tokio::test]
async fn test_fixtures_without_processing_stay_pending() {
    let case = TestCase::setup().await.unwrap();
    case.load_fixtures("kitchen.yaml", false).await.unwrap();

    let status = case.service().collection_status(1).await.unwrap();
    assert_eq!(status.pending, 2);

    let records = SearchQuery::new(IndexKind::Record);
    let admin = case.create_user("admin", true).await.unwrap();
    let admin = case.authz(&admin).await.unwrap();
    assert!(ids(&case, records.authorized(admin)).await.is_empty());
}

#[tokio::test]
async fn test_failed_fixture_load_leaves_no_rows() {
    let case = TestCase::setup().await.unwrap();

    let err = case.load_fixtures("broken.yaml", true).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::PipelineError(PipelineError::StoreError(StoreError::Fixture(_)))
    ));

    let mut conn = case.service().store().acquire().await.unwrap();
    assert!(Collection::all(&mut conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_fixture_column_is_rejected() {
    let case = TestCase::setup().await.unwrap();
    let err = case
        .load_fixtures("unknown_column.yaml", true)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("colour"));
}

#[tokio::test]
async fn test_grant_then_revoke() {
    let case = TestCase::setup().await.unwrap();
    let (owner, _) = case.login("p1", false).await.unwrap();
    let (reader, (header, api_key)) = case.login("p2", false).await.unwrap();
    assert_eq!(header, "Authorization");

    let collection = case
        .create_collection(&NewCollection::new("kitchen", "Kitchen"), Some(&owner))
        .await
        .unwrap();
    let id = collection.id.to_string();
    let reader_authz = case.app().authenticate(Some(&api_key)).await.unwrap();
    assert!(reader_authz.role_ids.contains(&reader.id));

    case.grant(&collection, &reader, true, false).await.unwrap();
    case.flush_index().await.unwrap();
    let query = SearchQuery::new(IndexKind::Collection).authorized(reader_authz.clone());
    assert_eq!(ids(&case, query.clone()).await, vec![id.clone()]);

    case.grant(&collection, &reader, false, false).await.unwrap();
    case.flush_index().await.unwrap();
    assert!(ids(&case, query).await.is_empty());

    let owner_authz = case.authz(&owner).await.unwrap();
    let query = SearchQuery::new(IndexKind::Collection).authorized(owner_authz);
    assert_eq!(ids(&case, query).await, vec![id]);
}

#[tokio::test]
async fn test_queued_jobs_wait_for_run_pending() {
    let case = TestCase::setup_with(|config| config.run_jobs_inline = false)
        .await
        .unwrap();
    let owner = case.create_user("p1", false).await.unwrap();
    let authz = case.authz(&owner).await.unwrap();

    case.create_collection(&NewCollection::new("kitchen", "Kitchen"), Some(&owner))
        .await
        .unwrap();
    case.flush_index().await.unwrap();
    let query = SearchQuery::new(IndexKind::Collection).authorized(authz);
    assert!(ids(&case, query.clone()).await.is_empty());

    case.service().run_pending().await.unwrap();
    case.flush_index().await.unwrap();
    assert_eq!(ids(&case, query).await.len(), 1);
}

#[tokio::test]
async fn test_next_case_starts_empty() {
    {
        let case = TestCase::setup().await.unwrap();
        case.load_fixtures("kitchen.yaml", true).await.unwrap();
    }

    let case = TestCase::setup().await.unwrap();
    let admin = case.create_user("admin", true).await.unwrap();
    let admin = case.authz(&admin).await.unwrap();
    for kind in IndexKind::ALL {
        let query = SearchQuery::new(kind).authorized(admin.clone());
        assert!(ids(&case, query).await.is_empty(), "{:?} not purged", kind);
    }

    let mut conn = case.service().store().acquire().await.unwrap();
    assert!(Collection::all(&mut conn).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reindex_and_reprocess_are_stable() {
    let case = TestCase::setup().await.unwrap();
    case.load_fixtures("kitchen.yaml", true).await.unwrap();
    let service = case.service();

    let before = service
        .client()
        .get_document(IndexKind::Entity, "banana")
        .await
        .unwrap();
    service.reindex_entities(None).await.unwrap();
    service.flush_index().await.unwrap();
    let after = service
        .client()
        .get_document(IndexKind::Entity, "banana")
        .await
        .unwrap();
    assert!(before.is_some());
    assert_eq!(before, after);

    let outcome = service.process_document(3).await.unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::Done {
            document_id: 3,
            records: 2
        }
    );
    let mut conn = service.store().acquire().await.unwrap();
    let records = Record::for_document(&mut conn, 3).await.unwrap();
    assert_eq!(records.len(), 2);
    let document = Document::by_id(&mut conn, 2).await.unwrap().unwrap();
    assert_eq!(document.status, DocumentStatus::Failed);
}

#[tokio::test]
async fn test_authenticate() {
    let case = TestCase::setup().await.unwrap();

    let guest = case.app().authenticate(None).await.unwrap();
    assert_eq!(guest.role_ids.len(), 1);
    assert!(!guest.is_admin);

    let err = case.app().authenticate(Some("nope")).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let (_, (_, api_key)) = case.login("boss", true).await.unwrap();
    let header = format!("ApiKey {}", api_key);
    assert!(case.app().authenticate(Some(&header)).await.unwrap().is_admin);
}
