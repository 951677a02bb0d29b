//! Test harness for code that needs a consistent store and index.
//!
//! Every [`TestCase`] gets a fresh schema with the system roles, an empty
//! set of indices and its own archive directory. The indices are deleted and
//! recreated by the first case in the process only; later cases purge their
//! documents, which is much cheaper. Cases share the search provider and run
//! one at a time.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde_json::{json, Map, Value};
use tempfile::TempDir;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::debug;

use crate::{App, AppConfig, AppError};
use aleph_index_pipeline::IndexService;
use aleph_index_repository::MemorySearchProvider;
use aleph_index_shared::{Authz, SearchQuery, SearchResponse};
use aleph_store::{Collection, FixtureSet, FixtureSummary, NewCollection, NewRole, Permission, Role};

pub const APP_NAME: &str = "aleph_test_instance";
pub const UI_URL: &str = "http://aleph.ui/";

/// Set once the indices have been rebuilt in this process.
static INDEX_RESET: OnceCell<()> = OnceCell::const_new();
static CASE_LOCK: Mutex<()> = Mutex::const_new(());
static SEARCH_PROVIDER: OnceLock<Arc<MemorySearchProvider>> = OnceLock::new();

fn search_provider() -> Arc<MemorySearchProvider> {
    SEARCH_PROVIDER
        .get_or_init(|| Arc::new(MemorySearchProvider::new()))
        .clone()
}

pub struct TestCase {
    app: App,
    archive_dir: TempDir,
    _serial: MutexGuard<'static, ()>,
}

impl TestCase {
    /// The config every case runs with.
    pub fn config(archive_path: &Path) -> Result<AppConfig, AppError> {
        let settings = [
            ("DEBUG", json!(true)),
            ("TESTING", json!(true)),
            ("CACHE", json!(true)),
            ("SECRET_KEY", json!("batman")),
            ("ARCHIVE_TYPE", json!("file")),
            ("ARCHIVE_PATH", json!(archive_path.to_string_lossy())),
            ("APP_UI_URL", json!(UI_URL)),
            ("APP_NAME", json!(APP_NAME)),
            ("PRESERVE_CONTEXT_ON_EXCEPTION", json!(false)),
            ("RUN_JOBS_INLINE", json!(true)),
            ("SEARCH_BACKEND", json!("memory")),
            ("INDEX_PREFIX", json!("aleph-test")),
        ];
        let map: Map<String, Value> = settings
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        AppConfig::from_map(map)
    }

    pub async fn setup() -> Result<Self, AppError> {
        Self::setup_with(|_| {}).await
    }

    /// Set up a case, letting `configure` adjust the config first.
    pub async fn setup_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Self, AppError> {
        let serial = CASE_LOCK.lock().await;
        let _ = crate::logging::init(false);

        let archive_dir = tempfile::tempdir()?;
        let mut config = Self::config(archive_dir.path())?;
        configure(&mut config);
        let app = App::with_provider(config, search_provider()).await?;
        let service = app.service();

        if INDEX_RESET.initialized() {
            let purged = service.purge_all().await?;
            debug!(deleted = purged.deleted, "Purged indices from the previous case");
        } else {
            INDEX_RESET
                .get_or_try_init(|| async {
                    service.delete_index().await?;
                    service.upgrade_search().await?;
                    Ok::<(), AppError>(())
                })
                .await?;
        }

        service.store().reset().await?;
        {
            let mut conn = service.store().acquire().await?;
            Role::create_system_roles(&mut conn).await?;
        }

        Ok(Self {
            app,
            archive_dir,
            _serial: serial,
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn service(&self) -> &IndexService {
        self.app.service()
    }

    pub fn archive_path(&self) -> &Path {
        self.archive_dir.path()
    }

    pub async fn create_user(&self, foreign_id: &str, is_admin: bool) -> Result<Role, AppError> {
        let mut new = NewRole::user(foreign_id, foreign_id)
            .with_email(format!("{}@example.com", foreign_id));
        if is_admin {
            new = new.admin();
        }
        let mut conn = self.service().store().acquire().await?;
        Ok(Role::load_or_create(&mut conn, &new).await?)
    }

    /// Create a user and the `Authorization` header that authenticates it.
    pub async fn login(
        &self,
        foreign_id: &str,
        is_admin: bool,
    ) -> Result<(Role, (&'static str, String)), AppError> {
        let role = self.create_user(foreign_id, is_admin).await?;
        let api_key = role
            .api_key
            .clone()
            .ok_or_else(|| AppError::unauthorized(format!("{} has no API key", foreign_id)))?;
        Ok((role, ("Authorization", api_key)))
    }

    pub async fn authz(&self, role: &Role) -> Result<Authz, AppError> {
        let mut conn = self.service().store().acquire().await?;
        Ok(Role::authz(&mut conn, role).await?)
    }

    pub async fn create_collection(
        &self,
        new: &NewCollection,
        creator: Option<&Role>,
    ) -> Result<Collection, AppError> {
        Ok(self
            .service()
            .create_collection(new, creator.map(|r| r.id))
            .await?)
    }

    pub async fn grant(
        &self,
        collection: &Collection,
        role: &Role,
        read: bool,
        write: bool,
    ) -> Result<Option<Permission>, AppError> {
        Ok(self
            .service()
            .grant(collection.id, role.id, read, write)
            .await?)
    }

    pub async fn flush_index(&self) -> Result<(), AppError> {
        Ok(self.service().flush_index().await?)
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse, AppError> {
        Ok(self.service().search(query).await?)
    }

    pub fn get_fixture_path(file_name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(file_name)
    }

    /// Load a fixture file, index what it created, and flush.
    ///
    /// Documents are run through the processor when `process_documents` is
    /// set; otherwise they stay as loaded.
    pub async fn load_fixtures(
        &self,
        file_name: &str,
        process_documents: bool,
    ) -> Result<FixtureSummary, AppError> {
        let set = FixtureSet::from_path(Self::get_fixture_path(file_name)).await?;
        let service = self.service();

        let summary = service.load_fixtures(&set).await?;
        service.reindex_collections().await?;
        if process_documents {
            service.process_all(None).await?;
        }
        service.flush_index().await?;
        Ok(summary)
    }
}
