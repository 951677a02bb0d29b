//! Dependency initialization and wiring for the aleph application.

use std::sync::Arc;
use tracing::info;

use super::settings::{AppConfig, ArchiveType, SearchBackend};
use crate::AppError;
use aleph_index_pipeline::{IndexService, ServiceConfig, TextExtractor};
use aleph_index_repository::{
    IndexConfig, MemorySearchProvider, OpenSearchProvider, SearchIndexClient, SearchIndexProvider,
};
use aleph_index_shared::Authz;
use aleph_store::{Archive, FileArchive, MemoryArchive, Role, Store, StoreConfig};

/// Prefix accepted in front of an API key in the `Authorization` header.
const API_KEY_SCHEME: &str = "ApiKey ";

/// The wired application: its config and the index service built from it.
pub struct App {
    config: AppConfig,
    service: Arc<IndexService>,
}

impl App {
    /// Validate `config` and build every dependency it names.
    ///
    /// The OpenSearch backend is health-checked before anything else is
    /// created.
    pub async fn create(config: AppConfig) -> Result<Self, AppError> {
        config.validate()?;

        let provider: Arc<dyn SearchIndexProvider> = match config.search_backend {
            SearchBackend::Opensearch => {
                let provider = OpenSearchProvider::new(&config.opensearch_url)
                    .await
                    .map_err(|e| {
                        AppError::config(format!("Failed to create OpenSearch client: {}", e))
                    })?;
                let healthy = provider.health_check().await.map_err(|e| {
                    AppError::config(format!("OpenSearch health check failed: {}", e))
                })?;
                if !healthy {
                    return Err(AppError::config("OpenSearch cluster is unhealthy"));
                }
                info!(opensearch_url = %config.opensearch_url, "OpenSearch connection verified");
                Arc::new(provider)
            }
            SearchBackend::Memory => Arc::new(MemorySearchProvider::new()),
        };

        Self::with_provider(config, provider).await
    }

    /// Build the application around an existing search provider.
    pub async fn with_provider(
        config: AppConfig,
        provider: Arc<dyn SearchIndexProvider>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        info!(
            app_name = %config.app_name,
            database_url = %config.database_url,
            index_prefix = %config.index_prefix,
            search_backend = ?config.search_backend,
            "Initializing dependencies"
        );

        let store = Store::connect(&StoreConfig::new(config.database_url.clone())).await?;
        store.create_all().await?;

        let archive: Arc<dyn Archive> = match (config.archive_type, &config.archive_path) {
            (ArchiveType::File, Some(path)) => Arc::new(FileArchive::new(path.clone())),
            (ArchiveType::File, None) => {
                return Err(AppError::config("ARCHIVE_PATH is required for the file archive"))
            }
            (ArchiveType::Memory, _) => Arc::new(MemoryArchive::new()),
        };

        let client = SearchIndexClient::new(provider, IndexConfig::new(config.index_prefix.clone()));
        let service = IndexService::new(
            store,
            archive,
            client,
            Arc::new(TextExtractor::new()),
            ServiceConfig {
                run_jobs_inline: config.run_jobs_inline,
                ..ServiceConfig::default()
            },
        );

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> &Arc<IndexService> {
        &self.service
    }

    /// Resolve an `Authorization` header value to what its bearer may read.
    ///
    /// No header reads as the guest role. A key, bare or prefixed with
    /// `ApiKey `, that matches no role is rejected.
    pub async fn authenticate(&self, authorization: Option<&str>) -> Result<Authz, AppError> {
        let mut conn = self.service.store().acquire().await?;

        let key = match authorization.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => value.strip_prefix(API_KEY_SCHEME).unwrap_or(value).trim(),
            None => return Ok(Role::anonymous_authz(&mut conn).await?),
        };

        let role = Role::by_api_key(&mut conn, key)
            .await?
            .ok_or_else(|| AppError::unauthorized("invalid API key"))?;
        Ok(Role::authz(&mut conn, &role).await?)
    }
}
