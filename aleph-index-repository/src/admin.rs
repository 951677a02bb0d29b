//! Index admin: create, delete and upgrade the index schemas.

use tracing::{info, instrument, warn};

use crate::client::SearchIndexClient;
use crate::errors::SearchIndexError;
use crate::mappings::get_index_settings;
use aleph_index_shared::IndexKind;

/// What `upgrade_search` did to each index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeOutcome {
    /// Indices created by this call.
    pub created: Vec<String>,
    /// Indices that already had the current mapping version.
    pub current: Vec<String>,
}

impl SearchIndexClient {
    /// Destroy the collection, entity and record indices.
    ///
    /// Removes the current versioned index of each kind and whatever index
    /// its alias points to, so indices left by an older mapping version go
    /// too. Deleting an index that does not exist is not an error, so this
    /// can be called on a fresh cluster.
    #[instrument(skip(self))]
    pub async fn delete_index(&self) -> Result<Vec<String>, SearchIndexError> {
        let mut deleted = Vec::new();
        for kind in IndexKind::ALL {
            let mut names = self.provider().alias_targets(&self.config().alias(kind)).await?;
            let current = self.config().index_name(kind);
            if !names.contains(&current) {
                names.push(current);
            }
            for name in names {
                if self.provider().delete_index(&name).await? {
                    deleted.push(name);
                }
            }
        }
        info!(count = deleted.len(), "Deleted search indices");
        Ok(deleted)
    }

    /// Create every index at the current mapping version.
    ///
    /// An index that already exists with the current version is left alone.
    /// One that exists with another (or no) version, or an alias still held
    /// by another index, is a [`SearchIndexError::SchemaMismatch`], which
    /// callers treat as fatal.
    #[instrument(skip(self))]
    pub async fn upgrade_search(&self) -> Result<UpgradeOutcome, SearchIndexError> {
        let config = self.config();
        let mut outcome = UpgradeOutcome::default();

        for kind in IndexKind::ALL {
            let name = config.index_name(kind);

            let targets = self.provider().alias_targets(&config.alias(kind)).await?;
            if let Some(other) = targets.into_iter().find(|target| *target != name) {
                let stored = self.provider().mapping_version(&other).await?;
                warn!(
                    index = %other,
                    alias = %config.alias(kind),
                    expected = config.version,
                    "Alias held by an index of another mapping version"
                );
                return Err(SearchIndexError::schema_mismatch(
                    other,
                    stored,
                    config.version,
                ));
            }

            if self.provider().index_exists(&name).await? {
                let stored = self.provider().mapping_version(&name).await?;
                if stored != Some(config.version) {
                    warn!(
                        index = %name,
                        stored = ?stored,
                        expected = config.version,
                        "Mapping version mismatch"
                    );
                    return Err(SearchIndexError::schema_mismatch(
                        name,
                        stored,
                        config.version,
                    ));
                }
                outcome.current.push(name);
                continue;
            }

            let body = get_index_settings(kind, config.version, &config.alias(kind));
            self.provider().create_index(&name, &body).await?;
            outcome.created.push(name);
        }

        info!(
            created = outcome.created.len(),
            current = outcome.current.len(),
            "Search indices upgraded"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::interfaces::SearchIndexProvider;
    use crate::memory::MemorySearchProvider;
    use serde_json::json;
    use std::sync::Arc;

    fn client(provider: Arc<MemorySearchProvider>, version: u32) -> SearchIndexClient {
        let mut config = IndexConfig::new("t");
        config.version = version;
        SearchIndexClient::new(provider, config)
    }

    #[tokio::test]
    async fn test_upgrade_creates_then_noops() {
        let provider = Arc::new(MemorySearchProvider::new());
        let client = client(provider.clone(), 1);

        let first = client.upgrade_search().await.unwrap();
        assert_eq!(
            first.created,
            vec!["t-collection-v1", "t-entity-v1", "t-record-v1"]
        );
        assert!(first.current.is_empty());
        assert!(provider.index_exists("t-entity").await.unwrap());

        let second = client.upgrade_search().await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.current.len(), 3);
    }

    #[tokio::test]
    async fn test_upgrade_rejects_stale_mapping() {
        let provider = Arc::new(MemorySearchProvider::new());
        provider
            .create_index(
                "t-collection-v2",
                &json!({ "mappings": { "_meta": { "version": 1 } } }),
            )
            .await
            .unwrap();

        let err = client(provider, 2).upgrade_search().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SearchIndexError::SchemaMismatch {
                stored: Some(1),
                expected: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_index_is_idempotent() {
        let provider = Arc::new(MemorySearchProvider::new());
        let client = client(provider.clone(), 1);

        assert!(client.delete_index().await.unwrap().is_empty());

        client.upgrade_search().await.unwrap();
        assert_eq!(client.delete_index().await.unwrap().len(), 3);
        assert!(!provider.index_exists("t-record").await.unwrap());
        assert!(client.delete_index().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_older_version_behind_alias_is_a_mismatch() {
        let provider = Arc::new(MemorySearchProvider::new());
        let v1 = client(provider.clone(), 1);
        let v2 = client(provider.clone(), 2);
        v1.upgrade_search().await.unwrap();

        let err = v2.upgrade_search().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SearchIndexError::SchemaMismatch {
                ref index,
                stored: Some(1),
                expected: 2,
            } if index == "t-collection-v1"
        ));
        assert!(!provider.index_exists("t-collection-v2").await.unwrap());

        let mut deleted = v2.delete_index().await.unwrap();
        deleted.sort();
        assert_eq!(
            deleted,
            vec!["t-collection-v1", "t-entity-v1", "t-record-v1"]
        );
        assert!(!provider.index_exists("t-entity-v1").await.unwrap());

        let upgraded = v2.upgrade_search().await.unwrap();
        assert_eq!(upgraded.created.len(), 3);
        assert_eq!(
            provider.alias_targets("t-record").await.unwrap(),
            vec!["t-record-v2"]
        );
    }
}
