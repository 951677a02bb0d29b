//! Configuration types for the SearchIndexClient.

use aleph_index_shared::IndexKind;

/// Default prefix of every index name.
pub const DEFAULT_INDEX_PREFIX: &str = "aleph";

/// Current mapping version. Bump when a mapping in [`crate::mappings`] changes.
pub const MAPPING_VERSION: u32 = 1;

/// Configuration for the SearchIndexClient.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Prefix shared by all index names and aliases.
    pub prefix: String,
    /// Mapping version baked into the concrete index names.
    pub version: u32,
    /// Maximum number of documents allowed in a single batch operation.
    /// Set to None to disable the limit (not recommended for production).
    pub max_batch_size: Option<usize>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_INDEX_PREFIX.to_string(),
            version: MAPPING_VERSION,
            max_batch_size: Some(1000),
        }
    }
}

impl IndexConfig {
    /// Create a config with the given prefix and the current mapping version.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    /// Create a config with no batch size limit (use with caution).
    pub fn unlimited(mut self) -> Self {
        self.max_batch_size = None;
        self
    }

    /// Create a config with a custom batch size limit.
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = Some(max_batch_size);
        self
    }

    /// Alias that readers and writers address, e.g. `aleph-entity`.
    pub fn alias(&self, kind: IndexKind) -> String {
        format!("{}-{}", self.prefix, kind.as_str())
    }

    /// Concrete versioned index behind the alias, e.g. `aleph-entity-v1`.
    pub fn index_name(&self, kind: IndexKind) -> String {
        format!("{}-{}-v{}", self.prefix, kind.as_str(), self.version)
    }

    pub fn collection_index(&self) -> String {
        self.alias(IndexKind::Collection)
    }

    pub fn entity_index(&self) -> String {
        self.alias(IndexKind::Entity)
    }

    pub fn record_index(&self) -> String {
        self.alias(IndexKind::Record)
    }

    /// Aliases of all three indices.
    pub fn all_aliases(&self) -> Vec<String> {
        IndexKind::ALL.iter().map(|k| self.alias(*k)).collect()
    }
}
