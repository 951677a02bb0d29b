//! Request and response types for search index operations.

use crate::errors::SearchIndexError;

/// How delete-by-query treats documents whose version changed after the
/// query snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Conflicts {
    /// Stop at the first conflict and report an error.
    #[default]
    Abort,
    /// Skip conflicting documents and count them.
    Proceed,
}

/// Options for delete-by-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteByQueryOptions {
    pub conflicts: Conflicts,
    /// Refresh the affected indices before returning.
    pub refresh: bool,
}

impl DeleteByQueryOptions {
    /// `conflicts=proceed`, `refresh=true`: used for inter-test cleanup.
    pub fn purge() -> Self {
        Self {
            conflicts: Conflicts::Proceed,
            refresh: true,
        }
    }
}

/// Outcome of a delete-by-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteByQuerySummary {
    pub deleted: u64,
    pub version_conflicts: u64,
}

impl DeleteByQuerySummary {
    pub fn merge(&mut self, other: DeleteByQuerySummary) {
        self.deleted += other.deleted;
        self.version_conflicts += other.version_conflicts;
    }
}

/// Result of a batch operation for a single item.
///
/// This struct represents the outcome of a single operation within a batch (e.g.,
/// indexing or deleting one document). It indicates whether the operation
/// succeeded and includes error details if it failed.
#[derive(Debug, Clone)]
pub struct BatchOperationResult {
    /// The document's `_id`.
    pub id: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error if the operation failed.
    pub error: Option<SearchIndexError>,
}

impl BatchOperationResult {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: SearchIndexError) -> Self {
        Self {
            id: id.into(),
            success: false,
            error: Some(error),
        }
    }
}

/// Summary of a batch operation containing aggregate statistics and individual results.
///
/// This struct provides a complete overview of a bulk operation, including the total
/// number of items processed, how many succeeded and failed, and detailed results for
/// each individual item. This allows callers to handle partial failures gracefully.
#[derive(Debug, Clone, Default)]
pub struct BatchOperationSummary {
    /// Total number of items in the batch.
    pub total: usize,
    /// Number of successful operations.
    pub succeeded: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Individual results for each item.
    pub results: Vec<BatchOperationResult>,
}

impl BatchOperationSummary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a summary from per-item results.
    pub fn from_results(results: Vec<BatchOperationResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }

    /// Fold another summary into this one.
    pub fn merge(&mut self, other: BatchOperationSummary) {
        self.total += other.total;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.results.extend(other.results);
    }

    /// Ids of the items that failed.
    pub fn failed_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.id.as_str())
            .collect()
    }
}
