//! In-memory search provider.
//!
//! Emulates a near-real-time engine closely enough to test ordering
//! contracts: every index keeps a *live* map (what realtime get sees) and a
//! *visible* map (what search sees), and only `refresh` copies live into
//! visible. Each write bumps the per-document version, which is what
//! delete-by-query checks to detect conflicts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::mappings::version_of;
use crate::types::{
    BatchOperationResult, BatchOperationSummary, Conflicts, DeleteByQueryOptions,
    DeleteByQuerySummary,
};
use aleph_index_shared::{
    DocumentFilter, IndexAction, SearchHit, SearchQuery, SearchResponse, TermFilter,
};

#[derive(Debug, Clone)]
struct StoredDoc {
    version: u64,
    source: Value,
}

#[derive(Debug, Default)]
struct MemoryIndex {
    body: Value,
    live: BTreeMap<String, StoredDoc>,
    visible: BTreeMap<String, StoredDoc>,
    /// Last version handed out per id, kept across deletes.
    versions: BTreeMap<String, u64>,
}

impl MemoryIndex {
    fn next_version(&mut self, id: &str) -> u64 {
        let version = self.versions.entry(id.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    fn refresh(&mut self) {
        self.visible = self.live.clone();
    }
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, MemoryIndex>,
    aliases: BTreeMap<String, String>,
}

impl State {
    fn resolve(&self, name: &str) -> Option<String> {
        if self.indices.contains_key(name) {
            return Some(name.to_string());
        }
        self.aliases.get(name).cloned()
    }

    fn index_mut(&mut self, name: &str) -> Result<&mut MemoryIndex, SearchIndexError> {
        let concrete = self
            .resolve(name)
            .ok_or_else(|| SearchIndexError::index_not_found(name))?;
        self.indices
            .get_mut(&concrete)
            .ok_or_else(|| SearchIndexError::index_not_found(name))
    }

    fn index(&self, name: &str) -> Result<&MemoryIndex, SearchIndexError> {
        let concrete = self
            .resolve(name)
            .ok_or_else(|| SearchIndexError::index_not_found(name))?;
        self.indices
            .get(&concrete)
            .ok_or_else(|| SearchIndexError::index_not_found(name))
    }
}

/// Search provider backed by process memory.
///
/// Used by the test harness and unit tests in place of OpenSearch.
#[derive(Debug, Default)]
pub struct MemorySearchProvider {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemorySearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the engine going away: every call fails with a connection error.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), SearchIndexError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SearchIndexError::connection("search engine unreachable"));
        }
        Ok(())
    }

    /// Number of documents written but not yet refreshed, per index or alias.
    pub async fn pending_count(&self, name: &str) -> Result<usize, SearchIndexError> {
        let state = self.state.lock().await;
        let index = state.index(name)?;
        let pending = index
            .live
            .iter()
            .filter(|(id, doc)| {
                index
                    .visible
                    .get(*id)
                    .map_or(true, |v| v.version != doc.version)
            })
            .count()
            + index
                .visible
                .keys()
                .filter(|id| !index.live.contains_key(*id))
                .count();
        Ok(pending)
    }
}

#[async_trait]
impl SearchIndexProvider for MemorySearchProvider {
    async fn create_index(&self, name: &str, body: &Value) -> Result<(), SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        if state.resolve(name).is_some() {
            return Err(SearchIndexError::index_creation(format!(
                "resource_already_exists_exception: {}",
                name
            )));
        }

        if let Some(aliases) = body.get("aliases").and_then(Value::as_object) {
            for alias in aliases.keys() {
                state.aliases.insert(alias.clone(), name.to_string());
            }
        }
        state.indices.insert(
            name.to_string(),
            MemoryIndex {
                body: body.clone(),
                ..MemoryIndex::default()
            },
        );

        debug!(index = %name, "Created in-memory index");
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, SearchIndexError> {
        self.check_available()?;
        Ok(self.state.lock().await.resolve(name).is_some())
    }

    async fn mapping_version(&self, name: &str) -> Result<Option<u32>, SearchIndexError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let index = state.index(name)?;
        Ok(version_of(&index.body["mappings"]))
    }

    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.aliases.get(alias).cloned().into_iter().collect())
    }

    async fn delete_index(&self, name: &str) -> Result<bool, SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let Some(concrete) = state.resolve(name) else {
            return Ok(false);
        };
        state.indices.remove(&concrete);
        state.aliases.retain(|_, target| *target != concrete);
        Ok(true)
    }

    async fn bulk_index(
        &self,
        index: &str,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let target = state.index_mut(index)?;

        let mut results = Vec::with_capacity(actions.len());
        for action in actions {
            if !action.source.is_object() {
                results.push(BatchOperationResult::failed(
                    action.id.clone(),
                    SearchIndexError::index("document source must be an object"),
                ));
                continue;
            }
            let version = target.next_version(&action.id);
            target.live.insert(
                action.id.clone(),
                StoredDoc {
                    version,
                    source: action.source.clone(),
                },
            );
            results.push(BatchOperationResult::ok(action.id.clone()));
        }

        Ok(BatchOperationSummary::from_results(results))
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let target = state.index_mut(index)?;
        if target.live.remove(id).is_some() {
            target.next_version(id);
        }
        Ok(())
    }

    async fn delete_by_query(
        &self,
        indices: &[String],
        filter: &DocumentFilter,
        options: DeleteByQueryOptions,
    ) -> Result<DeleteByQuerySummary, SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let mut summary = DeleteByQuerySummary::default();

        for name in indices {
            let target = state.index_mut(name)?;

            let snapshot: Vec<(String, u64)> = target
                .visible
                .iter()
                .filter(|(_, doc)| matches_filter(filter, &doc.source))
                .map(|(id, doc)| (id.clone(), doc.version))
                .collect();

            for (id, seen_version) in snapshot {
                let current = target.live.get(&id).map(|doc| doc.version);
                if current == Some(seen_version) {
                    target.live.remove(&id);
                    target.next_version(&id);
                    summary.deleted += 1;
                    continue;
                }

                summary.version_conflicts += 1;
                if options.conflicts == Conflicts::Abort {
                    return Err(SearchIndexError::version_conflict(format!(
                        "document {} in {} changed since the query snapshot",
                        id, name
                    )));
                }
            }

            if options.refresh {
                target.refresh();
            }
        }

        Ok(summary)
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), SearchIndexError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        for name in indices {
            state.index_mut(name)?.refresh();
        }
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchIndexError> {
        self.check_available()?;
        let state = self.state.lock().await;
        let target = state.index(index)?;

        let matched: Vec<(&String, &StoredDoc)> = target
            .visible
            .iter()
            .filter(|(_, doc)| matches_query(query, &doc.source))
            .collect();

        let hits = matched
            .iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(id, doc)| SearchHit {
                id: (*id).clone(),
                score: 1.0,
                source: doc.source.clone(),
            })
            .collect();

        Ok(SearchResponse {
            total: matched.len(),
            hits,
        })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchIndexError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state.index(index)?.live.get(id).map(|doc| doc.source.clone()))
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        Ok(!self.unavailable.load(Ordering::SeqCst))
    }
}

fn matches_filter(filter: &DocumentFilter, source: &Value) -> bool {
    match filter {
        DocumentFilter::MatchAll => true,
        DocumentFilter::Term(term) => matches_term(term, source),
    }
}

fn matches_query(query: &SearchQuery, source: &Value) -> bool {
    if let Some(authz) = &query.authz {
        let roles: Vec<i64> = source
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| roles.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();
        if !authz.can_read(&roles) {
            return false;
        }
    }

    if !query.filters.iter().all(|term| matches_term(term, source)) {
        return false;
    }

    match &query.text {
        Some(text) => matches_text(text, source),
        None => true,
    }
}

fn matches_term(term: &TermFilter, source: &Value) -> bool {
    let mut current = source;
    for part in term.field.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return false,
        }
    }
    match current {
        Value::Array(items) => items.iter().any(|item| *item == term.value),
        other => *other == term.value,
    }
}

/// Every whitespace-separated token must occur in some string value.
fn matches_text(text: &str, source: &Value) -> bool {
    let mut values = Vec::new();
    collect_strings(source, &mut values);

    text.split_whitespace()
        .map(str::to_lowercase)
        .all(|token| values.iter().any(|value| value.contains(&token)))
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.to_lowercase()),
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        Value::Object(map) => map.values().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}
