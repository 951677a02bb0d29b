//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchIndexProvider`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::response::Response,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetAliasParts,
        IndicesGetMappingParts, IndicesRefreshParts,
    },
    params, BulkParts, DeleteByQueryParts, DeleteParts, GetParts, OpenSearch, SearchParts,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::errors::SearchIndexError;
use crate::interfaces::SearchIndexProvider;
use crate::mappings::version_of;
use crate::opensearch::queries::{build_filter_query, build_search_query};
use crate::types::{
    BatchOperationResult, BatchOperationSummary, Conflicts, DeleteByQueryOptions,
    DeleteByQuerySummary,
};
use aleph_index_shared::{DocumentFilter, IndexAction, SearchHit, SearchQuery, SearchResponse};

/// OpenSearch client implementation.
///
/// Provides full-text search capabilities using OpenSearch as the backend.
///
/// # Example
///
/// ```ignore
/// let provider = OpenSearchProvider::new("http://localhost:9200").await?;
/// let client = SearchIndexClient::new(Arc::new(provider), IndexConfig::new("aleph"));
/// client.upgrade_search().await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new client instance
    /// * `Err(SearchIndexError)` - If connection setup fails
    pub async fn new(url: &str) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Fail with the response body unless the status is a success.
    async fn ensure_success(
        response: Response,
        what: &str,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, "{} request failed", what);
        Err(make_error(format!(
            "{} failed with status {}: {}",
            what, status, error_body
        )))
    }

    async fn read_json(response: Response) -> Result<Value, SearchIndexError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }

    /// Parse a single search hit into a SearchHit.
    fn parse_hit(hit: &Value) -> Option<SearchHit> {
        let id = hit.get("_id")?.as_str()?.to_string();
        let source = hit.get("_source")?.clone();
        let score = hit.get("_score").and_then(Value::as_f64).unwrap_or(0.0);
        Some(SearchHit { id, score, source })
    }

    /// Parse a bulk response into per-item results.
    fn parse_bulk_response(body: &Value, actions: &[IndexAction]) -> BatchOperationSummary {
        let items = body
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let results = actions
            .iter()
            .enumerate()
            .map(|(i, action)| {
                let item = items.get(i).and_then(|item| item.get("index"));
                match item.and_then(|item| item.get("error")) {
                    Some(err) => BatchOperationResult::failed(
                        action.id.clone(),
                        SearchIndexError::index(err.to_string()),
                    ),
                    None if item.is_some() => BatchOperationResult::ok(action.id.clone()),
                    None => BatchOperationResult::failed(
                        action.id.clone(),
                        SearchIndexError::parse("missing bulk item"),
                    ),
                }
            })
            .collect();

        BatchOperationSummary::from_results(results)
    }
}

#[async_trait]
impl SearchIndexProvider for OpenSearchProvider {
    #[instrument(skip(self, body))]
    async fn create_index(&self, name: &str, body: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(name))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::ensure_success(response, "Create index", SearchIndexError::IndexCreationError)
            .await?;

        info!(index = %name, "Created index");
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        match response.status_code().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            other => Err(SearchIndexError::unknown(format!(
                "Unexpected status {} checking index {}",
                other, name
            ))),
        }
    }

    async fn mapping_version(&self, name: &str) -> Result<Option<u32>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_mapping(IndicesGetMappingParts::Index(&[name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(name));
        }
        let response = Self::ensure_success(response, "Get mapping", SearchIndexError::QueryError)
            .await?;
        let body = Self::read_json(response).await?;

        // Keyed by the concrete index name, which differs from `name` for an alias
        let mappings = body
            .as_object()
            .and_then(|indices| indices.values().next())
            .map(|index| &index["mappings"]);

        Ok(mappings.and_then(version_of))
    }

    async fn alias_targets(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response = Self::ensure_success(response, "Get alias", SearchIndexError::QueryError)
            .await?;
        let body = Self::read_json(response).await?;

        // { "<index>": { "aliases": { "<alias>": {} } }, ... }
        let mut targets: Vec<String> = body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default();
        targets.sort();
        Ok(targets)
    }

    #[instrument(skip(self))]
    async fn delete_index(&self, name: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[name]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        // 404 is acceptable - index may not exist
        if response.status_code().as_u16() == 404 {
            debug!(index = %name, "Index already absent");
            return Ok(false);
        }

        Self::ensure_success(response, "Delete index", SearchIndexError::DeleteError).await?;
        info!(index = %name, "Deleted index");
        Ok(true)
    }

    #[instrument(skip(self, actions), fields(count = actions.len()))]
    async fn bulk_index(
        &self,
        index: &str,
        actions: &[IndexAction],
    ) -> Result<BatchOperationSummary, SearchIndexError> {
        if actions.is_empty() {
            return Ok(BatchOperationSummary::empty());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            body.push(JsonBody::new(json!({ "index": { "_id": action.id } })));
            body.push(JsonBody::new(action.source.clone()));
        }

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_operation(e.to_string()))?;

        let response =
            Self::ensure_success(response, "Bulk index", SearchIndexError::BulkOperationError)
                .await?;
        let body = Self::read_json(response).await?;
        let summary = Self::parse_bulk_response(&body, actions);

        if summary.failed > 0 {
            warn!(
                failed = summary.failed,
                total = summary.total,
                "Bulk index had failures"
            );
        }
        Ok(summary)
    }

    async fn delete_document(&self, index: &str, id: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchIndexError::delete(e.to_string()))?;

        // 404 is acceptable - document may not exist
        if response.status_code().as_u16() == 404 {
            return Ok(());
        }
        Self::ensure_success(response, "Delete", SearchIndexError::DeleteError).await?;

        debug!(index = %index, id = %id, "Document deleted");
        Ok(())
    }

    #[instrument(skip(self, filter))]
    async fn delete_by_query(
        &self,
        indices: &[String],
        filter: &DocumentFilter,
        options: DeleteByQueryOptions,
    ) -> Result<DeleteByQuerySummary, SearchIndexError> {
        let names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let conflicts = match options.conflicts {
            Conflicts::Abort => params::Conflicts::Abort,
            Conflicts::Proceed => params::Conflicts::Proceed,
        };

        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&names))
            .conflicts(conflicts)
            .refresh(options.refresh)
            .body(build_filter_query(filter))
            .send()
            .await
            .map_err(|e| SearchIndexError::delete(e.to_string()))?;

        if response.status_code().as_u16() == 409 {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SearchIndexError::version_conflict(error_body));
        }
        let response =
            Self::ensure_success(response, "Delete by query", SearchIndexError::DeleteError)
                .await?;
        let body = Self::read_json(response).await?;

        let summary = DeleteByQuerySummary {
            deleted: body.get("deleted").and_then(Value::as_u64).unwrap_or(0),
            version_conflicts: body
                .get("version_conflicts")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        };
        debug!(
            deleted = summary.deleted,
            version_conflicts = summary.version_conflicts,
            "Delete by query finished"
        );
        Ok(summary)
    }

    async fn refresh(&self, indices: &[String]) -> Result<(), SearchIndexError> {
        let names: Vec<&str> = indices.iter().map(String::as_str).collect();
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&names))
            .send()
            .await
            .map_err(|e| SearchIndexError::refresh(e.to_string()))?;

        Self::ensure_success(response, "Refresh", SearchIndexError::RefreshError).await?;
        Ok(())
    }

    async fn search(
        &self,
        index: &str,
        query: &SearchQuery,
    ) -> Result<SearchResponse, SearchIndexError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(build_search_query(query))
            .send()
            .await
            .map_err(|e| SearchIndexError::query(e.to_string()))?;

        let response =
            Self::ensure_success(response, "Search", SearchIndexError::QueryError).await?;
        let body = Self::read_json(response).await?;

        let total = body["hits"]["total"]["value"].as_u64().unwrap_or(0) as usize;
        let hits = body["hits"]["hits"]
            .as_array()
            .map(|hits| hits.iter().filter_map(Self::parse_hit).collect())
            .unwrap_or_default();

        Ok(SearchResponse { total, hits })
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, SearchIndexError> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(|e| SearchIndexError::query(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        let response = Self::ensure_success(response, "Get", SearchIndexError::QueryError).await?;
        let body = Self::read_json(response).await?;
        Ok(body.get("_source").cloned())
    }

    async fn health_check(&self) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Ok(false);
        }
        let body = Self::read_json(response).await?;
        Ok(matches!(body["status"].as_str(), Some("green") | Some("yellow")))
    }
}
