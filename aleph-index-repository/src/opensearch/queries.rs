//! OpenSearch query builders.
//!
//! This module provides functions to build OpenSearch request bodies from
//! [`SearchQuery`] and [`DocumentFilter`] values.

use serde_json::{json, Value};

use aleph_index_shared::{DocumentFilter, IndexKind, SearchQuery, TermFilter};

/// Build an OpenSearch search body from a SearchQuery.
///
/// The query builder handles:
/// - Free text over the kind's text fields, all terms required
/// - Term filters on keyword fields
/// - The ACL filter on `roles` for non-admin authorization
/// - Pagination with `from`/`size`
pub fn build_search_query(query: &SearchQuery) -> Value {
    let must = match &query.text {
        Some(text) => build_text_query(query.index, text),
        None => json!({ "match_all": {} }),
    };

    let mut filter: Vec<Value> = query.filters.iter().map(build_term).collect();
    if let Some(authz) = &query.authz {
        if !authz.is_admin {
            let roles: Vec<i64> = authz.role_ids.iter().copied().collect();
            filter.push(json!({ "terms": { "roles": roles } }));
        }
    }

    json!({
        "from": query.offset,
        "size": query.limit,
        "track_total_hits": true,
        "query": {
            "bool": {
                "must": [must],
                "filter": filter
            }
        },
        "sort": ["_score", { "_id": "asc" }]
    })
}

/// Build the `query` clause for delete-by-query.
pub fn build_filter_query(filter: &DocumentFilter) -> Value {
    let query = match filter {
        DocumentFilter::MatchAll => json!({ "match_all": {} }),
        DocumentFilter::Term(term) => build_term(term),
    };
    json!({ "query": query })
}

/// Fields searched by free text, per index, with boosts.
fn text_fields(kind: IndexKind) -> &'static [&'static str] {
    match kind {
        IndexKind::Collection => &["label^3", "summary", "foreign_id"],
        IndexKind::Entity => &["name^3", "text"],
        IndexKind::Record => &["text"],
    }
}

fn build_text_query(kind: IndexKind, text: &str) -> Value {
    json!({
        "multi_match": {
            "query": text,
            "fields": text_fields(kind),
            "operator": "and"
        }
    })
}

fn build_term(term: &TermFilter) -> Value {
    json!({ "term": { term.field.as_str(): term.value } })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aleph_index_shared::Authz;

    #[test]
    fn test_match_all_without_text() {
        let body = build_search_query(&SearchQuery::new(IndexKind::Collection));

        assert!(body["query"]["bool"]["must"][0]["match_all"].is_object());
        assert_eq!(body["query"]["bool"]["filter"], json!([]));
        assert_eq!(body["size"], 50);
    }

    #[test]
    fn test_text_and_filters() {
        let query = SearchQuery::new(IndexKind::Entity)
            .with_text("banana")
            .filter("schema", "Company");
        let body = build_search_query(&query);

        let multi_match = &body["query"]["bool"]["must"][0]["multi_match"];
        assert_eq!(multi_match["query"], "banana");
        assert_eq!(multi_match["fields"], json!(["name^3", "text"]));
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({ "term": { "schema": "Company" } })
        );
    }

    #[test]
    fn test_acl_filter() {
        let query = SearchQuery::new(IndexKind::Record).authorized(Authz::for_roles([5, 2]));
        let body = build_search_query(&query);
        assert_eq!(
            body["query"]["bool"]["filter"][0],
            json!({ "terms": { "roles": [2, 5] } })
        );

        let admin = SearchQuery::new(IndexKind::Record).authorized(Authz::admin());
        assert_eq!(build_search_query(&admin)["query"]["bool"]["filter"], json!([]));
    }

    #[test]
    fn test_filter_query() {
        assert_eq!(
            build_filter_query(&DocumentFilter::MatchAll),
            json!({ "query": { "match_all": {} } })
        );
        assert_eq!(
            build_filter_query(&DocumentFilter::Term(TermFilter::new("document_id", 4))),
            json!({ "query": { "term": { "document_id": 4 } } })
        );
    }
}
