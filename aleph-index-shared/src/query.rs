//! Search query and response types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::documents::IndexKind;

/// Default page size for searches.
pub const DEFAULT_LIMIT: usize = 50;

/// What a principal is allowed to read.
///
/// Built from the role table: a user holds its own role id plus the system
/// roles every authenticated user belongs to. Admins bypass the ACL filter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Authz {
    pub role_ids: BTreeSet<i64>,
    pub is_admin: bool,
}

impl Authz {
    /// Authorization for a non-admin holding the given roles.
    pub fn for_roles(role_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            role_ids: role_ids.into_iter().collect(),
            is_admin: false,
        }
    }

    /// Authorization that sees every document.
    pub fn admin() -> Self {
        Self {
            role_ids: BTreeSet::new(),
            is_admin: true,
        }
    }

    /// Whether a document readable by `roles` is visible.
    pub fn can_read(&self, roles: &[i64]) -> bool {
        self.is_admin || roles.iter().any(|r| self.role_ids.contains(r))
    }
}

/// Exact match on a keyword field. Array fields match if any element does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermFilter {
    pub field: String,
    pub value: Value,
}

impl TermFilter {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Selection used by delete-by-query.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentFilter {
    MatchAll,
    Term(TermFilter),
}

/// A search over one index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub index: IndexKind,
    /// Free text; `None` matches every document.
    pub text: Option<String>,
    pub filters: Vec<TermFilter>,
    /// `None` means unrestricted (internal callers).
    pub authz: Option<Authz>,
    pub offset: usize,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(index: IndexKind) -> Self {
        Self {
            index,
            text: None,
            filters: Vec::new(),
            authz: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = if text.trim().is_empty() {
            None
        } else {
            Some(text)
        };
        self
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(TermFilter::new(field, value));
        self
    }

    pub fn authorized(mut self, authz: Authz) -> Self {
        self.authz = Some(authz);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A single hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f64,
    pub source: Value,
}

/// Response of a search: total matches plus the requested page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub total: usize,
    pub hits: Vec<SearchHit>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Ids of the hits on this page, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.id.as_str()).collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.hits.iter().any(|h| h.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_builder() {
        let query = SearchQuery::new(IndexKind::Entity)
            .with_text("  ")
            .filter("collection_id", 3)
            .authorized(Authz::for_roles([1, 2]))
            .limit(10);

        assert!(query.text.is_none());
        assert_eq!(query.filters, vec![TermFilter::new("collection_id", 3)]);
        assert_eq!(query.limit, 10);
        assert!(!query.authz.unwrap().is_admin);
    }

    #[test]
    fn test_authz_can_read() {
        let authz = Authz::for_roles([4, 9]);
        assert!(authz.can_read(&[1, 9]));
        assert!(!authz.can_read(&[1, 2]));
        assert!(!authz.can_read(&[]));
        assert!(Authz::admin().can_read(&[]));
    }
}
