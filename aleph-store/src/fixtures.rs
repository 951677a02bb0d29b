//! Declarative fixture sets and the transactional bulk loader.
//!
//! A fixture file is a list of tables, each with its rows:
//!
//! ```yaml
//! - table: collections
//!   records:
//!     - id: 1
//!       foreign_id: kitchen
//!       label: Kitchen
//! - table: documents
//!   records:
//!     - collection_id: 1
//!       content_type: text/plain
//!       content: "Banana bread"
//! ```
//!
//! Tables are applied in file order, so parents come before the rows that
//! reference them. Rows are inserted as written: ids are kept when given,
//! and creating a collection here does not grant its creator anything.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqliteConnection;
use tracing::{info, instrument};

use aleph_index_shared::{DocumentStatus, RecordDocument};

use crate::archive::Archive;
use crate::db::Store;
use crate::error::{Result, StoreError};
use crate::models::{Properties, RoleType};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleRow {
    pub id: Option<i64>,
    pub foreign_id: String,
    #[serde(rename = "type", default = "default_role_type")]
    pub role_type: RoleType,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_role_type() -> RoleType {
    RoleType::User
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionRow {
    pub id: Option<i64>,
    pub foreign_id: String,
    pub label: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionRow {
    pub collection_id: i64,
    pub role_id: i64,
    #[serde(default = "default_true")]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentRow {
    pub id: Option<i64>,
    pub collection_id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    /// Inline body; archived on load and replaced by its hash.
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRow {
    pub id: String,
    pub collection_id: i64,
    pub schema: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub document_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordRow {
    pub document_id: i64,
    pub collection_id: i64,
    pub index: i64,
    pub text: String,
}

/// The rows of one table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "table", content = "records", rename_all = "lowercase")]
pub enum FixtureTable {
    Roles(Vec<RoleRow>),
    Collections(Vec<CollectionRow>),
    Permissions(Vec<PermissionRow>),
    Documents(Vec<DocumentRow>),
    Entities(Vec<EntityRow>),
    Records(Vec<RecordRow>),
}

impl FixtureTable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Roles(_) => "roles",
            Self::Collections(_) => "collections",
            Self::Permissions(_) => "permissions",
            Self::Documents(_) => "documents",
            Self::Entities(_) => "entities",
            Self::Records(_) => "records",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Roles(rows) => rows.len(),
            Self::Collections(rows) => rows.len(),
            Self::Permissions(rows) => rows.len(),
            Self::Documents(rows) => rows.len(),
            Self::Entities(rows) => rows.len(),
            Self::Records(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed fixture file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FixtureSet {
    pub tables: Vec<FixtureTable>,
}

impl FixtureSet {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| StoreError::fixture(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| StoreError::fixture(e.to_string()))
    }

    /// Read a `.yaml`, `.yml` or `.json` fixture file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::fixture(format!("{}: {}", path.display(), e)))?;
        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&text),
            Some("json") => Self::from_json(&text),
            _ => {
                return Err(StoreError::fixture(format!(
                    "{}: unsupported fixture format",
                    path.display()
                )))
            }
        };
        parsed.map_err(|e| StoreError::fixture(format!("{}: {}", path.display(), e)))
    }

    pub fn row_count(&self) -> usize {
        self.tables.iter().map(FixtureTable::len).sum()
    }

    /// Ids of every document row that carries an explicit id.
    pub fn document_ids(&self) -> Vec<i64> {
        self.tables
            .iter()
            .filter_map(|table| match table {
                FixtureTable::Documents(rows) => Some(rows.iter().filter_map(|r| r.id)),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Rows inserted per table by one load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureSummary {
    pub roles: usize,
    pub collections: usize,
    pub permissions: usize,
    pub documents: usize,
    pub entities: usize,
    pub records: usize,
    /// Ids of the inserted documents, in insertion order.
    pub document_ids: Vec<i64>,
}

impl FixtureSummary {
    pub fn total(&self) -> usize {
        self.roles
            + self.collections
            + self.permissions
            + self.documents
            + self.entities
            + self.records
    }
}

/// Apply a fixture set in one transaction.
///
/// Inline document content is archived first. Any failing row rolls the whole
/// set back and is reported as [`StoreError::Fixture`] naming the table and
/// row position. The search index is not touched.
#[instrument(skip_all, fields(rows = set.row_count()))]
pub async fn load_fixtures(
    store: &Store,
    archive: &Arc<dyn Archive>,
    set: &FixtureSet,
) -> Result<FixtureSummary> {
    let mut set = set.clone();
    for table in &mut set.tables {
        if let FixtureTable::Documents(rows) = table {
            for row in rows.iter_mut() {
                if let Some(content) = row.content.take() {
                    row.content_hash = Some(archive.archive(content.as_bytes()).await?);
                }
            }
        }
    }

    let loaded_at = Utc::now();
    let mut summary = FixtureSummary::default();
    let mut tx = store.begin().await?;
    for table in &set.tables {
        apply_table(&mut tx, table, loaded_at, &mut summary).await?;
    }
    tx.commit().await?;

    info!(rows = summary.total(), "Loaded fixtures");
    Ok(summary)
}

async fn apply_table(
    conn: &mut SqliteConnection,
    table: &FixtureTable,
    loaded_at: DateTime<Utc>,
    summary: &mut FixtureSummary,
) -> Result<()> {
    let fail = |position: usize, err: StoreError| {
        StoreError::fixture(format!("{}[{}]: {}", table.name(), position, err))
    };

    match table {
        FixtureTable::Roles(rows) => {
            for (i, row) in rows.iter().enumerate() {
                insert_role(conn, row, loaded_at).await.map_err(|e| fail(i, e))?;
                summary.roles += 1;
            }
        }
        FixtureTable::Collections(rows) => {
            for (i, row) in rows.iter().enumerate() {
                insert_collection(conn, row, loaded_at)
                    .await
                    .map_err(|e| fail(i, e))?;
                summary.collections += 1;
            }
        }
        FixtureTable::Permissions(rows) => {
            for (i, row) in rows.iter().enumerate() {
                insert_permission(conn, row).await.map_err(|e| fail(i, e))?;
                summary.permissions += 1;
            }
        }
        FixtureTable::Documents(rows) => {
            for (i, row) in rows.iter().enumerate() {
                let id = insert_document(conn, row, loaded_at)
                    .await
                    .map_err(|e| fail(i, e))?;
                summary.documents += 1;
                summary.document_ids.push(id);
            }
        }
        FixtureTable::Entities(rows) => {
            for (i, row) in rows.iter().enumerate() {
                insert_entity(conn, row, loaded_at)
                    .await
                    .map_err(|e| fail(i, e))?;
                summary.entities += 1;
            }
        }
        FixtureTable::Records(rows) => {
            for (i, row) in rows.iter().enumerate() {
                insert_record(conn, row).await.map_err(|e| fail(i, e))?;
                summary.records += 1;
            }
        }
    }
    Ok(())
}

async fn insert_role(
    conn: &mut SqliteConnection,
    row: &RoleRow,
    loaded_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO roles (id, foreign_id, type, name, email, is_admin, api_key, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id)
    .bind(&row.foreign_id)
    .bind(row.role_type.as_str())
    .bind(&row.name)
    .bind(&row.email)
    .bind(row.is_admin)
    .bind(&row.api_key)
    .bind(loaded_at)
    .bind(loaded_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_collection(
    conn: &mut SqliteConnection,
    row: &CollectionRow,
    loaded_at: DateTime<Utc>,
) -> Result<()> {
    let created_at = row.created_at.unwrap_or(loaded_at);
    sqlx::query(
        "INSERT INTO collections (id, foreign_id, label, summary, category, creator_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id)
    .bind(&row.foreign_id)
    .bind(&row.label)
    .bind(&row.summary)
    .bind(&row.category)
    .bind(row.creator_id)
    .bind(created_at)
    .bind(row.updated_at.unwrap_or(created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_permission(conn: &mut SqliteConnection, row: &PermissionRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO permissions (collection_id, role_id, read, write) VALUES (?, ?, ?, ?)",
    )
    .bind(row.collection_id)
    .bind(row.role_id)
    .bind(row.read || row.write)
    .bind(row.write)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_document(
    conn: &mut SqliteConnection,
    row: &DocumentRow,
    loaded_at: DateTime<Utc>,
) -> Result<i64> {
    let created_at = row.created_at.unwrap_or(loaded_at);
    let status = row.status.unwrap_or(DocumentStatus::Pending);
    let id = sqlx::query(
        "INSERT INTO documents (id, collection_id, title, file_name, content_type, content_hash,
                                source_url, status, error_message, uploader_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(row.id)
    .bind(row.collection_id)
    .bind(&row.title)
    .bind(&row.file_name)
    .bind(&row.content_type)
    .bind(&row.content_hash)
    .bind(&row.source_url)
    .bind(status.as_str())
    .bind(&row.error_message)
    .bind(row.uploader_id)
    .bind(created_at)
    .bind(row.updated_at.unwrap_or(created_at))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(id)
}

async fn insert_entity(
    conn: &mut SqliteConnection,
    row: &EntityRow,
    loaded_at: DateTime<Utc>,
) -> Result<()> {
    if row.schema.trim().is_empty() {
        return Err(StoreError::validation(format!("entity {} has no schema", row.id)));
    }
    let created_at = row.created_at.unwrap_or(loaded_at);
    sqlx::query(
        "INSERT INTO entities (id, collection_id, schema, properties, document_id, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(row.collection_id)
    .bind(&row.schema)
    .bind(serde_json::to_string(&row.properties)?)
    .bind(row.document_id)
    .bind(created_at)
    .bind(row.updated_at.unwrap_or(created_at))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_record(conn: &mut SqliteConnection, row: &RecordRow) -> Result<()> {
    sqlx::query(
        "INSERT INTO records (id, document_id, collection_id, idx, text) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(RecordDocument::record_id(row.document_id, row.index))
    .bind(row.document_id)
    .bind(row.collection_id)
    .bind(row.index)
    .bind(&row.text)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
