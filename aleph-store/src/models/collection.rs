//! Collections and their permission grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: i64,
    pub foreign_id: String,
    pub label: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub creator_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewCollection {
    pub foreign_id: String,
    pub label: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl NewCollection {
    pub fn new(foreign_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            foreign_id: foreign_id.into(),
            label: label.into(),
            summary: None,
            category: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// One row of the grant table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Permission {
    pub collection_id: i64,
    pub role_id: i64,
    pub read: bool,
    pub write: bool,
}

/// Role ids allowed to read and write a collection, both ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionAcl {
    pub readers: Vec<i64>,
    pub writers: Vec<i64>,
}

/// Documents of a collection counted by processing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStatus {
    pub pending: i64,
    /// Documents currently in `processing`.
    pub running: i64,
    pub done: i64,
    pub failed: i64,
}

impl CollectionStatus {
    pub fn total(&self) -> i64 {
        self.pending + self.running + self.done + self.failed
    }
}

const COLUMNS: &str = "id, foreign_id, label, summary, category, creator_id, created_at, updated_at";

impl Collection {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            foreign_id: row.try_get("foreign_id")?,
            label: row.try_get("label")?,
            summary: row.try_get("summary")?,
            category: row.try_get("category")?,
            creator_id: row.try_get("creator_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Insert a collection. The creator, if any, is granted read and write.
    pub async fn create(
        conn: &mut SqliteConnection,
        new: &NewCollection,
        creator_id: Option<i64>,
    ) -> Result<Self> {
        if new.foreign_id.trim().is_empty() {
            return Err(StoreError::validation("collection foreign_id is required"));
        }
        let now = Utc::now();
        Self::insert(conn, new, creator_id, now, now).await
    }

    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        new: &NewCollection,
        creator_id: Option<i64>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = sqlx::query(
            "INSERT INTO collections (foreign_id, label, summary, category, creator_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.foreign_id)
        .bind(&new.label)
        .bind(&new.summary)
        .bind(&new.category)
        .bind(creator_id)
        .bind(created_at)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        if let Some(role_id) = creator_id {
            Permission::grant(conn, id, role_id, true, true).await?;
        }

        debug!(collection_id = id, foreign_id = %new.foreign_id, "Created collection");
        Self::by_id(conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("collection {}", id)))
    }

    pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("SELECT {} FROM collections WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn by_foreign_id(
        conn: &mut SqliteConnection,
        foreign_id: &str,
    ) -> Result<Option<Self>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM collections WHERE foreign_id = ?",
            COLUMNS
        ))
        .bind(foreign_id)
        .fetch_optional(&mut *conn)
        .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    pub async fn all(conn: &mut SqliteConnection) -> Result<Vec<Self>> {
        let rows = sqlx::query(&format!("SELECT {} FROM collections ORDER BY id", COLUMNS))
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(Self::from_row).collect()
    }

    pub async fn ids(conn: &mut SqliteConnection) -> Result<Vec<i64>> {
        Ok(sqlx::query_scalar("SELECT id FROM collections ORDER BY id")
            .fetch_all(&mut *conn)
            .await?)
    }

    /// Delete a collection together with everything it owns.
    pub async fn delete(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn acl(conn: &mut SqliteConnection, id: i64) -> Result<CollectionAcl> {
        let readers = sqlx::query_scalar(
            "SELECT role_id FROM permissions WHERE collection_id = ? AND read = 1 ORDER BY role_id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        let writers = sqlx::query_scalar(
            "SELECT role_id FROM permissions WHERE collection_id = ? AND write = 1 ORDER BY role_id",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(CollectionAcl { readers, writers })
    }

    pub async fn count_documents(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE collection_id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?,
        )
    }

    /// Entities stored in their own right; document entities are not counted.
    pub async fn count_entities(conn: &mut SqliteConnection, id: i64) -> Result<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM entities WHERE collection_id = ?")
                .bind(id)
                .fetch_one(&mut *conn)
                .await?,
        )
    }

    pub async fn status(conn: &mut SqliteConnection, id: i64) -> Result<CollectionStatus> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM documents WHERE collection_id = ? GROUP BY status",
        )
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

        let mut status = CollectionStatus::default();
        for row in rows {
            let count: i64 = row.try_get("n")?;
            match row.try_get::<String, _>("status")?.as_str() {
                "pending" => status.pending = count,
                "processing" => status.running = count,
                "done" => status.done = count,
                "failed" => status.failed = count,
                other => {
                    return Err(StoreError::serialization(format!(
                        "unknown document status: {}",
                        other
                    )))
                }
            }
        }
        Ok(status)
    }
}

impl Permission {
    /// Upsert a grant. Granting neither read nor write removes the row.
    ///
    /// Write implies read. Returns the stored permission, or `None` when it
    /// was revoked.
    pub async fn grant(
        conn: &mut SqliteConnection,
        collection_id: i64,
        role_id: i64,
        read: bool,
        write: bool,
    ) -> Result<Option<Self>> {
        let read = read || write;
        if !read {
            sqlx::query("DELETE FROM permissions WHERE collection_id = ? AND role_id = ?")
                .bind(collection_id)
                .bind(role_id)
                .execute(&mut *conn)
                .await?;
            debug!(collection_id, role_id, "Revoked permission");
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO permissions (collection_id, role_id, read, write) VALUES (?, ?, ?, ?)
             ON CONFLICT (collection_id, role_id) DO UPDATE SET read = excluded.read, write = excluded.write",
        )
        .bind(collection_id)
        .bind(role_id)
        .bind(read)
        .bind(write)
        .execute(&mut *conn)
        .await?;
        debug!(collection_id, role_id, read, write, "Granted permission");

        Ok(Some(Self {
            collection_id,
            role_id,
            read,
            write,
        }))
    }

    pub async fn for_collection(
        conn: &mut SqliteConnection,
        collection_id: i64,
    ) -> Result<Vec<Self>> {
        let rows = sqlx::query(
            "SELECT collection_id, role_id, read, write FROM permissions
             WHERE collection_id = ? ORDER BY role_id",
        )
        .bind(collection_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter()
            .map(|row| {
                Ok(Self {
                    collection_id: row.try_get("collection_id")?,
                    role_id: row.try_get("role_id")?,
                    read: row.try_get("read")?,
                    write: row.try_get("write")?,
                })
            })
            .collect()
    }
}
