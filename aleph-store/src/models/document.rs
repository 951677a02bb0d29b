//! Stored documents and their processing status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use aleph_index_shared::DocumentStatus;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: i64,
    pub collection_id: i64,
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Archive key of the content, when it was uploaded.
    pub content_hash: Option<String>,
    pub source_url: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub uploader_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewDocument {
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
    #[serde(default)]
    pub uploader_id: Option<i64>,
}

const COLUMNS: &str = "id, collection_id, title, file_name, content_type, content_hash, \
                       source_url, status, error_message, uploader_id, created_at, updated_at";

impl Document {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(Self {
            id: row.try_get("id")?,
            collection_id: row.try_get("collection_id")?,
            title: row.try_get("title")?,
            file_name: row.try_get("file_name")?,
            content_type: row.try_get("content_type")?,
            content_hash: row.try_get("content_hash")?,
            source_url: row.try_get("source_url")?,
            status: status.parse()?,
            error_message: row.try_get("error_message")?,
            uploader_id: row.try_get("uploader_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Display title, falling back to the file name.
    pub fn display_title(&self) -> Option<&str> {
        self.title.as_deref().or(self.file_name.as_deref())
    }

    pub async fn create(conn: &mut SqliteConnection, new: &NewDocument) -> Result<Self> {
        let now = Utc::now();
        Self::insert(conn, new, DocumentStatus::Pending, now, now).await
    }

    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        new: &NewDocument,
        status: DocumentStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let id = sqlx::query(
            "INSERT INTO documents (collection_id, title, file_name, content_type, content_hash,
                                    source_url, status, uploader_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new.collection_id)
        .bind(&new.title)
        .bind(&new.file_name)
        .bind(&new.content_type)
        .bind(&new.content_hash)
        .bind(&new.source_url)
        .bind(status.as_str())
        .bind(new.uploader_id)
        .bind(created_at)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        Self::by_id(conn, id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("document {}", id)))
    }

    pub async fn by_id(conn: &mut SqliteConnection, id: i64) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    /// Documents ordered by id, optionally limited to one collection.
    pub async fn all(conn: &mut SqliteConnection, collection_id: Option<i64>) -> Result<Vec<Self>> {
        let rows = match collection_id {
            Some(collection_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM documents WHERE collection_id = ? ORDER BY id",
                    COLUMNS
                ))
                .bind(collection_id)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {} FROM documents ORDER BY id", COLUMNS))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };
        rows.iter().map(Self::from_row).collect()
    }

    pub async fn ids(conn: &mut SqliteConnection, collection_id: Option<i64>) -> Result<Vec<i64>> {
        let ids = match collection_id {
            Some(collection_id) => {
                sqlx::query_scalar("SELECT id FROM documents WHERE collection_id = ? ORDER BY id")
                    .bind(collection_id)
                    .fetch_all(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT id FROM documents ORDER BY id")
                    .fetch_all(&mut *conn)
                    .await?
            }
        };
        Ok(ids)
    }

    /// Move a document into `processing` unless it is already there.
    ///
    /// The check and the update are one statement, so two callers cannot
    /// both claim the same document. Returns whether this call claimed it.
    pub async fn claim_for_processing(conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let updated = sqlx::query(
            "UPDATE documents SET status = 'processing', error_message = NULL, updated_at = ?
             WHERE id = ? AND status != 'processing'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    /// Point the document at new content and queue it for processing again.
    pub async fn update_content(
        conn: &mut SqliteConnection,
        id: i64,
        content_hash: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE documents SET content_hash = ?, status = 'pending', error_message = NULL,
                                  updated_at = ?
             WHERE id = ?",
        )
        .bind(content_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(format!("document {}", id)));
        }
        Ok(())
    }

    pub async fn set_status(
        conn: &mut SqliteConnection,
        id: i64,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE documents SET status = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(format!("document {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collection::{Collection, NewCollection};
    use crate::test_support::memory_store;

    async fn setup() -> (crate::Store, i64) {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();
        let collection = Collection::create(&mut conn, &NewCollection::new("c", "C"), None)
            .await
            .unwrap();
        drop(conn);
        (store, collection.id)
    }

    #[tokio::test]
    async fn test_new_document_is_pending() {
        let (store, collection_id) = setup().await;
        let mut conn = store.acquire().await.unwrap();

        let doc = Document::create(
            &mut conn,
            &NewDocument {
                collection_id,
                file_name: Some("memo.txt".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(doc.status, DocumentStatus::Pending);
        assert_eq!(doc.display_title(), Some("memo.txt"));
        assert_eq!(Document::ids(&mut conn, Some(collection_id)).await.unwrap(), vec![doc.id]);
        assert!(Document::ids(&mut conn, Some(collection_id + 1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let (store, collection_id) = setup().await;
        let mut conn = store.acquire().await.unwrap();
        let doc = Document::create(
            &mut conn,
            &NewDocument {
                collection_id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(Document::claim_for_processing(&mut conn, doc.id).await.unwrap());
        assert!(!Document::claim_for_processing(&mut conn, doc.id).await.unwrap());

        Document::set_status(&mut conn, doc.id, DocumentStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let failed = Document::by_id(&mut conn, doc.id).await.unwrap().unwrap();
        assert_eq!(failed.status, DocumentStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));

        assert!(Document::claim_for_processing(&mut conn, doc.id).await.unwrap());
        let claimed = Document::by_id(&mut conn, doc.id).await.unwrap().unwrap();
        assert!(claimed.error_message.is_none());
    }

    #[tokio::test]
    async fn test_collection_status_counts() {
        let (store, collection_id) = setup().await;
        let mut conn = store.acquire().await.unwrap();
        let new = NewDocument {
            collection_id,
            ..Default::default()
        };
        let a = Document::create(&mut conn, &new).await.unwrap();
        let b = Document::create(&mut conn, &new).await.unwrap();
        Document::create(&mut conn, &new).await.unwrap();
        Document::set_status(&mut conn, a.id, DocumentStatus::Done, None)
            .await
            .unwrap();
        Document::claim_for_processing(&mut conn, b.id).await.unwrap();

        let status = Collection::status(&mut conn, collection_id).await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.running, 1);
        assert_eq!(status.done, 1);
        assert_eq!(status.failed, 0);
        assert_eq!(status.total(), 3);
    }

    #[tokio::test]
    async fn test_cascade_delete_from_collection() {
        let (store, collection_id) = setup().await;
        let mut conn = store.acquire().await.unwrap();
        Document::create(
            &mut conn,
            &NewDocument {
                collection_id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(Collection::delete(&mut conn, collection_id).await.unwrap());
        assert!(Document::all(&mut conn, None).await.unwrap().is_empty());
    }
}
