//! Records: the extracted text units of a processed document.

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use aleph_index_shared::RecordDocument;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub id: String,
    pub document_id: i64,
    pub collection_id: i64,
    pub index: i64,
    pub text: String,
}

/// Result of replacing a document's records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplacedRecords {
    pub records: Vec<Record>,
    /// Ids that existed before and are gone now.
    pub removed: Vec<String>,
}

const COLUMNS: &str = "id, document_id, collection_id, idx, text";

impl Record {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            document_id: row.try_get("document_id")?,
            collection_id: row.try_get("collection_id")?,
            index: row.try_get("idx")?,
            text: row.try_get("text")?,
        })
    }

    pub(crate) async fn insert(conn: &mut SqliteConnection, record: &Record) -> Result<()> {
        sqlx::query(
            "INSERT INTO records (id, document_id, collection_id, idx, text) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(record.document_id)
        .bind(record.collection_id)
        .bind(record.index)
        .bind(&record.text)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn for_document(conn: &mut SqliteConnection, document_id: i64) -> Result<Vec<Self>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM records WHERE document_id = ? ORDER BY idx",
            COLUMNS
        ))
        .bind(document_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(Self::from_row).collect()
    }

    /// Records ordered by document and position, optionally for one collection.
    pub async fn all(conn: &mut SqliteConnection, collection_id: Option<i64>) -> Result<Vec<Self>> {
        let rows = match collection_id {
            Some(collection_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM records WHERE collection_id = ? ORDER BY document_id, idx",
                    COLUMNS
                ))
                .bind(collection_id)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM records ORDER BY document_id, idx",
                    COLUMNS
                ))
                .fetch_all(&mut *conn)
                .await?
            }
        };
        rows.iter().map(Self::from_row).collect()
    }

    /// Delete every record of a document and insert `texts` in order.
    ///
    /// Run inside a transaction: a reader never sees a half-replaced set.
    pub async fn replace_for_document(
        conn: &mut SqliteConnection,
        document_id: i64,
        collection_id: i64,
        texts: &[String],
    ) -> Result<ReplacedRecords> {
        let previous: Vec<String> =
            sqlx::query_scalar("SELECT id FROM records WHERE document_id = ? ORDER BY idx")
                .bind(document_id)
                .fetch_all(&mut *conn)
                .await?;

        sqlx::query("DELETE FROM records WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *conn)
            .await?;

        let mut records = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            let index = index as i64;
            let record = Record {
                id: RecordDocument::record_id(document_id, index),
                document_id,
                collection_id,
                index,
                text: text.clone(),
            };
            Self::insert(conn, &record).await?;
            records.push(record);
        }

        let removed = previous
            .into_iter()
            .filter(|id| !records.iter().any(|r| &r.id == id))
            .collect();
        Ok(ReplacedRecords { records, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::collection::{Collection, NewCollection};
    use crate::models::document::{Document, NewDocument};
    use crate::test_support::memory_store;

    #[tokio::test]
    async fn test_replace_reports_removed_ids() {
        let store = memory_store().await;
        let mut conn = store.acquire().await.unwrap();
        let collection = Collection::create(&mut conn, &NewCollection::new("c", "C"), None)
            .await
            .unwrap();
        let doc = Document::create(
            &mut conn,
            &NewDocument {
                collection_id: collection.id,
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let texts: Vec<String> = ["one", "two", "three"].iter().map(|s| s.to_string()).collect();
        let first = Record::replace_for_document(&mut conn, doc.id, collection.id, &texts)
            .await
            .unwrap();
        assert_eq!(first.records.len(), 3);
        assert!(first.removed.is_empty());

        let again = Record::replace_for_document(&mut conn, doc.id, collection.id, &texts[..1])
            .await
            .unwrap();
        assert_eq!(
            again.removed,
            vec![
                RecordDocument::record_id(doc.id, 1),
                RecordDocument::record_id(doc.id, 2)
            ]
        );

        let stored = Record::for_document(&mut conn, doc.id).await.unwrap();
        assert_eq!(stored, again.records);
        assert_eq!(stored[0].text, "one");
    }
}
