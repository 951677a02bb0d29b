//! Entities: schema-typed property bags belonging to a collection.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use crate::error::{Result, StoreError};

pub type Properties = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: String,
    pub collection_id: i64,
    pub schema: String,
    pub properties: Properties,
    pub document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewEntity {
    pub id: String,
    pub collection_id: i64,
    pub schema: String,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub document_id: Option<i64>,
}

const COLUMNS: &str = "id, collection_id, schema, properties, document_id, created_at, updated_at";

impl Entity {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let properties: String = row.try_get("properties")?;
        Ok(Self {
            id: row.try_get("id")?,
            collection_id: row.try_get("collection_id")?,
            schema: row.try_get("schema")?,
            properties: serde_json::from_str(&properties)?,
            document_id: row.try_get("document_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// First non-blank `name` property.
    pub fn name(&self) -> Option<&str> {
        self.properties
            .get("name")?
            .iter()
            .map(|v| v.trim())
            .find(|v| !v.is_empty())
    }

    pub async fn create(conn: &mut SqliteConnection, new: &NewEntity) -> Result<Self> {
        let now = Utc::now();
        Self::insert(conn, new, now, now).await
    }

    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        new: &NewEntity,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        if new.id.trim().is_empty() {
            return Err(StoreError::validation("entity id is required"));
        }
        if new.schema.trim().is_empty() {
            return Err(StoreError::validation(format!("entity {} has no schema", new.id)));
        }
        sqlx::query(
            "INSERT INTO entities (id, collection_id, schema, properties, document_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.id)
        .bind(new.collection_id)
        .bind(&new.schema)
        .bind(serde_json::to_string(&new.properties)?)
        .bind(new.document_id)
        .bind(created_at)
        .bind(updated_at)
        .execute(&mut *conn)
        .await?;

        Self::by_id(conn, &new.id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("entity {}", new.id)))
    }

    pub async fn by_id(conn: &mut SqliteConnection, id: &str) -> Result<Option<Self>> {
        let row = sqlx::query(&format!("SELECT {} FROM entities WHERE id = ?", COLUMNS))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        row.as_ref().map(Self::from_row).transpose()
    }

    /// Entities ordered by id, optionally limited to one collection.
    pub async fn all(conn: &mut SqliteConnection, collection_id: Option<i64>) -> Result<Vec<Self>> {
        let rows = match collection_id {
            Some(collection_id) => {
                sqlx::query(&format!(
                    "SELECT {} FROM entities WHERE collection_id = ? ORDER BY id",
                    COLUMNS
                ))
                .bind(collection_id)
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(&format!("SELECT {} FROM entities ORDER BY id", COLUMNS))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };
        rows.iter().map(Self::from_row).collect()
    }

    pub async fn update_properties(
        conn: &mut SqliteConnection,
        id: &str,
        properties: &Properties,
    ) -> Result<()> {
        let updated =
            sqlx::query("UPDATE entities SET properties = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(properties)?)
                .bind(Utc::now())
                .bind(id)
                .execute(&mut *conn)
                .await?
                .rows_affected();
        if updated == 0 {
            return Err(StoreError::not_found(format!("entity {}", id)));
        }
        Ok(())
    }
}
