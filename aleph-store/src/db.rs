//! Connection pool and schema lifecycle.

use std::str::FromStr;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::schema::{CREATE_STATEMENTS, TABLES};

/// Handle to the relational store. Cheap to clone.
///
/// An in-memory database exists only on its connection, so for those the
/// pool holds exactly one connection that is never recycled. Callers must
/// not acquire a second connection while holding a transaction.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = if config.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .connect_with(options.journal_mode(sqlx::sqlite::SqliteJournalMode::Wal))
                .await?
        };

        info!(url = %config.url, "Connected to store");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Create every table that does not exist yet.
    pub async fn create_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in CREATE_STATEMENTS {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        debug!("Created store schema");
        Ok(())
    }

    /// Drop every table, children first.
    pub async fn drop_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in TABLES.iter().rev() {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Dropped store schema");
        Ok(())
    }

    /// Drop and recreate the schema.
    pub async fn reset(&self) -> Result<()> {
        self.drop_all().await?;
        self.create_all().await
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::memory_store;
    use sqlx::Row;

    #[tokio::test]
    async fn test_reset_empties_tables() {
        let store = memory_store().await;
        sqlx::query(
            "INSERT INTO roles (foreign_id, type, name, created_at, updated_at)
             VALUES ('x', 'user', 'X', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
        )
        .execute(store.pool())
        .await
        .unwrap();

        store.reset().await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n FROM roles")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 0);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let store = memory_store().await;
        let result = sqlx::query(
            "INSERT INTO permissions (collection_id, role_id, read, write) VALUES (99, 99, 1, 0)",
        )
        .execute(store.pool())
        .await;
        assert!(result.is_err());
    }
}
