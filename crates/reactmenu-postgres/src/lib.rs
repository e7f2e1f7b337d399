//! PostgreSQL implementation of the reactmenu owner store.
//!
//! Bots that already run on Postgres can keep their registered-owner list
//! next to the rest of their data instead of in a local file.
//!
//! # Database Schema
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS menu_owners (
//!     owner_id TEXT PRIMARY KEY,
//!     registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```
//!
//! [`PgOwnerStore::migrate`] creates it if missing.
//!
//! # Usage
//!
//! ```rust,ignore
//! use reactmenu_postgres::PgOwnerStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/mydb").await?;
//! let store = PgOwnerStore::new(pool);
//! store.migrate().await?;
//!
//! let dispatcher = Dispatcher::builder(transport, host, Arc::new(store)).build();
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reactmenu::{OwnerId, OwnerRecord, OwnerStore};
use sqlx::{PgPool, Row};
use tracing::info;

/// PostgreSQL owner store.
#[derive(Clone)]
pub struct PgOwnerStore {
    pool: PgPool,
}

impl PgOwnerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `menu_owners` table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS menu_owners (
                owner_id TEXT PRIMARY KEY,
                registered_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("menu_owners table ready");
        Ok(())
    }

    /// Every persisted record, oldest registration first.
    pub async fn records(&self) -> Result<Vec<OwnerRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id, registered_at
            FROM menu_owners
            ORDER BY registered_at ASC, owner_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let owner_id: String = row.get("owner_id");
                let registered_at: DateTime<Utc> = row.get("registered_at");
                OwnerRecord {
                    owner_id: OwnerId::from(owner_id),
                    registered_at,
                }
            })
            .collect())
    }
}

#[async_trait]
impl OwnerStore for PgOwnerStore {
    async fn list(&self) -> Result<Vec<OwnerId>> {
        let rows = sqlx::query(
            r#"
            SELECT owner_id
            FROM menu_owners
            ORDER BY registered_at ASC, owner_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| OwnerId::from(row.get::<String, _>("owner_id")))
            .collect())
    }

    /// Insert `owner`. A duplicate keeps its original registration time.
    async fn add(&self, owner: &OwnerId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO menu_owners (owner_id, registered_at)
            VALUES ($1, $2)
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(owner.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, owner: &OwnerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM menu_owners WHERE owner_id = $1")
            .bind(owner.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
