//! SQLite store for local runs.

use crate::error::{Result, StoreError};
use crate::objects::{object_rows, LoadReport, ObjectKind};
use crate::schema::{create_table_sql, upsert_sql, Dialect};
use crate::StoreClient;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
    description: String,
}

impl SqliteStore {
    /// Open or create the database file and its tables.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Connection(format!("{}: {e}", parent.display())))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {e}", path.display())))?;

        let store = Self {
            pool,
            description: format!("sqlite:{}", path.display()),
        };
        store.init().await?;
        info!(store = %store.description, "Opened SQLite store");
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        for kind in ObjectKind::ALL {
            sqlx::query(&create_table_sql(kind, Dialect::Sqlite))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    /// Stored JSON object for `id` in `kind`'s table (latest version for issues).
    pub async fn fetch(&self, kind: ObjectKind, id: &str) -> Result<Option<Value>> {
        let order = if kind.is_versioned() { " ORDER BY version DESC" } else { "" };
        let sql = format!(
            "SELECT data FROM {} WHERE id = ?{} LIMIT 1",
            kind.collection(),
            order
        );
        let row: Option<(Json<Value>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(Json(data),)| data))
    }

    /// Number of rows in `kind`'s table.
    pub async fn count(&self, kind: ObjectKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", kind.collection());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }
}

#[async_trait]
impl StoreClient for SqliteStore {
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn load(&self, doc: &Value) -> Result<LoadReport> {
        let rows = object_rows(doc)?;
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from_write)?;

        for row in &rows {
            let sql = upsert_sql(row.kind, Dialect::Sqlite);
            let mut query = sqlx::query(&sql).bind(row.id);
            if let Some(version) = row.version {
                query = query.bind(version);
            }
            query
                .bind(row.origin)
                .bind(Json(row.data))
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_write)?;
        }

        tx.commit().await.map_err(StoreError::from_write)?;

        let report = LoadReport::from_rows(&rows);
        debug!(rows = report.total(), "Loaded submission into SQLite");
        Ok(report)
    }
}
