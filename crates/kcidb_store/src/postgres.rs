//! PostgreSQL store.

use crate::error::{Result, StoreError};
use crate::objects::{object_rows, LoadReport, ObjectKind};
use crate::schema::{create_table_sql, upsert_sql, Dialect};
use crate::target::PgTarget;
use crate::StoreClient;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

/// PostgreSQL-backed store over one long-lived connection.
pub struct PgStore {
    pool: PgPool,
    description: String,
}

impl PgStore {
    /// Connect and create missing tables.
    pub async fn connect(target: &PgTarget, password: Option<&str>) -> Result<Self> {
        let options = target.connect_options(password)?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(format!("{target}: {e}")))?;

        let store = Self {
            pool,
            description: target.to_string(),
        };
        store.init().await?;
        info!(store = %store.description, "Connected to PostgreSQL store");
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        for kind in ObjectKind::ALL {
            sqlx::query(&create_table_sql(kind, Dialect::Postgres))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for PgStore {
    fn describe(&self) -> String {
        self.description.clone()
    }

    async fn load(&self, doc: &Value) -> Result<LoadReport> {
        let rows = object_rows(doc)?;
        let now = chrono::Utc::now();
        let mut tx = self.pool.begin().await.map_err(StoreError::from_write)?;

        for row in &rows {
            let sql = upsert_sql(row.kind, Dialect::Postgres);
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
        debug!(rows = report.total(), "Loaded submission into PostgreSQL");
        Ok(report)
    }
}
