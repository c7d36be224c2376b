//! Backing store for ingested KCIDB submissions.
//!
//! The ingester hands every validated, upgraded document to a [`StoreClient`].
//! Each collection (checkouts, builds, tests, issues, incidents) maps to one
//! table; a document is written in a single transaction.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kcidb_store::{connect, StoreUrl};
//!
//! let url = StoreUrl::parse("postgresql:host=localhost dbname=kcidb user=kcidb")?;
//! let store = connect(&url, Some(&password)).await?;
//! store.load(&document).await?;
//! ```

mod error;
pub mod memory;
mod objects;
pub mod postgres;
mod schema;
pub mod sqlite;
mod target;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use objects::{object_rows, LoadReport, ObjectKind, ObjectRow};
pub use postgres::PgStore;
pub use sqlite::SqliteStore;
pub use target::{PgParams, PgTarget, StoreUrl};

use async_trait::async_trait;
use serde_json::Value;

/// Write path for submissions.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Human readable target, without credentials.
    fn describe(&self) -> String;

    /// Persist every object of `doc`.
    ///
    /// Fails on connectivity problems or constraint violations; nothing is
    /// committed in that case.
    async fn load(&self, doc: &Value) -> Result<LoadReport>;
}

/// Open the store behind `url`.
///
/// `password` is the database credential; it is applied to PostgreSQL targets
/// that do not embed one.
pub async fn connect(url: &StoreUrl, password: Option<&str>) -> Result<Box<dyn StoreClient>> {
    match url {
        StoreUrl::Postgres(target) => Ok(Box::new(PgStore::connect(target, password).await?)),
        StoreUrl::Sqlite(path) => Ok(Box::new(SqliteStore::open(path).await?)),
        StoreUrl::Memory => Ok(Box::new(MemoryStore::new())),
    }
}
