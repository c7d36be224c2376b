//! KCIDB spool ingester.
//!
//! Producers drop JSON submissions into a spool directory. The ingester
//! polls it, and for every `*.json` file:
//!
//! 1. parses the submission,
//! 2. rewrites checkout tree names from the configured URL map,
//! 3. uploads oversized log excerpts to blob storage and replaces them with
//!    content-addressed URLs,
//! 4. validates and upgrades the document,
//! 5. loads it into the store,
//!
//! then moves the file verbatim into `archive/` or `failed/`. Zero-byte files
//! are removed.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kcidb_ingester::{Ingester, SpoolDirs, TreeNameMap};
//!
//! let spool = SpoolDirs::verify("/var/spool/kcidb")?;
//! let trees = TreeNameMap::load(Path::new("/app/trees.yml"))?;
//! let store = kcidb_store::connect(&url, Some(&password)).await?;
//! let ingester = Ingester::new(spool, trees, store);
//! ingester.run(shutdown).await;
//! ```

pub mod blob;
pub mod config;
pub mod error;
pub mod ingester;
pub mod lifecycle;
pub mod logexcerpt;
pub mod schema;
pub mod spool;
pub mod submission;
pub mod trees;

pub use blob::{BlobStore, HttpBlobStore};
pub use config::{Args, IngesterConfig, StorageConfig};
pub use error::{
    ConfigError, FileError, SchemaError, SpoolError, SubmissionError, TransitionError, UploadError,
};
pub use ingester::{IngestStats, Ingester, PipelineReport};
pub use lifecycle::{SpoolEvent, SpoolState};
pub use logexcerpt::{ExternalizeReport, LogExcerptExternalizer, LOG_EXCERPT_THRESHOLD};
pub use schema::{IoSchema, SchemaService};
pub use spool::{SpoolDirs, SpoolFile};
pub use submission::Submission;
pub use trees::TreeNameMap;
