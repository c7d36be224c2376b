//! Error taxonomy of the ingester.
//!
//! - [`ConfigError`]: fatal, raised before the ingestion loop starts.
//! - [`UploadError`]: recovered locally, the log excerpt stays inline.
//! - [`FileError`]: one file failed, it is quarantined and the loop goes on.
//! - [`SpoolError`]: a rename/remove/listing failed, logged and retried on the
//!   next iteration.

use crate::lifecycle::{SpoolEvent, SpoolState};
use kcidb_store::StoreError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Startup configuration errors. Any of these aborts the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} environment variable not set")]
    MissingCredential { name: &'static str },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Directory {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read trees file {path}: {source}")]
    TreesRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid trees file {path}: {message}")]
    TreesFormat { path: PathBuf, message: String },

    #[error("Invalid storage URL '{0}'")]
    StorageUrl(String),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),
}

/// Filesystem errors while moving files through the spool.
#[derive(Error, Debug)]
pub enum SpoolError {
    #[error("Failed to list spool directory {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is not a terminal spool state")]
    NotTerminal(SpoolState),
}

/// Rejected state machine step.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition: {event:?} in state {state}")]
pub struct TransitionError {
    pub state: SpoolState,
    pub event: SpoolEvent,
}

/// Structural problems with a submission document.
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Submission is not a JSON object")]
    NotAnObject,

    #[error("{collection} is not an array of objects")]
    NotAnArray { collection: &'static str },
}

/// Blob storage upload failures. Never fatal.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Upload request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Schema validation/upgrade failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("{path}: {message}")]
    Invalid { path: String, message: String },

    #[error("Unsupported schema version {major}.{minor}")]
    UnsupportedVersion { major: i64, minor: i64 },
}

impl SchemaError {
    pub fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Why a single spool file was quarantined.
#[derive(Error, Debug)]
pub enum FileError {
    #[error("Failed to read file: {0}")]
    Read(#[source] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] SubmissionError),

    #[error("Tree name normalization failed: {0}")]
    Normalize(#[source] SubmissionError),

    #[error("Log excerpt externalization failed: {0}")]
    Externalize(#[source] SubmissionError),

    #[error("Schema validation failed: {0}")]
    Validate(#[source] SchemaError),

    #[error("Schema upgrade failed: {0}")]
    Upgrade(#[source] SchemaError),

    #[error("Store load failed: {0}")]
    Load(#[source] StoreError),
}

impl FileError {
    /// Pipeline stage the error came from, for log fields.
    pub fn stage(&self) -> &'static str {
        match self {
            FileError::Read(_) => "read",
            FileError::Parse(_) => "parse",
            FileError::Normalize(_) => "normalize",
            FileError::Externalize(_) => "externalize",
            FileError::Validate(_) => "validate",
            FileError::Upgrade(_) => "upgrade",
            FileError::Load(_) => "load",
        }
    }
}
