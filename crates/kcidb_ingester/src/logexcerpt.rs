//! Log excerpt externalization.
//!
//! Oversized `log_excerpt` values of builds and tests are uploaded to blob
//! storage under a path derived from their SHA-256 digest and replaced with a
//! reference URL:
//!
//! ```text
//! {storage}/logexcerpt/{sha256 hex}/logexcerpt.txt
//! ```
//!
//! Identical excerpts always map to the same path. Upload failures keep the
//! excerpt inline.

use crate::blob::BlobStore;
use crate::error::SubmissionError;
use crate::submission::{ObjectKind, Submission};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Excerpts longer than this many bytes are externalized.
pub const LOG_EXCERPT_THRESHOLD: usize = 256;

pub const LOG_EXCERPT_DIR: &str = "logexcerpt";
pub const LOG_EXCERPT_FILE_NAME: &str = "logexcerpt.txt";

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Storage path an excerpt is uploaded to.
pub fn excerpt_path(digest: &str) -> String {
    format!("{LOG_EXCERPT_DIR}/{digest}")
}

/// Reference URL that replaces an externalized excerpt.
pub fn excerpt_reference(base_url: &str, digest: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        excerpt_path(digest),
        LOG_EXCERPT_FILE_NAME
    )
}

/// What one externalization pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalizeReport {
    /// Excerpts replaced by a reference
    pub externalized: usize,
    /// Oversized excerpts kept inline because the upload failed
    pub kept_inline: usize,
    /// No credential configured, nothing was looked at
    pub skipped: bool,
}

pub struct LogExcerptExternalizer {
    blob_store: Option<Arc<dyn BlobStore>>,
    threshold: usize,
    warned_disabled: AtomicBool,
}

impl LogExcerptExternalizer {
    /// `None` disables externalization (no storage token configured).
    pub fn new(blob_store: Option<Arc<dyn BlobStore>>) -> Self {
        Self {
            blob_store,
            threshold: LOG_EXCERPT_THRESHOLD,
            warned_disabled: AtomicBool::new(false),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.blob_store.is_some()
    }

    pub async fn externalize(
        &self,
        submission: &mut Submission,
    ) -> Result<ExternalizeReport, SubmissionError> {
        let Some(blob_store) = self.blob_store.as_deref() else {
            if !self.warned_disabled.swap(true, Ordering::Relaxed) {
                warn!("STORAGE_TOKEN is not set, log excerpts will not be uploaded");
            }
            return Ok(ExternalizeReport {
                skipped: true,
                ..ExternalizeReport::default()
            });
        };

        let mut report = ExternalizeReport::default();
        for kind in [ObjectKind::Build, ObjectKind::Test] {
            for object in submission.objects_mut(kind)? {
                let Some(Value::String(excerpt)) = object.get("log_excerpt") else {
                    continue;
                };
                if excerpt.len() <= self.threshold {
                    continue;
                }

                let id = object
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let digest = sha256_hex(excerpt.as_bytes());
                debug!(
                    kind = %kind,
                    id = %id,
                    hash = %digest,
                    size = excerpt.len(),
                    "Uploading log excerpt"
                );

                match blob_store
                    .upload(excerpt.as_bytes(), &excerpt_path(&digest), LOG_EXCERPT_FILE_NAME)
                    .await
                {
                    Ok(_) => {
                        let reference = excerpt_reference(blob_store.base_url(), &digest);
                        object.insert("log_excerpt".to_string(), Value::String(reference));
                        report.externalized += 1;
                    }
                    Err(e) => {
                        warn!(kind = %kind, id = %id, error = %e, "Failed to upload log excerpt, keeping it inline");
                        report.kept_inline += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}
