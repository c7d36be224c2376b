//! The ingestion loop.
//!
//! Every iteration lists the spool root, runs each file through
//!
//! ```text
//! parse → normalize tree names → externalize log excerpts → validate → upgrade → load
//! ```
//!
//! strictly one file at a time, then moves the file to its terminal place.

use crate::blob::BlobStore;
use crate::error::{FileError, TransitionError};
use crate::lifecycle::{SpoolEvent, SpoolState};
use crate::logexcerpt::{ExternalizeReport, LogExcerptExternalizer};
use crate::schema::{IoSchema, SchemaService};
use crate::spool::{SpoolDirs, SpoolFile};
use crate::submission::Submission;
use crate::trees::TreeNameMap;
use kcidb_store::{LoadReport, StoreClient};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Outcome counts of one or more iterations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub archived: usize,
    pub failed: usize,
    /// Zero-byte files removed; neither success nor failure
    pub deleted: usize,
}

impl IngestStats {
    pub fn record(&mut self, state: SpoolState) {
        match state {
            SpoolState::Archived => self.archived += 1,
            SpoolState::Deleted => self.deleted += 1,
            _ => self.failed += 1,
        }
    }

    pub fn merge(self, other: IngestStats) -> IngestStats {
        IngestStats {
            archived: self.archived + other.archived,
            failed: self.failed + other.failed,
            deleted: self.deleted + other.deleted,
        }
    }

    /// Files that went through the pipeline.
    pub fn processed(&self) -> usize {
        self.archived + self.failed
    }
}

/// What the pipeline did to one accepted submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineReport {
    pub tree_names: usize,
    pub excerpts: ExternalizeReport,
    pub loaded: LoadReport,
}

pub struct Ingester {
    spool: SpoolDirs,
    trees: TreeNameMap,
    externalizer: LogExcerptExternalizer,
    schema: Box<dyn SchemaService>,
    store: Box<dyn StoreClient>,
    poll_interval: Duration,
}

impl Ingester {
    /// An ingester without blob storage, using [`IoSchema`] and the default
    /// poll interval.
    pub fn new(spool: SpoolDirs, trees: TreeNameMap, store: Box<dyn StoreClient>) -> Self {
        Self {
            spool,
            trees,
            externalizer: LogExcerptExternalizer::new(None),
            schema: Box::new(IoSchema::default()),
            store,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_blob_store(mut self, blob_store: Option<Arc<dyn BlobStore>>) -> Self {
        self.externalizer = LogExcerptExternalizer::new(blob_store);
        self
    }

    pub fn with_schema(mut self, schema: Box<dyn SchemaService>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn spool(&self) -> &SpoolDirs {
        &self.spool
    }

    /// Poll the spool until `shutdown` resolves.
    ///
    /// Shutdown is only observed between iterations, a file in flight is
    /// always finished. Returns the totals over every iteration.
    pub async fn run<F>(&self, shutdown: F) -> IngestStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            spool = %self.spool.root().display(),
            store = %self.store.describe(),
            trees = self.trees.len(),
            externalize = self.externalizer.is_enabled(),
            "Starting ingestion loop"
        );

        let mut totals = IngestStats::default();
        loop {
            totals = totals.merge(self.ingest_once().await);

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(
                        archived = totals.archived,
                        failed = totals.failed,
                        deleted = totals.deleted,
                        "Shutdown requested, stopping ingestion loop"
                    );
                    break;
                }

                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        totals
    }

    /// One pass over the files currently in the spool root.
    pub async fn ingest_once(&self) -> IngestStats {
        let files = match self.spool.pending_files() {
            Ok(files) => files,
            Err(e) => {
                error!(error = %e, "Failed to list spool directory, skipping iteration");
                return IngestStats::default();
            }
        };

        let mut stats = IngestStats::default();
        for file in &files {
            let state = match self.process_file(file).await {
                Ok(state) => state,
                Err(e) => {
                    error!(file = %file.name, error = %e, "Spool lifecycle violated");
                    stats.failed += 1;
                    continue;
                }
            };

            match self.spool.apply(file, state) {
                Ok(_) => stats.record(state),
                // Still in the root, picked up again next iteration.
                Err(e) => {
                    error!(file = %file.name, state = %state, error = %e, "Failed to move spool file");
                    stats.failed += 1;
                }
            }
        }

        if stats.processed() > 0 {
            info!(
                "Processed {} files: {} succeeded, {} failed",
                stats.processed(),
                stats.archived,
                stats.failed
            );
        }
        if stats.deleted > 0 {
            debug!(deleted = stats.deleted, "Removed empty files");
        }
        stats
    }

    /// Drive one file to a terminal state. The filesystem move is left to
    /// the caller.
    pub async fn process_file(&self, file: &SpoolFile) -> Result<SpoolState, TransitionError> {
        let processing = SpoolState::Pending.transition(SpoolEvent::Opened)?;
        let started = Instant::now();

        let event = match tokio::fs::read(&file.path).await {
            Ok(bytes) if bytes.is_empty() => {
                debug!(file = %file.name, "Empty file");
                SpoolEvent::Empty
            }
            Ok(bytes) => match self.run_pipeline(&bytes).await {
                Ok(report) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    let kb = bytes.len() as f64 / 1024.0;
                    debug!(
                        file = %file.name,
                        size_kb = %format!("{kb:.2}"),
                        speed_kb_s = %format!("{:.2}", if elapsed > 0.0 { kb / elapsed } else { 0.0 }),
                        "Ingested file"
                    );
                    info!(
                        file = %file.name,
                        objects = report.loaded.total(),
                        tree_names = report.tree_names,
                        excerpts_uploaded = report.excerpts.externalized,
                        "File ingested"
                    );
                    SpoolEvent::Ingested
                }
                Err(e) => {
                    error!(file = %file.name, stage = e.stage(), error = %e, "Failed to ingest file");
                    SpoolEvent::Rejected
                }
            },
            Err(e) => {
                let e = FileError::Read(e);
                error!(file = %file.name, stage = e.stage(), error = %e, "Failed to ingest file");
                SpoolEvent::Rejected
            }
        };

        processing.transition(event)
    }

    /// The per-document pipeline. Nothing touches the filesystem here.
    pub async fn run_pipeline(&self, bytes: &[u8]) -> Result<PipelineReport, FileError> {
        let mut submission = Submission::parse(bytes).map_err(FileError::Parse)?;

        let tree_names = self
            .trees
            .normalize(&mut submission)
            .map_err(FileError::Normalize)?;

        let excerpts = self
            .externalizer
            .externalize(&mut submission)
            .await
            .map_err(FileError::Externalize)?;

        let doc = submission.into_value();
        self.schema.validate(&doc).map_err(FileError::Validate)?;
        let doc = self.schema.upgrade(doc).map_err(FileError::Upgrade)?;

        let loaded = self.store.load(&doc).await.map_err(FileError::Load)?;
        Ok(PipelineReport {
            tree_names,
            excerpts,
            loaded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kcidb_store::MemoryStore;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn valid_doc() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "version": {"major": 5, "minor": 3},
            "checkouts": [{"id": "lab:c1", "origin": "lab"}]
        }))
        .unwrap()
    }

    fn setup() -> (TempDir, Ingester, MemoryStore) {
        let temp = TempDir::new().unwrap();
        let spool = SpoolDirs::verify(temp.path()).unwrap();
        let store = MemoryStore::new();
        let ingester = Ingester::new(spool, TreeNameMap::default(), Box::new(store.clone()));
        (temp, ingester, store)
    }

    #[test]
    fn test_stats_merge_and_record() {
        let mut a = IngestStats::default();
        a.record(SpoolState::Archived);
        a.record(SpoolState::Failed);
        let mut b = IngestStats::default();
        b.record(SpoolState::Deleted);
        b.record(SpoolState::Archived);

        let merged = a.merge(b);
        assert_eq!(
            merged,
            IngestStats {
                archived: 2,
                failed: 1,
                deleted: 1
            }
        );
        assert_eq!(merged.processed(), 3);
        assert_eq!(merged, b.merge(a));
        assert_eq!(a.merge(IngestStats::default()), a);
    }

    #[tokio::test]
    async fn test_process_file_outcomes() {
        let (temp, ingester, _store) = setup();
        fs::write(temp.path().join("ok.json"), valid_doc()).unwrap();
        fs::write(temp.path().join("bad.json"), b"{not json").unwrap();
        fs::write(temp.path().join("empty.json"), b"").unwrap();

        for file in ingester.spool().pending_files().unwrap() {
            let expected = match file.name.as_str() {
                "ok.json" => SpoolState::Archived,
                "bad.json" => SpoolState::Failed,
                _ => SpoolState::Deleted,
            };
            assert_eq!(ingester.process_file(&file).await, Ok(expected), "{}", file.name);
            // Nothing moves until the state is applied.
            assert!(file.path.exists());
        }
    }

    #[tokio::test]
    async fn test_pipeline_error_stages() {
        let (_temp, ingester, store) = setup();
        // Never contacted, only enables the externalization stage.
        let blob: Arc<dyn BlobStore> =
            Arc::new(crate::blob::HttpBlobStore::new("http://127.0.0.1:9", "token").unwrap());
        let ingester = ingester.with_blob_store(Some(blob));

        let err = ingester.run_pipeline(b"[]").await.unwrap_err();
        assert_eq!(err.stage(), "parse");

        let err = ingester
            .run_pipeline(br#"{"version": {"major": 5, "minor": 3}, "checkouts": 1}"#)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "normalize");

        let err = ingester
            .run_pipeline(br#"{"version": {"major": 5, "minor": 3}, "builds": 1}"#)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "externalize");

        let err = ingester
            .run_pipeline(br#"{"version": {"major": 7, "minor": 0}}"#)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "validate");

        store.reject_loads("duplicate key");
        let err = ingester.run_pipeline(&valid_doc()).await.unwrap_err();
        assert_eq!(err.stage(), "load");
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn test_pipeline_loads_upgraded_document() {
        let (_temp, ingester, store) = setup();
        let doc = br#"{"version": {"major": 4, "minor": 1}, "checkouts": [{"id": "lab:c1", "origin": "lab"}]}"#;

        let report = ingester.run_pipeline(doc).await.unwrap();
        assert_eq!(report.loaded.checkouts, 1);
        assert_eq!(store.documents()[0]["version"], json!({"major": 5, "minor": 3}));
    }

    #[tokio::test]
    async fn test_ingest_once_counts() {
        let (temp, ingester, _store) = setup();
        fs::write(temp.path().join("a.json"), valid_doc()).unwrap();
        fs::write(temp.path().join("b.json"), valid_doc()).unwrap();
        fs::write(temp.path().join("c.json"), b"nope").unwrap();
        fs::write(temp.path().join("d.json"), b"").unwrap();

        let stats = ingester.ingest_once().await;
        assert_eq!(
            stats,
            IngestStats {
                archived: 2,
                failed: 1,
                deleted: 1
            }
        );
        assert!(ingester.spool().pending_files().unwrap().is_empty());
        assert_eq!(ingester.ingest_once().await, IngestStats::default());
    }

    #[tokio::test]
    async fn test_ingest_once_survives_missing_root() {
        let (temp, ingester, _store) = setup();
        fs::remove_dir_all(temp.path().join("archive")).unwrap();
        fs::remove_dir_all(temp.path().join("failed")).unwrap();
        fs::remove_dir(temp.path()).unwrap();

        assert_eq!(ingester.ingest_once().await, IngestStats::default());
    }

    #[tokio::test]
    async fn test_failed_move_is_retried() {
        let (temp, ingester, store) = setup();
        fs::write(temp.path().join("a.json"), valid_doc()).unwrap();
        fs::remove_dir(temp.path().join("archive")).unwrap();

        let stats = ingester.ingest_once().await;
        assert_eq!(stats.failed, 1);
        assert!(temp.path().join("a.json").exists());

        fs::create_dir(temp.path().join("archive")).unwrap();
        let stats = ingester.ingest_once().await;
        assert_eq!(stats.archived, 1);
        assert!(temp.path().join("archive/a.json").exists());
        // Loaded once per attempt.
        assert_eq!(store.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (temp, ingester, _store) = setup();
        fs::write(temp.path().join("a.json"), valid_doc()).unwrap();
        let ingester = ingester.with_poll_interval(Duration::from_secs(3600));

        let totals = ingester.run(async {}).await;
        assert_eq!(totals.archived, 1);
    }
}
