//! Startup configuration.
//!
//! Flags come from the command line or their environment variables;
//! credentials only ever come from the environment.

use crate::error::ConfigError;
use crate::ingester::DEFAULT_POLL_INTERVAL;
use crate::trees::DEFAULT_TREES_FILE;
use clap::Parser;
use kcidb_store::StoreUrl;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "postgresql:dbname=kcidb user=kcidb host=localhost port=5432";
pub const DEFAULT_STORAGE_URL: &str = "https://files-staging.kernelci.org";

/// Database target overrides, highest priority first.
pub const DATABASE_ENV: [&str; 2] = ["PG_DSN", "PG_URI"];
pub const PASSWORD_ENV: &str = "POSTGRES_PASSWORD";
pub const STORAGE_TOKEN_ENV: &str = "STORAGE_TOKEN";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "kcidb-ingester",
    version,
    about = "Ingest KCIDB submissions dropped into a spool directory"
)]
pub struct Args {
    /// Spool directory to watch
    #[arg(long, env = "KCIDB_SPOOL_DIR")]
    pub spool_dir: PathBuf,

    /// YAML file mapping repository URLs to tree names
    #[arg(long, env = "KCIDB_TREES_FILE", default_value = DEFAULT_TREES_FILE)]
    pub trees_file: PathBuf,

    /// Store target (falls back to PG_DSN, then PG_URI)
    #[arg(long)]
    pub database: Option<String>,

    /// Blob storage base URL for log excerpts
    #[arg(long, env = "STORAGE_URL", default_value = DEFAULT_STORAGE_URL)]
    pub storage_url: String,

    /// Sleep between spool scans, in milliseconds
    #[arg(long, env = "KCIDB_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub poll_interval_ms: u64,

    /// 0 = warnings, 1 = info, 2+ = debug
    #[arg(long, env = "KCIDB_VERBOSE", default_value_t = 0)]
    pub verbose: u8,

    /// Also write rotated log files here
    #[arg(long, env = "KCIDB_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Where and how to upload log excerpts.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub base_url: String,
    pub token: String,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Immutable configuration, built once at startup.
#[derive(Clone)]
pub struct IngesterConfig {
    pub spool_dir: PathBuf,
    pub trees_file: PathBuf,
    pub store_url: StoreUrl,
    pub db_password: Option<String>,
    /// `None` when no storage token is set; excerpts then stay inline.
    pub storage: Option<StorageConfig>,
    pub poll_interval: Duration,
    pub verbose: u8,
    pub log_dir: Option<PathBuf>,
}

impl IngesterConfig {
    /// Build from parsed args and the process environment.
    pub fn from_env(args: Args) -> Result<Self, ConfigError> {
        Self::from_args(args, |name| std::env::var(name).ok())
    }

    /// Build from parsed args and an environment lookup. Empty variables
    /// count as unset.
    pub fn from_args<E>(args: Args, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let database = args
            .database
            .clone()
            .or_else(|| DATABASE_ENV.iter().find_map(|&name| lookup(name)))
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let store_url = StoreUrl::parse(&database)?;

        let db_password = lookup(PASSWORD_ENV);
        if store_url.requires_password() && db_password.is_none() {
            return Err(ConfigError::MissingCredential { name: PASSWORD_ENV });
        }

        let base_url = args.storage_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::StorageUrl(args.storage_url));
        }
        let storage = lookup(STORAGE_TOKEN_ENV).map(|token| StorageConfig { base_url, token });

        Ok(Self {
            spool_dir: args.spool_dir,
            trees_file: args.trees_file,
            store_url,
            db_password,
            storage,
            poll_interval: Duration::from_millis(args.poll_interval_ms),
            verbose: args.verbose,
            log_dir: args.log_dir,
        })
    }
}

impl fmt::Debug for IngesterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngesterConfig")
            .field("spool_dir", &self.spool_dir)
            .field("trees_file", &self.trees_file)
            .field("store_url", &self.store_url)
            .field("db_password", &self.db_password.as_ref().map(|_| "<redacted>"))
            .field("storage", &self.storage)
            .field("poll_interval", &self.poll_interval)
            .field("verbose", &self.verbose)
            .field("log_dir", &self.log_dir)
            .finish()
    }
}
