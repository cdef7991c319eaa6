//! Configuration module
//!
//! Env-driven configuration for the API, worker, and replication components.
//! Built once at startup with [`Config::from_env`] and injected by value into
//! whatever needs it; no component reads the environment after startup.

use std::env;

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_MAX_FILE_SIZE_BYTES: usize = 50 * 1024 * 1024;
const DEFAULT_SCAN_MAX_RETRIES: i32 = 3;
const DEFAULT_QUEUE_MAX_WORKERS: usize = 4;
const DEFAULT_QUEUE_MAX_DELIVERIES: u32 = 10;
const DEFAULT_CLAMAV_PORT: u16 = 3310;
const DEFAULT_CLAMAV_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REPLICATION_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["pdf", "docx", "xlsx", "png", "jpg", "zip"];

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub server_port: u16,
    pub environment: String,

    /// Root directory of the raw (pending) object store.
    pub raw_store_path: String,
    /// Root directory of the clean (trusted) object store.
    pub clean_store_path: String,

    /// Postgres status store when set; in-memory store otherwise.
    pub database_url: Option<String>,

    // Intake validation
    pub max_file_size_bytes: usize,
    pub allowed_extensions: Vec<String>,

    // ClamAV scan engine
    pub clamav_enabled: bool,
    pub clamav_host: String,
    pub clamav_port: u16,
    pub clamav_timeout_secs: u64,

    /// Scan-engine failures tolerated per upload before terminal FAILED.
    pub scan_max_retries: i32,

    // Event queue
    pub queue_max_workers: usize,
    /// Redelivery cap for infrastructure failures (store unreachable etc.).
    /// The scan retry budget is tracked separately, in the file record.
    pub queue_max_deliveries: u32,

    // DR replication
    pub replication_enabled: bool,
    /// Root directory of the secondary-region clean store.
    pub replica_clean_store_path: Option<String>,
    /// Secondary-region Postgres for record history; in-memory replica
    /// otherwise (useful only for local smoke testing).
    pub replica_database_url: Option<String>,
    pub replication_poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = Config {
            server_port: parse_env("SERVER_PORT", DEFAULT_SERVER_PORT)?,
            environment: env_or("ENVIRONMENT", "development"),
            raw_store_path: env_or("RAW_STORE_PATH", "./data/raw"),
            clean_store_path: env_or("CLEAN_STORE_PATH", "./data/clean"),
            database_url: env::var("DATABASE_URL").ok(),
            max_file_size_bytes: parse_env("MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE_BYTES)?,
            allowed_extensions: parse_extension_list(env::var("ALLOWED_EXTENSIONS").ok()),
            clamav_enabled: parse_env("CLAMAV_ENABLED", false)?,
            clamav_host: env_or("CLAMAV_HOST", "localhost"),
            clamav_port: parse_env("CLAMAV_PORT", DEFAULT_CLAMAV_PORT)?,
            clamav_timeout_secs: parse_env("CLAMAV_TIMEOUT_SECS", DEFAULT_CLAMAV_TIMEOUT_SECS)?,
            scan_max_retries: parse_env("SCAN_MAX_RETRIES", DEFAULT_SCAN_MAX_RETRIES)?,
            queue_max_workers: parse_env("QUEUE_MAX_WORKERS", DEFAULT_QUEUE_MAX_WORKERS)?,
            queue_max_deliveries: parse_env("QUEUE_MAX_DELIVERIES", DEFAULT_QUEUE_MAX_DELIVERIES)?,
            replication_enabled: parse_env("REPLICATION_ENABLED", false)?,
            replica_clean_store_path: env::var("REPLICA_CLEAN_STORE_PATH").ok(),
            replica_database_url: env::var("REPLICA_DATABASE_URL").ok(),
            replication_poll_interval_secs: parse_env(
                "REPLICATION_POLL_INTERVAL_SECS",
                DEFAULT_REPLICATION_POLL_INTERVAL_SECS,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.scan_max_retries < 1 {
            anyhow::bail!("SCAN_MAX_RETRIES must be at least 1");
        }
        if self.queue_max_workers == 0 {
            anyhow::bail!("QUEUE_MAX_WORKERS must be at least 1");
        }
        // Every scan attempt the budget allows needs its own delivery, or the
        // queue would give up on a file before the scan budget resolves it.
        if self.queue_max_deliveries <= self.scan_max_retries as u32 {
            anyhow::bail!(
                "QUEUE_MAX_DELIVERIES ({}) must be greater than SCAN_MAX_RETRIES ({})",
                self.queue_max_deliveries,
                self.scan_max_retries
            );
        }
        if self.max_file_size_bytes == 0 {
            anyhow::bail!("MAX_FILE_SIZE_BYTES must be greater than zero");
        }
        if self.raw_store_path == self.clean_store_path {
            anyhow::bail!("RAW_STORE_PATH and CLEAN_STORE_PATH must differ");
        }
        if self.replication_enabled && self.replica_clean_store_path.is_none() {
            anyhow::bail!("REPLICA_CLEAN_STORE_PATH is required when REPLICATION_ENABLED=true");
        }
        if self.allowed_extensions.is_empty() {
            anyhow::bail!("ALLOWED_EXTENSIONS must not be empty");
        }
        Ok(())
    }

    /// A configuration suitable for tests: memory status store, temp-style
    /// paths, scanning stubbed out.
    pub fn for_tests() -> Self {
        Config {
            server_port: 0,
            environment: "test".to_string(),
            raw_store_path: "./test-data/raw".to_string(),
            clean_store_path: "./test-data/clean".to_string(),
            database_url: None,
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            allowed_extensions: parse_extension_list(None),
            clamav_enabled: false,
            clamav_host: "localhost".to_string(),
            clamav_port: DEFAULT_CLAMAV_PORT,
            clamav_timeout_secs: DEFAULT_CLAMAV_TIMEOUT_SECS,
            scan_max_retries: DEFAULT_SCAN_MAX_RETRIES,
            queue_max_workers: 2,
            queue_max_deliveries: DEFAULT_QUEUE_MAX_DELIVERIES,
            replication_enabled: false,
            replica_clean_store_path: None,
            replica_database_url: None,
            replication_poll_interval_secs: 1,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

/// Parse a comma-separated extension list; lowercased, dots stripped.
/// `None` or a blank value yields the default allowlist.
fn parse_extension_list(raw: Option<String>) -> Vec<String> {
    let parsed: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();

    if parsed.is_empty() {
        DEFAULT_ALLOWED_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .collect()
    } else {
        parsed
    }
}
