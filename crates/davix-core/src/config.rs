//! Configuration resolution for Davix Bridge.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`<config dir>/davix-bridge/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (applied by the binary, highest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Complete Davix Bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            database: DatabaseConfig::default(),
            queue: QueueConfig::default(),
            reconcile: ReconcileConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage location and table naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    /// Prepended to every table name, e.g. `wp_`.
    pub table_prefix: String,
    /// Appended to MySQL `CREATE TABLE` statements.
    pub charset_collate: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            table_prefix: "wp_".to_string(),
            charset_collate: "DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci".to_string(),
        }
    }
}

/// Claim protocol and retry settings shared by both queues.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub lease_secs: u64,
    pub max_attempts: u32,
    pub backoff_base_secs: u64,
    pub backoff_max_secs: u64,
    pub backoff_jitter: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            lease_secs: 60,
            max_attempts: 5,
            backoff_base_secs: 30,
            backoff_max_secs: 3600, // 1 hour
            backoff_jitter: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Mappings not synced within this window are reported as stale.
    pub staleness_bound_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            staleness_bound_secs: 24 * 60 * 60, // 1 day
        }
    }
}

/// Audit log retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = Config::default();

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            config = load_config_file(&global_path)?;
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Error::MissingConfig(path.to_path_buf()));
        }
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("davix-bridge").join("settings.json"))
}

/// Get the default database path.
pub fn database_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("davix-bridge").join("bridge.db"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::InvalidEnv { var, value })
}

fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(val) = var("DAVIX_DB_PATH") {
        config.database.path = Some(PathBuf::from(val));
    }
    if let Some(val) = var("DAVIX_TABLE_PREFIX") {
        config.database.table_prefix = val;
    }
    if let Some(val) = var("DAVIX_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = var("DAVIX_LEASE_SECS") {
        config.queue.lease_secs = parse_env("DAVIX_LEASE_SECS", val)?;
    }
    if let Some(val) = var("DAVIX_MAX_ATTEMPTS") {
        config.queue.max_attempts = parse_env("DAVIX_MAX_ATTEMPTS", val)?;
    }
    Ok(())
}
