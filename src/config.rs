//! TOML configuration.
//!
//! A single file describes where the relational database and the document
//! store live, how long the document store is given before a query falls
//! back, how synchronization retries an unreachable store, and where the
//! HTTP server binds.
//!
//! ```toml
//! [db]
//! path = "./data/journal.sqlite"
//!
//! [document_store]
//! path = "./data/documents.sqlite"
//! timeout_ms = 3000
//!
//! [search]
//! enabled = true
//! limit = 100
//!
//! [sync]
//! max_attempts = 3
//! delay_ms = 2000
//! attempt_timeout_ms = 10000
//!
//! [server]
//! bind = "127.0.0.1:5080"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub document_store: DocumentStoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentStoreConfig {
    pub path: PathBuf,
    /// Time budget for the document-store fast path.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    3000
}

impl DocumentStoreConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_enabled")]
    pub enabled: bool,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 100,
        }
    }
}

fn default_search_enabled() -> bool {
    true
}
fn default_search_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
            attempt_timeout_ms: 10000,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_delay_ms() -> u64 {
    2000
}
fn default_attempt_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.document_store.timeout_ms == 0 {
        anyhow::bail!("document_store.timeout_ms must be > 0");
    }

    if config.search.limit < 1 {
        anyhow::bail!("search.limit must be >= 1");
    }

    if config.sync.max_attempts == 0 {
        anyhow::bail!("sync.max_attempts must be >= 1");
    }

    if config.db.path == config.document_store.path {
        anyhow::bail!("document_store.path must differ from db.path");
    }

    Ok(config)
}
