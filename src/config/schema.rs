//! Configuration schema for Livebox
//!
//! Configuration is stored at `~/.config/livebox/config.toml`

use crate::retry::{RetryPolicy, RetryStrategy};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// In-memory LRU tier
    pub memory: MemoryConfig,

    /// Disk LRU tier
    pub disk_lru: DiskLruConfig,

    /// Persistent single-file-per-key tier
    pub persistent: PersistentConfig,

    /// Fetch timestamp journal
    pub journal: JournalConfig,

    /// Retry schedule used by `retry_on_failure`
    pub retry: RetryConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Emit library log events
    pub logging: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            logging: true,
            log_format: "text".to_string(),
        }
    }
}

/// In-memory LRU settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of cached entries
    pub max_entries: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_entries: 1000 }
    }
}

/// Disk LRU settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskLruConfig {
    /// Cache directory
    pub dir: PathBuf,

    /// Size bound in bytes (default: 100 MiB)
    pub max_bytes: u64,
}

impl Default for DiskLruConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_root().join("livebox_disk_lru_cache"),
            max_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Persistent tier settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    /// Output directory, one file per key
    pub dir: PathBuf,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_root().join("livebox_disk_persistent_cache"),
        }
    }
}

/// Journal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Keep a journal of fetch timestamps. Age validators treat every entry
    /// as fresh when disabled.
    pub enabled: bool,

    /// Directory holding the journal file. In-memory only when unset.
    pub dir: Option<PathBuf>,

    /// Maximum number of keys remembered
    pub limit: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: Some(default_cache_root().join("livebox_journal_dir")),
            limit: 300,
        }
    }
}

/// Retry schedule settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed delay for the interval strategy
    pub interval_ms: u64,

    /// First delay for the backoff strategy
    pub backoff_base_ms: u64,

    /// Multiplier applied to each further backoff delay
    pub backoff_factor: u32,

    /// Retries after the first attempt
    pub max_retries: u32,

    /// Ignore `max_retries` and retry until the fetch succeeds
    pub unbounded: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2_000,
            backoff_base_ms: 4_000,
            backoff_factor: 4,
            max_retries: 2,
            unbounded: false,
        }
    }
}

impl RetryConfig {
    /// Build the policy for a strategy from these settings
    pub fn policy(&self, strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            max_retries: (!self.unbounded).then_some(self.max_retries),
            interval: Duration::from_millis(self.interval_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_factor: self.backoff_factor,
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("livebox")
}

impl Config {
    /// Configuration rooted in a single directory, handy for tests and tools
    pub fn in_dir(root: &std::path::Path) -> Self {
        Self {
            disk_lru: DiskLruConfig {
                dir: root.join("livebox_disk_lru_cache"),
                ..DiskLruConfig::default()
            },
            persistent: PersistentConfig {
                dir: root.join("livebox_disk_persistent_cache"),
            },
            journal: JournalConfig {
                dir: Some(root.join("livebox_journal_dir")),
                ..JournalConfig::default()
            },
            ..Config::default()
        }
    }
}
