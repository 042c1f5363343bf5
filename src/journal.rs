//! Journal of last successful fetch timestamps
//!
//! Appends `key:millis` lines to `journal_livebox.txt`. On open the file is
//! replayed (latest timestamp per key wins), trimmed to the most recent
//! `limit` keys and rewritten without duplicates. The same rewrite happens
//! once more than `limit` lines have been appended since the last one.
//!
//! Only age validators read the journal, and the orchestrator only writes it
//! after a successful fetch for a request that uses one.

use crate::error::{LiveboxError, LiveboxResult};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Journal file name inside the journal directory
pub const JOURNAL_FILE: &str = "journal_livebox.txt";

/// Default number of keys remembered
pub const DEFAULT_LIMIT: usize = 300;

const SEPARATOR: char = ':';

/// Bounded map of key to timestamp, evicting the least recently written key
#[derive(Debug, Default)]
struct Timestamps {
    values: HashMap<String, i64>,
    order: VecDeque<String>,
}

impl Timestamps {
    fn get(&self, key: &str) -> Option<i64> {
        self.values.get(key).copied()
    }

    /// Insert or advance a timestamp. Returns false if `millis` is not newer.
    fn advance(&mut self, key: &str, millis: i64, limit: usize) -> bool {
        if let Some(current) = self.values.get(key) {
            if millis <= *current {
                return false;
            }
            self.order.retain(|k| k != key);
        }

        self.values.insert(key.to_string(), millis);
        self.order.push_back(key.to_string());

        while self.order.len() > limit {
            if let Some(eldest) = self.order.pop_front() {
                self.values.remove(&eldest);
            }
        }
        true
    }

    fn lines(&self) -> String {
        self.order
            .iter()
            .filter_map(|k| self.values.get(k).map(|v| format!("{k}{SEPARATOR}{v}\n")))
            .collect()
    }
}

/// Fetch timestamp ledger
#[derive(Debug)]
pub struct Journal {
    timestamps: RwLock<Timestamps>,
    file: Option<PathBuf>,
    /// Lines appended since the file was last compacted
    appended: tokio::sync::Mutex<usize>,
    limit: usize,
}

impl Journal {
    /// Journal that lives only in memory
    pub fn in_memory(limit: usize) -> Self {
        Self {
            timestamps: RwLock::new(Timestamps::default()),
            file: None,
            appended: tokio::sync::Mutex::new(0),
            limit: limit.max(1),
        }
    }

    /// Open (or create) the journal stored in `dir`
    pub async fn open(dir: &Path, limit: usize) -> LiveboxResult<Self> {
        fs::create_dir_all(dir).await.map_err(|e| {
            LiveboxError::io(format!("creating journal directory {}", dir.display()), e)
        })?;

        let mut journal = Self::in_memory(limit);
        let path = dir.join(JOURNAL_FILE);

        if path.exists() {
            let content = fs::read_to_string(&path).await.map_err(|e| {
                LiveboxError::io(format!("reading journal {}", path.display()), e)
            })?;
            journal.replay(&content);
            journal.compact(&path).await?;
            debug!("Rebuilt journal from disk with {} entries", journal.len());
        } else {
            debug!("No journal file found at {}", path.display());
        }

        journal.file = Some(path);
        Ok(journal)
    }

    fn replay(&mut self, content: &str) {
        let timestamps = self.timestamps.get_mut();
        for line in content.lines() {
            let Some((key, millis)) = line.rsplit_once(SEPARATOR) else {
                continue;
            };
            match millis.trim().parse::<i64>() {
                Ok(millis) if !key.is_empty() => {
                    timestamps.advance(key, millis, self.limit);
                }
                _ => warn!("Skipping malformed journal line: {:?}", line),
            }
        }
    }

    /// Rewrite the file with one line per remembered key
    async fn compact(&self, path: &Path) -> LiveboxResult<()> {
        let content = self.timestamps.read().lines();
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4()));

        fs::write(&tmp, content)
            .await
            .map_err(|e| LiveboxError::io(format!("writing journal {}", tmp.display()), e))?;
        fs::rename(&tmp, path)
            .await
            .map_err(|e| LiveboxError::io(format!("replacing journal {}", path.display()), e))?;
        Ok(())
    }

    /// Last successful fetch time for `key`
    pub fn read(&self, key: &str) -> Option<DateTime<Utc>> {
        let millis = self.timestamps.read().get(key)?;
        Utc.timestamp_millis_opt(millis).single()
    }

    /// Record a successful fetch. Older timestamps never overwrite newer ones.
    pub async fn record(&self, key: &str, at: DateTime<Utc>) -> LiveboxResult<()> {
        let millis = at.timestamp_millis();
        let advanced = self.timestamps.write().advance(key, millis, self.limit);
        if !advanced {
            return Ok(());
        }

        let Some(path) = &self.file else {
            return Ok(());
        };

        let mut appended = self.appended.lock().await;
        if *appended >= self.limit {
            self.compact(path).await?;
            *appended = 0;
            debug!("Compacted journal {}", path.display());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| LiveboxError::io(format!("opening journal {}", path.display()), e))?;

        let line = format!("{key}{SEPARATOR}{millis}\n");
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| LiveboxError::io("appending to journal", e))?;
        file.flush()
            .await
            .map_err(|e| LiveboxError::io("flushing journal", e))?;
        *appended += 1;

        info!("Journal recorded {} at {}", key, at);
        Ok(())
    }

    /// Snapshot of all entries, oldest write first
    pub fn entries(&self) -> Vec<(String, DateTime<Utc>)> {
        let timestamps = self.timestamps.read();
        timestamps
            .order
            .iter()
            .filter_map(|k| {
                let millis = timestamps.values.get(k)?;
                let at = Utc.timestamp_millis_opt(*millis).single()?;
                Some((k.clone(), at))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.timestamps.read().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}
