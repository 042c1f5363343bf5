//! Process-wide Livebox context
//!
//! Requests can only be built after [`init`]. The context owns everything
//! shared between requests: configuration, serializer, journal, the in-memory
//! store, the disk LRU cache and the in-flight registry.

use crate::config::Config;
use crate::error::{LiveboxError, LiveboxResult};
use crate::flight::InFlight;
use crate::journal::Journal;
use crate::serializer::Serializer;
use crate::source::{DiskLruCache, MemoryStore};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

static CONTEXT: RwLock<Option<Arc<Context>>> = parking_lot::const_rwlock(None);

/// Shared state behind every request
pub struct Context {
    config: Config,
    serializer: Arc<dyn Serializer>,
    journal: Option<Arc<Journal>>,
    memory: MemoryStore,
    disk_lru: Arc<DiskLruCache>,
    in_flight: Arc<InFlight>,
}

impl Context {
    async fn open(config: Config, serializer: Arc<dyn Serializer>) -> LiveboxResult<Self> {
        let journal = if config.journal.enabled {
            let journal = match &config.journal.dir {
                Some(dir) => Journal::open(dir, config.journal.limit).await?,
                None => Journal::in_memory(config.journal.limit),
            };
            Some(Arc::new(journal))
        } else {
            debug!("Journal disabled, age validators accept all cached data");
            None
        };

        let disk_lru = DiskLruCache::open(&config.disk_lru.dir, config.disk_lru.max_bytes).await?;

        Ok(Self {
            memory: MemoryStore::new(config.memory.max_entries),
            disk_lru: Arc::new(disk_lru),
            in_flight: Arc::new(InFlight::new()),
            journal,
            serializer,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn serializer(&self) -> Arc<dyn Serializer> {
        self.serializer.clone()
    }

    /// Journal read by age validators, `None` when disabled
    pub fn journal(&self) -> Option<Arc<Journal>> {
        self.journal.clone()
    }

    pub fn memory(&self) -> MemoryStore {
        self.memory.clone()
    }

    pub fn disk_lru(&self) -> Arc<DiskLruCache> {
        self.disk_lru.clone()
    }

    pub fn persistent_dir(&self) -> &Path {
        &self.config.persistent.dir
    }

    pub(crate) fn in_flight(&self) -> &Arc<InFlight> {
        &self.in_flight
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("serializer", &self.serializer.name())
            .field("journal", &self.journal.as_ref().map(|j| j.len()))
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

/// Initialize Livebox for this process.
///
/// Opens the journal and the disk LRU cache. Calling it again replaces the
/// previous context; requests built before keep using the old one.
pub async fn init(config: Config, serializer: Arc<dyn Serializer>) -> LiveboxResult<()> {
    let context = Context::open(config, serializer).await?;

    info!(
        serializer = context.serializer.name(),
        disk_lru = %context.config.disk_lru.dir.display(),
        persistent = %context.config.persistent.dir.display(),
        journal = context.journal.is_some(),
        "Livebox initialized"
    );

    *CONTEXT.write() = Some(Arc::new(context));
    Ok(())
}

/// Drop the process-wide context
pub fn shutdown() {
    if CONTEXT.write().take().is_some() {
        debug!("Livebox shut down");
    }
}

/// The current context, if initialized
pub fn current() -> Option<Arc<Context>> {
    CONTEXT.read().clone()
}

pub fn is_initialized() -> bool {
    CONTEXT.read().is_some()
}

pub(crate) fn get() -> LiveboxResult<Arc<Context>> {
    current().ok_or(LiveboxError::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::JsonSerializer;
    use serial_test::serial;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn init_and_shutdown() {
        let dir = TempDir::new().unwrap();
        shutdown();
        assert!(matches!(get(), Err(LiveboxError::NotInitialized)));

        init(Config::in_dir(dir.path()), Arc::new(JsonSerializer::new()))
            .await
            .unwrap();
        let context = get().unwrap();
        assert!(context.journal().is_some());
        assert!(dir.path().join("livebox_disk_lru_cache").is_dir());
        assert!(dir.path().join("livebox_journal_dir").is_dir());

        shutdown();
        assert!(!is_initialized());
    }

    #[tokio::test]
    #[serial]
    async fn disabled_journal_is_absent() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::in_dir(dir.path());
        config.journal.enabled = false;

        init(config, Arc::new(JsonSerializer::new())).await.unwrap();
        assert!(get().unwrap().journal().is_none());
        shutdown();
    }

    #[tokio::test]
    #[serial]
    async fn reinit_replaces_context() {
        let dir = TempDir::new().unwrap();
        init(Config::in_dir(dir.path()), Arc::new(JsonSerializer::new()))
            .await
            .unwrap();
        let first = get().unwrap();

        let mut config = Config::in_dir(dir.path());
        config.journal.dir = None;
        init(config, Arc::new(JsonSerializer::pretty())).await.unwrap();
        let second = get().unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.journal().unwrap().path().is_none());
        shutdown();
    }
}
