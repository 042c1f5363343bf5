//! In-memory LRU tier
//!
//! One bounded store per process, shared by every request. Values are kept
//! type-erased; reading a key saved with a different type counts as a miss.

use crate::error::LiveboxResult;
use crate::key::RequestKey;
use crate::source::LocalDataSource;
use async_trait::async_trait;
use moka::sync::Cache;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

type Entry = Arc<dyn Any + Send + Sync>;

/// Bounded in-memory store backing [`MemoryLruDataSource`]
#[derive(Clone)]
pub struct MemoryStore {
    entries: Cache<String, Entry>,
}

impl MemoryStore {
    pub fn new(max_entries: u64) -> Self {
        Self {
            entries: Cache::new(max_entries),
        }
    }

    fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        match entry.downcast_ref::<T>() {
            Some(value) => Some(value.clone()),
            None => {
                debug!("Memory entry {} holds a different type, treating as miss", key);
                None
            }
        }
    }

    fn insert<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        self.entries.insert(key.to_string(), Arc::new(value));
    }

    fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Approximate entry count
    pub fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

/// In-memory tier storing `I` by value
pub struct MemoryLruDataSource<I> {
    store: MemoryStore,
    _marker: PhantomData<fn() -> I>,
}

impl<I> MemoryLruDataSource<I> {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I> LocalDataSource<I> for MemoryLruDataSource<I>
where
    I: Clone + Send + Sync + 'static,
{
    type Output = I;

    async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<I>> {
        debug!("Read from memory with key: {}", key);
        Ok(self.store.get::<I>(key.as_str()))
    }

    async fn save(&self, key: &RequestKey, input: &I) -> LiveboxResult<()> {
        debug!("Save to memory with key: {}", key);
        self.store.insert(key.as_str(), input.clone());
        Ok(())
    }

    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
        self.store.remove(key.as_str());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
