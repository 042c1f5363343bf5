//! Size-bounded disk cache with least-recently-used eviction
//!
//! Each key is stored as `<key>.entry`: a SHA256 hex digest line followed by
//! the serialized payload. Entries that fail the checksum or cannot be
//! decoded are deleted and read as absent.
//!
//! Writes go to a temporary file first and are renamed into place, so a
//! crash never leaves a half-written entry behind.

use crate::error::{LiveboxError, LiveboxResult};
use crate::key::RequestKey;
use crate::serializer::{self, Serializer};
use crate::source::LocalDataSource;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

const ENTRY_EXT: &str = "entry";
const TMP_EXT: &str = "tmp";

#[derive(Debug, Clone, Copy)]
struct EntryMeta {
    size: u64,
    last_used: u64,
}

/// Recency index over the entries on disk
#[derive(Debug, Default)]
struct LruIndex {
    entries: HashMap<String, EntryMeta>,
    total_bytes: u64,
    clock: u64,
}

impl LruIndex {
    fn touch(&mut self, key: &str) {
        self.clock += 1;
        if let Some(meta) = self.entries.get_mut(key) {
            meta.last_used = self.clock;
        }
    }

    fn upsert(&mut self, key: &str, size: u64) {
        self.clock += 1;
        let meta = EntryMeta {
            size,
            last_used: self.clock,
        };
        if let Some(old) = self.entries.insert(key.to_string(), meta) {
            self.total_bytes -= old.size;
        }
        self.total_bytes += size;
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.total_bytes -= old.size;
        }
    }

    /// Drop least recently used entries until the total fits `max_bytes`
    fn evict(&mut self, max_bytes: u64) -> Vec<String> {
        let mut victims = Vec::new();
        while self.total_bytes > max_bytes {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, meta)| meta.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.remove(&oldest);
            victims.push(oldest);
        }
        victims
    }
}

/// Byte-level LRU store shared by every [`DiskLruDataSource`] on a directory
#[derive(Debug)]
pub struct DiskLruCache {
    dir: PathBuf,
    max_bytes: u64,
    index: Mutex<LruIndex>,
}

impl DiskLruCache {
    /// Open the cache in `dir`, rebuilding the recency index from file times
    pub async fn open(dir: &Path, max_bytes: u64) -> LiveboxResult<Self> {
        fs::create_dir_all(dir).await.map_err(|e| {
            LiveboxError::io(format!("creating disk cache directory {}", dir.display()), e)
        })?;

        let mut found: Vec<(String, u64, SystemTime)> = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| LiveboxError::io("reading disk cache directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LiveboxError::io("reading disk cache entry", e))?
        {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(ENTRY_EXT) => {
                    let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let Ok(metadata) = entry.metadata().await else {
                        continue;
                    };
                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((key.to_string(), metadata.len(), modified));
                }
                Some(TMP_EXT) => {
                    debug!("Removing leftover temp file {}", path.display());
                    let _ = fs::remove_file(&path).await;
                }
                _ => {}
            }
        }

        found.sort_by_key(|(_, _, modified)| *modified);
        let mut index = LruIndex::default();
        for (key, size, _) in &found {
            index.upsert(key, *size);
        }

        debug!(
            "Opened disk cache {} with {} entries ({} bytes)",
            dir.display(),
            index.entries.len(),
            index.total_bytes
        );

        let cache = Self {
            dir: dir.to_path_buf(),
            max_bytes,
            index: Mutex::new(index),
        };
        cache.trim().await;
        Ok(cache)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key, ENTRY_EXT))
    }

    /// Read the payload for `key`
    pub async fn get(&self, key: &str) -> LiveboxResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.index.lock().remove(key);
                return Ok(None);
            }
            Err(e) => {
                return Err(LiveboxError::io(
                    format!("reading cache entry {}", path.display()),
                    e,
                ))
            }
        };

        let Some(payload) = verify(&raw) else {
            warn!("Disk cache entry {} is corrupt, removing it", key);
            self.remove(key).await?;
            return Ok(None);
        };

        self.index.lock().touch(key);
        Ok(Some(payload.to_vec()))
    }

    /// Store `payload` under `key`, evicting older entries past the size bound
    pub async fn put(&self, key: &str, payload: &[u8]) -> LiveboxResult<()> {
        let mut content = checksum(payload).into_bytes();
        content.push(b'\n');
        content.extend_from_slice(payload);

        let path = self.entry_path(key);
        let tmp = self
            .dir
            .join(format!("{}-{}.{}", key, uuid::Uuid::new_v4(), TMP_EXT));

        fs::write(&tmp, &content)
            .await
            .map_err(|e| LiveboxError::io(format!("writing cache entry {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(LiveboxError::io(
                format!("committing cache entry {}", path.display()),
                e,
            ));
        }

        self.index.lock().upsert(key, content.len() as u64);
        self.trim().await;
        Ok(())
    }

    /// Delete the entry for `key`
    pub async fn remove(&self, key: &str) -> LiveboxResult<()> {
        self.index.lock().remove(key);
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LiveboxError::io(
                format!("removing cache entry {}", path.display()),
                e,
            )),
        }
    }

    async fn trim(&self) {
        let victims = self.index.lock().evict(self.max_bytes);
        for key in victims {
            debug!("Evicting {} from disk cache", key);
            if let Err(e) = fs::remove_file(self.entry_path(&key)).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!("Failed to evict disk cache entry {}: {}", key, e);
                }
            }
        }
    }

    /// Bytes currently held on disk
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn checksum(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Split off and check the digest line, returning the payload
fn verify(raw: &[u8]) -> Option<&[u8]> {
    let newline = raw.iter().position(|b| *b == b'\n')?;
    let (digest, rest) = raw.split_at(newline);
    let payload = &rest[1..];
    let digest = std::str::from_utf8(digest).ok()?;
    (digest == checksum(payload)).then_some(payload)
}

/// Disk LRU tier storing `I` through the configured serializer
pub struct DiskLruDataSource<I> {
    cache: Arc<DiskLruCache>,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn() -> I>,
}

impl<I> DiskLruDataSource<I> {
    pub fn new(cache: Arc<DiskLruCache>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            cache,
            serializer,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<I> LocalDataSource<I> for DiskLruDataSource<I>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Output = I;

    async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<I>> {
        let Some(bytes) = self.cache.get(key.as_str()).await? else {
            debug!("Disk cache miss for key: {}", key);
            return Ok(None);
        };

        let value = serializer::decode::<I>(self.serializer.as_ref(), &bytes);
        if value.is_none() {
            debug!("Disk cache entry {} could not be decoded, removing it", key);
            self.cache.remove(key.as_str()).await?;
        }
        Ok(value)
    }

    async fn save(&self, key: &RequestKey, input: &I) -> LiveboxResult<()> {
        let bytes = serializer::encode(self.serializer.as_ref(), input).ok_or_else(|| {
            LiveboxError::tier(
                self.name(),
                "save",
                key.as_str(),
                format!("{} serializer could not encode value", self.serializer.name()),
            )
        })?;

        self.cache.put(key.as_str(), &bytes).await?;
        debug!("Saved {} bytes to disk cache with key: {}", bytes.len(), key);
        Ok(())
    }

    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
        debug!("Clear disk cache key: {}", key);
        self.cache.remove(key.as_str()).await
    }

    fn name(&self) -> &str {
        "disk-lru"
    }
}
