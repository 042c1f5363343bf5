//! Local storage tiers
//!
//! Every tier offers the same three capabilities: read, save and clear by key.
//! The orchestrator never special-cases a tier; it only sees the trait.
//!
//! | Tier | Backing | Bound |
//! |------|---------|-------|
//! | [`MemoryLruDataSource`] | process memory | entry count |
//! | [`DiskLruDataSource`] | one directory, checksummed files | total bytes |
//! | [`DiskPersistentDataSource`] | `<key>_livebox.json` per key | none |

pub mod disk_lru;
pub mod memory;
pub mod persistent;

pub use disk_lru::{DiskLruCache, DiskLruDataSource};
pub use memory::{MemoryLruDataSource, MemoryStore};
pub use persistent::DiskPersistentDataSource;

use crate::converter::Payload;
use crate::error::LiveboxResult;
use crate::journal::Journal;
use crate::key::RequestKey;
use crate::validator::Validator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::{type_name, TypeId};
use std::fmt;

/// A storage tier holding values saved as `I` and read back as `Output`
#[async_trait]
pub trait LocalDataSource<I>: Send + Sync
where
    I: Send + Sync + 'static,
{
    /// Type handed to validators and converters
    type Output: Send + 'static;

    /// Read the entry for `key`, `Ok(None)` when absent
    async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<Self::Output>>;

    /// Store freshly fetched data under `key`
    async fn save(&self, key: &RequestKey, input: &I) -> LiveboxResult<()>;

    /// Remove the entry for `key`
    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()>;

    /// Human-readable tier name for logs
    fn name(&self) -> &str;
}

/// Built-in tiers that can be added by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Memory,
    DiskLru,
    DiskPersistent,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::DiskLru => "disk-lru",
            Self::DiskPersistent => "disk-persistent",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of probing one tier
pub(crate) enum Lookup {
    Miss,
    Stale,
    Hit(Payload),
}

/// A data source paired with its validator, with the read type erased
#[async_trait]
pub(crate) trait Tier<I>: Send + Sync {
    fn name(&self) -> &str;

    fn output_type(&self) -> (TypeId, &'static str);

    /// Read and validate the entry for `key` against the request's journal
    async fn lookup(&self, key: &RequestKey, journal: Option<&Journal>) -> LiveboxResult<Lookup>;

    async fn save(&self, key: &RequestKey, input: &I) -> LiveboxResult<()>;

    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()>;
}

pub(crate) struct SourceTier<S, V> {
    source: S,
    validator: V,
}

impl<S, V> SourceTier<S, V> {
    pub(crate) fn new(source: S, validator: V) -> Self {
        Self { source, validator }
    }
}

#[async_trait]
impl<I, S, V> Tier<I> for SourceTier<S, V>
where
    I: Send + Sync + 'static,
    S: LocalDataSource<I>,
    V: Validator<S::Output>,
{
    fn name(&self) -> &str {
        self.source.name()
    }

    fn output_type(&self) -> (TypeId, &'static str) {
        (TypeId::of::<S::Output>(), type_name::<S::Output>())
    }

    async fn lookup(&self, key: &RequestKey, journal: Option<&Journal>) -> LiveboxResult<Lookup> {
        let Some(value) = self.source.read(key).await? else {
            return Ok(Lookup::Miss);
        };

        if !self.validator.validate_in(key.as_str(), &value, journal) {
            return Ok(Lookup::Stale);
        }

        Ok(Lookup::Hit(Payload::new(value)))
    }

    async fn save(&self, key: &RequestKey, input: &I) -> LiveboxResult<()> {
        self.source.save(key, input).await
    }

    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
        self.source.clear(key).await
    }
}
