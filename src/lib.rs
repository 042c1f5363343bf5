//! Livebox - multi-tier read-through cache orchestrator
//!
//! A request identified by a key is served from the first local tier holding
//! valid data, otherwise fetched from its remote source, written back to every
//! tier and delivered. Concurrent requests for one key share a single fetch.
//!
//! ```rust,ignore
//! use livebox::{AgeValidator, JsonSerializer, Livebox, SourceKind};
//!
//! livebox::init(Config::default(), Arc::new(JsonSerializer::new())).await?;
//!
//! let users = Livebox::<Vec<User>, Vec<User>>::builder()
//!     .with_key("get_users")
//!     .fetch(|| async { api.users().await })
//!     .add_source_kind(SourceKind::DiskLru, AgeValidator::hours(1))
//!     .retry_on_failure(RetryStrategy::Backoff)
//!     .build()?;
//!
//! let fresh_or_cached = users.first().await?;
//! ```

pub mod adapter;
pub mod builder;
pub mod cli;
pub mod config;
pub mod context;
pub mod converter;
pub mod error;
pub mod fetcher;
mod flight;
pub mod journal;
pub mod key;
pub mod livebox;
pub mod retry;
pub mod serializer;
pub mod source;
pub mod ui;
pub mod validator;

pub use adapter::{CollectAdapter, ResultAdapter, State, StateAdapter};
pub use builder::LiveboxBuilder;
pub use config::{Config, ConfigManager};
pub use context::{init, shutdown, Context};
pub use converter::Converter;
pub use error::{BoxError, LiveboxError, LiveboxResult};
pub use fetcher::{FileFetcher, Fetcher, HttpFetcher};
pub use flight::LiveboxStream;
pub use journal::Journal;
pub use key::RequestKey;
pub use livebox::Livebox;
pub use retry::{RetryPolicy, RetryStrategy};
pub use serializer::{JsonSerializer, Serializer};
pub use source::{
    DiskLruCache, DiskLruDataSource, DiskPersistentDataSource, LocalDataSource,
    MemoryLruDataSource, MemoryStore, SourceKind,
};
pub use validator::{AgeValidator, AlwaysValid, Validator};
