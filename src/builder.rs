//! Request builder
//!
//! Collects the configuration of one request type and freezes it into a
//! [`Livebox`]. Every setter consumes and returns the builder. Mistakes that
//! can only be detected with the full picture (invalid key, missing fetcher,
//! no way to convert a tier's type) are reported by [`LiveboxBuilder::build`].

use crate::context;
use crate::converter::{Converter, ConverterRegistry};
use crate::error::{LiveboxError, LiveboxResult};
use crate::fetcher::Fetcher;
use crate::key::RequestKey;
use crate::livebox::{Inner, Livebox};
use crate::retry::{RetryPolicy, RetryStrategy};
use crate::source::{
    DiskLruDataSource, DiskPersistentDataSource, LocalDataSource, MemoryLruDataSource, SourceKind,
    SourceTier, Tier,
};
use crate::validator::Validator;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{type_name, TypeId};
use tracing::debug;

/// Retry settings, resolved against the context configuration at build time
enum Retry {
    Off,
    Strategy(RetryStrategy),
    Policy(RetryPolicy),
}

/// Staged configuration for a [`Livebox`] fetching `I` and delivering `O`
pub struct LiveboxBuilder<I, O> {
    key: Option<RequestKey>,
    fetcher: Option<Box<dyn Fetcher<I>>>,
    tiers: Vec<Box<dyn Tier<I>>>,
    converters: ConverterRegistry<O>,
    ignore_cache: bool,
    refresh: bool,
    retry: Retry,
    uses_age_validator: bool,
    deferred: Option<LiveboxError>,
}

impl<I, O> Default for LiveboxBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> Livebox<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn builder() -> LiveboxBuilder<I, O> {
        LiveboxBuilder::new()
    }
}

impl<I, O> LiveboxBuilder<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            key: None,
            fetcher: None,
            tiers: Vec::new(),
            converters: ConverterRegistry::new(),
            ignore_cache: false,
            refresh: false,
            retry: Retry::Off,
            uses_age_validator: false,
            deferred: None,
        }
    }

    fn defer(&mut self, error: LiveboxError) {
        if self.deferred.is_none() {
            self.deferred = Some(error);
        }
    }

    /// Key identifying the request in every tier, the journal and the
    /// in-flight registry. Must match `[a-z0-9_-]{1,120}`.
    pub fn with_key(mut self, key: impl AsRef<str>) -> Self {
        match RequestKey::new(key.as_ref()) {
            Ok(key) => self.key = Some(key),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Remote data source
    pub fn fetch<F>(mut self, fetcher: F) -> Self
    where
        F: Fetcher<I> + 'static,
    {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Add a tier, probed after every tier added before it
    pub fn add_source<S, V>(mut self, source: S, validator: V) -> Self
    where
        S: LocalDataSource<I> + 'static,
        V: Validator<S::Output> + 'static,
    {
        if validator.is_age_based() {
            self.uses_age_validator = true;
        }
        self.tiers.push(Box::new(SourceTier::new(source, validator)));
        self
    }

    /// Convert values of type `T` (fetched or read from a tier) into `O`
    pub fn add_converter<T, C>(mut self, converter: C) -> Self
    where
        T: 'static,
        C: Converter<T, O> + 'static,
    {
        self.converters.insert::<T, C>(converter);
        self
    }

    /// Skip every tier, for both reading and saving
    pub fn ignore_cache(mut self, ignore: bool) -> Self {
        self.ignore_cache = ignore;
        self
    }

    /// Deliver valid cached data, then fetch and deliver fresh data
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Retry failed fetches with the configured schedule for `strategy`
    pub fn retry_on_failure(mut self, strategy: RetryStrategy) -> Self {
        self.retry = Retry::Strategy(strategy);
        self
    }

    /// Retry failed fetches with an explicit policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Retry::Policy(policy);
        self
    }

    /// Freeze the configuration
    pub fn build(self) -> LiveboxResult<Livebox<I, O>> {
        if let Some(error) = self.deferred {
            return Err(error);
        }

        let context = context::get()?;

        let key = self.key.ok_or_else(|| {
            LiveboxError::Configuration("a key is required, call with_key() before build()".into())
        })?;
        let fetcher = self.fetcher.ok_or_else(|| {
            LiveboxError::Configuration(format!("no fetcher set for key {}", key))
        })?;

        self.converters
            .ensure_supported(TypeId::of::<I>(), type_name::<I>())?;
        for tier in &self.tiers {
            let (type_id, name) = tier.output_type();
            self.converters.ensure_supported(type_id, name)?;
        }

        let retry = match self.retry {
            Retry::Off => None,
            Retry::Strategy(strategy) => Some(context.config().retry.policy(strategy)),
            Retry::Policy(policy) => Some(policy),
        };

        debug!(
            key = %key,
            tiers = self.tiers.len(),
            converters = ?self.converters.registered().collect::<Vec<_>>(),
            age_validator = self.uses_age_validator,
            "Built livebox"
        );

        Ok(Livebox::from_parts(Inner {
            key,
            tiers: self.tiers,
            fetcher,
            converters: self.converters,
            ignore_cache: self.ignore_cache,
            refresh: self.refresh,
            retry,
            uses_age_validator: self.uses_age_validator,
            context,
        }))
    }
}

impl<I, O> LiveboxBuilder<I, O>
where
    I: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    /// Add a built-in tier bound to the initialized context
    pub fn add_source_kind<V>(self, kind: SourceKind, validator: V) -> Self
    where
        V: Validator<I> + 'static,
    {
        let Some(context) = context::current() else {
            let mut builder = self;
            builder.defer(LiveboxError::NotInitialized);
            return builder;
        };

        match kind {
            SourceKind::Memory => {
                self.add_source(MemoryLruDataSource::<I>::new(context.memory()), validator)
            }
            SourceKind::DiskLru => self.add_source(
                DiskLruDataSource::<I>::new(context.disk_lru(), context.serializer()),
                validator,
            ),
            SourceKind::DiskPersistent => self.add_source(
                DiskPersistentDataSource::<I>::new(context.persistent_dir(), context.serializer()),
                validator,
            ),
        }
    }
}
