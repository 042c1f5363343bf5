//! The request orchestrator
//!
//! A [`Livebox`] is the frozen form of one request type. Every call to
//! [`Livebox::stream`] runs (or joins) the pipeline for its key:
//!
//! 1. Attach to the in-flight pipeline for the key if there is one.
//! 2. With `ignore_cache`, fetch without touching any tier.
//! 3. Probe tiers in order. Stale entries are cleared, the first valid hit wins.
//! 4. No valid hit: fetch, populate every tier, deliver.
//! 5. Valid hit: deliver it, and with `refresh` fetch and deliver again.
//!
//! The pipeline runs on its own task, so dropping a stream never cancels it
//! for other attached callers.

use crate::adapter::ResultAdapter;
use crate::context::Context;
use crate::converter::{ConverterRegistry, Payload};
use crate::error::{LiveboxError, LiveboxResult};
use crate::fetcher::Fetcher;
use crate::flight::{Joined, LiveboxStream, Publisher};
use crate::key::RequestKey;
use crate::retry::{run_with_retry, RetryPolicy};
use crate::source::{Lookup, Tier};
use chrono::Utc;
use futures_util::future::{self, join_all};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct Inner<I, O> {
    pub(crate) key: RequestKey,
    pub(crate) tiers: Vec<Box<dyn Tier<I>>>,
    pub(crate) fetcher: Box<dyn Fetcher<I>>,
    pub(crate) converters: ConverterRegistry<O>,
    pub(crate) ignore_cache: bool,
    pub(crate) refresh: bool,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) uses_age_validator: bool,
    pub(crate) context: Arc<Context>,
}

/// Orchestrator for one request type. Cheap to clone.
pub struct Livebox<I, O> {
    inner: Arc<Inner<I, O>>,
}

impl<I, O> Clone for Livebox<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<I, O> Livebox<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    pub(crate) fn from_parts(inner: Inner<I, O>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn key(&self) -> &RequestKey {
        &self.inner.key
    }

    /// Whether a successful fetch records a journal entry
    pub fn uses_age_validator(&self) -> bool {
        self.inner.uses_age_validator
    }

    /// Run the request and deliver its results
    ///
    /// Nothing happens until the stream is first polled, which must be inside
    /// a Tokio runtime. The stream yields zero or more values and ends after
    /// the first error.
    pub fn stream(&self) -> LiveboxStream<O> {
        let inner = self.inner.clone();
        stream::once(async move { inner.start() }).flatten().boxed()
    }

    /// First delivered value, or the terminal error
    pub async fn first(&self) -> LiveboxResult<O> {
        match self.stream().next().await {
            Some(result) => result,
            None => Err(LiveboxError::Internal(format!(
                "request for key {} completed without a value",
                self.inner.key
            ))),
        }
    }

    /// Hand the result stream to an adapter
    pub fn adapt<A: ResultAdapter<O>>(&self, adapter: &A) -> A::Output {
        adapter.adapt(self.stream())
    }
}

impl<I, O> Inner<I, O>
where
    I: Send + Sync + 'static,
    O: Clone + Send + Sync + 'static,
{
    fn start(self: Arc<Self>) -> LiveboxStream<O> {
        debug!("Start request for key: {}", self.key);

        let joined = self.context.in_flight().join::<O>(&self.key);
        match joined {
            Ok(Joined::Attached(subscription)) => subscription.into_stream(),
            Ok(Joined::Leader {
                publisher,
                subscription,
            }) => {
                tokio::spawn(async move {
                    let outcome = self.execute(&publisher).await;
                    if let Err(e) = &outcome {
                        debug!("Request for key {} failed: {}", publisher.key(), e);
                    }
                    publisher.finish(outcome.err());
                });
                subscription.into_stream()
            }
            Err(e) => stream::once(future::ready(Err(e))).boxed(),
        }
    }

    async fn execute(&self, publisher: &Publisher<O>) -> LiveboxResult<()> {
        if self.ignore_cache {
            debug!("Ignore cache, hit remote data source for key: {}", self.key);
            let value = self.fetch_remote(false).await?;
            publisher.emit(value);
            return Ok(());
        }

        let Some(payload) = self.read_local().await else {
            debug!("No valid local data, hit remote data source and save");
            let value = self.fetch_remote(true).await?;
            publisher.emit(value);
            return Ok(());
        };

        debug!("Return local data of type {}", payload.type_name());
        publisher.emit(self.converters.convert(self.key.as_str(), payload)?);

        if self.refresh {
            debug!("Local data is valid, refreshing from remote data source");
            let value = self.fetch_remote(true).await?;
            publisher.emit(value);
        }
        Ok(())
    }

    /// Probe tiers in priority order, purging stale entries on the way
    async fn read_local(&self) -> Option<Payload> {
        let journal = self.context.journal();
        for tier in &self.tiers {
            match tier.lookup(&self.key, journal.as_deref()).await {
                Ok(Lookup::Hit(payload)) => {
                    debug!("Data from {} is valid", tier.name());
                    return Some(payload);
                }
                Ok(Lookup::Miss) => debug!("No data in {}", tier.name()),
                Ok(Lookup::Stale) => {
                    debug!("Data from {} is not valid, clearing it", tier.name());
                    if let Err(e) = tier.clear(&self.key).await {
                        warn!("Failed to clear stale entry in {}: {}", tier.name(), e);
                    }
                }
                Err(e) => warn!("Skipping {} after read failure: {}", tier.name(), e),
            }
        }
        None
    }

    async fn fetch_remote(&self, populate: bool) -> LiveboxResult<O> {
        let fetcher = &self.fetcher;
        let (result, attempts) =
            run_with_retry(self.key.as_str(), self.retry.as_ref(), || fetcher.fetch()).await;
        let raw = result.map_err(|e| LiveboxError::fetch(self.key.as_str(), attempts, e))?;

        if populate {
            self.populate(&raw).await;
        }

        self.converters.convert(self.key.as_str(), Payload::new(raw))
    }

    /// Save fresh data to every tier. Failures are logged and absorbed.
    async fn populate(&self, raw: &I) {
        if self.uses_age_validator {
            if let Some(journal) = self.context.journal() {
                if let Err(e) = journal.record(self.key.as_str(), Utc::now()).await {
                    warn!("Failed to record journal entry for {}: {}", self.key, e);
                }
            }
        }

        let key = &self.key;
        let saves = self.tiers.iter().map(|tier| async move {
            debug!("Saving fresh data in {}", tier.name());
            (tier.name(), tier.save(key, raw).await)
        });

        for (name, result) in join_all(saves).await {
            if let Err(e) = result {
                warn!("Failed to save key {} in {}: {}", key, name, e);
            }
        }
    }
}

impl<I, O> std::fmt::Debug for Livebox<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Livebox")
            .field("key", &self.inner.key)
            .field("tiers", &self.inner.tiers.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("ignore_cache", &self.inner.ignore_cache)
            .field("refresh", &self.inner.refresh)
            .field("retry", &self.inner.retry)
            .finish()
    }
}
