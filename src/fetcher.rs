//! Remote data sources
//!
//! A fetcher produces the authoritative value for a request. Retrying is the
//! orchestrator's job, a fetcher only reports success or failure of a single
//! attempt. Async closures returning `Result<I, BoxError>` are fetchers too.

use crate::error::{BoxError, LiveboxError};
use crate::serializer::{self, Serializer};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Produces the authoritative value of type `I`
#[async_trait]
pub trait Fetcher<I>: Send + Sync {
    async fn fetch(&self) -> Result<I, BoxError>;
}

#[async_trait]
impl<I, F, Fut> Fetcher<I> for F
where
    I: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<I, BoxError>> + Send,
{
    async fn fetch(&self) -> Result<I, BoxError> {
        self().await
    }
}

/// Reads a file and decodes it with the configured serializer
pub struct FileFetcher<T> {
    path: PathBuf,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FileFetcher<T> {
    pub fn new(path: impl Into<PathBuf>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            path: path.into(),
            serializer,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> Fetcher<T> for FileFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<T, BoxError> {
        debug!("Fetching file {}", self.path.display());
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| LiveboxError::io(format!("reading {}", self.path.display()), e))?;

        serializer::decode(self.serializer.as_ref(), &bytes).ok_or_else(|| {
            LiveboxError::Decode(format!(
                "{} is not valid {}",
                self.path.display(),
                self.serializer.name()
            ))
            .into()
        })
    }
}

/// HTTP GET decoded with the configured serializer
///
/// Non-2xx responses are failures. The request runs on the blocking pool.
pub struct HttpFetcher<T> {
    url: String,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> HttpFetcher<T> {
    pub fn new(url: impl Into<String>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            url: url.into(),
            serializer,
            _marker: PhantomData,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

fn http_get(url: &str) -> Result<Vec<u8>, BoxError> {
    let mut response = match ureq::get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(status)) => {
            return Err(LiveboxError::HttpStatus {
                url: url.to_string(),
                status,
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    Ok(response.body_mut().read_to_vec()?)
}

#[async_trait]
impl<T> Fetcher<T> for HttpFetcher<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn fetch(&self) -> Result<T, BoxError> {
        debug!("Fetching {}", self.url);
        let url = self.url.clone();
        let bytes = tokio::task::spawn_blocking(move || http_get(&url))
            .await
            .map_err(|e| LiveboxError::Internal(format!("HTTP task failed: {}", e)))??;

        serializer::decode(self.serializer.as_ref(), &bytes).ok_or_else(|| {
            LiveboxError::Decode(format!(
                "response from {} is not valid {}",
                self.url,
                self.serializer.name()
            ))
            .into()
        })
    }
}
