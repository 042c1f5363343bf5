//! Unbounded disk tier, one file per key
//!
//! Files are named `<key>_livebox.json` and survive restarts until cleared.

use crate::error::{LiveboxError, LiveboxResult};
use crate::key::RequestKey;
use crate::serializer::{self, Serializer};
use crate::source::LocalDataSource;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Suffix appended to every key's file name
pub const FILE_SUFFIX: &str = "_livebox.json";

pub struct DiskPersistentDataSource<I> {
    dir: PathBuf,
    serializer: Arc<dyn Serializer>,
    _marker: PhantomData<fn() -> I>,
}

impl<I> DiskPersistentDataSource<I> {
    pub fn new(dir: impl Into<PathBuf>, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            dir: dir.into(),
            serializer,
            _marker: PhantomData,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}{}", key, FILE_SUFFIX))
    }
}

#[async_trait]
impl<I> LocalDataSource<I> for DiskPersistentDataSource<I>
where
    I: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Output = I;

    async fn read(&self, key: &RequestKey) -> LiveboxResult<Option<I>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No persistent file for key: {}", key);
                return Ok(None);
            }
            Err(e) => {
                return Err(LiveboxError::io(
                    format!("reading persistent file {}", path.display()),
                    e,
                ))
            }
        };

        let value = serializer::decode::<I>(self.serializer.as_ref(), &bytes);
        if value.is_none() {
            debug!("Persistent file {} could not be decoded", path.display());
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

        fs::create_dir_all(&self.dir).await.map_err(|e| {
            LiveboxError::io(
                format!("creating persistent directory {}", self.dir.display()),
                e,
            )
        })?;

        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}-{}.tmp", key, uuid::Uuid::new_v4()));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| LiveboxError::io(format!("writing {}", tmp.display()), e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(LiveboxError::io(format!("replacing {}", path.display()), e));
        }

        debug!("Saved persistent file {}", path.display());
        Ok(())
    }

    async fn clear(&self, key: &RequestKey) -> LiveboxResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed persistent file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LiveboxError::io(
                format!("removing persistent file {}", path.display()),
                e,
            )),
        }
    }

    fn name(&self) -> &str {
        "disk-persistent"
    }
}
