//! Clear command - remove a key from the disk tiers

use crate::cli::args::ClearArgs;
use crate::config::Config;
use crate::error::LiveboxResult;
use crate::key::RequestKey;
use crate::serializer::JsonSerializer;
use crate::source::{DiskLruCache, DiskLruDataSource, DiskPersistentDataSource, LocalDataSource};
use crate::ui::{self, UiContext};
use serde_json::Value;
use std::sync::Arc;

/// Execute the clear command
pub async fn execute(args: ClearArgs, config: &Config) -> LiveboxResult<()> {
    let ctx = UiContext::detect();
    let key = RequestKey::new(args.key)?;
    let serializer = Arc::new(JsonSerializer::new());

    let cache = DiskLruCache::open(&config.disk_lru.dir, config.disk_lru.max_bytes).await?;
    let disk_lru = DiskLruDataSource::<Value>::new(Arc::new(cache), serializer.clone());
    disk_lru.clear(&key).await?;
    ui::step_ok_detail(&ctx, &format!("Cleared {}", key), disk_lru.name());

    let persistent = DiskPersistentDataSource::<Value>::new(&config.persistent.dir, serializer);
    persistent.clear(&key).await?;
    ui::step_ok_detail(&ctx, &format!("Cleared {}", key), persistent.name());

    Ok(())
}
