//! Get command - run one request through the orchestrator

use crate::cli::args::GetArgs;
use crate::config::Config;
use crate::error::{LiveboxError, LiveboxResult};
use crate::fetcher::{FileFetcher, HttpFetcher};
use crate::serializer::JsonSerializer;
use crate::source::SourceKind;
use crate::ui::{self, UiContext};
use crate::validator::{AgeValidator, AlwaysValid};
use crate::{Livebox, LiveboxBuilder};
use futures_util::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// Execute the get command
pub async fn execute(args: GetArgs, config: &Config) -> LiveboxResult<()> {
    let ctx = UiContext::detect();
    let serializer = Arc::new(if args.pretty {
        JsonSerializer::pretty()
    } else {
        JsonSerializer::new()
    });
    crate::init(config.clone(), serializer.clone()).await?;

    let mut builder = Livebox::<Value, Value>::builder()
        .with_key(&args.key)
        .ignore_cache(args.ignore_cache)
        .refresh(args.refresh);

    builder = match (&args.url, &args.file) {
        (Some(url), _) => builder.fetch(HttpFetcher::new(url.clone(), serializer.clone())),
        (None, Some(path)) => builder.fetch(FileFetcher::new(path.clone(), serializer.clone())),
        (None, None) => {
            return Err(LiveboxError::Configuration(
                "one of --url or --file is required".into(),
            ))
        }
    };

    for tier in &args.tiers {
        builder = add_tier(builder, (*tier).into(), args.ttl_minutes);
    }

    if let Some(retry) = args.retry {
        builder = builder.retry_on_failure(retry.into());
    }

    let livebox = builder.build()?;
    let mut results = livebox.stream();
    let mut delivered = 0usize;

    while let Some(result) = results.next().await {
        let value = result?;
        let rendered = if args.pretty {
            serde_json::to_string_pretty(&value)?
        } else {
            serde_json::to_string(&value)?
        };
        ui::value(&rendered);
        delivered += 1;
    }

    ui::step_ok_detail(
        &ctx,
        &format!("Delivered {} value(s)", delivered),
        livebox.key().as_str(),
    );
    crate::shutdown();
    Ok(())
}

fn add_tier(
    builder: LiveboxBuilder<Value, Value>,
    kind: SourceKind,
    ttl_minutes: Option<u64>,
) -> LiveboxBuilder<Value, Value> {
    match ttl_minutes {
        Some(minutes) => builder.add_source_kind(kind, AgeValidator::minutes(minutes)),
        None => builder.add_source_kind(kind, AlwaysValid),
    }
}
