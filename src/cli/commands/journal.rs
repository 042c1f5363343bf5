//! Journal command - show last successful fetch times

use crate::cli::args::JournalArgs;
use crate::config::Config;
use crate::error::LiveboxResult;
use crate::journal::Journal;
use crate::key::RequestKey;
use crate::ui::{self, UiContext};

/// Execute the journal command
pub async fn execute(args: JournalArgs, config: &Config) -> LiveboxResult<()> {
    let ctx = UiContext::detect();

    if !config.journal.enabled {
        ui::step_warn_hint(&ctx, "Journal is disabled", "Set journal.enabled = true");
        return Ok(());
    }

    let Some(dir) = &config.journal.dir else {
        ui::step_info(&ctx, "Journal is kept in memory only, nothing to show");
        return Ok(());
    };

    let journal = Journal::open(dir, config.journal.limit).await?;

    if let Some(key) = args.key {
        let key = RequestKey::new(key)?;
        match journal.read(key.as_str()) {
            Some(at) => ui::key_value(&ctx, key.as_str(), &at.to_rfc3339()),
            None => ui::step_info(&ctx, &format!("No journal entry for {}", key)),
        }
        return Ok(());
    }

    let entries = journal.entries();
    if entries.is_empty() {
        ui::step_info(&ctx, "Journal is empty");
        return Ok(());
    }

    for (key, at) in entries {
        ui::key_value(&ctx, &key, &at.to_rfc3339());
    }
    Ok(())
}
