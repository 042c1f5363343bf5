//! CLI argument definitions using clap derive

use crate::retry::RetryStrategy;
use crate::source::SourceKind;
use clap::{ArgAction, ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Livebox - multi-tier read-through cache
///
/// Serves a keyed request from local cache tiers when they hold valid data
/// and falls back to a file or URL otherwise.
#[derive(Parser, Debug)]
#[command(name = "livebox")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LIVEBOX_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a request through the cache tiers and print every delivered value
    Get(GetArgs),

    /// Show last successful fetch times
    Journal(JournalArgs),

    /// Remove a key from the disk tiers
    Clear(ClearArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments for the get command
#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("remote").required(true).args(["url", "file"])))]
pub struct GetArgs {
    /// Request key ([a-z0-9_-], at most 120 characters)
    pub key: String,

    /// Fetch JSON from this URL
    #[arg(long)]
    pub url: Option<String>,

    /// Fetch JSON from this file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Cache tiers to consult, in priority order (repeatable)
    #[arg(short, long = "tier", value_enum)]
    pub tiers: Vec<TierArg>,

    /// Treat cached data older than this as stale
    #[arg(long)]
    pub ttl_minutes: Option<u64>,

    /// Print cached data, then fetch and print fresh data
    #[arg(long)]
    pub refresh: bool,

    /// Bypass every tier for both reading and saving
    #[arg(long)]
    pub ignore_cache: bool,

    /// Retry failed fetches with this schedule
    #[arg(long, value_enum)]
    pub retry: Option<RetryArg>,

    /// Pretty-print delivered JSON
    #[arg(long)]
    pub pretty: bool,
}

/// Arguments for the journal command
#[derive(Parser, Debug)]
pub struct JournalArgs {
    /// Only show this key
    pub key: Option<String>,
}

/// Arguments for the clear command
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Request key to remove
    pub key: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

/// Cache tier selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TierArg {
    /// In-process memory (lives for one invocation)
    Memory,
    /// Size-bounded disk cache
    DiskLru,
    /// One file per key
    Persistent,
}

impl From<TierArg> for SourceKind {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Memory => SourceKind::Memory,
            TierArg::DiskLru => SourceKind::DiskLru,
            TierArg::Persistent => SourceKind::DiskPersistent,
        }
    }
}

/// Retry schedule selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetryArg {
    /// Fixed delay between attempts
    Interval,
    /// Growing delay between attempts
    Backoff,
}

impl From<RetryArg> for RetryStrategy {
    fn from(retry: RetryArg) -> Self {
        match retry {
            RetryArg::Interval => RetryStrategy::Interval,
            RetryArg::Backoff => RetryStrategy::Backoff,
        }
    }
}
