//! CLI command implementations

pub mod clear;
pub mod config;
pub mod get;
pub mod journal;

pub use clear::execute as clear;
pub use config::execute as config;
pub use get::execute as get;
pub use journal::execute as journal;
