//! Command line interface for the `livebox` binary

pub mod args;
pub mod commands;

pub use args::{Cli, Commands};
