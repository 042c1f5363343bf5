//! Terminal output for the `livebox` binary
//!
//! Status lines go to stderr so stdout carries only request results and can
//! be piped into other tools.

mod context;
mod output;

pub use context::UiContext;
pub use output::{key_value, step_info, step_ok, step_ok_detail, step_warn_hint, value};
