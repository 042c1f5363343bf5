//! Request keys
//!
//! A key identifies one logical request. It is the in-flight dedup index, the
//! cache entry name in every storage tier, and the journal entry name.

use crate::error::{LiveboxError, LiveboxResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Pattern every key must match in full
pub const KEY_PATTERN: &str = "^[a-z0-9_-]{1,120}$";

static KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(KEY_PATTERN).expect("valid key regex"));

/// Validated, immutable request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    /// Validate and wrap a key. Keys are never truncated or normalized.
    pub fn new(key: impl Into<String>) -> LiveboxResult<Self> {
        let key = key.into();
        if !KEY_REGEX.is_match(&key) {
            return Err(LiveboxError::InvalidKey { key });
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for RequestKey {
    type Err = LiveboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for RequestKey {
    type Error = LiveboxError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
