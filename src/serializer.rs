//! Serialization codec used by the storage tiers and built-in fetchers
//!
//! The trait works on `serde_json::Value` so it stays object safe and can be
//! configured once per process. Failures are reported as `None`; a tier that
//! cannot decode an entry treats it as absent.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Byte-level codec
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Encode a value, `None` on failure
    fn serialize(&self, value: &serde_json::Value) -> Option<Vec<u8>>;

    /// Decode bytes, `None` on failure
    fn deserialize(&self, bytes: &[u8]) -> Option<serde_json::Value>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Encode a typed value through a serializer
pub fn encode<T: Serialize>(serializer: &dyn Serializer, value: &T) -> Option<Vec<u8>> {
    let value = match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            debug!("Failed to convert value for {}: {}", serializer.name(), e);
            return None;
        }
    };
    serializer.serialize(&value)
}

/// Decode a typed value through a serializer
pub fn decode<T: DeserializeOwned>(serializer: &dyn Serializer, bytes: &[u8]) -> Option<T> {
    let value = serializer.deserialize(bytes)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("Decoded {} value has unexpected shape: {}", serializer.name(), e);
            None
        }
    }
}

/// JSON codec backed by serde_json
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Human-readable output, useful for the persistent tier
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &serde_json::Value) -> Option<Vec<u8>> {
        let result = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        result.ok()
    }

    fn deserialize(&self, bytes: &[u8]) -> Option<serde_json::Value> {
        serde_json::from_slice(bytes).ok()
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
