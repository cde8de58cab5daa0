//! Wire envelope (JSON).
//!
//! Every frame is `{ "v": 1, "tag": "...", "data": { ... } }`. The payload is
//! stored as `RawValue` to enable lazy parsing by the packet registry.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{BotlinkError, Result};

/// Envelope version accepted by both sides of a link.
pub const PROTOCOL_VERSION: u8 = 1;

/// One wire frame, header parsed, payload raw.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version.
    pub v: u8,
    /// Packet type tag (e.g., "event.group_message").
    pub tag: String,
    /// Payload, kept raw until the registry resolves the tag.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    /// Parse an envelope header from a text frame. Rejects unknown versions.
    pub fn decode(text: &str) -> Result<Self> {
        let env: Envelope = serde_json::from_str(text)
            .map_err(|e| BotlinkError::Decode(format!("invalid envelope json: {e}")))?;
        if env.v != PROTOCOL_VERSION {
            return Err(BotlinkError::UnsupportedVersion);
        }
        Ok(env)
    }

    /// Raw payload bytes, or `{}` when the packet carries none.
    pub fn payload(&self) -> &str {
        self.data.as_deref().map(RawValue::get).unwrap_or("{}")
    }
}

/// Serialize a tagged payload into a text frame.
pub fn encode<T: Serialize>(tag: &str, data: &T) -> Result<String> {
    let data = serde_json::to_value(data)
        .map_err(|e| BotlinkError::Decode(format!("payload encode failed: {e}")))?;
    serde_json::to_string(&serde_json::json!({
        "v": PROTOCOL_VERSION,
        "tag": tag,
        "data": data,
    }))
    .map_err(|e| BotlinkError::Decode(format!("envelope encode failed: {e}")))
}
