//! Network-agnostic message model.
//!
//! Messages are trees: a `Chain` is an ordered sequence of child messages and
//! may nest. Construction collapses empty child chains so no consumer ever
//! sees one. On the wire every node is an object tagged with the concrete
//! per-network tag from the environment's `VariantTable`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BotlinkError, Result};
use crate::protocol::variant::{MessageKind, VariantTable};

/// Identity of an already-transmitted message: platform id (when the network
/// assigned one), sender id, and send timestamp in epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageMeta {
    #[serde(default)]
    pub id: Option<String>,
    pub sender: String,
    pub time: u64,
}

/// One entry of a forwarded-message bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardEntry {
    pub sender: String,
    pub name: String,
    pub time: u64,
    pub message: Message,
}

/// A message, polymorphic over the variants every supported network shares.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text { text: String },
    At { target: String, display: String },
    Image { url: String },
    Audio { url: String },
    Quote { quoted: MessageMeta },
    Chain { items: Vec<Message> },
    Forward { title: String, entries: Vec<ForwardEntry> },
    Service { service_id: String, content: String },
    Unsupported,
}

impl Message {
    /// Plain text leaf.
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text { text: text.into() }
    }

    /// Build a chain, dropping any child that is an empty chain.
    pub fn chain(items: Vec<Message>) -> Self {
        let items = items
            .into_iter()
            .filter(|m| !matches!(m, Message::Chain { items } if items.is_empty()))
            .collect();
        Message::Chain { items }
    }

    /// The generic variant of this node.
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Text { .. } => MessageKind::Text,
            Message::At { .. } => MessageKind::At,
            Message::Image { .. } => MessageKind::Image,
            Message::Audio { .. } => MessageKind::Audio,
            Message::Quote { .. } => MessageKind::Quote,
            Message::Chain { .. } => MessageKind::Chain,
            Message::Forward { .. } => MessageKind::Forward,
            Message::Service { .. } => MessageKind::Service,
            Message::Unsupported => MessageKind::Unsupported,
        }
    }

    /// Concatenated text of all `Text` leaves, in order.
    pub fn plain_text(&self) -> String {
        match self {
            Message::Text { text } => text.clone(),
            Message::Chain { items } => items.iter().map(Message::plain_text).collect(),
            _ => String::new(),
        }
    }
}

/// Encode a message tree using the network's variant tags.
pub fn encode_message(table: &VariantTable, message: &Message) -> Result<Value> {
    let tag = table.wire_tag(message.kind());
    let value = match message {
        Message::Text { text } => json!({ "tag": tag, "text": text }),
        Message::At { target, display } => {
            json!({ "tag": tag, "target": target, "display": display })
        }
        Message::Image { url } => json!({ "tag": tag, "url": url }),
        Message::Audio { url } => json!({ "tag": tag, "url": url }),
        Message::Quote { quoted } => json!({ "tag": tag, "quoted": quoted }),
        Message::Chain { items } => {
            let items = items
                .iter()
                .map(|m| encode_message(table, m))
                .collect::<Result<Vec<_>>>()?;
            json!({ "tag": tag, "items": items })
        }
        Message::Forward { title, entries } => {
            let entries = entries
                .iter()
                .map(|e| {
                    Ok(json!({
                        "sender": e.sender,
                        "name": e.name,
                        "time": e.time,
                        "message": encode_message(table, &e.message)?,
                    }))
                })
                .collect::<Result<Vec<_>>>()?;
            json!({ "tag": tag, "title": title, "entries": entries })
        }
        Message::Service { service_id, content } => {
            json!({ "tag": tag, "service_id": service_id, "content": content })
        }
        Message::Unsupported => json!({ "tag": tag }),
    };
    Ok(value)
}

fn field<'a>(value: &'a Value, name: &str, tag: &str) -> Result<&'a Value> {
    value
        .get(name)
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: missing field {name}")))
}

fn str_field(value: &Value, name: &str, tag: &str) -> Result<String> {
    field(value, name, tag)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: field {name} must be a string")))
}

fn u64_field(value: &Value, name: &str, tag: &str) -> Result<u64> {
    field(value, name, tag)?
        .as_u64()
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: field {name} must be an integer")))
}

/// Decode a message tree; every node's tag must belong to the table's network.
pub fn decode_message(table: &VariantTable, value: &Value) -> Result<Message> {
    let tag = value
        .get("tag")
        .and_then(Value::as_str)
        .ok_or_else(|| BotlinkError::Decode("message node without tag".into()))?;
    let kind = table
        .kind_of(tag)
        .ok_or_else(|| BotlinkError::UnknownTag(tag.to_string()))?;

    let message = match kind {
        MessageKind::Text => Message::Text {
            text: str_field(value, "text", tag)?,
        },
        MessageKind::At => Message::At {
            target: str_field(value, "target", tag)?,
            display: str_field(value, "display", tag)?,
        },
        MessageKind::Image => Message::Image {
            url: str_field(value, "url", tag)?,
        },
        MessageKind::Audio => Message::Audio {
            url: str_field(value, "url", tag)?,
        },
        MessageKind::Quote => Message::Quote {
            quoted: serde_json::from_value(field(value, "quoted", tag)?.clone())
                .map_err(|e| BotlinkError::Decode(format!("{tag}: bad quoted meta: {e}")))?,
        },
        MessageKind::Chain => {
            let items = field(value, "items", tag)?
                .as_array()
                .ok_or_else(|| BotlinkError::Decode(format!("{tag}: items must be an array")))?
                .iter()
                .map(|v| decode_message(table, v))
                .collect::<Result<Vec<_>>>()?;
            Message::chain(items)
        }
        MessageKind::Forward => {
            let entries = field(value, "entries", tag)?
                .as_array()
                .ok_or_else(|| BotlinkError::Decode(format!("{tag}: entries must be an array")))?
                .iter()
                .map(|v| {
                    Ok(ForwardEntry {
                        sender: str_field(v, "sender", tag)?,
                        name: str_field(v, "name", tag)?,
                        time: u64_field(v, "time", tag)?,
                        message: decode_message(table, field(v, "message", tag)?)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Message::Forward {
                title: str_field(value, "title", tag)?,
                entries,
            }
        }
        MessageKind::Service => Message::Service {
            service_id: str_field(value, "service_id", tag)?,
            content: str_field(value, "content", tag)?,
        },
        MessageKind::Unsupported => Message::Unsupported,
    };
    Ok(message)
}
