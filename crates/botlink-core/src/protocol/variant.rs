//! Message variant tables.
//!
//! Each chat network names its message variants with its own wire tags
//! ("qq.text", "kook.at", ...). A `VariantTable` is the explicit two-way
//! lookup between the network-agnostic `MessageKind` and those concrete tags;
//! one table exists per environment and is consulted on every message encode
//! and decode.

use std::collections::HashMap;

/// Network-agnostic message variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Text,
    At,
    Image,
    Audio,
    Quote,
    Chain,
    Forward,
    Service,
    Unsupported,
}

impl MessageKind {
    /// All variants, in wire-registration order.
    pub const ALL: [MessageKind; 9] = [
        MessageKind::Text,
        MessageKind::At,
        MessageKind::Image,
        MessageKind::Audio,
        MessageKind::Quote,
        MessageKind::Chain,
        MessageKind::Forward,
        MessageKind::Service,
        MessageKind::Unsupported,
    ];

    /// Suffix appended to the network id to form the concrete tag.
    pub fn suffix(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::At => "at",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Quote => "quote",
            MessageKind::Chain => "chain",
            MessageKind::Forward => "forward",
            MessageKind::Service => "service",
            MessageKind::Unsupported => "unsupported",
        }
    }
}

/// Two-way (kind <-> concrete wire tag) lookup for one network.
#[derive(Debug, Clone)]
pub struct VariantTable {
    network: String,
    tags: HashMap<MessageKind, String>,
    kinds: HashMap<String, MessageKind>,
}

impl VariantTable {
    /// Build the table for a network id ("qq", "telegram", "kook").
    pub fn for_network(network: &str) -> Self {
        let mut tags = HashMap::new();
        let mut kinds = HashMap::new();
        for kind in MessageKind::ALL {
            let tag = format!("{network}.{}", kind.suffix());
            kinds.insert(tag.clone(), kind);
            tags.insert(kind, tag);
        }
        Self {
            network: network.to_string(),
            tags,
            kinds,
        }
    }

    /// The network id this table serves.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Concrete wire tag for a generic variant.
    pub fn wire_tag(&self, kind: MessageKind) -> &str {
        // Every kind is inserted in `for_network`; the map is total.
        self.tags.get(&kind).map(String::as_str).unwrap_or("unsupported")
    }

    /// Generic variant for a concrete wire tag, if this network owns it.
    pub fn kind_of(&self, tag: &str) -> Option<MessageKind> {
        self.kinds.get(tag).copied()
    }
}
