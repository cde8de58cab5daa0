//! Chat-network entities referenced by packets.
//!
//! Ids are globally scoped strings carrying a network prefix ("qq.user12345",
//! "kook.group67"), so a reference is only meaningful on the connection whose
//! environment owns that prefix.

use serde::{Deserialize, Serialize};

/// A user on a chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserInfo {
    /// Prefixed user id, e.g. "qq.user12345".
    pub id: String,
    /// Display name; "Unknown" for the sentinel answer.
    pub name: String,
    /// True for users without a friend relation to the bot.
    #[serde(default)]
    pub is_stranger: bool,
}

impl UserInfo {
    /// Sentinel answer for a user the backend cannot resolve.
    pub fn unknown(id: impl Into<String>, is_stranger: bool) -> Self {
        Self {
            id: id.into(),
            name: "Unknown".into(),
            is_stranger,
        }
    }
}

/// A group (or channel) on a chat network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupInfo {
    /// Prefixed group id, e.g. "qq.group67890".
    pub id: String,
    /// Display name; "Unknown" for the sentinel answer.
    pub name: String,
}

impl GroupInfo {
    /// Sentinel answer for a group the backend cannot resolve.
    pub fn unknown(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Unknown".into(),
        }
    }
}

/// Destination of an outbound send: a user or a group, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    User(UserInfo),
    Group(GroupInfo),
}

impl Target {
    /// The prefixed id of whichever side this target is.
    pub fn id(&self) -> &str {
        match self {
            Target::User(u) => &u.id,
            Target::Group(g) => &g.id,
        }
    }
}
