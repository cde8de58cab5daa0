//! Packet taxonomy and wire payload shapes.
//!
//! A packet is one envelope: handshake, inbound chat event, query, query
//! result, or fire-and-forget action. Encoding needs the environment's
//! variant table whenever the packet embeds a message tree; everything else
//! is plain serde.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BotlinkError, Result};
use crate::protocol::entity::{GroupInfo, Target, UserInfo};
use crate::protocol::envelope;
use crate::protocol::message::{decode_message, encode_message, Message, MessageMeta};
use crate::protocol::variant::VariantTable;

/// Wire tags, one per packet type.
pub mod tags {
    pub const HANDSHAKE: &str = "env.handshake";

    pub const GROUP_MESSAGE: &str = "event.group_message";
    pub const FRIEND_MESSAGE: &str = "event.friend_message";
    pub const STRANGER_MESSAGE: &str = "event.stranger_message";
    pub const GROUP_RECALL: &str = "event.group_recall";
    pub const FRIEND_RECALL: &str = "event.friend_recall";
    pub const MEMBER_ADD: &str = "event.member_add";

    pub const QUERY_GROUP_INFO: &str = "query.group_info";
    pub const QUERY_USER_INFO: &str = "query.user_info";
    pub const QUERY_NAME_IN_GROUP: &str = "query.name_in_group";
    pub const QUERY_SEND_MESSAGE: &str = "query.send_message";
    pub const QUERY_RESULT: &str = "query.result";

    pub const ACTION_SEND_MESSAGE: &str = "action.send_message";
    pub const ACTION_RECALL: &str = "action.recall";
    pub const ACTION_NUDGE: &str = "action.nudge";
    pub const ACTION_STOP: &str = "action.stop";
}

/// Capability flags a backend announces in its handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Capabilities {
    pub forward: bool,
    pub audio: bool,
    pub audio_to_friend: bool,
    pub quote: bool,
    pub anti_filter: bool,
    pub audio_silk: bool,
    pub nudge: bool,
}

/// Identity of one backend connection: the chat network it serves and the
/// namespaces its entity ids live in. Sent once as the first packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentProfile {
    /// Network id ("qq", "telegram", "kook"); also the variant tag prefix.
    pub network: String,
    /// Prefixed id of the bot account itself.
    pub bot_id: String,
    /// Human-readable network name.
    pub name: String,
    /// Prefix of every user id on this network.
    pub user_prefix: String,
    /// Prefix of every group id on this network.
    pub group_prefix: String,
    pub capabilities: Capabilities,
}

impl EnvironmentProfile {
    pub fn check_user(&self, user: &UserInfo) -> Result<()> {
        if user.id.starts_with(&self.user_prefix) {
            Ok(())
        } else {
            Err(BotlinkError::Protocol(format!(
                "user id {} does not belong to network {}",
                user.id, self.network
            )))
        }
    }

    pub fn check_group(&self, group: &GroupInfo) -> Result<()> {
        if group.id.starts_with(&self.group_prefix) {
            Ok(())
        } else {
            Err(BotlinkError::Protocol(format!(
                "group id {} does not belong to network {}",
                group.id, self.network
            )))
        }
    }

    pub fn check_target(&self, target: &Target) -> Result<()> {
        match target {
            Target::User(u) => self.check_user(u),
            Target::Group(g) => self.check_group(g),
        }
    }
}

/// Inbound chat events, backend -> hub.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    GroupMessage {
        group: GroupInfo,
        user: UserInfo,
        message: Message,
        meta: MessageMeta,
    },
    FriendMessage {
        user: UserInfo,
        message: Message,
        meta: MessageMeta,
    },
    StrangerMessage {
        user: UserInfo,
        message: Message,
        meta: MessageMeta,
    },
    GroupRecall {
        group: GroupInfo,
        user: UserInfo,
        time: u64,
    },
    FriendRecall {
        user: UserInfo,
        time: u64,
    },
    MemberAdd {
        group: GroupInfo,
        user: UserInfo,
    },
}

/// Correlated queries, hub -> backend; each expects exactly one result.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    GroupInfo {
        query_id: u64,
        id: String,
    },
    UserInfo {
        query_id: u64,
        id: String,
        is_stranger: bool,
    },
    NameInGroup {
        query_id: u64,
        user: UserInfo,
        group: GroupInfo,
    },
    SendMessage {
        query_id: u64,
        target: Target,
        message: Message,
    },
}

impl Query {
    pub fn query_id(&self) -> u64 {
        match self {
            Query::GroupInfo { query_id, .. }
            | Query::UserInfo { query_id, .. }
            | Query::NameInGroup { query_id, .. }
            | Query::SendMessage { query_id, .. } => *query_id,
        }
    }
}

/// Correlated answer to a query; payload decoding is query-specific.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub query_id: u64,
    pub payload: Vec<u8>,
}

/// Fire-and-forget imperatives, hub -> backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SendMessage { target: Target, message: Message },
    Recall { message_id: String },
    Nudge { user: UserInfo, target: Target },
    Stop,
}

/// One typed wire packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Handshake(EnvironmentProfile),
    Event(Event),
    Query(Query),
    QueryResult(QueryResult),
    Action(Action),
}

impl Packet {
    /// The wire tag this packet serializes under.
    pub fn tag(&self) -> &'static str {
        match self {
            Packet::Handshake(_) => tags::HANDSHAKE,
            Packet::Event(e) => match e {
                Event::GroupMessage { .. } => tags::GROUP_MESSAGE,
                Event::FriendMessage { .. } => tags::FRIEND_MESSAGE,
                Event::StrangerMessage { .. } => tags::STRANGER_MESSAGE,
                Event::GroupRecall { .. } => tags::GROUP_RECALL,
                Event::FriendRecall { .. } => tags::FRIEND_RECALL,
                Event::MemberAdd { .. } => tags::MEMBER_ADD,
            },
            Packet::Query(q) => match q {
                Query::GroupInfo { .. } => tags::QUERY_GROUP_INFO,
                Query::UserInfo { .. } => tags::QUERY_USER_INFO,
                Query::NameInGroup { .. } => tags::QUERY_NAME_IN_GROUP,
                Query::SendMessage { .. } => tags::QUERY_SEND_MESSAGE,
            },
            Packet::QueryResult(_) => tags::QUERY_RESULT,
            Packet::Action(a) => match a {
                Action::SendMessage { .. } => tags::ACTION_SEND_MESSAGE,
                Action::Recall { .. } => tags::ACTION_RECALL,
                Action::Nudge { .. } => tags::ACTION_NUDGE,
                Action::Stop => tags::ACTION_STOP,
            },
        }
    }

    /// Serialize into a text frame. `table` is required for any packet that
    /// embeds a message tree.
    pub fn encode(&self, table: Option<&VariantTable>) -> Result<String> {
        let data = self.payload_value(table)?;
        envelope::encode(self.tag(), &data)
    }

    fn need_table<'a>(table: Option<&'a VariantTable>) -> Result<&'a VariantTable> {
        table.ok_or_else(|| {
            BotlinkError::Protocol("message-bearing packet needs a variant table".into())
        })
    }

    fn payload_value(&self, table: Option<&VariantTable>) -> Result<Value> {
        let value = match self {
            Packet::Handshake(profile) => serde_json::to_value(profile)
                .map_err(|e| BotlinkError::Decode(format!("handshake encode failed: {e}")))?,
            Packet::Event(event) => match event {
                Event::GroupMessage {
                    group,
                    user,
                    message,
                    meta,
                } => json!({
                    "group": group,
                    "user": user,
                    "message": encode_message(Self::need_table(table)?, message)?,
                    "meta": meta,
                }),
                Event::FriendMessage { user, message, meta }
                | Event::StrangerMessage { user, message, meta } => json!({
                    "user": user,
                    "message": encode_message(Self::need_table(table)?, message)?,
                    "meta": meta,
                }),
                Event::GroupRecall { group, user, time } => {
                    json!({ "group": group, "user": user, "time": time })
                }
                Event::FriendRecall { user, time } => json!({ "user": user, "time": time }),
                Event::MemberAdd { group, user } => json!({ "group": group, "user": user }),
            },
            Packet::Query(query) => match query {
                Query::GroupInfo { query_id, id } => json!({ "query_id": query_id, "id": id }),
                Query::UserInfo {
                    query_id,
                    id,
                    is_stranger,
                } => json!({ "query_id": query_id, "id": id, "is_stranger": is_stranger }),
                Query::NameInGroup {
                    query_id,
                    user,
                    group,
                } => json!({ "query_id": query_id, "user": user, "group": group }),
                Query::SendMessage {
                    query_id,
                    target,
                    message,
                } => json!({
                    "query_id": query_id,
                    "target": target,
                    "message": encode_message(Self::need_table(table)?, message)?,
                }),
            },
            Packet::QueryResult(result) => json!({
                "query_id": result.query_id,
                "payload": BASE64.encode(&result.payload),
            }),
            Packet::Action(action) => match action {
                Action::SendMessage { target, message } => json!({
                    "target": target,
                    "message": encode_message(Self::need_table(table)?, message)?,
                }),
                Action::Recall { message_id } => json!({ "message_id": message_id }),
                Action::Nudge { user, target } => json!({ "user": user, "target": target }),
                Action::Stop => json!({}),
            },
        };
        Ok(value)
    }
}

// --------------------
// Payload decoding, one function per tag family. The registry wires these to
// wire tags; environment-bound ones validate id prefixes against the profile.
// --------------------

fn parse<T: for<'de> Deserialize<'de>>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| BotlinkError::Decode(format!("{what}: {e}")))
}

fn parse_value(raw: &str, what: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| BotlinkError::Decode(format!("{what}: {e}")))
}

pub fn decode_handshake(raw: &str) -> Result<Packet> {
    let profile: EnvironmentProfile = parse(raw, "handshake")?;
    if profile.network.is_empty() || profile.user_prefix.is_empty() {
        return Err(BotlinkError::Protocol("handshake with empty identity".into()));
    }
    Ok(Packet::Handshake(profile))
}

pub fn decode_event(
    tag: &str,
    profile: &EnvironmentProfile,
    table: &VariantTable,
    raw: &str,
) -> Result<Packet> {
    let value = parse_value(raw, tag)?;
    let event = match tag {
        tags::GROUP_MESSAGE => {
            let group: GroupInfo = field_of(&value, "group", tag)?;
            let user: UserInfo = field_of(&value, "user", tag)?;
            profile.check_group(&group)?;
            profile.check_user(&user)?;
            Event::GroupMessage {
                group,
                user,
                message: message_of(&value, table, tag)?,
                meta: field_of(&value, "meta", tag)?,
            }
        }
        tags::FRIEND_MESSAGE | tags::STRANGER_MESSAGE => {
            let user: UserInfo = field_of(&value, "user", tag)?;
            profile.check_user(&user)?;
            let message = message_of(&value, table, tag)?;
            let meta = field_of(&value, "meta", tag)?;
            if tag == tags::FRIEND_MESSAGE {
                Event::FriendMessage { user, message, meta }
            } else {
                Event::StrangerMessage { user, message, meta }
            }
        }
        tags::GROUP_RECALL => {
            let group: GroupInfo = field_of(&value, "group", tag)?;
            let user: UserInfo = field_of(&value, "user", tag)?;
            profile.check_group(&group)?;
            profile.check_user(&user)?;
            Event::GroupRecall {
                group,
                user,
                time: u64_of(&value, "time", tag)?,
            }
        }
        tags::FRIEND_RECALL => {
            let user: UserInfo = field_of(&value, "user", tag)?;
            profile.check_user(&user)?;
            Event::FriendRecall {
                user,
                time: u64_of(&value, "time", tag)?,
            }
        }
        tags::MEMBER_ADD => {
            let group: GroupInfo = field_of(&value, "group", tag)?;
            let user: UserInfo = field_of(&value, "user", tag)?;
            profile.check_group(&group)?;
            profile.check_user(&user)?;
            Event::MemberAdd { group, user }
        }
        other => return Err(BotlinkError::UnknownTag(other.to_string())),
    };
    Ok(Packet::Event(event))
}

pub fn decode_query(
    tag: &str,
    profile: &EnvironmentProfile,
    table: &VariantTable,
    raw: &str,
) -> Result<Packet> {
    let value = parse_value(raw, tag)?;
    let query_id = u64_of(&value, "query_id", tag)?;
    let query = match tag {
        tags::QUERY_GROUP_INFO => Query::GroupInfo {
            query_id,
            id: str_of(&value, "id", tag)?,
        },
        tags::QUERY_USER_INFO => Query::UserInfo {
            query_id,
            id: str_of(&value, "id", tag)?,
            is_stranger: value
                .get("is_stranger")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        },
        tags::QUERY_NAME_IN_GROUP => {
            let user: UserInfo = field_of(&value, "user", tag)?;
            let group: GroupInfo = field_of(&value, "group", tag)?;
            profile.check_user(&user)?;
            profile.check_group(&group)?;
            Query::NameInGroup {
                query_id,
                user,
                group,
            }
        }
        tags::QUERY_SEND_MESSAGE => {
            let target: Target = field_of(&value, "target", tag)?;
            profile.check_target(&target)?;
            Query::SendMessage {
                query_id,
                target,
                message: message_of(&value, table, tag)?,
            }
        }
        other => return Err(BotlinkError::UnknownTag(other.to_string())),
    };
    Ok(Packet::Query(query))
}

pub fn decode_query_result(raw: &str) -> Result<Packet> {
    let value = parse_value(raw, tags::QUERY_RESULT)?;
    let payload = str_of(&value, "payload", tags::QUERY_RESULT)?;
    let payload = BASE64
        .decode(payload.as_bytes())
        .map_err(|e| BotlinkError::Decode(format!("query result payload: {e}")))?;
    Ok(Packet::QueryResult(QueryResult {
        query_id: u64_of(&value, "query_id", tags::QUERY_RESULT)?,
        payload,
    }))
}

pub fn decode_action(
    tag: &str,
    profile: &EnvironmentProfile,
    table: &VariantTable,
    raw: &str,
) -> Result<Packet> {
    let value = parse_value(raw, tag)?;
    let action = match tag {
        tags::ACTION_SEND_MESSAGE => {
            let target: Target = field_of(&value, "target", tag)?;
            profile.check_target(&target)?;
            Action::SendMessage {
                target,
                message: message_of(&value, table, tag)?,
            }
        }
        tags::ACTION_RECALL => Action::Recall {
            message_id: str_of(&value, "message_id", tag)?,
        },
        tags::ACTION_NUDGE => {
            let user: UserInfo = field_of(&value, "user", tag)?;
            let target: Target = field_of(&value, "target", tag)?;
            profile.check_user(&user)?;
            profile.check_target(&target)?;
            Action::Nudge { user, target }
        }
        other => return Err(BotlinkError::UnknownTag(other.to_string())),
    };
    Ok(Packet::Action(action))
}

fn field_of<T: for<'de> Deserialize<'de>>(value: &Value, name: &str, tag: &str) -> Result<T> {
    let v = value
        .get(name)
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: missing field {name}")))?;
    serde_json::from_value(v.clone())
        .map_err(|e| BotlinkError::Decode(format!("{tag}: bad field {name}: {e}")))
}

fn message_of(value: &Value, table: &VariantTable, tag: &str) -> Result<Message> {
    let v = value
        .get("message")
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: missing field message")))?;
    decode_message(table, v)
}

fn str_of(value: &Value, name: &str, tag: &str) -> Result<String> {
    value
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: field {name} must be a string")))
}

fn u64_of(value: &Value, name: &str, tag: &str) -> Result<u64> {
    value
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| BotlinkError::Decode(format!("{tag}: field {name} must be an integer")))
}
