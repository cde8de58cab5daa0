//! Query and action handling against the platform session.
//!
//! Queries never error toward the hub: an entity the platform cannot resolve
//! degrades to the "Unknown" sentinel answer with the requested id. Actions
//! are executed best-effort; failures are logged, not returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use botlink_core::protocol::{
    packet::tags, Action, GroupInfo, Packet, Query, QueryResult, UserInfo,
};
use botlink_core::{BotlinkError, Result};
use botlink_link::{Connection, Dispatcher, LinkHook, PacketHandler};

use crate::session::NetworkSession;

/// Answers the hub's queries and executes its actions.
pub struct Responder {
    session: Arc<dyn NetworkSession>,
    stopped: Arc<AtomicBool>,
}

impl Responder {
    pub fn new(session: Arc<dyn NetworkSession>, stopped: Arc<AtomicBool>) -> Self {
        Self { session, stopped }
    }

    /// Register this responder for every query and action tag.
    pub fn register_on(self: &Arc<Self>, dispatcher: &Dispatcher) {
        for tag in [
            tags::QUERY_GROUP_INFO,
            tags::QUERY_USER_INFO,
            tags::QUERY_NAME_IN_GROUP,
            tags::QUERY_SEND_MESSAGE,
            tags::ACTION_SEND_MESSAGE,
            tags::ACTION_RECALL,
            tags::ACTION_NUDGE,
            tags::ACTION_STOP,
        ] {
            dispatcher.register(tag, Arc::clone(self) as Arc<dyn PacketHandler>);
        }
    }

    async fn answer(&self, conn: &Connection, query_id: u64, payload: Vec<u8>) -> Result<()> {
        conn.send_packet(&Packet::QueryResult(QueryResult { query_id, payload }))
            .await
    }

    async fn handle_query(&self, conn: &Connection, query: Query) -> Result<()> {
        match query {
            Query::GroupInfo { query_id, id } => {
                let info = self
                    .session
                    .group(&id)
                    .await
                    .unwrap_or_else(|| GroupInfo::unknown(&id));
                let payload = serde_json::to_vec(&info)
                    .map_err(|e| BotlinkError::Decode(format!("group info encode: {e}")))?;
                self.answer(conn, query_id, payload).await
            }
            Query::UserInfo {
                query_id,
                id,
                is_stranger,
            } => {
                let info = self
                    .session
                    .user(&id, is_stranger)
                    .await
                    .unwrap_or_else(|| UserInfo::unknown(&id, is_stranger));
                let payload = serde_json::to_vec(&info)
                    .map_err(|e| BotlinkError::Decode(format!("user info encode: {e}")))?;
                self.answer(conn, query_id, payload).await
            }
            Query::NameInGroup {
                query_id,
                user,
                group,
            } => {
                let name = self
                    .session
                    .name_in_group(&user, &group)
                    .await
                    .unwrap_or_else(|| user.name.clone());
                self.answer(conn, query_id, name.into_bytes()).await
            }
            Query::SendMessage {
                query_id,
                target,
                message,
            } => {
                let message_id = match self.session.send(&target, &message).await {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::warn!(target = target.id(), error = %e, "platform send failed");
                        None
                    }
                };
                self.answer(conn, query_id, message_id.unwrap_or_default().into_bytes())
                    .await
            }
        }
    }

    async fn handle_action(&self, conn: &Connection, action: Action) -> Result<()> {
        match action {
            Action::SendMessage { target, message } => {
                if let Err(e) = self.session.send(&target, &message).await {
                    tracing::warn!(target = target.id(), error = %e, "platform send failed");
                }
            }
            Action::Recall { message_id } => {
                if let Err(e) = self.session.recall(&message_id).await {
                    tracing::warn!(message_id, error = %e, "platform recall failed");
                }
            }
            Action::Nudge { user, target } => {
                if let Err(e) = self.session.nudge(&user, &target).await {
                    tracing::warn!(user = user.id, error = %e, "platform nudge failed");
                }
            }
            Action::Stop => {
                tracing::info!("stop action received, shutting down");
                self.stopped.store(true, Ordering::Release);
                self.session.close().await;
                conn.close().await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PacketHandler for Responder {
    async fn handle(&self, conn: &Connection, packet: Packet) -> Result<()> {
        match packet {
            Packet::Query(query) => self.handle_query(conn, query).await,
            Packet::Action(action) => self.handle_action(conn, action).await,
            _ => Ok(()),
        }
    }
}

/// Sends our environment as the first packet of every session.
pub struct HandshakeHook {
    session: Arc<dyn NetworkSession>,
    sent: Arc<AtomicBool>,
}

impl HandshakeHook {
    pub fn new(session: Arc<dyn NetworkSession>) -> Self {
        Self {
            session,
            sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether the handshake made it onto the wire this session.
    pub fn sent_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.sent)
    }
}

#[async_trait]
impl LinkHook for HandshakeHook {
    async fn opened(&self, conn: &Connection) {
        let profile = self.session.profile();
        conn.establish(profile.clone());
        match conn.send_packet(&Packet::Handshake(profile)).await {
            Ok(()) => self.sent.store(true, Ordering::Release),
            Err(e) => tracing::warn!(error = %e, "handshake send failed"),
        }
    }
}
