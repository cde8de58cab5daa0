//! Per-backend environments on the hub side.
//!
//! One `DelegateEnvironment` exists per connected backend, created when its
//! handshake arrives and dropped when the connection closes. It owns the
//! outbound pipeline for that network and answers entity lookups by asking
//! the backend over the link.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use botlink_core::protocol::{
    Action, EnvironmentProfile, GroupInfo, Packet, Query, Target, UserInfo,
};
use botlink_core::{BotlinkError, Result};
use botlink_link::{Connection, QueryCorrelator};

use crate::filter::WordFilter;
use crate::journal::ErrorJournal;
use crate::sender::{LinkTransmitter, MessageSender, StatusIllustrator};

/// Hub-side face of one connected backend.
pub struct DelegateEnvironment {
    profile: Arc<EnvironmentProfile>,
    conn: Connection,
    correlator: Arc<QueryCorrelator>,
    sender: MessageSender,
}

impl DelegateEnvironment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: EnvironmentProfile,
        conn: Connection,
        correlator: Arc<QueryCorrelator>,
        filter: Arc<WordFilter>,
        journal: Arc<ErrorJournal>,
        illustrator: Arc<dyn StatusIllustrator>,
        mirrors: HashMap<String, String>,
    ) -> Self {
        let anti_filter = profile.capabilities.anti_filter;
        let transmitter = Arc::new(LinkTransmitter::new(conn.clone(), Arc::clone(&correlator)));
        let sender = MessageSender::new(
            transmitter,
            filter,
            journal,
            illustrator,
            mirrors,
            anti_filter,
        );
        Self {
            profile: Arc::new(profile),
            conn,
            correlator,
            sender,
        }
    }

    pub fn profile(&self) -> &EnvironmentProfile {
        &self.profile
    }

    pub fn network(&self) -> &str {
        &self.profile.network
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    /// Resolve a group through the backend. The sentinel "Unknown" answer
    /// decodes like any other group.
    pub async fn group_info(&self, id: &str) -> Result<GroupInfo> {
        let payload = self
            .correlator
            .ask(&self.conn, |query_id| Query::GroupInfo {
                query_id,
                id: id.to_string(),
            })
            .await?;
        serde_json::from_slice(&payload)
            .map_err(|e| BotlinkError::Decode(format!("group info payload: {e}")))
    }

    /// Resolve a user through the backend.
    pub async fn user_info(&self, id: &str, is_stranger: bool) -> Result<UserInfo> {
        let payload = self
            .correlator
            .ask(&self.conn, |query_id| Query::UserInfo {
                query_id,
                id: id.to_string(),
                is_stranger,
            })
            .await?;
        serde_json::from_slice(&payload)
            .map_err(|e| BotlinkError::Decode(format!("user info payload: {e}")))
    }

    /// A user's display name within a group.
    pub async fn name_in_group(&self, user: &UserInfo, group: &GroupInfo) -> Result<String> {
        let payload = self
            .correlator
            .ask(&self.conn, |query_id| Query::NameInGroup {
                query_id,
                user: user.clone(),
                group: group.clone(),
            })
            .await?;
        String::from_utf8(payload)
            .map_err(|e| BotlinkError::Decode(format!("name payload not utf-8: {e}")))
    }

    /// Poke a user, on networks that support it.
    pub async fn nudge(&self, user: &UserInfo, target: &Target) -> Result<()> {
        if !self.profile.capabilities.nudge {
            return Err(BotlinkError::Platform(format!(
                "{} does not support nudges",
                self.profile.name
            )));
        }
        self.conn
            .send_packet(&Packet::Action(Action::Nudge {
                user: user.clone(),
                target: target.clone(),
            }))
            .await
    }

    /// Ask the backend to shut down, then close our side of the link.
    pub async fn stop(&self) -> Result<()> {
        self.conn.send_packet(&Packet::Action(Action::Stop)).await?;
        self.conn.close().await;
        Ok(())
    }
}

/// Registry of live environments, keyed by connection id.
#[derive(Default)]
pub struct Environments {
    by_conn: DashMap<u64, Arc<DelegateEnvironment>>,
}

impl Environments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn_id: u64, env: Arc<DelegateEnvironment>) {
        self.by_conn.insert(conn_id, env);
    }

    pub fn remove(&self, conn_id: u64) -> Option<Arc<DelegateEnvironment>> {
        self.by_conn.remove(&conn_id).map(|(_, env)| env)
    }

    pub fn get(&self, conn_id: u64) -> Option<Arc<DelegateEnvironment>> {
        self.by_conn.get(&conn_id).map(|e| Arc::clone(e.value()))
    }

    pub fn by_network(&self, network: &str) -> Option<Arc<DelegateEnvironment>> {
        self.by_conn
            .iter()
            .find(|e| e.value().network() == network)
            .map(|e| Arc::clone(e.value()))
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}
