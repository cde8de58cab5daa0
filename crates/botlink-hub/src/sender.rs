//! Outbound message pipeline.
//!
//! Every user-facing send passes five stages in fixed order: word filter,
//! anti-automation stamping, rate limiting, transmission, recall
//! bookkeeping. One async mutex per environment serializes the send path;
//! the rate-limit sleep happens while holding it, so a slow send stalls the
//! whole environment and nothing else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use botlink_core::protocol::{
    Action, GroupInfo, Message, MessageMeta, Packet, Query, Target, UserInfo,
};
use botlink_core::{BotlinkError, Result};
use botlink_link::{Connection, QueryCorrelator};

use crate::filter::{WordFilter, FILTER_NOTICE};
use crate::journal::ErrorJournal;

/// Minimum spacing between two sends on one environment.
pub const SEND_INTERVAL: Duration = Duration::from_millis(250);

/// Bound of the sent-message recall store.
pub const RECALL_CAPACITY: usize = 100;

/// Decoy strings appended to every 10th eligible send on networks that run
/// automated content filters.
pub const ANTI_AUTO_MARKERS: [&str; 4] =
    ["[ffk]", ">anti-auto_filter<", "~防止风向操控~", "=_禁止符卡攻击_="];

/// Apologies opening a user-visible failure reply.
pub const APOLOGIES: [&str; 3] = ["发生了错误", "bot发生了异常", "bot陷入无意识之中"];

/// Where an inbound message came from and where the reply goes.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContext {
    pub group: Option<GroupInfo>,
    pub user: UserInfo,
    /// Identity of the originating message; its `time` addresses recalls.
    pub message: MessageMeta,
    pub dest: Target,
}

/// One tracked send, kept for recall-by-identity.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub context: MessageContext,
    pub message: Message,
    pub message_id: Option<String>,
    pub sent_at: u64,
}

/// Transmission seam: the production implementation speaks the link, tests
/// record calls and timestamps.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Deliver a message. Recallable sends return the platform-assigned
    /// message id when the network hands one out.
    async fn transmit(
        &self,
        target: &Target,
        message: &Message,
        recallable: bool,
    ) -> Result<Option<String>>;

    /// Retract a previously sent message by platform id.
    async fn recall(&self, message_id: &str) -> Result<()>;
}

/// Production transmitter: recallable sends go out as correlated queries so
/// the platform message id comes back, the rest as fire-and-forget actions.
pub struct LinkTransmitter {
    conn: Connection,
    correlator: Arc<QueryCorrelator>,
}

impl LinkTransmitter {
    pub fn new(conn: Connection, correlator: Arc<QueryCorrelator>) -> Self {
        Self { conn, correlator }
    }
}

#[async_trait]
impl Transmitter for LinkTransmitter {
    async fn transmit(
        &self,
        target: &Target,
        message: &Message,
        recallable: bool,
    ) -> Result<Option<String>> {
        if recallable {
            let payload = self
                .correlator
                .ask(&self.conn, |query_id| Query::SendMessage {
                    query_id,
                    target: target.clone(),
                    message: message.clone(),
                })
                .await?;
            let id = String::from_utf8(payload)
                .map_err(|e| BotlinkError::Decode(format!("message id not utf-8: {e}")))?;
            Ok((!id.is_empty()).then_some(id))
        } else {
            self.conn
                .send_packet(&Packet::Action(Action::SendMessage {
                    target: target.clone(),
                    message: message.clone(),
                }))
                .await?;
            Ok(None)
        }
    }

    async fn recall(&self, message_id: &str) -> Result<()> {
        self.conn
            .send_packet(&Packet::Action(Action::Recall {
                message_id: message_id.to_string(),
            }))
            .await
    }
}

/// Fetches an illustration url for an HTTP-style status code.
#[async_trait]
pub trait StatusIllustrator: Send + Sync {
    async fn fetch(&self, code: u16) -> Option<String>;
}

/// status-cat illustration service backed by reqwest.
pub struct HttpCatIllustrator {
    client: reqwest::Client,
}

impl HttpCatIllustrator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpCatIllustrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusIllustrator for HttpCatIllustrator {
    async fn fetch(&self, code: u16) -> Option<String> {
        let url = format!("https://http.cat/{code}");
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => Some(url),
            _ => None,
        }
    }
}

/// Reply-waiters keyed by (group, user): the next inbound message from that
/// user in that group completes the waiter instead of reaching modules.
#[derive(Default)]
pub struct AwaitTable {
    waiters: DashMap<String, oneshot::Sender<Message>>,
}

impl AwaitTable {
    fn key(group: Option<&GroupInfo>, user: &UserInfo) -> String {
        format!(
            "{}|{}",
            group.map(|g| g.id.as_str()).unwrap_or("-"),
            user.id
        )
    }

    /// Park a waiter; an earlier waiter for the same key is replaced.
    pub fn register(&self, group: Option<&GroupInfo>, user: &UserInfo) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(Self::key(group, user), tx);
        rx
    }

    /// Hand a message to a parked waiter. Returns false when nobody waits.
    pub fn deliver(&self, group: Option<&GroupInfo>, user: &UserInfo, message: Message) -> bool {
        match self.waiters.remove(&Self::key(group, user)) {
            Some((_, tx)) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

struct SendState {
    last_send: Option<Instant>,
    sent: std::collections::VecDeque<SentRecord>,
}

/// The per-environment send pipeline.
pub struct MessageSender {
    transmitter: Arc<dyn Transmitter>,
    filter: Arc<WordFilter>,
    journal: Arc<ErrorJournal>,
    illustrator: Arc<dyn StatusIllustrator>,
    mirrors: HashMap<String, String>,
    anti_filter: bool,
    counter: AtomicU64,
    state: Mutex<SendState>,
    awaits: AwaitTable,
}

impl MessageSender {
    pub fn new(
        transmitter: Arc<dyn Transmitter>,
        filter: Arc<WordFilter>,
        journal: Arc<ErrorJournal>,
        illustrator: Arc<dyn StatusIllustrator>,
        mirrors: HashMap<String, String>,
        anti_filter: bool,
    ) -> Self {
        Self {
            transmitter,
            filter,
            journal,
            illustrator,
            mirrors,
            anti_filter,
            counter: AtomicU64::new(0),
            state: Mutex::new(SendState {
                last_send: None,
                sent: std::collections::VecDeque::new(),
            }),
            awaits: AwaitTable::default(),
        }
    }

    pub fn awaits(&self) -> &AwaitTable {
        &self.awaits
    }

    /// Stage 1: pass text leaves through the word filter; if anything was
    /// altered, rebuild with the visible notice appended.
    fn apply_word_filter(&self, message: &Message) -> Message {
        let (rebuilt, altered) = self.filter.filter_message(message);
        if altered {
            Message::chain(vec![rebuilt, Message::text(FILTER_NOTICE)])
        } else {
            rebuilt
        }
    }

    /// Stage 2: every 10th eligible send gets a decoy marker. Forward, audio
    /// and image sends are exempt, as are networks without the anti-filter
    /// capability.
    fn stamp_anti_auto(&self, message: Message) -> Message {
        if !self.anti_filter {
            return message;
        }
        if matches!(
            message,
            Message::Forward { .. } | Message::Audio { .. } | Message::Image { .. }
        ) {
            return message;
        }
        let nth = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if nth % 10 == 0 {
            let marker = ANTI_AUTO_MARKERS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(ANTI_AUTO_MARKERS[0]);
            Message::chain(vec![message, Message::text(format!("\n{marker}"))])
        } else {
            message
        }
    }

    /// Send a message through the full pipeline. Returns the message as
    /// actually transmitted (filter and stamping included).
    pub async fn send(
        &self,
        context: &MessageContext,
        message: &Message,
        recallable: bool,
    ) -> Result<Message> {
        let message = self.apply_word_filter(message);
        let message = self.stamp_anti_auto(message);

        let mut state = self.state.lock().await;

        // Stage 3: coarse global throttle for this environment.
        if let Some(last) = state.last_send {
            let since = last.elapsed();
            if since < SEND_INTERVAL {
                tokio::time::sleep(SEND_INTERVAL - since).await;
            }
        }

        // Stage 4: transmit.
        let message_id = self
            .transmitter
            .transmit(&context.dest, &message, recallable)
            .await?;

        // Stage 5: recall bookkeeping.
        if recallable {
            state.sent.push_back(SentRecord {
                context: context.clone(),
                message: message.clone(),
                message_id,
                sent_at: epoch_millis(),
            });
        }
        while state.sent.len() > RECALL_CAPACITY {
            state.sent.pop_front();
        }
        state.last_send = Some(Instant::now());

        Ok(message)
    }

    /// Recallable send that also parks a reply-waiter for the addressee; the
    /// returned receiver yields that user's next message in this context.
    pub async fn send_await(
        &self,
        context: &MessageContext,
        message: &Message,
    ) -> Result<oneshot::Receiver<Message>> {
        let rx = self.awaits.register(context.group.as_ref(), &context.user);
        self.send(context, message, true).await?;
        Ok(rx)
    }

    /// Record a failure and reply to the user with a quoted apology. The
    /// reply goes through the same pipeline as any other send.
    pub async fn on_error(
        &self,
        error: &BotlinkError,
        module: &str,
        context: &MessageContext,
        recallable: bool,
    ) {
        self.journal.record(module, error.to_string());

        let apology = APOLOGIES
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(APOLOGIES[0]);
        let quote = Message::Quote {
            quoted: context.message.clone(),
        };

        let reply = if let Some(code) = error.status_code() {
            let mut items = vec![quote, Message::text(format!("{apology}: 状态码{code}"))];
            if let Some(url) = self.illustrator.fetch(code).await {
                items.push(Message::Image { url });
            }
            Message::chain(items)
        } else {
            let mut detail = error.to_string();
            for (mirror, internal) in &self.mirrors {
                if detail.contains(internal.as_str()) {
                    detail = detail.replace(internal.as_str(), mirror);
                }
            }
            let detail = if detail.chars().count() > 100 {
                error.kind_name().to_string()
            } else {
                detail
            };
            Message::chain(vec![quote, Message::text(format!("{apology}: {detail}"))])
        };

        if let Err(e) = self.send(context, &reply, recallable).await {
            tracing::error!(module, error = %e, "failed to deliver error reply");
        }
    }

    /// Retract stored sends matching (group identity or both absent) AND
    /// user AND originating-message timestamp.
    pub async fn on_recall(&self, group: Option<&GroupInfo>, user: &UserInfo, time: u64) {
        let state = self.state.lock().await;
        for record in state.sent.iter() {
            let group_match = match (group, &record.context.group) {
                (None, None) => true,
                (Some(a), Some(b)) => a.id == b.id,
                _ => false,
            };
            if !group_match
                || record.context.user.id != user.id
                || record.context.message.time != time
            {
                continue;
            }
            let Some(message_id) = record.message_id.as_deref() else {
                continue;
            };
            if let Err(e) = self.transmitter.recall(message_id).await {
                tracing::warn!(message_id, error = %e, "recall failed");
            }
        }
    }

    /// Friend recalls carry no group: same predicate with group absent.
    pub async fn on_friend_recall(&self, user: &UserInfo, time: u64) {
        self.on_recall(None, user, time).await;
    }

    /// Snapshot of the recall store, oldest first.
    pub async fn sent_records(&self) -> Vec<SentRecord> {
        self.state.lock().await.sent.iter().cloned().collect()
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
