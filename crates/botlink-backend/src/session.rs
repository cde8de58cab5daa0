//! Platform session seam.
//!
//! Real chat-network SDKs live behind `NetworkSession`; the protocol
//! machinery in this crate only ever talks to the trait. The demo session is
//! an in-memory loopback used for wiring checks and local runs without any
//! platform credentials.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;

use botlink_core::protocol::{
    Capabilities, EnvironmentProfile, Event, GroupInfo, Message, Target, UserInfo,
};
use botlink_core::Result;

/// One logged-in platform account.
#[async_trait]
pub trait NetworkSession: Send + Sync {
    /// Identity and capabilities announced to the hub in the handshake.
    fn profile(&self) -> EnvironmentProfile;

    /// False once the platform account is logged out; the supervisor stops
    /// reconnecting then.
    fn is_online(&self) -> bool;

    async fn group(&self, id: &str) -> Option<GroupInfo>;

    async fn user(&self, id: &str, is_stranger: bool) -> Option<UserInfo>;

    async fn name_in_group(&self, user: &UserInfo, group: &GroupInfo) -> Option<String>;

    /// Deliver a message; returns the platform-assigned message id, if any.
    async fn send(&self, target: &Target, message: &Message) -> Result<Option<String>>;

    async fn recall(&self, message_id: &str) -> Result<()>;

    async fn nudge(&self, user: &UserInfo, target: &Target) -> Result<()>;

    /// Log out and release platform resources.
    async fn close(&self);
}

/// In-memory loopback session for the "demo" network.
pub struct DemoSession {
    profile: EnvironmentProfile,
    online: AtomicBool,
    next_message_id: AtomicU64,
    groups: DashMap<String, GroupInfo>,
    users: DashMap<String, UserInfo>,
    sent: DashMap<String, Message>,
    events: mpsc::Sender<Event>,
}

impl DemoSession {
    /// Build the session plus the receiver the supervisor pumps events from.
    pub fn new(bot_id: &str) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (events, events_rx) = mpsc::channel(64);
        let session = Arc::new(Self {
            profile: EnvironmentProfile {
                network: "demo".into(),
                bot_id: format!("demo.user{bot_id}"),
                name: "Demo".into(),
                user_prefix: "demo.user".into(),
                group_prefix: "demo.group".into(),
                capabilities: Capabilities {
                    quote: true,
                    ..Default::default()
                },
            },
            online: AtomicBool::new(true),
            next_message_id: AtomicU64::new(1),
            groups: DashMap::new(),
            users: DashMap::new(),
            sent: DashMap::new(),
            events,
        });
        session.add_group(GroupInfo {
            id: "demo.group1".into(),
            name: "lobby".into(),
        });
        session.add_user(UserInfo {
            id: "demo.user1".into(),
            name: "alice".into(),
            is_stranger: false,
        });
        (session, events_rx)
    }

    pub fn add_group(&self, group: GroupInfo) {
        self.groups.insert(group.id.clone(), group);
    }

    pub fn add_user(&self, user: UserInfo) {
        self.users.insert(user.id.clone(), user);
    }

    /// Inject a native event, as a platform SDK callback would.
    pub async fn push_event(&self, event: Event) {
        let _ = self.events.send(event).await;
    }

    /// Messages delivered so far, by id. Test/demo introspection.
    pub fn delivered(&self, message_id: &str) -> Option<Message> {
        self.sent.get(message_id).map(|m| m.clone())
    }
}

#[async_trait]
impl NetworkSession for DemoSession {
    fn profile(&self) -> EnvironmentProfile {
        self.profile.clone()
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    async fn group(&self, id: &str) -> Option<GroupInfo> {
        self.groups.get(id).map(|g| g.clone())
    }

    async fn user(&self, id: &str, is_stranger: bool) -> Option<UserInfo> {
        self.users.get(id).map(|u| UserInfo {
            is_stranger,
            ..u.clone()
        })
    }

    async fn name_in_group(&self, user: &UserInfo, _group: &GroupInfo) -> Option<String> {
        Some(user.name.clone())
    }

    async fn send(&self, _target: &Target, message: &Message) -> Result<Option<String>> {
        let id = format!(
            "demo.msg{}",
            self.next_message_id.fetch_add(1, Ordering::Relaxed)
        );
        self.sent.insert(id.clone(), message.clone());
        Ok(Some(id))
    }

    async fn recall(&self, message_id: &str) -> Result<()> {
        self.sent.remove(message_id);
        Ok(())
    }

    async fn nudge(&self, _user: &UserInfo, _target: &Target) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.online.store(false, Ordering::Release);
    }
}
