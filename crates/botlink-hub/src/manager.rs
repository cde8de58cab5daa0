//! Event routing on the hub.
//!
//! The manager turns decoded events into module calls. Modules are the
//! pluggable content features; they receive a context and may answer through
//! the environment's pipeline. A module error becomes a user-visible reply,
//! never a crash.

use std::sync::Arc;

use async_trait::async_trait;

use botlink_core::protocol::{Event, GroupInfo, Message, Target, UserInfo};
use botlink_core::Result;

use crate::environment::DelegateEnvironment;
use crate::sender::MessageContext;

/// One content feature. Returning `Ok(true)` consumes the message; later
/// modules are not consulted.
#[async_trait]
pub trait MessageModule: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_message(
        &self,
        env: &DelegateEnvironment,
        ctx: &MessageContext,
        message: &Message,
    ) -> Result<bool>;

    async fn on_member_add(
        &self,
        _env: &DelegateEnvironment,
        _group: &GroupInfo,
        _user: &UserInfo,
    ) -> Result<()> {
        Ok(())
    }
}

/// Routes events from any backend to the module list.
pub struct MessageManager {
    modules: Vec<Arc<dyn MessageModule>>,
}

impl MessageManager {
    pub fn new(modules: Vec<Arc<dyn MessageModule>>) -> Self {
        Self { modules }
    }

    /// Entry point for every decoded event on a link.
    pub async fn dispatch_event(&self, env: Arc<DelegateEnvironment>, event: Event) {
        match event {
            Event::GroupMessage {
                group,
                user,
                message,
                meta,
            } => {
                let ctx = MessageContext {
                    dest: Target::Group(group.clone()),
                    group: Some(group),
                    user,
                    message: meta,
                };
                self.on_message(&env, ctx, message).await;
            }
            Event::FriendMessage { user, message, meta }
            | Event::StrangerMessage { user, message, meta } => {
                let ctx = MessageContext {
                    dest: Target::User(user.clone()),
                    group: None,
                    user,
                    message: meta,
                };
                self.on_message(&env, ctx, message).await;
            }
            Event::GroupRecall { group, user, time } => {
                env.sender().on_recall(Some(&group), &user, time).await;
            }
            Event::FriendRecall { user, time } => {
                env.sender().on_friend_recall(&user, time).await;
            }
            Event::MemberAdd { group, user } => {
                for module in &self.modules {
                    if let Err(e) = module.on_member_add(&env, &group, &user).await {
                        tracing::warn!(module = module.name(), error = %e, "member-add hook failed");
                    }
                }
            }
        }
    }

    async fn on_message(&self, env: &Arc<DelegateEnvironment>, ctx: MessageContext, message: Message) {
        // A parked reply-waiter takes priority over every module.
        if env
            .sender()
            .awaits()
            .deliver(ctx.group.as_ref(), &ctx.user, message.clone())
        {
            return;
        }

        for module in &self.modules {
            match module.on_message(env, &ctx, &message).await {
                Ok(true) => break,
                Ok(false) => continue,
                Err(e) => {
                    env.sender().on_error(&e, module.name(), &ctx, false).await;
                    break;
                }
            }
        }
    }
}
