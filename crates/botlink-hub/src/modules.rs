//! Built-in modules.
//!
//! Real content features (wiki, calculator, ...) plug in through the
//! `MessageModule` trait; the ping module ships in-tree to prove the loop
//! from event to pipelined reply.

use async_trait::async_trait;

use botlink_core::protocol::Message;
use botlink_core::Result;

use crate::environment::DelegateEnvironment;
use crate::manager::MessageModule;
use crate::sender::MessageContext;

/// Replies "pong" to "ping", quoting the asker.
#[derive(Default)]
pub struct PingModule;

impl PingModule {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageModule for PingModule {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn on_message(
        &self,
        env: &DelegateEnvironment,
        ctx: &MessageContext,
        message: &Message,
    ) -> Result<bool> {
        if message.plain_text().trim() != "ping" {
            return Ok(false);
        }
        let reply = Message::chain(vec![
            Message::Quote {
                quoted: ctx.message.clone(),
            },
            Message::text("pong"),
        ]);
        env.sender().send(ctx, &reply, false).await?;
        Ok(true)
    }
}
