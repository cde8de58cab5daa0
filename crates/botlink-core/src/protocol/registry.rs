//! Packet registry: wire tag -> reconstruction factory.
//!
//! Factories come in two shapes. Environment-free factories rebuild a packet
//! from the raw payload alone; `action.stop` ignores even that and yields the
//! canonical stop action, and `env.handshake` is environment-free because it
//! is what creates the environment. Environment-bound factories need the
//! link's active profile and variant table to resolve entity references and
//! per-network message tags, so they fail with a protocol error until the
//! handshake has been seen.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BotlinkError, Result};
use crate::protocol::packet::{self, tags, Action, EnvironmentProfile, Packet};
use crate::protocol::variant::VariantTable;

/// Per-connection context handed to environment-bound factories.
#[derive(Debug, Clone, Default)]
pub struct LinkContext {
    pub profile: Option<Arc<EnvironmentProfile>>,
    pub variants: Option<Arc<VariantTable>>,
}

impl LinkContext {
    /// Context for a link whose handshake has been exchanged.
    pub fn established(profile: EnvironmentProfile) -> Self {
        let variants = VariantTable::for_network(&profile.network);
        Self {
            profile: Some(Arc::new(profile)),
            variants: Some(Arc::new(variants)),
        }
    }

    fn require(&self) -> Result<(&EnvironmentProfile, &VariantTable)> {
        match (&self.profile, &self.variants) {
            (Some(p), Some(v)) => Ok((p.as_ref(), v.as_ref())),
            _ => Err(BotlinkError::Protocol(
                "environment-bound packet before handshake".into(),
            )),
        }
    }
}

type EnvFreeFn = Box<dyn Fn(&str) -> Result<Packet> + Send + Sync>;
type EnvBoundFn = Box<dyn Fn(&LinkContext, &str) -> Result<Packet> + Send + Sync>;

enum Factory {
    EnvFree(EnvFreeFn),
    EnvBound(EnvBoundFn),
}

/// Maps wire tags to packet factories.
pub struct PacketRegistry {
    entries: HashMap<&'static str, Factory>,
}

impl PacketRegistry {
    /// An empty registry. Most callers want [`PacketRegistry::standard`].
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a factory that needs no connection context.
    pub fn register_env_free(
        &mut self,
        tag: &'static str,
        factory: impl Fn(&str) -> Result<Packet> + Send + Sync + 'static,
    ) {
        self.entries.insert(tag, Factory::EnvFree(Box::new(factory)));
    }

    /// Register a factory resolved through the connection's environment.
    pub fn register(
        &mut self,
        tag: &'static str,
        factory: impl Fn(&LinkContext, &str) -> Result<Packet> + Send + Sync + 'static,
    ) {
        self.entries.insert(tag, Factory::EnvBound(Box::new(factory)));
    }

    /// Rebuild a typed packet from its tag and raw payload.
    pub fn reconstruct(&self, tag: &str, ctx: &LinkContext, raw: &str) -> Result<Packet> {
        match self.entries.get(tag) {
            Some(Factory::EnvFree(f)) => f(raw),
            Some(Factory::EnvBound(f)) => f(ctx, raw),
            None => Err(BotlinkError::UnknownTag(tag.to_string())),
        }
    }

    /// Registry covering the full packet taxonomy both processes speak.
    pub fn standard() -> Self {
        let mut registry = Self::new();

        registry.register_env_free(tags::HANDSHAKE, packet::decode_handshake);
        registry.register_env_free(tags::ACTION_STOP, |_raw| Ok(Packet::Action(Action::Stop)));
        registry.register_env_free(tags::QUERY_RESULT, packet::decode_query_result);

        for tag in [
            tags::GROUP_MESSAGE,
            tags::FRIEND_MESSAGE,
            tags::STRANGER_MESSAGE,
            tags::GROUP_RECALL,
            tags::FRIEND_RECALL,
            tags::MEMBER_ADD,
        ] {
            registry.register(tag, move |ctx, raw| {
                let (profile, table) = ctx.require()?;
                packet::decode_event(tag, profile, table, raw)
            });
        }

        for tag in [
            tags::QUERY_GROUP_INFO,
            tags::QUERY_USER_INFO,
            tags::QUERY_NAME_IN_GROUP,
            tags::QUERY_SEND_MESSAGE,
        ] {
            registry.register(tag, move |ctx, raw| {
                let (profile, table) = ctx.require()?;
                packet::decode_query(tag, profile, table, raw)
            });
        }

        for tag in [
            tags::ACTION_SEND_MESSAGE,
            tags::ACTION_RECALL,
            tags::ACTION_NUDGE,
        ] {
            registry.register(tag, move |ctx, raw| {
                let (profile, table) = ctx.require()?;
                packet::decode_action(tag, profile, table, raw)
            });
        }

        registry
    }
}

impl Default for PacketRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
