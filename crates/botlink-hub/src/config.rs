//! Hub config loader (strict parsing).

use std::collections::HashMap;
use std::fs;

use serde::Deserialize;

use botlink_core::{BotlinkError, Result};

pub fn load_from_file(path: &str) -> Result<HubConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| BotlinkError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<HubConfig> {
    let cfg: HubConfig = serde_yaml::from_str(s)
        .map_err(|e| BotlinkError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    pub version: u32,

    #[serde(default)]
    pub hub: HubSection,

    /// Words replaced by the outbound content filter.
    #[serde(default)]
    pub filter_words: Vec<String>,

    /// Public mirror url -> internal url. Error replies swap the internal
    /// form for the public one before anything reaches a chat.
    #[serde(default)]
    pub mirrors: HashMap<String, String>,
}

impl HubConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BotlinkError::UnsupportedVersion);
        }
        self.hub.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl HubSection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120_000).contains(&self.ping_interval_ms) {
            return Err(BotlinkError::Config(
                "hub.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10_000..=600_000).contains(&self.idle_timeout_ms) {
            return Err(BotlinkError::Config(
                "hub.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(BotlinkError::Config(
                "hub.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(1000..=60_000).contains(&self.query_timeout_ms) {
            return Err(BotlinkError::Config(
                "hub.query_timeout_ms must be between 1000 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:7700".into()
}
fn default_ping_interval_ms() -> u64 {
    20_000
}
fn default_idle_timeout_ms() -> u64 {
    60_000
}
fn default_query_timeout_ms() -> u64 {
    10_000
}
