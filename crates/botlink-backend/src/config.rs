//! Backend config loader (strict parsing).

use std::fs;

use serde::Deserialize;

use botlink_core::{BotlinkError, Result};

pub fn load_from_file(path: &str) -> Result<BackendConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| BotlinkError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BackendConfig> {
    let cfg: BackendConfig = serde_yaml::from_str(s)
        .map_err(|e| BotlinkError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub version: u32,

    #[serde(default)]
    pub hub: HubLink,

    pub account: AccountSection,
}

impl BackendConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BotlinkError::UnsupportedVersion);
        }
        self.hub.validate()?;
        if self.account.network.is_empty() {
            return Err(BotlinkError::Config("account.network must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubLink {
    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for HubLink {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            max_retries: default_max_retries(),
        }
    }
}

impl HubLink {
    pub fn validate(&self) -> Result<()> {
        if !self.url.starts_with("ws://") && !self.url.starts_with("wss://") {
            return Err(BotlinkError::Config(
                "hub.url must be a ws:// or wss:// url".into(),
            ));
        }
        if self.max_retries == 0 {
            return Err(BotlinkError::Config("hub.max_retries must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountSection {
    /// Network id; "demo" runs the built-in loopback session.
    pub network: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub token: String,
}

fn default_url() -> String {
    "ws://127.0.0.1:7700/v1/link".into()
}
fn default_reconnect_backoff_ms() -> u64 {
    60_000
}
fn default_max_retries() -> u32 {
    20
}
