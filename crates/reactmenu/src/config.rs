//! Dispatcher configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codec::{IconUrlCodec, DEFAULT_ICON_BASE_URL, DEFAULT_MAX_TOKEN_LEN};

/// Which reaction removals are treated as clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalPolicy {
    /// Removals drive transitions everywhere, same as additions.
    #[default]
    Everywhere,
    /// Removals only count in direct-message channels. Elsewhere menus strip
    /// user reactions after each click, and those removals must not
    /// transition a second time.
    DirectOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Emoji that are valid controls on every menu.
    pub universal_controls: Vec<String>,
    pub removal_events: RemovalPolicy,
    /// Drop events whose emoji is not currently a reaction on the surface.
    pub require_live_reaction: bool,
    /// Icon URL the state codec hangs the encoded state off.
    pub icon_base_url: String,
    /// Upper bound on the encoded state URL.
    pub max_token_len: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            universal_controls: vec!["\u{274C}".to_owned()],
            removal_events: RemovalPolicy::default(),
            require_live_reaction: true,
            icon_base_url: DEFAULT_ICON_BASE_URL.to_owned(),
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
        }
    }
}

impl DispatcherConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid dispatcher config")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn codec(&self) -> IconUrlCodec {
        IconUrlCodec::new(self.icon_base_url.clone(), self.max_token_len)
    }
}
