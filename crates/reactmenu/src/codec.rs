//! State codec: carries a [`MenuState`] inside a surface.
//!
//! Chat messages have no generic data field, so the state rides in the one
//! place that survives a send/edit round trip untouched: the footer icon URL.
//! [`IconUrlCodec`] appends the state to a real icon URL as a query
//! parameter, which the transport accepts and clients ignore.
//!
//! ```text
//! https://cdn.example/icon.png?ims=eyJtZW51X3R5cGUiOiJRdWl6TWVudSIsLi4ufQ
//!                              └─ base64url(JSON envelope), no padding
//! ```

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::CodecError;
use crate::state::MenuState;
use crate::surface::SurfaceContent;

/// Query parameter holding the encoded state.
pub const STATE_PARAM: &str = "ims";

/// Longest URL the transport accepts in an icon field.
pub const DEFAULT_MAX_TOKEN_LEN: usize = 2048;

/// Placeholder icon used when no base URL is configured.
pub const DEFAULT_ICON_BASE_URL: &str = "https://cdn.discordapp.com/embed/avatars/0.png";

/// Serialization boundary between a [`MenuState`] and the surface that carries it.
///
/// `decode` must never fail loudly: anything it cannot read is simply not a
/// tracked menu.
pub trait StateCodec: Send + Sync {
    fn encode(&self, state: &MenuState) -> Result<String, CodecError>;

    fn decode(&self, token: &str) -> Option<MenuState>;

    /// Read the state out of a surface's content.
    fn extract(&self, content: &SurfaceContent) -> Option<MenuState> {
        content
            .footer_icon_url
            .as_deref()
            .and_then(|token| self.decode(token))
    }

    /// Write the state into a surface's content, replacing any previous state.
    fn embed(&self, content: &mut SurfaceContent, state: &MenuState) -> Result<(), CodecError> {
        content.footer_icon_url = Some(self.encode(state)?);
        Ok(())
    }
}

/// Encodes state as a query parameter on an icon URL.
#[derive(Debug, Clone)]
pub struct IconUrlCodec {
    base_url: String,
    max_len: usize,
}

impl IconUrlCodec {
    pub fn new(base_url: impl Into<String>, max_len: usize) -> Self {
        Self {
            base_url: base_url.into(),
            max_len,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for IconUrlCodec {
    fn default() -> Self {
        Self::new(DEFAULT_ICON_BASE_URL, DEFAULT_MAX_TOKEN_LEN)
    }
}

impl StateCodec for IconUrlCodec {
    fn encode(&self, state: &MenuState) -> Result<String, CodecError> {
        let json = serde_json::to_vec(state).map_err(|e| CodecError::Serialize(e.to_string()))?;
        let separator = if self.base_url.contains('?') { '&' } else { '?' };
        let token = format!(
            "{}{}{}={}",
            self.base_url,
            separator,
            STATE_PARAM,
            URL_SAFE_NO_PAD.encode(json)
        );

        if token.len() > self.max_len {
            return Err(CodecError::TooLarge {
                len: token.len(),
                max: self.max_len,
            });
        }
        Ok(token)
    }

    fn decode(&self, token: &str) -> Option<MenuState> {
        let (_, query) = token.split_once('?')?;
        let query = query.split('#').next().unwrap_or_default();
        let encoded = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == STATE_PARAM)
            .map(|(_, value)| value)?;

        let json = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&json).ok()
    }
}
