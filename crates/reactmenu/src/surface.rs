//! Surfaces (rendered messages) and the reaction events that arrive on them.

use crate::state::{ChannelId, MenuState, SurfaceId, UserId};

/// The renderable part of a surface.
///
/// `footer_icon_url` is the metadata field the state codec writes into; the
/// transport only accepts URL-shaped values there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurfaceContent {
    pub body: String,
    pub footer_text: Option<String>,
    pub footer_icon_url: Option<String>,
}

impl SurfaceContent {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_footer(mut self, text: impl Into<String>) -> Self {
        self.footer_text = Some(text.into());
        self
    }
}

/// A single rendered message as the transport reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    /// Whether the surface lives in a direct-message channel.
    pub direct: bool,
    pub content: SurfaceContent,
    /// Emoji currently attached to the surface as reactions.
    pub reactions: Vec<String>,
}

impl Surface {
    pub fn has_reaction(&self, emoji: &str) -> bool {
        self.reactions.iter().any(|r| r == emoji)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionKind {
    Add,
    Remove,
}

/// A reaction added to or removed from a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionEvent {
    pub surface_id: SurfaceId,
    pub channel_id: ChannelId,
    pub emoji: String,
    pub user_id: UserId,
    pub kind: ReactionKind,
    /// Whether the channel is a direct conversation, when the gateway says so.
    /// `None` defers to the fetched surface.
    pub direct: Option<bool>,
}

impl ReactionEvent {
    pub fn added(
        channel_id: ChannelId,
        surface_id: SurfaceId,
        emoji: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            surface_id,
            channel_id,
            emoji: emoji.into(),
            user_id,
            kind: ReactionKind::Add,
            direct: None,
        }
    }

    pub fn removed(
        channel_id: ChannelId,
        surface_id: SurfaceId,
        emoji: impl Into<String>,
        user_id: UserId,
    ) -> Self {
        Self {
            kind: ReactionKind::Remove,
            ..Self::added(channel_id, surface_id, emoji, user_id)
        }
    }

    pub fn in_direct(mut self, direct: bool) -> Self {
        self.direct = Some(direct);
        self
    }
}

/// What a transition wants the surface to become.
///
/// The dispatcher embeds `state` into `content` with its codec before
/// committing the edit, so owners never touch the encoded form.
#[derive(Debug, Clone, PartialEq)]
pub struct Render {
    pub content: SurfaceContent,
    pub state: MenuState,
}

impl Render {
    pub fn new(content: SurfaceContent, state: MenuState) -> Self {
        Self { content, state }
    }
}
