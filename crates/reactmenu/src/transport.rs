//! The chat transport as seen by the dispatcher.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransportError;
use crate::state::{ChannelId, SurfaceId, UserId};
use crate::surface::{ReactionEvent, Surface, SurfaceContent};

/// Message send/edit/fetch primitives and the reaction event source.
///
/// Edits are expected to be last-write-wins; the dispatcher does not
/// serialize overlapping events on the same surface.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn fetch_surface(
        &self,
        channel: ChannelId,
        surface: SurfaceId,
    ) -> Result<Surface, TransportError>;

    async fn edit_surface(
        &self,
        channel: ChannelId,
        surface: SurfaceId,
        content: SurfaceContent,
    ) -> Result<(), TransportError>;

    /// Reaction added/removed events. Fires for both kinds.
    fn reaction_events(&self) -> BoxStream<'static, ReactionEvent>;

    /// Whether `user` is the identity this dispatcher posts as.
    fn is_self(&self, user: UserId) -> bool;
}
