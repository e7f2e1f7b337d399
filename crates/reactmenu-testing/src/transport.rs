//! An in-memory chat transport.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, BoxStream, StreamExt};
use reactmenu::{
    ChannelId, MenuState, ReactionEvent, StateCodec, Surface, SurfaceContent, SurfaceId,
    Transport, TransportError, UserId,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One committed edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub channel_id: ChannelId,
    pub surface_id: SurfaceId,
    pub content: SurfaceContent,
}

/// Surfaces live in a map, edits are recorded, reaction events are pushed
/// by the test.
pub struct MemoryTransport {
    self_id: UserId,
    surfaces: DashMap<SurfaceId, Surface>,
    forbidden: DashSet<SurfaceId>,
    edits: Mutex<Vec<Edit>>,
    fetches: AtomicUsize,
    next_id: AtomicU64,
    sender: Mutex<Option<mpsc::UnboundedSender<ReactionEvent>>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ReactionEvent>>>,
}

impl MemoryTransport {
    pub fn new(self_id: UserId) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            self_id,
            surfaces: DashMap::new(),
            forbidden: DashSet::new(),
            edits: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            next_id: AtomicU64::new(1000),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    /// Post a surface authored by the transport's own identity.
    pub fn post(&self, channel: ChannelId, content: SurfaceContent, reactions: &[&str]) -> SurfaceId {
        self.post_as(self.self_id, channel, content, reactions)
    }

    pub fn post_as(
        &self,
        author: UserId,
        channel: ChannelId,
        content: SurfaceContent,
        reactions: &[&str],
    ) -> SurfaceId {
        let id = SurfaceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.surfaces.insert(
            id,
            Surface {
                id,
                channel_id: channel,
                author_id: author,
                direct: false,
                content,
                reactions: reactions.iter().map(|r| (*r).to_owned()).collect(),
            },
        );
        id
    }

    /// Post a menu: `body` with `state` embedded by `codec`.
    ///
    /// # Panics
    ///
    /// If `codec` cannot encode `state`.
    pub fn post_menu(
        &self,
        codec: &dyn StateCodec,
        channel: ChannelId,
        body: &str,
        state: &MenuState,
        reactions: &[&str],
    ) -> SurfaceId {
        let mut content = SurfaceContent::new(body);
        codec
            .embed(&mut content, state)
            .expect("fixture state must encode");
        self.post(channel, content, reactions)
    }

    /// Replace the state embedded in an existing surface.
    pub fn restate(&self, codec: &dyn StateCodec, id: SurfaceId, state: &MenuState) -> bool {
        match self.surfaces.get_mut(&id) {
            Some(mut surface) => codec.embed(&mut surface.content, state).is_ok(),
            None => false,
        }
    }

    pub fn set_direct(&self, id: SurfaceId, direct: bool) {
        if let Some(mut surface) = self.surfaces.get_mut(&id) {
            surface.direct = direct;
        }
    }

    pub fn add_reaction(&self, id: SurfaceId, emoji: &str) {
        if let Some(mut surface) = self.surfaces.get_mut(&id) {
            if !surface.has_reaction(emoji) {
                surface.reactions.push(emoji.to_owned());
            }
        }
    }

    /// Make edits to `id` fail with `Forbidden`.
    pub fn forbid_edits(&self, id: SurfaceId) {
        self.forbidden.insert(id);
    }

    pub fn delete(&self, id: SurfaceId) -> bool {
        self.surfaces.remove(&id).is_some()
    }

    pub fn surface(&self, id: SurfaceId) -> Option<Surface> {
        self.surfaces.get(&id).map(|s| s.value().clone())
    }

    pub fn state_of(&self, codec: &dyn StateCodec, id: SurfaceId) -> Option<MenuState> {
        self.surfaces.get(&id).and_then(|s| codec.extract(&s.content))
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().unwrap().len()
    }

    pub fn edits_to(&self, id: SurfaceId) -> usize {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.surface_id == id)
            .count()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Queue an event for [`Transport::reaction_events`]. Returns `false` once
    /// the stream is closed.
    pub fn push_event(&self, event: ReactionEvent) -> bool {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// End the reaction stream after the queued events.
    pub fn close_events(&self) {
        self.sender.lock().unwrap().take();
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(UserId(1))
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn fetch_surface(
        &self,
        channel: ChannelId,
        surface: SurfaceId,
    ) -> Result<Surface, TransportError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.surfaces
            .get(&surface)
            .filter(|s| s.channel_id == channel)
            .map(|s| s.value().clone())
            .ok_or(TransportError::NotFound)
    }

    async fn edit_surface(
        &self,
        channel: ChannelId,
        surface: SurfaceId,
        content: SurfaceContent,
    ) -> Result<(), TransportError> {
        if self.forbidden.contains(&surface) {
            return Err(TransportError::Forbidden);
        }
        let mut entry = self
            .surfaces
            .get_mut(&surface)
            .filter(|s| s.channel_id == channel)
            .ok_or(TransportError::NotFound)?;
        entry.content = content.clone();
        drop(entry);

        self.edits.lock().unwrap().push(Edit {
            channel_id: channel,
            surface_id: surface,
            content,
        });
        Ok(())
    }

    fn reaction_events(&self) -> BoxStream<'static, ReactionEvent> {
        match self.receiver.lock().unwrap().take() {
            Some(receiver) => stream::unfold(receiver, |mut receiver| async move {
                receiver.recv().await.map(|event| (event, receiver))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    fn is_self(&self, user: UserId) -> bool {
        user == self.self_id
    }
}
