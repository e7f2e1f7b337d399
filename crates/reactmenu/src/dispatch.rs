//! The dispatcher: reaction events in, menu edits out.
//!
//! ```text
//! ReactionEvent
//!     │ pre-check emoji (no network)
//!     ▼
//! fetch surface ─► authored by self? ─► decode state ─► resolve menu type
//!     │
//!     ▼
//! filter pipeline ─► owner default data ─► Menu::transition ─► edit surface
//!     │
//!     ▼
//! cascade into child surfaces (pre-transition state)
//! ```
//!
//! Every step can abort. An abort leaves the surface untouched and is
//! reported only as an [`Outcome::Dropped`]; nothing is surfaced to users.

use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, debug_span, warn, Instrument};
use uuid::Uuid;

use crate::codec::StateCodec;
use crate::config::{DispatcherConfig, RemovalPolicy};
use crate::error::{MenuError, TransportError};
use crate::filter::{FilterInput, FilterPipeline, ValidEmojiFilter};
use crate::owner::{DelegateLookup, OwnerHost};
use crate::registry::{MenuEntry, MenuRegistry, RegistryStatus};
use crate::state::{DefaultData, MenuState, MenuTypeId, OwnerId, UserId};
use crate::store::OwnerStore;
use crate::surface::{ReactionEvent, ReactionKind, Surface};
use crate::transport::Transport;

/// Why an event was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Emoji is neither a universal control nor any menu's control.
    UnknownEmoji,
    SurfaceNotFound,
    /// A removal outside direct messages under [`RemovalPolicy::DirectOnly`].
    RemovalIgnored,
    NotAuthoredBySelf,
    /// The emoji is not currently a reaction on the surface.
    ReactionMissing,
    /// No decodable state; not a menu.
    UntrackedSurface,
    MissingMenuType,
    InvalidMenuType(MenuTypeId),
    /// Name of the filter that denied.
    FilterDenied(&'static str),
    OwnerNotLoaded(OwnerId),
    /// Owner code returned an error.
    OwnerFailed(OwnerId),
    /// Encoding the new state or editing the surface failed.
    CommitFailed,
    /// Fetching the surface failed for a reason other than not-found.
    Transport,
}

/// Result of handling one reaction event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The owner ran. `edits` counts committed surface edits, including
    /// cascaded ones; a transition may choose to leave its surface as is.
    Applied { edits: usize, cascade_hops: usize },
    Dropped(DropReason),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }

    pub fn drop_reason(&self) -> Option<&DropReason> {
        match self {
            Outcome::Dropped(reason) => Some(reason),
            Outcome::Applied { .. } => None,
        }
    }
}

/// Routes reactions on menu surfaces to the owners of those menus.
pub struct Dispatcher {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) host: Arc<dyn OwnerHost>,
    pub(crate) registry: MenuRegistry,
    pub(crate) codec: Arc<dyn StateCodec>,
    delegates: Option<Arc<dyn DelegateLookup>>,
    config: DispatcherConfig,
    universal: HashSet<String>,
}

impl Dispatcher {
    pub fn builder(
        transport: Arc<dyn Transport>,
        host: Arc<dyn OwnerHost>,
        store: Arc<dyn OwnerStore>,
    ) -> DispatcherBuilder {
        DispatcherBuilder::new(transport, host, store)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &MenuRegistry {
        &self.registry
    }

    pub fn codec(&self) -> &dyn StateCodec {
        self.codec.as_ref()
    }

    // ========================================================================
    // Owner administration
    // ========================================================================

    /// Register an owner. Safe to call before the owner is loaded.
    pub async fn register(&self, owner: OwnerId) -> Result<RegistryStatus, MenuError> {
        self.registry.register(owner).await
    }

    /// Remove an owner from the persisted list. Returns whether it was registered.
    pub async fn unregister(&self, owner: &OwnerId) -> Result<bool, MenuError> {
        self.registry.unregister(owner).await
    }

    pub async fn registered_owners(&self) -> Result<Vec<OwnerId>, MenuError> {
        self.registry.owners().await
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Consume the transport's reaction stream until it ends. Each event is
    /// handled on its own task.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.transport.reaction_events();
        let mut tasks = JoinSet::new();

        while let Some(event) = events.next().await {
            let dispatcher = Arc::clone(&self);
            tasks.spawn(async move { dispatcher.handle(event).await });
            while let Some(finished) = tasks.try_join_next() {
                log_join(finished);
            }
        }
        while let Some(finished) = tasks.join_next().await {
            log_join(finished);
        }
        debug!("reaction stream ended");
    }

    /// Spawn [`Dispatcher::run`] on the current runtime.
    pub fn start(self: Arc<Self>) -> DispatcherHandle {
        DispatcherHandle {
            task: tokio::spawn(self.run()),
        }
    }

    /// Handle one reaction event. Never fails; see [`Outcome`].
    pub async fn handle(&self, event: ReactionEvent) -> Outcome {
        let span = debug_span!(
            "reaction",
            id = %Uuid::new_v4(),
            surface = %event.surface_id,
            emoji = %event.emoji,
            actor = %event.user_id,
            kind = ?event.kind,
        );
        async {
            let outcome = self.process(&event).await;
            match &outcome {
                Outcome::Applied { edits, cascade_hops } => {
                    debug!(edits, cascade_hops, "reaction applied")
                }
                Outcome::Dropped(reason) => debug!(?reason, "reaction dropped"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    fn ignores_removal(&self, event: &ReactionEvent, direct: Option<bool>) -> bool {
        event.kind == ReactionKind::Remove
            && self.config.removal_events == RemovalPolicy::DirectOnly
            && direct == Some(false)
    }

    async fn process(&self, event: &ReactionEvent) -> Outcome {
        self.registry.ensure_fresh().await;

        // Cheap check before any network round trip.
        if !self.universal.contains(&event.emoji) && !self.registry.is_known_emoji(&event.emoji) {
            return Outcome::Dropped(DropReason::UnknownEmoji);
        }
        if self.ignores_removal(event, event.direct) {
            return Outcome::Dropped(DropReason::RemovalIgnored);
        }

        let surface = match self
            .transport
            .fetch_surface(event.channel_id, event.surface_id)
            .await
        {
            Ok(surface) => surface,
            Err(TransportError::NotFound) => return Outcome::Dropped(DropReason::SurfaceNotFound),
            Err(error) => {
                warn!(%error, "failed to fetch surface");
                return Outcome::Dropped(DropReason::Transport);
            }
        };

        // Events without a channel hint are only judged once the surface is in.
        if self.ignores_removal(event, Some(surface.direct)) {
            return Outcome::Dropped(DropReason::RemovalIgnored);
        }
        let surface_is_own = self.transport.is_self(surface.author_id);
        if !surface_is_own {
            return Outcome::Dropped(DropReason::NotAuthoredBySelf);
        }
        if self.config.require_live_reaction && !surface.has_reaction(&event.emoji) {
            return Outcome::Dropped(DropReason::ReactionMissing);
        }

        let Some(state) = self.codec.extract(&surface.content) else {
            return Outcome::Dropped(DropReason::UntrackedSurface);
        };
        let entry = match self.registry.resolve(&state) {
            Ok(entry) => entry,
            Err(error) => return Outcome::Dropped(self.absorb(error)),
        };

        let delegates = self.delegates_of(state.original_author_id).await;
        let pipeline = FilterPipeline::canonical(self.valid_emoji(&entry));
        let input = FilterInput {
            event,
            surface: &surface,
            state: &state,
            actor_is_self: self.transport.is_self(event.user_id),
            surface_is_own,
            delegates: &delegates,
        };
        if let Err(filter) = pipeline.evaluate(&input) {
            return Outcome::Dropped(DropReason::FilterDenied(filter));
        }

        let data = match self.default_data(&entry, &state, &event.emoji).await {
            Ok(data) => data,
            Err(error) => return Outcome::Dropped(self.absorb(error)),
        };

        // The owner gets its own copy; the cascade needs the state as it was.
        let edited = match self
            .commit_transition(&entry, &surface, state.clone(), &event.emoji, event.user_id, &data)
            .await
        {
            Ok(edited) => edited,
            Err(reason) => return Outcome::Dropped(reason),
        };

        let cascade = self
            .cascade(&state, &surface, &event.emoji, event.user_id)
            .await;
        Outcome::Applied {
            edits: usize::from(edited) + cascade.edits,
            cascade_hops: cascade.hops,
        }
    }

    // ========================================================================
    // Shared with the cascade
    // ========================================================================

    /// Ask the owner for its default data. Missing owners mark the registry
    /// stale so a reload heals it.
    pub(crate) async fn default_data(
        &self,
        entry: &MenuEntry,
        state: &MenuState,
        emoji: &str,
    ) -> Result<DefaultData, MenuError> {
        let Some(owner) = self.host.get(&entry.owner_id) else {
            self.registry.invalidate();
            return Err(MenuError::OwnerNotLoaded(entry.owner_id.clone()));
        };
        let mut data = owner
            .default_data(state)
            .await
            .map_err(|error| MenuError::Owner {
                owner: entry.owner_id.clone(),
                error,
            })?;
        data.reaction = Some(emoji.to_owned());
        Ok(data)
    }

    /// Run the owner's transition and commit the render, if any.
    ///
    /// Returns whether an edit was committed.
    pub(crate) async fn commit_transition(
        &self,
        entry: &MenuEntry,
        surface: &Surface,
        state: MenuState,
        emoji: &str,
        actor: UserId,
        data: &DefaultData,
    ) -> Result<bool, DropReason> {
        let render = match entry.menu.transition(surface, state, emoji, actor, data).await {
            Ok(Some(render)) => render,
            Ok(None) => return Ok(false),
            Err(error) => {
                warn!(owner = %entry.owner_id, error = %format!("{error:#}"), "menu transition failed");
                return Err(DropReason::OwnerFailed(entry.owner_id.clone()));
            }
        };

        let mut content = render.content;
        if let Err(error) = self.codec.embed(&mut content, &render.state) {
            warn!(owner = %entry.owner_id, %error, "failed to encode menu state");
            return Err(DropReason::CommitFailed);
        }

        match self
            .transport
            .edit_surface(surface.channel_id, surface.id, content)
            .await
        {
            Ok(()) => Ok(true),
            Err(TransportError::NotFound) => Err(DropReason::SurfaceNotFound),
            Err(error) => {
                warn!(surface = %surface.id, %error, "failed to edit surface");
                Err(DropReason::CommitFailed)
            }
        }
    }

    /// Log a registry/owner error at the severity it deserves and map it to a
    /// drop reason.
    pub(crate) fn absorb(&self, error: MenuError) -> DropReason {
        match error {
            MenuError::MissingMenuType => {
                debug!("menu state without a menu type");
                DropReason::MissingMenuType
            }
            MenuError::InvalidMenuType(menu_type) => {
                debug!(%menu_type, "menu type not registered");
                DropReason::InvalidMenuType(menu_type)
            }
            MenuError::OwnerNotLoaded(owner) => {
                debug!(%owner, "menu owner not loaded");
                DropReason::OwnerNotLoaded(owner)
            }
            MenuError::Owner { owner, error } => {
                warn!(%owner, error = %format!("{error:#}"), "menu owner failed");
                DropReason::OwnerFailed(owner)
            }
            MenuError::Store(error) => {
                warn!(error = %format!("{error:#}"), "owner store failed");
                DropReason::CommitFailed
            }
        }
    }

    async fn delegates_of(&self, author: UserId) -> HashSet<UserId> {
        match &self.delegates {
            Some(lookup) => lookup.trusted_delegates(author).await,
            None => HashSet::new(),
        }
    }

    fn valid_emoji(&self, entry: &MenuEntry) -> ValidEmojiFilter {
        ValidEmojiFilter::new(
            self.universal
                .iter()
                .map(String::as_str)
                .chain(entry.panes.emoji_names()),
        )
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn log_join(finished: Result<Outcome, JoinError>) {
    if let Err(error) = finished {
        warn!(%error, "reaction task failed");
    }
}

/// Handle to a dispatcher started with [`Dispatcher::start`].
#[derive(Debug)]
pub struct DispatcherHandle {
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Wait for the reaction stream to end and all in-flight events to finish.
    pub async fn join(self) -> Result<(), JoinError> {
        self.task.await
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Wires a [`Dispatcher`] together.
pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    host: Arc<dyn OwnerHost>,
    store: Arc<dyn OwnerStore>,
    codec: Option<Arc<dyn StateCodec>>,
    delegates: Option<Arc<dyn DelegateLookup>>,
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    pub fn new(
        transport: Arc<dyn Transport>,
        host: Arc<dyn OwnerHost>,
        store: Arc<dyn OwnerStore>,
    ) -> Self {
        Self {
            transport,
            host,
            store,
            codec: None,
            delegates: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the codec derived from the config.
    pub fn with_codec(mut self, codec: Arc<dyn StateCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn with_delegates(mut self, delegates: Arc<dyn DelegateLookup>) -> Self {
        self.delegates = Some(delegates);
        self
    }

    pub fn build(self) -> Dispatcher {
        let codec: Arc<dyn StateCodec> = match self.codec {
            Some(codec) => codec,
            None => Arc::new(self.config.codec()),
        };
        let universal = self.config.universal_controls.iter().cloned().collect();
        Dispatcher {
            registry: MenuRegistry::new(Arc::clone(&self.host), self.store),
            transport: self.transport,
            host: self.host,
            codec,
            delegates: self.delegates,
            config: self.config,
            universal,
        }
    }
}
