//! A wired-up dispatcher over the in-memory transport.

use reactmenu::{
    ChannelId, Dispatcher, DispatcherConfig, LoadedOwners, MemoryOwnerStore, MenuState,
    MenuTypeId, ReactionEvent, StateCodec, SurfaceId, UserId,
};
use std::sync::Arc;

use crate::delegates::StaticDelegates;
use crate::paged::{render_page, PagedOwner, NEXT, PREV, QUIZ_DETAIL, QUIZ_MENU};
use crate::transport::MemoryTransport;

pub const BOT: UserId = UserId(1);
pub const AUTHOR: UserId = UserId(10);
pub const FRIEND: UserId = UserId(11);
pub const STRANGER: UserId = UserId(12);
pub const CHANNEL: ChannelId = ChannelId(500);

pub struct Harness {
    pub transport: Arc<MemoryTransport>,
    pub host: Arc<LoadedOwners>,
    pub store: Arc<MemoryOwnerStore>,
    pub delegates: Arc<StaticDelegates>,
    pub dispatcher: Arc<Dispatcher>,
    pub quiz: Arc<PagedOwner>,
}

impl Harness {
    /// Nothing loaded or registered.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        let transport = Arc::new(MemoryTransport::new(BOT));
        let host = Arc::new(LoadedOwners::new());
        let store = Arc::new(MemoryOwnerStore::new());
        let delegates = Arc::new(StaticDelegates::new());
        let dispatcher = Dispatcher::builder(
            transport.clone(),
            host.clone(),
            store.clone(),
        )
        .with_config(config)
        .with_delegates(delegates.clone())
        .build();

        Self {
            transport,
            host,
            store,
            delegates,
            dispatcher: Arc::new(dispatcher),
            quiz: Arc::new(PagedOwner::quiz()),
        }
    }

    /// The quiz owner loaded and registered.
    pub async fn with_quiz() -> Self {
        let harness = Self::new();
        harness.load_quiz().await;
        harness
    }

    pub async fn load_quiz(&self) {
        self.host.load(self.quiz.clone());
        reactmenu::register_menus(Some(self.dispatcher.as_ref()), self.quiz.as_ref())
            .await
            .expect("memory store never fails");
    }

    pub fn codec(&self) -> &dyn StateCodec {
        self.dispatcher.codec()
    }

    pub fn quiz_state(&self, menu_type: &str, page: i64, child: Option<SurfaceId>) -> MenuState {
        let mut state = MenuState::new(MenuTypeId::from(menu_type), AUTHOR).with("page", page);
        state.child_message_id = child;
        state
    }

    /// Post a `QuizMenu` at `page` with the control reactions seeded.
    pub fn post_quiz(&self, page: i64, child: Option<SurfaceId>) -> SurfaceId {
        self.post_state(&self.quiz_state(QUIZ_MENU, page, child))
    }

    /// Post a `QuizDetail` (no child) at `page`.
    pub fn post_detail(&self, page: i64) -> SurfaceId {
        self.post_state(&self.quiz_state(QUIZ_DETAIL, page, None))
    }

    pub fn post_state(&self, state: &MenuState) -> SurfaceId {
        let page = state.get("page").unwrap_or(1);
        self.transport.post_menu(
            self.codec(),
            CHANNEL,
            &render_page(page).body,
            state,
            &[PREV, NEXT, crate::paged::CLOSE],
        )
    }

    pub fn state_of(&self, id: SurfaceId) -> Option<MenuState> {
        self.transport.state_of(self.codec(), id)
    }

    pub fn page_of(&self, id: SurfaceId) -> Option<i64> {
        self.state_of(id).and_then(|s| s.get("page"))
    }

    pub fn add(&self, id: SurfaceId, emoji: &str, user: UserId) -> ReactionEvent {
        ReactionEvent::added(CHANNEL, id, emoji, user)
    }

    pub fn remove(&self, id: SurfaceId, emoji: &str, user: UserId) -> ReactionEvent {
        ReactionEvent::removed(CHANNEL, id, emoji, user)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
