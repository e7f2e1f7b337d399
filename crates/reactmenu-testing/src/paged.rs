//! A page-flipping menu owner.
//!
//! Every menu type it declares keeps a `page` counter in its state. `▶`/`◀`
//! flip the page and cascade into the child surface as `next`/`prev`, tagging
//! the child with `linked: true`.

use async_trait::async_trait;
use reactmenu::{
    child_fn, ChildStep, DefaultData, Menu, MenuDeclaration, MenuOwner, MenuState, MenuTypeId,
    OwnerId, PaneDeclaration, Render, Surface, SurfaceContent, UserId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const QUIZ_OWNER: &str = "Quiz";
pub const QUIZ_MENU: &str = "QuizMenu";
pub const QUIZ_DETAIL: &str = "QuizDetail";

pub const NEXT: &str = "\u{25B6}";
pub const PREV: &str = "\u{25C0}";
pub const CLOSE: &str = "\u{274C}";

/// Synthetic emoji replayed on child surfaces.
pub const CHILD_NEXT: &str = "next";
pub const CHILD_PREV: &str = "prev";

pub fn render_page(page: i64) -> SurfaceContent {
    SurfaceContent::new(format!("page {page}")).with_footer("quiz")
}

struct PagedMenu {
    transitions: Arc<AtomicUsize>,
    reactions: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Menu for PagedMenu {
    async fn transition(
        &self,
        _surface: &Surface,
        state: MenuState,
        emoji: &str,
        _actor: UserId,
        data: &DefaultData,
    ) -> anyhow::Result<Option<Render>> {
        self.transitions.fetch_add(1, Ordering::SeqCst);
        if let Some(reaction) = &data.reaction {
            self.reactions.lock().unwrap().push(reaction.clone());
        }
        let page: i64 = state.get("page").unwrap_or(1);
        let page = match emoji {
            NEXT | CHILD_NEXT => page + 1,
            PREV | CHILD_PREV => (page - 1).max(1),
            _ => return Ok(None),
        };
        Ok(Some(Render::new(render_page(page), state.with("page", page))))
    }
}

fn paged_panes() -> PaneDeclaration {
    PaneDeclaration::new([PREV, NEXT])
        .with_child(
            NEXT,
            child_fn(|_, _, _| ChildStep::replay(CHILD_NEXT).with_extra("linked", true)),
        )
        .with_child(
            PREV,
            child_fn(|_, _, _| ChildStep::replay(CHILD_PREV).with_extra("linked", true)),
        )
}

/// Owns any number of paged menu types.
pub struct PagedOwner {
    owner_id: OwnerId,
    menu_types: Vec<MenuTypeId>,
    transitions: Arc<AtomicUsize>,
    reactions: Arc<Mutex<Vec<String>>>,
    default_data_calls: AtomicUsize,
}

impl PagedOwner {
    pub fn new<I, S>(owner_id: impl Into<OwnerId>, menu_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MenuTypeId>,
    {
        Self {
            owner_id: owner_id.into(),
            menu_types: menu_types.into_iter().map(Into::into).collect(),
            transitions: Arc::new(AtomicUsize::new(0)),
            reactions: Arc::new(Mutex::new(Vec::new())),
            default_data_calls: AtomicUsize::new(0),
        }
    }

    /// `Quiz`, declaring `QuizMenu` and `QuizDetail`.
    pub fn quiz() -> Self {
        Self::new(QUIZ_OWNER, [QUIZ_MENU, QUIZ_DETAIL])
    }

    pub fn transitions(&self) -> usize {
        self.transitions.load(Ordering::SeqCst)
    }

    /// The `reaction` default-data field of every transition so far.
    pub fn reactions_seen(&self) -> Vec<String> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn default_data_calls(&self) -> usize {
        self.default_data_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MenuOwner for PagedOwner {
    fn owner_id(&self) -> OwnerId {
        self.owner_id.clone()
    }

    fn menu_declarations(&self) -> Vec<MenuDeclaration> {
        self.menu_types
            .iter()
            .map(|menu_type| {
                MenuDeclaration::new(
                    menu_type.clone(),
                    PagedMenu {
                        transitions: Arc::clone(&self.transitions),
                        reactions: Arc::clone(&self.reactions),
                    },
                    paged_panes(),
                )
            })
            .collect()
    }

    async fn default_data(&self, _state: &MenuState) -> anyhow::Result<DefaultData> {
        self.default_data_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DefaultData::default().with("owner", self.owner_id.as_str()))
    }
}
