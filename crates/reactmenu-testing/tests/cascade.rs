use async_trait::async_trait;
use reactmenu::{
    child_fn, register_menus, ChildStep, DefaultData, Menu, MenuDeclaration, MenuOwner,
    MenuState, MenuTypeId, OwnerId, Outcome, PaneDeclaration, Render, Surface, SurfaceContent,
    UserId, CASCADE_FAILSAFE,
};
use reactmenu_testing::{Harness, PagedOwner, AUTHOR, CLOSE, NEXT, PREV, QUIZ_MENU};
use std::sync::Arc;

// ============================================================================
// Chains
// ============================================================================

#[tokio::test]
async fn cascade_walks_the_whole_chain() {
    let h = Harness::with_quiz().await;
    let grandchild = h.post_detail(1);
    let child = h.post_state(&h.quiz_state(QUIZ_MENU, 1, Some(grandchild)));
    let parent = h.post_quiz(1, Some(child));

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 3, cascade_hops: 2 });
    for id in [parent, child, grandchild] {
        assert_eq!(h.page_of(id), Some(2));
    }
    // The link survives the child's own transition.
    assert_eq!(h.state_of(child).unwrap().child_message_id, Some(grandchild));
}

#[tokio::test]
async fn cyclic_chain_stops_at_the_failsafe() {
    let h = Harness::with_quiz().await;
    let a = h.post_quiz(1, None);
    let b = h.post_quiz(1, Some(a));
    assert!(h.transport.restate(h.codec(), a, &h.quiz_state(QUIZ_MENU, 1, Some(b))));

    let outcome = h.dispatcher.handle(h.add(a, NEXT, AUTHOR)).await;

    assert_eq!(
        outcome,
        Outcome::Applied {
            edits: 1 + CASCADE_FAILSAFE,
            cascade_hops: CASCADE_FAILSAFE,
        }
    );
    // a: the click plus every even hop; b: every odd hop.
    assert_eq!(h.transport.edits_to(a), 1 + CASCADE_FAILSAFE / 2);
    assert_eq!(h.transport.edits_to(b), CASCADE_FAILSAFE / 2);
    assert_eq!(h.page_of(a), Some(7));
    assert_eq!(h.page_of(b), Some(6));
}

#[tokio::test]
async fn self_referencing_surface_stops_at_the_failsafe() {
    let h = Harness::with_quiz().await;
    let a = h.post_quiz(1, None);
    assert!(h.transport.restate(h.codec(), a, &h.quiz_state(QUIZ_MENU, 1, Some(a))));

    let outcome = h.dispatcher.handle(h.add(a, PREV, AUTHOR)).await;

    assert_eq!(
        outcome,
        Outcome::Applied {
            edits: 1 + CASCADE_FAILSAFE,
            cascade_hops: CASCADE_FAILSAFE,
        }
    );
    assert_eq!(h.page_of(a), Some(1));
}

// ============================================================================
// Early exits
// ============================================================================

#[tokio::test]
async fn deleted_child_ends_silently() {
    let h = Harness::with_quiz().await;
    let child = h.post_detail(1);
    let parent = h.post_quiz(1, Some(child));
    h.transport.delete(child);

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 1, cascade_hops: 1 });
    assert_eq!(h.page_of(parent), Some(2));
}

#[tokio::test]
async fn emoji_without_child_transition_ends_the_walk() {
    let h = Harness::with_quiz().await;
    let child = h.post_detail(1);
    let parent = h.post_quiz(1, Some(child));

    let outcome = h.dispatcher.handle(h.add(parent, CLOSE, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 0, cascade_hops: 1 });
    assert_eq!(h.transport.fetch_count(), 1);
    assert_eq!(h.page_of(child), Some(1));
}

#[tokio::test]
async fn forbidden_child_edit_keeps_the_parent_edit() {
    let h = Harness::with_quiz().await;
    let grandchild = h.post_detail(1);
    let child = h.post_state(&h.quiz_state(QUIZ_MENU, 1, Some(grandchild)));
    let parent = h.post_quiz(1, Some(child));
    h.transport.forbid_edits(child);

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 1, cascade_hops: 1 });
    assert_eq!(h.page_of(parent), Some(2));
    assert_eq!(h.page_of(grandchild), Some(1));
}

#[tokio::test]
async fn untracked_child_ends_the_walk() {
    let h = Harness::with_quiz().await;
    let child = h
        .transport
        .post(reactmenu_testing::CHANNEL, SurfaceContent::new("plain"), &[NEXT]);
    let parent = h.post_quiz(1, Some(child));

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 1, cascade_hops: 1 });
    assert_eq!(h.transport.edits_to(child), 0);
}

// ============================================================================
// Child steps
// ============================================================================

/// Counts hits and writes the clicked emoji into the body. Its `▶` child
/// step replays `echo:▶` only when the parent state is `open`.
struct GatedMenu;

#[async_trait]
impl Menu for GatedMenu {
    async fn transition(
        &self,
        _surface: &Surface,
        state: MenuState,
        emoji: &str,
        _actor: UserId,
        _data: &DefaultData,
    ) -> anyhow::Result<Option<Render>> {
        let hits: i64 = state.get("hits").unwrap_or(0);
        let content = SurfaceContent::new(format!("{emoji} x{}", hits + 1));
        Ok(Some(Render::new(content, state.with("hits", hits + 1))))
    }
}

struct GatedOwner;

#[async_trait]
impl MenuOwner for GatedOwner {
    fn owner_id(&self) -> OwnerId {
        OwnerId::from("Gate")
    }

    fn menu_declarations(&self) -> Vec<MenuDeclaration> {
        let panes = PaneDeclaration::new([NEXT]).with_child(
            NEXT,
            child_fn(|parent: &MenuState, emoji: &str, data: &DefaultData| {
                if parent.get::<bool>("open").unwrap_or(false) {
                    ChildStep::replay(format!("echo:{emoji}"))
                        .with_extra("from_owner", data.get("owner").cloned().unwrap_or_default())
                } else {
                    ChildStep::halt()
                }
            }),
        );
        vec![MenuDeclaration::new("GateMenu", GatedMenu, panes)]
    }

    async fn default_data(&self, _state: &MenuState) -> anyhow::Result<DefaultData> {
        Ok(DefaultData::default().with("owner", "Gate"))
    }
}

async fn gated_harness() -> Harness {
    let h = Harness::with_quiz().await;
    let gate = Arc::new(GatedOwner);
    h.host.load(gate.clone());
    register_menus(Some(h.dispatcher.as_ref()), gate.as_ref())
        .await
        .unwrap();
    h
}

fn gate_state(open: bool, child: Option<reactmenu::SurfaceId>) -> MenuState {
    MenuState::new(MenuTypeId::from("GateMenu"), AUTHOR)
        .with("open", open)
        .with("child_message_id", child)
}

#[tokio::test]
async fn halting_child_step_stops_before_fetching() {
    let h = gated_harness().await;
    let child = h.post_detail(1);
    let parent = h.post_state(&gate_state(false, Some(child)));

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 1, cascade_hops: 1 });
    assert_eq!(h.transport.fetch_count(), 1);
    assert_eq!(h.page_of(child), Some(1));
}

#[tokio::test]
async fn cascade_crosses_owners() {
    // Gate's parent drives a Quiz child with a synthetic emoji the quiz menu
    // ignores, and the Quiz child drives a Gate grandchild with the quiz's own
    // replay.
    let h = gated_harness().await;
    let grandchild = h.post_state(&gate_state(false, None));
    let child = h.post_state(&h.quiz_state(QUIZ_MENU, 1, Some(grandchild)));
    let parent = h.post_state(&gate_state(true, Some(child)));

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    // Quiz ignores `echo:▶`, so only the parent and grandchild are edited.
    assert_eq!(outcome, Outcome::Applied { edits: 2, cascade_hops: 2 });
    let child_state = h.state_of(child).unwrap();
    assert_eq!(child_state.get::<i64>("page"), Some(1));
    assert_eq!(h.transport.edits_to(child), 0);
    // The grandchild saw the quiz's replay, not the original click.
    let grandchild_surface = h.transport.surface(grandchild).unwrap();
    assert_eq!(grandchild_surface.content.body, "next x1");
    assert_eq!(h.state_of(grandchild).unwrap().get::<bool>("linked"), Some(true));
}

#[tokio::test]
async fn child_step_sees_parent_default_data() {
    let h = gated_harness().await;
    let child = h.post_state(&gate_state(false, None));
    let parent = h.post_state(&gate_state(true, Some(child)));

    h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    let child_state = h.state_of(child).unwrap();
    assert_eq!(child_state.get::<String>("from_owner").as_deref(), Some("Gate"));
    assert_eq!(child_state.get::<i64>("hits"), Some(1));
    assert_eq!(
        h.transport.surface(child).unwrap().content.body,
        format!("echo:{NEXT} x1")
    );
}

#[tokio::test]
async fn cascade_respects_independent_owners() {
    // Two owners with distinct menu types never collide in the registry.
    let h = Harness::with_quiz().await;
    let other = Arc::new(PagedOwner::new("Glossary", ["GlossaryPage"]));
    h.host.load(other.clone());
    register_menus(Some(h.dispatcher.as_ref()), other.as_ref())
        .await
        .unwrap();

    let child =
        h.post_state(&MenuState::new(MenuTypeId::from("GlossaryPage"), AUTHOR).with("page", 4));
    let parent = h.post_quiz(1, Some(child));

    let outcome = h.dispatcher.handle(h.add(parent, NEXT, AUTHOR)).await;

    assert_eq!(outcome, Outcome::Applied { edits: 2, cascade_hops: 1 });
    assert_eq!(h.page_of(child), Some(5));
    assert_eq!(other.transitions(), 1);
    assert_eq!(h.quiz.transitions(), 1);
}
