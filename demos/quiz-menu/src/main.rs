//! # Quiz Menu Demo
//!
//! Wires a dispatcher to an in-memory chat, loads a paging "Quiz" owner and
//! clicks through a parent menu with a linked detail pane.
//!
//! ```text
//! RUST_LOG=reactmenu=debug cargo run -p quiz-menu-demo [config.json]
//! ```

use anyhow::Result;
use reactmenu::{
    register_menus, ChannelId, Dispatcher, DispatcherConfig, LoadedOwners, MenuState, MenuTypeId,
    ReactionEvent, StateCodec, SurfaceId, UserId,
};
use reactmenu_persistence::JsonFileOwnerStore;
use reactmenu_testing::{
    render_page, MemoryTransport, PagedOwner, StaticDelegates, CLOSE, NEXT, PREV, QUIZ_DETAIL,
    QUIZ_MENU,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const BOT: UserId = UserId(1);
const AUTHOR: UserId = UserId(10);
const FRIEND: UserId = UserId(11);
const STRANGER: UserId = UserId(12);
const CHANNEL: ChannelId = ChannelId(500);

// ============================================================================
// Helpers
// ============================================================================

fn post_page(
    transport: &MemoryTransport,
    codec: &dyn StateCodec,
    menu_type: &str,
    child: Option<SurfaceId>,
) -> SurfaceId {
    let mut state = MenuState::new(MenuTypeId::from(menu_type), AUTHOR).with("page", 1);
    state.child_message_id = child;
    transport.post_menu(codec, CHANNEL, &render_page(1).body, &state, &[PREV, NEXT, CLOSE])
}

fn page_of(transport: &MemoryTransport, codec: &dyn StateCodec, id: SurfaceId) -> i64 {
    transport
        .state_of(codec, id)
        .and_then(|state| state.get("page"))
        .unwrap_or(0)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => DispatcherConfig::from_path(path)?,
        None => DispatcherConfig::default(),
    };

    let owner_file = std::env::temp_dir().join("quiz-menu-demo").join("owners.json");
    let transport = Arc::new(MemoryTransport::new(BOT));
    let host = Arc::new(LoadedOwners::new());
    let store = Arc::new(JsonFileOwnerStore::new(&owner_file));
    let delegates = Arc::new(StaticDelegates::new());

    let dispatcher = Arc::new(
        Dispatcher::builder(transport.clone(), host.clone(), store)
            .with_config(config)
            .with_delegates(delegates.clone())
            .build(),
    );

    // The owner loads after the dispatcher and registers itself.
    let quiz = Arc::new(PagedOwner::quiz());
    host.load(quiz.clone());
    register_menus(Some(dispatcher.as_ref()), quiz.as_ref()).await?;
    info!(owners = ?dispatcher.registered_owners().await?, file = %owner_file.display(), "owners persisted");

    let codec = dispatcher.codec();
    let detail = post_page(&transport, codec, QUIZ_DETAIL, None);
    let menu = post_page(&transport, codec, QUIZ_MENU, Some(detail));

    // Scripted walkthrough, one event at a time.
    let script = [
        ("author pages forward", ReactionEvent::added(CHANNEL, menu, NEXT, AUTHOR)),
        ("stranger tries to page", ReactionEvent::added(CHANNEL, menu, NEXT, STRANGER)),
        ("friend tries before being trusted", ReactionEvent::added(CHANNEL, menu, NEXT, FRIEND)),
    ];
    for (label, event) in script {
        let outcome = dispatcher.handle(event).await;
        println!("{label:<36} -> {outcome:?}");
    }

    delegates.trust(AUTHOR, FRIEND);
    let outcome = dispatcher
        .handle(ReactionEvent::added(CHANNEL, menu, NEXT, FRIEND))
        .await;
    println!("{:<36} -> {outcome:?}", "trusted friend pages forward");

    println!(
        "menu page {}, detail page {}",
        page_of(&transport, codec, menu),
        page_of(&transport, codec, detail)
    );

    // The event loop: independent quizzes clicked concurrently.
    let quizzes: Vec<SurfaceId> = (0..4)
        .map(|_| post_page(&transport, codec, QUIZ_MENU, None))
        .collect();
    let runner = dispatcher.clone().start();
    for (i, &id) in quizzes.iter().enumerate() {
        transport.push_event(ReactionEvent::added(CHANNEL, id, NEXT, AUTHOR));
        if i % 2 == 0 {
            transport.push_event(ReactionEvent::added(CHANNEL, id, "\u{1F642}", AUTHOR));
        }
    }
    transport.close_events();
    runner.join().await?;

    for id in quizzes {
        println!("quiz {id} page {}", page_of(&transport, codec, id));
    }
    println!("{} edits committed", transport.edit_count());

    Ok(())
}
