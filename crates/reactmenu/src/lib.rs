//! # Reactmenu
//!
//! A reaction-driven menu dispatcher for chat bots. Menus are ordinary
//! messages; users drive them by adding and removing emoji reactions. The
//! dispatcher owns no UI logic: it routes each reaction to the plugin that
//! declared the menu, checks the actor may drive it, lets the plugin compute
//! the next rendering, and commits the edit.
//!
//! ## Core Concepts
//!
//! - [`MenuOwner`] = a plugin that declares menu types
//! - [`Menu`] = transition logic for one menu type
//! - [`PaneDeclaration`] = the emoji a menu responds to, and how they cascade
//! - [`MenuState`] = state carried inside the message itself
//!
//! ## Architecture
//!
//! ```text
//! Transport reaction stream
//!     │
//!     ▼ run()
//! Dispatcher ──► fetch surface ──► StateCodec::extract ──► MenuRegistry::resolve
//!     │                                                          │
//!     │◄─────────────────────────── MenuEntry { owner, menu, panes }
//!     ▼
//! FilterPipeline (valid emoji → not poster → bot authored → ownership)
//!     │
//!     ▼
//! MenuOwner::default_data ──► Menu::transition ──► StateCodec::embed ──► edit
//!     │
//!     ▼
//! cascade: child_message_id ──► ChildTransition ──► child Menu::transition
//!          (at most CASCADE_FAILSAFE hops)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Fail silent** - every abort leaves the surface untouched and tells no one
//! 2. **State is in the message** - the dispatcher only couriers it
//! 3. **Registry is a snapshot** - rebuilt wholesale, published atomically
//! 4. **Eventually fresh** - owners may register before they load
//! 5. **Cascades terminate** - bounded by [`CASCADE_FAILSAFE`]
//!
//! ## Example
//!
//! ```ignore
//! use reactmenu::{Dispatcher, LoadedOwners, MemoryOwnerStore};
//! use std::sync::Arc;
//!
//! let host = Arc::new(LoadedOwners::new());
//! let dispatcher = Arc::new(
//!     Dispatcher::builder(transport, host.clone(), Arc::new(MemoryOwnerStore::new()))
//!         .with_delegates(friends)
//!         .build(),
//! );
//!
//! // A plugin loads and registers itself.
//! host.load(quiz.clone());
//! reactmenu::register_menus(Some(dispatcher.as_ref()), quiz.as_ref()).await?;
//!
//! dispatcher.start().join().await?;
//! ```

mod cascade;
mod codec;
mod config;
mod dispatch;
mod error;
mod filter;
mod owner;
mod registry;
mod state;
mod store;
mod surface;
mod transport;

// Re-export state types
pub use crate::state::{ChannelId, DefaultData, MenuState, MenuTypeId, OwnerId, SurfaceId, UserId};

// Re-export surface types
pub use crate::surface::{ReactionEvent, ReactionKind, Render, Surface, SurfaceContent};

// Re-export codec types
pub use crate::codec::{
    IconUrlCodec, StateCodec, DEFAULT_ICON_BASE_URL, DEFAULT_MAX_TOKEN_LEN, STATE_PARAM,
};

// Re-export error types
pub use crate::error::{CodecError, MenuError, TransportError};

// Re-export filter types
pub use crate::filter::{
    BotAuthoredFilter, FilterInput, FilterPipeline, NotPosterFilter, OwnershipFilter,
    ReactionFilter, ValidEmojiFilter,
};

// Re-export owner protocol
pub use crate::owner::{
    child_fn, register_menus, ChildFn, ChildStep, ChildTransition, DelegateLookup, LoadedOwners,
    Menu, MenuDeclaration, MenuOwner, OwnerHost, PaneDeclaration,
};

// Re-export registry types
pub use crate::registry::{MenuEntry, MenuRegistry, RegistryStatus};

// Re-export persistence types
pub use crate::store::{MemoryOwnerStore, OwnerRecord, OwnerStore};

// Re-export dispatcher types
pub use crate::cascade::{CascadeReport, CASCADE_FAILSAFE};
pub use crate::config::{DispatcherConfig, RemovalPolicy};
pub use crate::dispatch::{Dispatcher, DispatcherBuilder, DispatcherHandle, DropReason, Outcome};
pub use crate::transport::Transport;

// Re-export commonly used external types
pub use async_trait::async_trait;
