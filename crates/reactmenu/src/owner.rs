//! The plugin-facing protocol.
//!
//! A feature module implements [`MenuOwner`] and declares its menu types,
//! each with a [`Menu`] (the transition logic) and a [`PaneDeclaration`]
//! (the emoji it responds to and how those emoji cascade into child
//! surfaces). The application keeps loaded owners in an [`OwnerHost`]; the
//! dispatcher only ever holds their ids.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::dispatch::Dispatcher;
use crate::error::MenuError;
use crate::state::{DefaultData, MenuState, MenuTypeId, OwnerId, UserId};
use crate::surface::{Render, Surface};

/// Transition logic for one menu type.
#[async_trait]
pub trait Menu: Send + Sync + 'static {
    /// Compute the next rendering of `surface` after `actor` clicked `emoji`.
    ///
    /// Return `Ok(None)` to leave the surface as it is. May be replayed by the
    /// transport, so it should not assume it runs exactly once.
    async fn transition(
        &self,
        surface: &Surface,
        state: MenuState,
        emoji: &str,
        actor: UserId,
        data: &DefaultData,
    ) -> anyhow::Result<Option<Render>>;
}

/// What a child transition asks the cascade to do next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildStep {
    /// Emoji to replay on the child surface. `None` stops the cascade.
    pub emoji: Option<String>,
    /// Fields merged into the child's state before it transitions.
    pub extra: Map<String, Value>,
}

impl ChildStep {
    pub fn replay(emoji: impl Into<String>) -> Self {
        Self {
            emoji: Some(emoji.into()),
            extra: Map::new(),
        }
    }

    pub fn halt() -> Self {
        Self::default()
    }

    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_owned(), value.into());
        self
    }
}

/// Maps a click on a parent surface to a synthetic click on its child.
#[async_trait]
pub trait ChildTransition: Send + Sync + 'static {
    async fn child_step(
        &self,
        state: &MenuState,
        emoji: &str,
        data: &DefaultData,
    ) -> anyhow::Result<ChildStep>;
}

/// A [`ChildTransition`] backed by a plain function.
pub struct ChildFn<F>(F);

/// Wrap a pure function as a [`ChildTransition`].
pub fn child_fn<F>(f: F) -> ChildFn<F>
where
    F: Fn(&MenuState, &str, &DefaultData) -> ChildStep + Send + Sync + 'static,
{
    ChildFn(f)
}

#[async_trait]
impl<F> ChildTransition for ChildFn<F>
where
    F: Fn(&MenuState, &str, &DefaultData) -> ChildStep + Send + Sync + 'static,
{
    async fn child_step(
        &self,
        state: &MenuState,
        emoji: &str,
        data: &DefaultData,
    ) -> anyhow::Result<ChildStep> {
        Ok((self.0)(state, emoji, data))
    }
}

/// The control emoji of a menu type, plus optional per-emoji child transitions.
#[derive(Clone, Default)]
pub struct PaneDeclaration {
    emoji: BTreeSet<String>,
    children: HashMap<String, Arc<dyn ChildTransition>>,
}

impl PaneDeclaration {
    pub fn new<I, S>(emoji: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            emoji: emoji.into_iter().map(Into::into).collect(),
            children: HashMap::new(),
        }
    }

    /// Attach a child transition to `emoji`, adding it to the control set.
    pub fn with_child(
        mut self,
        emoji: impl Into<String>,
        transition: impl ChildTransition,
    ) -> Self {
        let emoji = emoji.into();
        self.emoji.insert(emoji.clone());
        self.children.insert(emoji, Arc::new(transition));
        self
    }

    pub fn emoji_names(&self) -> impl Iterator<Item = &str> {
        self.emoji.iter().map(String::as_str)
    }

    pub fn contains(&self, emoji: &str) -> bool {
        self.emoji.contains(emoji)
    }

    pub fn child_transition(&self, emoji: &str) -> Option<Arc<dyn ChildTransition>> {
        self.children.get(emoji).cloned()
    }
}

impl fmt::Debug for PaneDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut children: Vec<_> = self.children.keys().collect();
        children.sort();
        f.debug_struct("PaneDeclaration")
            .field("emoji", &self.emoji)
            .field("children", &children)
            .finish()
    }
}

/// One menu type as declared by its owner.
#[derive(Clone)]
pub struct MenuDeclaration {
    pub menu_type: MenuTypeId,
    pub menu: Arc<dyn Menu>,
    pub panes: PaneDeclaration,
}

impl MenuDeclaration {
    pub fn new(menu_type: impl Into<MenuTypeId>, menu: impl Menu, panes: PaneDeclaration) -> Self {
        Self {
            menu_type: menu_type.into(),
            menu: Arc::new(menu),
            panes,
        }
    }
}

impl fmt::Debug for MenuDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuDeclaration")
            .field("menu_type", &self.menu_type)
            .field("panes", &self.panes)
            .finish_non_exhaustive()
    }
}

/// A feature module that owns one or more menu types.
#[async_trait]
pub trait MenuOwner: Send + Sync + 'static {
    fn owner_id(&self) -> OwnerId;

    fn menu_declarations(&self) -> Vec<MenuDeclaration>;

    /// Context handed to every transition of this owner's menus.
    async fn default_data(&self, _state: &MenuState) -> anyhow::Result<DefaultData> {
        Ok(DefaultData::default())
    }
}

/// Lookup of currently loaded owners.
pub trait OwnerHost: Send + Sync + 'static {
    fn get(&self, owner: &OwnerId) -> Option<Arc<dyn MenuOwner>>;

    /// A counter that moves whenever an owner loads or unloads.
    ///
    /// Hosts that track one let the registry skip retrying an incomplete
    /// rebuild until something changes. `None` means retry on every check.
    fn revision(&self) -> Option<u64> {
        None
    }
}

/// An [`OwnerHost`] that plugins load into and unload from at runtime.
#[derive(Default)]
pub struct LoadedOwners {
    owners: DashMap<OwnerId, Arc<dyn MenuOwner>>,
    revision: AtomicU64,
}

impl LoadedOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `owner`, replacing any instance with the same id.
    pub fn load(&self, owner: Arc<dyn MenuOwner>) {
        self.owners.insert(owner.owner_id(), owner);
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn unload(&self, owner: &OwnerId) -> bool {
        let removed = self.owners.remove(owner).is_some();
        if removed {
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn is_loaded(&self, owner: &OwnerId) -> bool {
        self.owners.contains_key(owner)
    }
}

impl OwnerHost for LoadedOwners {
    fn get(&self, owner: &OwnerId) -> Option<Arc<dyn MenuOwner>> {
        self.owners.get(owner).map(|entry| Arc::clone(entry.value()))
    }

    fn revision(&self) -> Option<u64> {
        Some(self.revision.load(Ordering::Acquire))
    }
}

impl fmt::Debug for LoadedOwners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<OwnerId> = self.owners.iter().map(|e| e.key().clone()).collect();
        f.debug_struct("LoadedOwners").field("owners", &ids).finish()
    }
}

/// Who else may drive a user's menus.
#[async_trait]
pub trait DelegateLookup: Send + Sync + 'static {
    async fn trusted_delegates(&self, user: UserId) -> HashSet<UserId>;
}

/// Called by an owner once it has loaded.
///
/// With no dispatcher running the registration is skipped with a warning; the
/// owner can register again later.
pub async fn register_menus(
    dispatcher: Option<&Dispatcher>,
    owner: &dyn MenuOwner,
) -> Result<(), MenuError> {
    let owner_id = owner.owner_id();
    let Some(dispatcher) = dispatcher else {
        warn!(owner = %owner_id, "menu dispatcher is not running; menus not registered");
        return Ok(());
    };
    dispatcher.register(owner_id).await?;
    Ok(())
}
