//! Menu registry: menu type → (owner, transition, panes).
//!
//! The registry is rebuilt wholesale from the persisted owner list and
//! published as an immutable snapshot, so readers never see a half-built
//! map. Owners may register before they are loaded; a rebuild that finds
//! one missing still publishes what it found but leaves the registry
//! [`RegistryStatus::Stale`] so the next [`MenuRegistry::ensure_fresh`]
//! tries again once the host reports a load or unload.
//!
//! Rebuilds may overlap. Each takes a ticket when it starts, and a snapshot is
//! only published if no later-started rebuild has published already and no
//! invalidation happened meanwhile.

use arc_swap::ArcSwap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::error::MenuError;
use crate::owner::{Menu, OwnerHost, PaneDeclaration};
use crate::state::{MenuState, MenuTypeId, OwnerId};
use crate::store::OwnerStore;

/// Resolved declaration for one menu type.
#[derive(Clone)]
pub struct MenuEntry {
    pub owner_id: OwnerId,
    pub menu: Arc<dyn Menu>,
    pub panes: Arc<PaneDeclaration>,
}

impl std::fmt::Debug for MenuEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuEntry")
            .field("owner_id", &self.owner_id)
            .field("panes", &self.panes)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryStatus {
    Stale,
    Rebuilding,
    Fresh,
}

#[derive(Debug, Default)]
struct Snapshot {
    menus: HashMap<MenuTypeId, MenuEntry>,
    /// Union of every pane's emoji, for the cheap pre-check.
    emoji: HashSet<String>,
}

const NEVER: u64 = u64::MAX;

/// Bookkeeping guarded by the publish lock.
#[derive(Debug, Default)]
struct Published {
    /// Ticket of the rebuild behind the current snapshot.
    ticket: u64,
    /// `(generation, host revision)` of the last incomplete rebuild.
    incomplete_at: Option<(u64, u64)>,
}

pub struct MenuRegistry {
    host: Arc<dyn OwnerHost>,
    store: Arc<dyn OwnerStore>,
    snap: ArcSwap<Snapshot>,
    /// Bumped on every invalidation.
    generation: AtomicU64,
    /// Generation the published snapshot is complete for.
    fresh_at: AtomicU64,
    rebuilding: AtomicUsize,
    tickets: AtomicU64,
    published: Mutex<Published>,
}

impl MenuRegistry {
    pub fn new(host: Arc<dyn OwnerHost>, store: Arc<dyn OwnerStore>) -> Self {
        Self {
            host,
            store,
            snap: ArcSwap::from_pointee(Snapshot::default()),
            generation: AtomicU64::new(0),
            fresh_at: AtomicU64::new(NEVER),
            rebuilding: AtomicUsize::new(0),
            tickets: AtomicU64::new(0),
            published: Mutex::new(Published::default()),
        }
    }

    pub fn status(&self) -> RegistryStatus {
        if self.rebuilding.load(Ordering::Acquire) > 0 {
            RegistryStatus::Rebuilding
        } else if self.is_current() {
            RegistryStatus::Fresh
        } else {
            RegistryStatus::Stale
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.status() == RegistryStatus::Fresh
    }

    /// Mark the registry stale. The current snapshot stays readable.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Persist `owner` and rebuild. Returns the status after the rebuild.
    pub async fn register(&self, owner: OwnerId) -> Result<RegistryStatus, MenuError> {
        if self.store.add(&owner).await.map_err(MenuError::Store)? {
            info!(%owner, "registered menu owner");
        }
        self.invalidate();
        self.rebuild().await?;
        Ok(self.status())
    }

    /// Remove `owner` from the persisted list and rebuild. Returns whether it
    /// was registered.
    pub async fn unregister(&self, owner: &OwnerId) -> Result<bool, MenuError> {
        let removed = self.store.remove(owner).await.map_err(MenuError::Store)?;
        if removed {
            info!(%owner, "unregistered menu owner");
        }
        self.invalidate();
        self.rebuild().await?;
        Ok(removed)
    }

    pub async fn owners(&self) -> Result<Vec<OwnerId>, MenuError> {
        self.store.list().await.map_err(MenuError::Store)
    }

    /// Rebuild from the persisted owner list. Returns whether the result is
    /// complete (every registered owner was loaded) and was published.
    pub async fn rebuild(&self) -> Result<bool, MenuError> {
        let generation = self.generation.load(Ordering::Acquire);
        let revision = self.host.revision();
        let ticket = self.tickets.fetch_add(1, Ordering::AcqRel) + 1;

        self.rebuilding.fetch_add(1, Ordering::AcqRel);
        let result = self.build_snapshot().await;
        let outcome = result.map(|(snapshot, complete)| {
            self.publish(snapshot, complete, generation, revision, ticket)
        });
        self.rebuilding.fetch_sub(1, Ordering::AcqRel);
        outcome
    }

    /// Rebuild only if stale. An incomplete rebuild is not retried until the
    /// host's revision moves. Failures are logged and the current snapshot
    /// kept.
    pub async fn ensure_fresh(&self) {
        if self.is_current() || self.awaiting_owners() {
            return;
        }
        if let Err(error) = self.rebuild().await {
            warn!(%error, "menu registry rebuild failed");
        }
    }

    fn is_current(&self) -> bool {
        self.fresh_at.load(Ordering::Acquire) == self.generation.load(Ordering::Acquire)
    }

    /// The last rebuild for this generation came up short and no owner has
    /// loaded or unloaded since.
    fn awaiting_owners(&self) -> bool {
        let Some(revision) = self.host.revision() else {
            return false;
        };
        let generation = self.generation.load(Ordering::Acquire);
        let published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        published.incomplete_at == Some((generation, revision))
    }

    fn publish(
        &self,
        snapshot: Snapshot,
        complete: bool,
        generation: u64,
        revision: Option<u64>,
        ticket: u64,
    ) -> bool {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        // Older data than what is already out; a newer invalidation means a
        // newer rebuild is coming.
        if ticket < published.ticket || self.generation.load(Ordering::Acquire) != generation {
            debug!(ticket, latest = published.ticket, "superseded rebuild discarded");
            return false;
        }

        let menus = snapshot.menus.len();
        published.ticket = ticket;
        self.snap.store(Arc::new(snapshot));
        if complete {
            published.incomplete_at = None;
            self.fresh_at.store(generation, Ordering::Release);
            info!(menus, "menu registry rebuilt");
        } else {
            published.incomplete_at = revision.map(|revision| (generation, revision));
            self.fresh_at.store(NEVER, Ordering::Release);
            debug!(menus, "menu registry partially rebuilt; waiting on owners");
        }
        complete
    }

    async fn build_snapshot(&self) -> Result<(Snapshot, bool), MenuError> {
        let owners = self.store.list().await.map_err(MenuError::Store)?;
        let mut snapshot = Snapshot::default();
        let mut complete = true;

        for owner_id in owners {
            let Some(owner) = self.host.get(&owner_id) else {
                debug!(owner = %owner_id, "registered owner not loaded yet");
                complete = false;
                continue;
            };
            for declaration in owner.menu_declarations() {
                snapshot
                    .emoji
                    .extend(declaration.panes.emoji_names().map(str::to_owned));
                let entry = MenuEntry {
                    owner_id: owner_id.clone(),
                    menu: declaration.menu,
                    panes: Arc::new(declaration.panes),
                };
                if let Some(previous) = snapshot.menus.insert(declaration.menu_type.clone(), entry) {
                    debug!(
                        menu_type = %declaration.menu_type,
                        previous = %previous.owner_id,
                        owner = %owner_id,
                        "menu type redeclared; last registration wins"
                    );
                }
            }
        }
        Ok((snapshot, complete))
    }

    /// Resolve the owner of a decoded state.
    pub fn resolve(&self, state: &MenuState) -> Result<MenuEntry, MenuError> {
        let menu_type = state.menu_type.as_ref().ok_or(MenuError::MissingMenuType)?;
        self.resolve_type(menu_type)
    }

    pub fn resolve_type(&self, menu_type: &MenuTypeId) -> Result<MenuEntry, MenuError> {
        self.snap
            .load()
            .menus
            .get(menu_type)
            .cloned()
            .ok_or_else(|| MenuError::InvalidMenuType(menu_type.clone()))
    }

    /// Whether any declared menu uses `emoji` as a control.
    pub fn is_known_emoji(&self, emoji: &str) -> bool {
        self.snap.load().emoji.contains(emoji)
    }

    pub fn menu_types(&self) -> Vec<MenuTypeId> {
        let mut types: Vec<_> = self.snap.load().menus.keys().cloned().collect();
        types.sort();
        types
    }
}

impl std::fmt::Debug for MenuRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MenuRegistry")
            .field("status", &self.status())
            .field("menu_types", &self.menu_types())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::owner::{LoadedOwners, MenuDeclaration, MenuOwner};
    use crate::state::{DefaultData, UserId};
    use crate::store::MemoryOwnerStore;
    use crate::surface::{Render, Surface};
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl Menu for Noop {
        async fn transition(
            &self,
            _surface: &Surface,
            _state: MenuState,
            _emoji: &str,
            _actor: UserId,
            _data: &DefaultData,
        ) -> anyhow::Result<Option<Render>> {
            Ok(None)
        }
    }

    struct Owner {
        id: &'static str,
        menus: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl MenuOwner for Owner {
        fn owner_id(&self) -> OwnerId {
            self.id.into()
        }

        fn menu_declarations(&self) -> Vec<MenuDeclaration> {
            self.menus
                .iter()
                .map(|(menu_type, emoji)| {
                    MenuDeclaration::new(*menu_type, Noop, PaneDeclaration::new([*emoji]))
                })
                .collect()
        }
    }

    fn owner(id: &'static str, menus: Vec<(&'static str, &'static str)>) -> Arc<Owner> {
        Arc::new(Owner { id, menus })
    }

    fn registry() -> (Arc<LoadedOwners>, MenuRegistry) {
        let host = Arc::new(LoadedOwners::new());
        let registry = MenuRegistry::new(host.clone(), Arc::new(MemoryOwnerStore::new()));
        (host, registry)
    }

    #[tokio::test]
    async fn starts_stale_and_empty() {
        let (_, registry) = registry();
        assert_eq!(registry.status(), RegistryStatus::Stale);
        assert!(registry.menu_types().is_empty());
    }

    #[tokio::test]
    async fn register_loaded_owner_is_fresh() {
        let (host, registry) = registry();
        host.load(owner("Quiz", vec![("QuizMenu", "▶")]));

        let status = registry.register("Quiz".into()).await.unwrap();
        assert_eq!(status, RegistryStatus::Fresh);

        let entry = registry.resolve(&MenuState::new("QuizMenu", UserId(1))).unwrap();
        assert_eq!(entry.owner_id, OwnerId::from("Quiz"));
        assert!(registry.is_known_emoji("▶"));
        assert!(!registry.is_known_emoji("◀"));
    }

    #[tokio::test]
    async fn unloaded_owner_keeps_registry_stale_but_commits_partial() {
        let (host, registry) = registry();
        host.load(owner("Quiz", vec![("QuizMenu", "▶")]));

        registry.register("Quiz".into()).await.unwrap();
        let status = registry.register("Profile".into()).await.unwrap();
        assert_eq!(status, RegistryStatus::Stale);
        assert!(registry.resolve_type(&"QuizMenu".into()).is_ok());

        host.load(owner("Profile", vec![("ProfileMenu", "👤")]));
        registry.ensure_fresh().await;
        assert!(registry.is_fresh());
        assert!(registry.resolve_type(&"ProfileMenu".into()).is_ok());
    }

    #[tokio::test]
    async fn resolve_errors() {
        let (_, registry) = registry();
        let mut state = MenuState::new("Nope", UserId(1));
        assert!(matches!(
            registry.resolve(&state),
            Err(MenuError::InvalidMenuType(t)) if t.as_str() == "Nope"
        ));

        state.menu_type = None;
        assert!(matches!(registry.resolve(&state), Err(MenuError::MissingMenuType)));
    }

    #[tokio::test]
    async fn last_registration_wins_on_collision() {
        let (host, registry) = registry();
        host.load(owner("A", vec![("Shared", "1️⃣")]));
        host.load(owner("B", vec![("Shared", "2️⃣")]));

        registry.register("A".into()).await.unwrap();
        registry.register("B".into()).await.unwrap();

        let entry = registry.resolve_type(&"Shared".into()).unwrap();
        assert_eq!(entry.owner_id, OwnerId::from("B"));
        assert!(entry.panes.contains("2️⃣"));
    }

    #[tokio::test]
    async fn unregister_drops_menus() {
        let (host, registry) = registry();
        host.load(owner("Quiz", vec![("QuizMenu", "▶")]));
        registry.register("Quiz".into()).await.unwrap();

        assert!(registry.unregister(&"Quiz".into()).await.unwrap());
        assert!(!registry.unregister(&"Quiz".into()).await.unwrap());
        assert!(registry.is_fresh());
        assert!(registry.resolve_type(&"QuizMenu".into()).is_err());
        assert!(registry.owners().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalidate_marks_stale_without_clearing() {
        let (host, registry) = registry();
        host.load(owner("Quiz", vec![("QuizMenu", "▶")]));
        registry.register("Quiz".into()).await.unwrap();

        registry.invalidate();
        assert_eq!(registry.status(), RegistryStatus::Stale);
        assert!(registry.resolve_type(&"QuizMenu".into()).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rebuilds_converge() {
        let (host, registry) = registry();
        let registry = Arc::new(registry);
        for id in ["A", "B", "C"] {
            registry.register(id.into()).await.unwrap();
        }
        host.load(owner("A", vec![("MenuA", "a")]));
        host.load(owner("B", vec![("MenuB", "b")]));
        host.load(owner("C", vec![("MenuC", "c")]));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            tasks.push(tokio::spawn(async move { registry.ensure_fresh().await }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        registry.ensure_fresh().await;

        assert!(registry.is_fresh());
        assert_eq!(
            registry.menu_types(),
            vec![MenuTypeId::from("MenuA"), MenuTypeId::from("MenuB"), MenuTypeId::from("MenuC")]
        );
    }

    /// Blocks the first lookup of `Slow` until released.
    struct GatedHost {
        inner: Arc<LoadedOwners>,
        entered: Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl OwnerHost for GatedHost {
        fn get(&self, owner: &OwnerId) -> Option<Arc<dyn MenuOwner>> {
            if owner.as_str() == "Slow" {
                let entered = self.entered.lock().unwrap().take();
                if let Some(entered) = entered {
                    let _ = entered.send(());
                    let release = self.release.lock().unwrap().take();
                    if let Some(release) = release {
                        let _ = release.recv();
                    }
                }
            }
            self.inner.get(owner)
        }

        fn revision(&self) -> Option<u64> {
            self.inner.revision()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_partial_rebuild_cannot_overwrite_a_newer_complete_one() {
        let inner = Arc::new(LoadedOwners::new());
        inner.load(owner("Slow", vec![("SlowMenu", "s")]));
        let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let host = Arc::new(GatedHost {
            inner: inner.clone(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        let store = Arc::new(MemoryOwnerStore::with_owners(["Late", "Slow"]));
        let registry = Arc::new(MenuRegistry::new(host, store));

        // First rebuild misses Late, then stalls on Slow.
        let first = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.rebuild().await })
        };
        entered_rx.await.unwrap();

        inner.load(owner("Late", vec![("LateMenu", "l")]));
        assert!(registry.rebuild().await.unwrap());
        assert!(registry.is_fresh());

        release_tx.send(()).unwrap();
        assert!(!first.await.unwrap().unwrap());

        assert!(registry.is_fresh());
        assert_eq!(
            registry.menu_types(),
            vec![MenuTypeId::from("LateMenu"), MenuTypeId::from("SlowMenu")]
        );
    }

    /// Counts full reads of the owner list.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryOwnerStore,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl OwnerStore for CountingStore {
        async fn list(&self) -> anyhow::Result<Vec<OwnerId>> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list().await
        }

        async fn add(&self, owner: &OwnerId) -> anyhow::Result<bool> {
            self.inner.add(owner).await
        }

        async fn remove(&self, owner: &OwnerId) -> anyhow::Result<bool> {
            self.inner.remove(owner).await
        }
    }

    #[tokio::test]
    async fn missing_owner_is_not_retried_until_the_host_changes() {
        let host = Arc::new(LoadedOwners::new());
        let store = Arc::new(CountingStore::default());
        let registry = MenuRegistry::new(host.clone(), store.clone());
        host.load(owner("Quiz", vec![("QuizMenu", "▶")]));
        registry.register("Quiz".into()).await.unwrap();
        registry.register("Ghost".into()).await.unwrap();
        let reads = store.lists.load(Ordering::SeqCst);

        for _ in 0..5 {
            registry.ensure_fresh().await;
        }
        assert_eq!(store.lists.load(Ordering::SeqCst), reads);
        assert_eq!(registry.status(), RegistryStatus::Stale);
        assert!(registry.resolve_type(&"QuizMenu".into()).is_ok());

        // Unloading something that was never loaded changes nothing.
        assert!(!host.unload(&"Nobody".into()));
        registry.ensure_fresh().await;
        assert_eq!(store.lists.load(Ordering::SeqCst), reads);

        host.load(owner("Ghost", vec![("GhostMenu", "👻")]));
        registry.ensure_fresh().await;
        assert_eq!(store.lists.load(Ordering::SeqCst), reads + 1);
        assert!(registry.is_fresh());

        // Invalidation always forces a fresh read.
        registry.invalidate();
        registry.ensure_fresh().await;
        assert_eq!(store.lists.load(Ordering::SeqCst), reads + 2);
    }
}
