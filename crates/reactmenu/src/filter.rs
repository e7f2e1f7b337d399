//! Reaction filters: who may drive a menu, and with which emoji.
//!
//! A [`FilterPipeline`] is an ordered AND-chain; the first filter that
//! denies ends evaluation. The dispatcher drops denied events without telling
//! anyone.

use smallvec::SmallVec;
use std::collections::HashSet;
use std::fmt;

use crate::state::{MenuState, UserId};
use crate::surface::{ReactionEvent, ReactionKind, Surface};

/// Everything a filter may look at. Identity checks are resolved up front so
/// filters stay synchronous.
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub event: &'a ReactionEvent,
    pub surface: &'a Surface,
    pub state: &'a MenuState,
    /// The acting user is the dispatcher's own identity.
    pub actor_is_self: bool,
    /// The surface was posted by the dispatcher's own identity.
    pub surface_is_own: bool,
    /// Users the menu's original author trusts to act on their behalf.
    pub delegates: &'a HashSet<UserId>,
}

pub trait ReactionFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn allows(&self, input: &FilterInput<'_>) -> bool;
}

/// The emoji must be a control of this menu (or a universal control).
#[derive(Debug, Clone, Default)]
pub struct ValidEmojiFilter {
    allowed: HashSet<String>,
}

impl ValidEmojiFilter {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl ReactionFilter for ValidEmojiFilter {
    fn name(&self) -> &'static str {
        "valid_emoji"
    }

    fn allows(&self, input: &FilterInput<'_>) -> bool {
        self.allowed.contains(&input.event.emoji)
    }
}

/// Ignore the dispatcher's own reactions (it seeds the control emoji itself).
#[derive(Debug, Clone, Copy, Default)]
pub struct NotPosterFilter;

impl ReactionFilter for NotPosterFilter {
    fn name(&self) -> &'static str {
        "not_poster"
    }

    fn allows(&self, input: &FilterInput<'_>) -> bool {
        !input.actor_is_self
    }
}

/// Only surfaces the dispatcher posted are menus.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotAuthoredFilter;

impl ReactionFilter for BotAuthoredFilter {
    fn name(&self) -> &'static str {
        "bot_authored"
    }

    fn allows(&self, input: &FilterInput<'_>) -> bool {
        input.surface_is_own
    }
}

/// The actor must be the menu's original author or one of their delegates.
///
/// Removals are exempt so toggle-style controls can always be undone.
// TODO(product): confirm the removal exemption is wanted outside toggle controls.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipFilter;

impl ReactionFilter for OwnershipFilter {
    fn name(&self) -> &'static str {
        "ownership"
    }

    fn allows(&self, input: &FilterInput<'_>) -> bool {
        let actor = input.event.user_id;
        input.event.kind == ReactionKind::Remove
            || actor == input.state.original_author_id
            || input.delegates.contains(&actor)
    }
}

/// An ordered AND-chain of filters.
#[derive(Default)]
pub struct FilterPipeline {
    filters: SmallVec<[Box<dyn ReactionFilter>; 4]>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid emoji, not the poster, bot authored, ownership; in that order.
    pub fn canonical(valid_emoji: ValidEmojiFilter) -> Self {
        Self::new()
            .with(valid_emoji)
            .with(NotPosterFilter)
            .with(BotAuthoredFilter)
            .with(OwnershipFilter)
    }

    pub fn with(mut self, filter: impl ReactionFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// `Err` carries the name of the first filter that denied.
    pub fn evaluate(&self, input: &FilterInput<'_>) -> Result<(), &'static str> {
        match self.filters.iter().find(|f| !f.allows(input)) {
            Some(filter) => Err(filter.name()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for FilterPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|filter| filter.name()))
            .finish()
    }
}
