//! A mutable trusted-delegate directory.

use async_trait::async_trait;
use dashmap::DashMap;
use reactmenu::{DelegateLookup, UserId};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct StaticDelegates {
    trusted: DashMap<UserId, HashSet<UserId>>,
}

impl StaticDelegates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `delegate` drive `author`'s menus.
    pub fn trust(&self, author: UserId, delegate: UserId) {
        self.trusted.entry(author).or_default().insert(delegate);
    }

    pub fn revoke(&self, author: UserId, delegate: UserId) -> bool {
        self.trusted
            .get_mut(&author)
            .map(|mut set| set.remove(&delegate))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DelegateLookup for StaticDelegates {
    async fn trusted_delegates(&self, user: UserId) -> HashSet<UserId> {
        self.trusted
            .get(&user)
            .map(|set| set.value().clone())
            .unwrap_or_default()
    }
}
