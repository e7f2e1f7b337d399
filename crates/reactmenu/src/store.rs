//! Persisted list of registered owners.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::state::OwnerId;

/// One persisted registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub owner_id: OwnerId,
    pub registered_at: DateTime<Utc>,
}

impl OwnerRecord {
    pub fn now(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            registered_at: Utc::now(),
        }
    }
}

/// Append-mostly storage for the owner list.
///
/// Registration order is preserved by `list`. Ids are unique.
#[async_trait]
pub trait OwnerStore: Send + Sync + 'static {
    async fn list(&self) -> anyhow::Result<Vec<OwnerId>>;

    /// Append `owner`. Returns `false` if it was already present.
    async fn add(&self, owner: &OwnerId) -> anyhow::Result<bool>;

    /// Remove `owner`. Returns `false` if it was not present.
    async fn remove(&self, owner: &OwnerId) -> anyhow::Result<bool>;
}

/// Process-local store; forgets everything on restart.
#[derive(Debug, Default)]
pub struct MemoryOwnerStore {
    records: RwLock<Vec<OwnerRecord>>,
}

impl MemoryOwnerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owners<I, O>(owners: I) -> Self
    where
        I: IntoIterator<Item = O>,
        O: Into<OwnerId>,
    {
        let mut records: Vec<OwnerRecord> = Vec::new();
        for owner in owners {
            let owner = owner.into();
            if !records.iter().any(|r| r.owner_id == owner) {
                records.push(OwnerRecord::now(owner));
            }
        }
        Self {
            records: RwLock::new(records),
        }
    }

    pub async fn records(&self) -> Vec<OwnerRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl OwnerStore for MemoryOwnerStore {
    async fn list(&self) -> anyhow::Result<Vec<OwnerId>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .map(|r| r.owner_id.clone())
            .collect())
    }

    async fn add(&self, owner: &OwnerId) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| &r.owner_id == owner) {
            return Ok(false);
        }
        records.push(OwnerRecord::now(owner.clone()));
        Ok(true)
    }

    async fn remove(&self, owner: &OwnerId) -> anyhow::Result<bool> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| &r.owner_id != owner);
        Ok(records.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_is_idempotent_and_ordered() {
        let store = MemoryOwnerStore::new();
        assert!(store.add(&"Profile".into()).await.unwrap());
        assert!(store.add(&"Quiz".into()).await.unwrap());
        assert!(!store.add(&"Profile".into()).await.unwrap());

        let owners = store.list().await.unwrap();
        assert_eq!(owners, vec![OwnerId::from("Profile"), OwnerId::from("Quiz")]);
    }

    #[tokio::test]
    async fn remove_reports_presence() {
        let store = MemoryOwnerStore::with_owners(["Profile", "Quiz", "Profile"]);
        assert_eq!(store.records().await.len(), 2);

        assert!(store.remove(&"Profile".into()).await.unwrap());
        assert!(!store.remove(&"Profile".into()).await.unwrap());
        assert_eq!(store.list().await.unwrap(), vec![OwnerId::from("Quiz")]);
    }
}
