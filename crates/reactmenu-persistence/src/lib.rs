//! JSON file implementation of the reactmenu owner store.
//!
//! The registered-owner list survives restarts by living in a small JSON
//! document:
//!
//! ```json
//! {
//!   "owners": [
//!     { "owner_id": "Quiz", "registered_at": "2024-05-01T12:00:00Z" }
//!   ]
//! }
//! ```
//!
//! A missing file reads as an empty list. Every write replaces the file
//! through a sibling temp file and a rename, so readers never see a torn
//! document.
//!
//! # Usage
//!
//! ```rust,ignore
//! use reactmenu_persistence::JsonFileOwnerStore;
//!
//! let store = Arc::new(JsonFileOwnerStore::new("data/menu_owners.json"));
//! let dispatcher = Dispatcher::builder(transport, host, store).build();
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use reactmenu::{OwnerId, OwnerRecord, OwnerStore};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
struct OwnerFile {
    #[serde(default)]
    owners: Vec<OwnerRecord>,
}

/// Owner store backed by a JSON file.
///
/// Calls are serialized through an in-process lock; the file is not meant to
/// be shared between processes.
#[derive(Debug)]
pub struct JsonFileOwnerStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileOwnerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every persisted record, in registration order.
    pub async fn records(&self) -> Result<Vec<OwnerRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read().await?.owners)
    }

    async fn read(&self) -> Result<OwnerFile> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(OwnerFile::default()),
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    async fn write(&self, file: &OwnerFile) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), owners = file.owners.len(), "owner file written");
        Ok(())
    }
}

#[async_trait]
impl OwnerStore for JsonFileOwnerStore {
    async fn list(&self) -> Result<Vec<OwnerId>> {
        let _guard = self.lock.lock().await;
        let file = self.read().await?;
        Ok(file.owners.into_iter().map(|r| r.owner_id).collect())
    }

    async fn add(&self, owner: &OwnerId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        if file.owners.iter().any(|r| &r.owner_id == owner) {
            return Ok(false);
        }
        file.owners.push(OwnerRecord::now(owner.clone()));
        self.write(&file).await?;
        Ok(true)
    }

    async fn remove(&self, owner: &OwnerId) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;
        let before = file.owners.len();
        file.owners.retain(|r| &r.owner_id != owner);
        if file.owners.len() == before {
            return Ok(false);
        }
        self.write(&file).await?;
        Ok(true)
    }
}
