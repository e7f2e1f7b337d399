//! Error types.
//!
//! None of these reach users. The dispatcher absorbs every one of them at the
//! event boundary and reports the drop through [`crate::Outcome`].

use crate::state::{MenuTypeId, OwnerId};
use thiserror::Error;

/// Failures from the registry and owner plumbing.
#[derive(Debug, Error)]
pub enum MenuError {
    /// The decoded state carried no `menu_type`.
    #[error("menu state has no menu type")]
    MissingMenuType,

    /// The state names a menu type nothing has declared (or its owner is gone).
    #[error("unknown menu type `{0}`")]
    InvalidMenuType(MenuTypeId),

    /// The owner registered but is not loaded right now.
    #[error("owner `{0}` is not loaded")]
    OwnerNotLoaded(OwnerId),

    /// Owner-supplied code failed.
    #[error("owner `{owner}` failed: {error:#}")]
    Owner {
        owner: OwnerId,
        error: anyhow::Error,
    },

    /// The persisted owner list could not be read or written.
    #[error("owner store failed: {0:#}")]
    Store(anyhow::Error),
}

/// State codec failures. Only encoding can fail; decoding yields `None`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encoded state is {len} bytes, over the {max} byte budget")]
    TooLarge { len: usize, max: usize },

    #[error("failed to serialize menu state: {0}")]
    Serialize(String),
}

/// Failures reported by the chat transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("surface not found")]
    NotFound,

    #[error("not allowed to edit surface")]
    Forbidden,

    #[error("transport error: {0}")]
    Other(String),
}
