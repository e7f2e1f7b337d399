//! Identifiers and the intra-message state envelope.
//!
//! A [`MenuState`] is what a menu carries inside its own message. The
//! dispatcher only reads the envelope fields (`menu_type`,
//! `original_author_id`, `child_message_id`); everything else belongs to the
//! owner and is threaded through untouched.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

macro_rules! name_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                Self(name.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                Self(name)
            }
        }
    };
}

snowflake_id!(
    /// A chat user (human or bot).
    UserId
);
snowflake_id!(
    /// A rendered message that may host a menu.
    SurfaceId
);
snowflake_id!(
    /// The channel a surface lives in.
    ChannelId
);

name_id!(
    /// Names a class of menu. Unique across all owners; the last
    /// registration of a name wins.
    MenuTypeId
);
name_id!(
    /// Names the plugin that declared one or more menu types.
    OwnerId
);

const ENVELOPE_KEYS: [&str; 3] = ["menu_type", "original_author_id", "child_message_id"];

/// Intra-message state: the envelope the dispatcher understands plus an
/// opaque owner payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu_type: Option<MenuTypeId>,
    pub original_author_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_message_id: Option<SurfaceId>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl MenuState {
    pub fn new(menu_type: impl Into<MenuTypeId>, original_author_id: UserId) -> Self {
        Self {
            menu_type: Some(menu_type.into()),
            original_author_id,
            child_message_id: None,
            payload: Map::new(),
        }
    }

    pub fn with_child(mut self, child: SurfaceId) -> Self {
        self.child_message_id = Some(child);
        self
    }

    /// Set an owner field. Envelope keys are routed to the envelope.
    ///
    /// A value that does not serialize, or an envelope key given a value of
    /// the wrong shape (say a string `original_author_id`), is ignored and the
    /// state comes back unchanged. Use [`MenuState::set`] to see the error.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Err(error) = self.set(key, value) {
            debug!(key, %error, "menu state field ignored");
        }
        self
    }

    /// Set one field like [`MenuState::with`], failing instead of ignoring.
    /// The state is unchanged on error.
    pub fn set(&mut self, key: &str, value: impl Serialize) -> Result<(), serde_json::Error> {
        let mut extra = Map::new();
        extra.insert(key.to_owned(), serde_json::to_value(value)?);
        self.merge(extra)
    }

    /// Read an owner field.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.payload
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Overlay `extra` onto this state. Keys naming envelope fields replace
    /// those fields; the rest land in the payload.
    ///
    /// On failure (e.g. `original_author_id` set to a non-integer) the state is
    /// left unchanged.
    pub fn merge(&mut self, extra: Map<String, Value>) -> Result<(), serde_json::Error> {
        if extra.is_empty() {
            return Ok(());
        }
        if !extra.keys().any(|k| ENVELOPE_KEYS.contains(&k.as_str())) {
            self.payload.extend(extra);
            return Ok(());
        }

        let mut merged = match serde_json::to_value(&*self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in extra {
            // Null clears optional envelope fields.
            if value.is_null() && ENVELOPE_KEYS.contains(&key.as_str()) {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }
        *self = serde_json::from_value(Value::Object(merged))?;
        Ok(())
    }
}

/// Contextual data an owner hands to its transitions.
///
/// `reaction` is filled in by the dispatcher with the emoji that triggered
/// the event; `values` belongs to the owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultData {
    pub reaction: Option<String>,
    pub values: Map<String, Value>,
}

impl DefaultData {
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_owned(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_fields_flatten_next_to_envelope() {
        let state = MenuState::new("ProfileMenu", UserId(7))
            .with_child(SurfaceId(9))
            .with("page", 2);

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            json!({
                "menu_type": "ProfileMenu",
                "original_author_id": 7,
                "child_message_id": 9,
                "page": 2,
            })
        );
        assert_eq!(state.get::<u32>("page"), Some(2));
    }

    #[test]
    fn merge_routes_envelope_keys() {
        let mut state = MenuState::new("Parent", UserId(1)).with("page", 1);
        let mut extra = Map::new();
        extra.insert("menu_type".into(), json!("Detail"));
        extra.insert("page".into(), json!(4));
        extra.insert("child_message_id".into(), json!(33));

        state.merge(extra).unwrap();
        assert_eq!(state.menu_type, Some(MenuTypeId::from("Detail")));
        assert_eq!(state.child_message_id, Some(SurfaceId(33)));
        assert_eq!(state.get::<u32>("page"), Some(4));
        assert!(!state.payload.contains_key("menu_type"));
    }

    #[test]
    fn merge_null_clears_child_pointer() {
        let mut state = MenuState::new("Parent", UserId(1)).with_child(SurfaceId(5));
        let mut extra = Map::new();
        extra.insert("child_message_id".into(), Value::Null);

        state.merge(extra).unwrap();
        assert_eq!(state.child_message_id, None);
    }

    #[test]
    fn failed_merge_leaves_state_untouched() {
        let mut state = MenuState::new("Parent", UserId(1)).with("page", 1);
        let before = state.clone();
        let mut extra = Map::new();
        extra.insert("original_author_id".into(), json!("not-a-user"));

        assert!(state.merge(extra).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn mistyped_envelope_value_is_ignored_by_with_and_reported_by_set() {
        let state = MenuState::new("Parent", UserId(1))
            .with("page", 1)
            .with("original_author_id", "not-a-user");
        assert_eq!(state.original_author_id, UserId(1));
        assert_eq!(state.get::<u32>("page"), Some(1));
        assert!(!state.payload.contains_key("original_author_id"));

        let mut state = state.with("menu_type", Value::Null);
        assert_eq!(state.menu_type, None);

        assert!(state.set("original_author_id", "still-not-a-user").is_err());
        assert_eq!(state.original_author_id, UserId(1));
        state.set("original_author_id", 8).unwrap();
        assert_eq!(state.original_author_id, UserId(8));
    }
}
