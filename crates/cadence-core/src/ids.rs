//! Branded ID newtypes.
//!
//! Session keys, notification IDs and chat message IDs are all strings on the
//! wire. Wrapping each in its own type keeps a notification ID from being
//! passed where a session key is expected.
//!
//! Generated IDs are a short kind prefix plus a UUID v7 (time-ordered), e.g.
//! `ntf_0192f0c4-...`. Server-provided values are accepted verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Opaque key scoping one logical real-time context: a conversation ID
    /// or a practice session ID.
    SessionKey, "sess"
}

branded_id! {
    /// Identifier of a user-facing notification.
    NotificationId, "ntf"
}

branded_id! {
    /// Identifier of a chat message in a transcript.
    MessageId, "msg"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn generated_ids_carry_prefix() {
        assert!(SessionKey::generate().starts_with("sess_"));
        assert!(NotificationId::generate().starts_with("ntf_"));
        assert!(MessageId::generate().starts_with("msg_"));
    }

    #[test]
    fn generated_suffix_is_uuid_v7() {
        let id = NotificationId::generate();
        let suffix = id.as_str().trim_start_matches("ntf_");
        let parsed = Uuid::parse_str(suffix).unwrap();
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn generated_ids_are_unique() {
        let ids: HashSet<_> = (0..100).map(|_| NotificationId::generate()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn server_values_kept_verbatim() {
        let key = SessionKey::from("conv_abc123");
        assert_eq!(key.as_str(), "conv_abc123");
        assert_eq!(format!("{key}"), "conv_abc123");
        let s: String = key.into();
        assert_eq!(s, "conv_abc123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = SessionKey::from("room_1");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"room_1\"");
        let back: SessionKey = serde_json::from_str("\"room_1\"").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = HashMap::new();
        let _ = map.insert(SessionKey::from("room_1"), 1);
        assert_eq!(map.get("room_1"), Some(&1));
    }
}
