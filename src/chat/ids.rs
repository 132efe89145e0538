//! Identifier types for conversations and stream sessions.
//!
//! Conversation ids are random UUIDs generated client-side and never reused.
//! Stream session ids change on every send so stale frames and drain ticks
//! from a cancelled session can be told apart from the live one.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new random identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier of one conversation thread.
    ConversationId
);

define_uuid_id!(
    /// Identifier of one streamed response (one send).
    StreamSessionId
);

/// Routing key for stream events and drain ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamTarget {
    /// Conversation the response belongs to.
    pub conversation_id: ConversationId,
    /// Session that produced the response.
    pub session_id: StreamSessionId,
}

impl StreamTarget {
    /// Build a target for a fresh session in `conversation_id`.
    #[must_use]
    pub fn fresh(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            session_id: StreamSessionId::new(),
        }
    }
}
