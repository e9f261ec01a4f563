//! Newtype identifiers.
//!
//! Every protocol concept that has an identity is a distinct newtype wrapping a
//! primitive. This keeps a [`JobId`] from being passed where an [`EndpointName`]
//! is expected even though both are strings on the wire.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Server-assigned and configured identifiers
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies one server-side job.
    ///
    /// Opaque and server-assigned; returned by a deferred submission and echoed
    /// on every progress query for that job.
    JobId
}

string_id! {
    /// Name of the compute endpoint a request is submitted to (e.g. `"llama3_chat"`).
    ///
    /// Appears as the last path segment of both `call/{endpoint}` and
    /// `progress/{endpoint}`.
    EndpointName
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// API key sent as the `key` field of every request.
///
/// `Debug` is redacted so the key never reaches log output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApiKey(String);

impl ApiKey {
    /// Creates a new key, returning `None` if the value is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

// ---------------------------------------------------------------------------
// UUID-backed identifiers (generated locally)
// ---------------------------------------------------------------------------

/// Identifies one client-side job session (one submission and its polling loop).
///
/// Generated fresh for every session and recorded on its tracing span, so all
/// log events for one submission can be correlated before the server has
/// assigned a [`JobId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generates a new random session identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
