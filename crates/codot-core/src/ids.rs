//! Numeric id newtypes.
//!
//! Connections and debugger sessions are numbered from a per-instance
//! counter. Ids are never reused within one server instance, so a stale id
//! can only ever miss, never alias a newer entity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wrap a raw value.
            #[must_use]
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The raw counter value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(
    /// Id of an accepted client WebSocket connection.
    ConnectionId,
    "conn"
);

numeric_id!(
    /// Id of a debugger session with an instrumented game process.
    SessionId,
    "session"
);

/// Monotonic id generator. The first id handed out is `1`.
#[derive(Debug)]
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a generator starting at 1.
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Take the next raw value.
    pub fn next_raw(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Take the next value as a typed id.
    pub fn next<T: From<u64>>(&self) -> T {
        T::from(self.next_raw())
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn_7");
    }

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId::new(3).to_string(), "session_3");
    }

    #[test]
    fn generator_is_monotonic() {
        let ids = IdGenerator::new();
        let a: ConnectionId = ids.next();
        let b: ConnectionId = ids.next();
        let c: ConnectionId = ids.next();
        assert_eq!(a.get(), 1);
        assert!(a < b && b < c);
    }

    #[test]
    fn id_serializes_as_number() {
        let json = serde_json::to_string(&SessionId::new(42)).unwrap();
        assert_eq!(json, "42");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, SessionId::new(42));
    }
}
