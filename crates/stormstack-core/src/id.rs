//! Strongly-typed identifiers for `StormStack` entities.
//!
//! All domain identifiers (entities, matches, containers, nodes, players,
//! components, tokens) are opaque 64-bit unsigned integers wrapped in
//! newtypes for compile-time safety. Connection and request identifiers
//! are UUIDs: they only correlate transport-level activity and never
//! cross the simulation boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

macro_rules! u64_id {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

u64_id!(
    /// Identifier of an entity inside a container's store.
    EntityId,
    "Entity"
);

u64_id!(
    /// Identifier of a match. Unique cluster-wide.
    MatchId,
    "Match"
);

u64_id!(
    /// Identifier of an execution container on an engine node.
    ContainerId,
    "Container"
);

u64_id!(
    /// Identifier of an engine node registered with the control plane.
    NodeId,
    "Node"
);

u64_id!(
    /// Identifier of a player principal.
    PlayerId,
    "Player"
);

u64_id!(
    /// Identifier of a component column. Allocated per container.
    ComponentId,
    "Component"
);

u64_id!(
    /// Identifier of an issued match token.
    TokenId,
    "Token"
);

/// Monotonic identifier allocator.
///
/// Confined to the scope that constructs it (a container allocates its
/// entity and component ids; the control plane allocates match ids), never
/// process-global.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Create an allocator starting at `first`.
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id.
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Peek at the next id without allocating it.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// WebSocket connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Connection({})", self.0)
    }
}

/// Per-request correlation identifier carried in response envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
