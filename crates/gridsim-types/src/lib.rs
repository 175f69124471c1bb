//! # gridsim-types: Core identifiers for `gridsim`
//!
//! This crate contains the identifier types shared across the workspace:
//! - Platform ids ([`HostId`])
//! - Simulated process ids ([`ActorId`])
//! - Kernel object ids ([`ActivityId`])
//!
//! All ids are `Copy` 8-byte values. They are allocated by whoever owns the
//! corresponding registry (the platform for hosts, the kernel for actors and
//! activities) and are never reused within one simulation run, which keeps
//! traces comparable across runs.

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Platform IDs
// ============================================================================

/// Identifier of a simulated host (a machine with a processor).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct HostId(u64);

impl HostId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw index, used by platforms that store hosts in a `Vec`.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host#{}", self.0)
    }
}

impl From<u64> for HostId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<HostId> for u64 {
    fn from(id: HostId) -> Self {
        id.0
    }
}

// ============================================================================
// Kernel IDs
// ============================================================================

/// Identifier of a simulated actor (lightweight process).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ActorId(u64);

impl ActorId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

impl From<u64> for ActorId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ActorId> for u64 {
    fn from(id: ActorId) -> Self {
        id.0
    }
}

/// Identifier of a kernel activity.
///
/// Resource bindings refer back to their activity through this id rather
/// than through a pointer, so a binding that outlives its activity can only
/// ever name a stale id, never dangle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct ActivityId(u64);

impl ActivityId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the id that follows this one.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exec#{}", self.0)
    }
}

impl From<u64> for ActivityId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ActivityId> for u64 {
    fn from(id: ActivityId) -> Self {
        id.0
    }
}
