//! Execution mode gate.
//!
//! The kernel runs either under the normal clocked simulator or under a
//! mechanized driver (state-space exploration, instruction replay). The
//! mechanized drivers must not depend on timing side channels, so activities
//! take the no-binding, complete-immediately paths whenever either flag is
//! set. The mode is a plain value threaded through activity construction.

use serde::{Deserialize, Serialize};

/// Which driver is running the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExecutionMode {
    /// State-space exploration is active.
    pub exploring: bool,
    /// Instruction replay is active.
    pub replaying: bool,
}

impl ExecutionMode {
    /// Normal timed simulation.
    pub const TIMED: Self = Self {
        exploring: false,
        replaying: false,
    };

    /// Mechanized state-space exploration.
    pub const EXPLORATION: Self = Self {
        exploring: true,
        replaying: false,
    };

    /// Replay of a recorded instruction trace.
    pub const REPLAY: Self = Self {
        exploring: false,
        replaying: true,
    };

    /// Returns true when either mechanized driver is active.
    ///
    /// Under a mechanized driver no resource binding is ever materialized.
    #[inline]
    pub fn is_mechanized(self) -> bool {
        self.exploring || self.replaying
    }

    /// Returns true for the normal clocked simulator.
    #[inline]
    pub fn is_timed(self) -> bool {
        !self.is_mechanized()
    }
}
