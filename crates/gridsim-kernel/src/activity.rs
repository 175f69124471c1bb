//! Activity lifecycle shared by every activity kind.
//!
//! ```text
//!   Waiting ──start──► Running ──post──► Done | Failed | Canceled | TimedOut
//! ```
//!
//! Transitions are monotonic: an activity never goes back to a non-terminal
//! state once it reached a terminal one. Every terminal transition is
//! followed by one finalize pass answering the pending callers; finalizing
//! an activity with no pending caller does nothing.

use std::collections::VecDeque;

use gridsim_types::{ActivityId, ActorId};
use serde::{Deserialize, Serialize};

use crate::simcall::Simcall;

/// Lifecycle state of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivityState {
    /// Created, not started. No binding attached yet.
    Waiting,
    /// Started and progressing.
    Running,
    /// Completed normally.
    Done,
    /// The host running the activity went down.
    Failed,
    /// The binding was canceled while the host stayed up.
    Canceled,
    /// The deadline fired first.
    TimedOut,
}

impl ActivityState {
    /// Returns true for Done, Failed, Canceled and TimedOut.
    pub fn is_terminal(self) -> bool {
        match self {
            ActivityState::Waiting | ActivityState::Running => false,
            ActivityState::Done
            | ActivityState::Failed
            | ActivityState::Canceled
            | ActivityState::TimedOut => true,
        }
    }

    /// Returns true if `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: ActivityState) -> bool {
        match self {
            ActivityState::Waiting => next == ActivityState::Running,
            ActivityState::Running => next.is_terminal(),
            ActivityState::Done
            | ActivityState::Failed
            | ActivityState::Canceled
            | ActivityState::TimedOut => false,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActivityState::Waiting => "waiting",
            ActivityState::Running => "running",
            ActivityState::Done => "done",
            ActivityState::Failed => "failed",
            ActivityState::Canceled => "canceled",
            ActivityState::TimedOut => "timed-out",
        }
    }
}

impl std::fmt::Display for ActivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// State and caller queue common to all activity kinds.
#[derive(Debug)]
pub struct ActivityCore {
    id: ActivityId,
    name: String,
    state: ActivityState,
    /// Pending callers, answered in attachment order.
    simcalls: VecDeque<Simcall>,
}

impl ActivityCore {
    pub fn new(id: ActivityId) -> Self {
        Self {
            id,
            name: String::new(),
            state: ActivityState::Waiting,
            simcalls: VecDeque::new(),
        }
    }

    pub fn id(&self) -> ActivityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    /// Moves to `next`.
    ///
    /// # Panics
    ///
    /// Panics on an illegal transition: the kernel drove the state machine
    /// out of order.
    pub(crate) fn transition_to(&mut self, next: ActivityState) {
        assert!(
            self.state.can_transition_to(next),
            "illegal activity transition for {}: {} -> {}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }

    pub(crate) fn register_simcall(&mut self, simcall: Simcall) {
        self.simcalls.push_back(simcall);
    }

    pub(crate) fn pop_simcall(&mut self) -> Option<Simcall> {
        self.simcalls.pop_front()
    }

    /// Drops every pending call issued by `actor`. Returns how many were
    /// removed.
    pub(crate) fn unregister_simcalls_of(&mut self, actor: ActorId) -> usize {
        let before = self.simcalls.len();
        self.simcalls.retain(|s| s.issuer() != actor);
        before - self.simcalls.len()
    }

    pub fn pending_simcalls(&self) -> usize {
        self.simcalls.len()
    }

    pub fn has_simcalls(&self) -> bool {
        !self.simcalls.is_empty()
    }

    /// Issuers of the pending calls, in answering order.
    pub fn pending_callers(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.simcalls.iter().map(Simcall::issuer)
    }
}
