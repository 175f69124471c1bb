//! Actors as seen by the kernel.
//!
//! The kernel does not run actor code. It only keeps, per actor, what the
//! simcall protocol needs: the host the actor lives on, the activity it is
//! blocked on, the result and error slots written when it is answered, and
//! whether it must be terminated instead of resumed.

use std::collections::{BTreeMap, VecDeque};

use gridsim_types::{ActivityId, ActorId, HostId};

use crate::activity::ActivityState;
use crate::error::ActivityError;
use crate::simcall::SimcallResult;

/// A simulated process.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    id: ActorId,
    name: String,
    host: HostId,
    waiting_activity: Option<ActivityId>,
    wants_to_die: bool,
    error: Option<ActivityError>,
    result: Option<SimcallResult>,
}

impl Actor {
    fn new(id: ActorId, name: String, host: HostId) -> Self {
        Self {
            id,
            name,
            host,
            waiting_activity: None,
            wants_to_die: false,
            error: None,
            result: None,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> HostId {
        self.host
    }

    /// The activity this actor is suspended on, if any.
    pub fn waiting_activity(&self) -> Option<ActivityId> {
        self.waiting_activity
    }

    pub fn wants_to_die(&self) -> bool {
        self.wants_to_die
    }

    /// Error attached by the last answer, not yet consumed.
    pub fn pending_error(&self) -> Option<ActivityError> {
        self.error
    }

    pub fn last_result(&self) -> Option<SimcallResult> {
        self.result
    }

    /// Consumes the answer of an `execution_wait`.
    ///
    /// Returns `None` if the actor has not been answered yet.
    pub fn take_wait_outcome(&mut self) -> Option<Result<ActivityState, ActivityError>> {
        match self.result.take()? {
            SimcallResult::ExecutionWait(state) => Some(match self.error.take() {
                Some(err) => Err(err),
                None => Ok(state),
            }),
            other => {
                self.result = Some(other);
                None
            }
        }
    }

    /// Consumes the answer of an `execution_test`.
    pub fn take_test_outcome(&mut self) -> Option<Result<bool, ActivityError>> {
        match self.result.take()? {
            SimcallResult::ExecutionTest(ready) => Some(match self.error.take() {
                Some(err) => Err(err),
                None => Ok(ready),
            }),
            other => {
                self.result = Some(other);
                None
            }
        }
    }

    pub(crate) fn block_on(&mut self, activity: ActivityId) {
        self.waiting_activity = Some(activity);
    }

    pub(crate) fn clear_waiting(&mut self) {
        self.waiting_activity = None;
    }

    pub(crate) fn set_error(&mut self, error: ActivityError) {
        self.error = Some(error);
    }

    pub(crate) fn mark_to_die(&mut self) {
        self.wants_to_die = true;
    }
}

/// Registry of live actors plus the queue of answered ones.
#[derive(Debug, Default)]
pub struct ActorTable {
    actors: BTreeMap<ActorId, Actor>,
    next_id: ActorId,
    /// Actors answered since the last [`ActorTable::take_answered`], in
    /// answering order.
    answered: VecDeque<ActorId>,
}

impl ActorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an actor living on `host`.
    pub fn spawn(&mut self, name: impl Into<String>, host: HostId) -> ActorId {
        let id = self.next_id;
        self.next_id = id.next();
        self.actors.insert(id, Actor::new(id, name.into(), host));
        tracing::debug!(actor = %id, host = %host, "actor spawned");
        id
    }

    pub fn get(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(&id)
    }

    pub fn get_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    /// Writes `result` into the issuer's slot and schedules it for
    /// resumption.
    pub(crate) fn answer(&mut self, issuer: ActorId, result: SimcallResult) {
        match self.actors.get_mut(&issuer) {
            Some(actor) => {
                actor.result = Some(result);
                self.answered.push_back(issuer);
            }
            None => tracing::debug!(actor = %issuer, "answer dropped, actor is gone"),
        }
    }

    /// Drains the actors answered since the last call, in answering order.
    pub fn take_answered(&mut self) -> Vec<ActorId> {
        self.answered.drain(..).collect()
    }

    /// Marks every actor living on `host` for termination.
    pub fn kill_on_host(&mut self, host: HostId) -> usize {
        let mut killed = 0;
        for actor in self.actors.values_mut().filter(|a| a.host == host) {
            actor.wants_to_die = true;
            killed += 1;
        }
        killed
    }

    /// Removes and returns the actors marked for termination.
    pub fn reap_dying(&mut self) -> Vec<Actor> {
        let dying: Vec<ActorId> = self
            .actors
            .values()
            .filter(|a| a.wants_to_die)
            .map(|a| a.id)
            .collect();
        self.answered.retain(|id| !dying.contains(id));
        dying
            .into_iter()
            .filter_map(|id| self.actors.remove(&id))
            .collect()
    }
}
