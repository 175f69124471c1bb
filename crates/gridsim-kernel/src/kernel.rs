//! The kernel: activity registry, actors, signals and the entry points the
//! simulator drives.
//!
//! The kernel is a single mutator. Every operation takes `&mut self` and
//! runs to completion; actors only reach shared simulated resources through
//! the simcall entry points below.
//!
//! # Example
//!
//! ```ignore
//! let mut kernel = Kernel::new(platform, ExecutionMode::TIMED);
//! let actor = kernel.spawn_actor("worker", host);
//! let exec = kernel.exec_init(ExecRequest::sequential(host, 1e9))?;
//! kernel.simcall_execution_wait(actor, exec)?;
//!
//! // ... the platform advances time ...
//! kernel.handle_state_changes();
//! for actor in kernel.take_answered() {
//!     // resume actor
//! }
//! ```

use std::collections::BTreeMap;

use gridsim_types::{ActivityId, ActorId, HostId};

use crate::activity::ActivityState;
use crate::actor::{Actor, ActorTable};
use crate::error::KernelError;
use crate::exec::{ExecActivity, ExecRequest};
use crate::mode::ExecutionMode;
use crate::resource::Platform;
use crate::signal::LifecycleSignals;
use crate::simcall;

/// Owner of every activity and actor of one simulation.
#[derive(Debug)]
pub struct Kernel<P: Platform> {
    platform: P,
    mode: ExecutionMode,
    signals: LifecycleSignals,
    activities: BTreeMap<ActivityId, ExecActivity>,
    actors: ActorTable,
    next_activity: ActivityId,
}

impl<P: Platform> Kernel<P> {
    pub fn new(platform: P, mode: ExecutionMode) -> Self {
        Self {
            platform,
            mode,
            signals: LifecycleSignals::new(),
            activities: BTreeMap::new(),
            actors: ActorTable::new(),
            next_activity: ActivityId::new(1),
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn signals_mut(&mut self) -> &mut LifecycleSignals {
        &mut self.signals
    }

    // ========================================================================
    // Actors
    // ========================================================================

    pub fn spawn_actor(&mut self, name: impl Into<String>, host: HostId) -> ActorId {
        self.actors.spawn(name, host)
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.get(id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.get_mut(id)
    }

    pub fn actors(&self) -> &ActorTable {
        &self.actors
    }

    /// Actors answered since the last call, in answering order.
    pub fn take_answered(&mut self) -> Vec<ActorId> {
        self.actors.take_answered()
    }

    /// Marks every actor living on `host` for termination.
    pub fn kill_actors_on(&mut self, host: HostId) -> usize {
        self.actors.kill_on_host(host)
    }

    /// Removes actors marked for termination, detaching them from any
    /// activity they were blocked on.
    pub fn reap_dying(&mut self) -> Vec<Actor> {
        let dying = self.actors.reap_dying();
        for actor in &dying {
            if let Some(exec) = actor
                .waiting_activity()
                .and_then(|id| self.activities.get_mut(&id))
            {
                exec.unregister_simcalls_of(actor.id());
            }
            tracing::debug!(actor = %actor.id(), name = actor.name(), "actor terminated");
        }
        dying
    }

    // ========================================================================
    // Executions
    // ========================================================================

    /// Creates a waiting execution to be configured through
    /// [`Kernel::execution_mut`].
    pub fn create_execution(&mut self) -> ActivityId {
        let id = self.next_activity;
        self.next_activity = id.next();
        self.activities.insert(id, ExecActivity::new(id, self.mode));
        id
    }

    pub fn execution(&self, id: ActivityId) -> Option<&ExecActivity> {
        self.activities.get(&id)
    }

    pub fn execution_mut(&mut self, id: ActivityId) -> Result<&mut ExecActivity, KernelError> {
        self.activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))
    }

    pub fn activity_count(&self) -> usize {
        self.activities.len()
    }

    pub fn set_execution_timeout(
        &mut self,
        id: ActivityId,
        timeout: f64,
    ) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        exec.set_timeout(timeout, &mut self.platform)?;
        Ok(())
    }

    pub fn start_execution(&mut self, id: ActivityId) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        exec.start(&mut self.platform, &self.signals)?;
        Ok(())
    }

    /// Creates, configures and starts an execution in one step.
    ///
    /// On error the half-built execution is discarded along with any timer
    /// it already armed.
    pub fn exec_init(&mut self, request: ExecRequest) -> Result<ActivityId, KernelError> {
        let id = self.create_execution();
        match self.configure_and_start(id, request) {
            Ok(()) => Ok(id),
            Err(err) => {
                self.activities.remove(&id);
                Err(err)
            }
        }
    }

    fn configure_and_start(
        &mut self,
        id: ActivityId,
        request: ExecRequest,
    ) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        exec.set_name(request.name)?
            .set_hosts(request.hosts)?
            .set_flops_amounts(request.flops)?
            .set_bytes_amounts(request.bytes)?
            .set_priority(request.priority)?
            .set_bound(request.bound)?;
        if let Some(category) = request.category {
            exec.set_tracing_category(category)?;
        }
        if let Some(timeout) = request.timeout {
            exec.set_timeout(timeout, &mut self.platform)?;
        }
        exec.start(&mut self.platform, &self.signals)?;
        Ok(())
    }

    pub fn execution_migrate(&mut self, id: ActivityId, to: HostId) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        exec.migrate(to, &mut self.platform, &self.signals)?;
        Ok(())
    }

    /// Drops a terminated execution once nobody waits on it anymore.
    pub fn release_execution(&mut self, id: ActivityId) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        if !exec.state().is_terminal() {
            return Err(KernelError::NotTerminal(id));
        }
        if exec.pending_simcalls() > 0 {
            return Err(KernelError::CallersPending(id));
        }
        self.activities.remove(&id);
        tracing::trace!(activity = %id, "execution released");
        Ok(())
    }

    // ========================================================================
    // Simcalls
    // ========================================================================

    /// `actor` blocks until `id` terminates.
    pub fn simcall_execution_wait(
        &mut self,
        actor: ActorId,
        id: ActivityId,
    ) -> Result<(), KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        simcall::execution_wait(exec, actor, &self.platform, &mut self.actors)
    }

    /// Non-blocking readiness check of `id` by `actor`.
    pub fn simcall_execution_test(
        &mut self,
        actor: ActorId,
        id: ActivityId,
    ) -> Result<bool, KernelError> {
        let exec = self
            .activities
            .get_mut(&id)
            .ok_or(KernelError::UnknownActivity(id))?;
        simcall::execution_test(exec, actor, &self.platform, &mut self.actors)
    }

    // ========================================================================
    // Per-tick resolution
    // ========================================================================

    /// Resolves every running execution whose bindings changed state since
    /// the last call. Returns how many executions reached a terminal state.
    ///
    /// An execution reported twice in one batch (its work and its timer
    /// both changed) is only resolved once.
    pub fn handle_state_changes(&mut self) -> usize {
        let mut resolved = 0;
        for id in self.platform.take_state_changes() {
            let Some(exec) = self.activities.get_mut(&id) else {
                tracing::trace!(activity = %id, "state change for a released execution");
                continue;
            };
            if exec.state() != ActivityState::Running {
                continue;
            }
            exec.post(&self.platform, &self.signals, &mut self.actors);
            resolved += 1;
        }
        resolved
    }

    /// Ids of the executions currently in `state`.
    pub fn executions_in(&self, state: ActivityState) -> Vec<ActivityId> {
        self.activities
            .values()
            .filter(|e| e.state() == state)
            .map(ExecActivity::id)
            .collect()
    }
}
