//! Simcall synchronization protocol.
//!
//! An actor that needs something from the kernel issues a simcall and is
//! suspended. For executions, the simcall is attached to the activity and
//! answered exactly once, by [`ExecActivity::finish`], when the activity is
//! terminal. The handlers here are the kernel side of the two execution
//! simcalls:
//!
//! - [`execution_wait`]: block until the activity terminates.
//! - [`execution_test`]: non-blocking readiness check.

use gridsim_types::ActorId;
use serde::{Deserialize, Serialize};

use crate::activity::ActivityState;
use crate::actor::ActorTable;
use crate::error::{ExecError, KernelError};
use crate::exec::ExecActivity;
use crate::resource::Platform;

/// Which execution simcall an actor issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SimcallKind {
    ExecutionWait,
    ExecutionTest,
}

/// A pending call from a suspended actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Simcall {
    issuer: ActorId,
    kind: SimcallKind,
}

impl Simcall {
    pub fn new(issuer: ActorId, kind: SimcallKind) -> Self {
        Self { issuer, kind }
    }

    pub fn issuer(&self) -> ActorId {
        self.issuer
    }

    pub fn kind(&self) -> SimcallKind {
        self.kind
    }

    /// The value this call returns once its activity ended in `state`.
    pub(crate) fn result_for(&self, state: ActivityState) -> SimcallResult {
        match self.kind {
            SimcallKind::ExecutionWait => SimcallResult::ExecutionWait(state),
            SimcallKind::ExecutionTest => SimcallResult::ExecutionTest(true),
        }
    }
}

/// Value written into the issuer's result slot when it is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimcallResult {
    /// Terminal state of the awaited execution.
    ExecutionWait(ActivityState),
    /// Whether the tested execution was ready.
    ExecutionTest(bool),
}

/// Blocks `issuer` on `exec` until it terminates.
///
/// Under exploration or replay there is no binding to wait for, so the
/// execution is forced to [`ActivityState::Done`] and answered right away.
/// An execution that already terminated is answered right away too.
pub fn execution_wait<P: Platform + ?Sized>(
    exec: &mut ExecActivity,
    issuer: ActorId,
    platform: &P,
    actors: &mut ActorTable,
) -> Result<(), KernelError> {
    let actor = actors
        .get_mut(issuer)
        .ok_or(KernelError::UnknownActor(issuer))?;
    if let Some(activity) = actor.waiting_activity() {
        return Err(KernelError::ActorBusy {
            actor: issuer,
            activity,
        });
    }
    if exec.state() == ActivityState::Waiting {
        return Err(ExecError::NotRunning(exec.id()).into());
    }

    tracing::debug!(
        activity = %exec.id(),
        actor = %issuer,
        state = %exec.state(),
        "wait for execution"
    );

    actor.block_on(exec.id());
    exec.register_simcall(Simcall::new(issuer, SimcallKind::ExecutionWait));

    if exec.mode().is_mechanized() {
        exec.force_done();
        exec.finish(platform, actors);
        return Ok(());
    }

    if exec.state() != ActivityState::Running {
        exec.finish(platform, actors);
    }
    Ok(())
}

/// Checks whether `exec` terminated, without blocking.
///
/// A terminated execution answers the caller through the normal finalize
/// pass, so the caller also receives the error of an abnormal end. A
/// running one answers `false` immediately. A caller blocked in a wait
/// cannot test.
pub fn execution_test<P: Platform + ?Sized>(
    exec: &mut ExecActivity,
    issuer: ActorId,
    platform: &P,
    actors: &mut ActorTable,
) -> Result<bool, KernelError> {
    let actor = actors.get(issuer).ok_or(KernelError::UnknownActor(issuer))?;
    if let Some(activity) = actor.waiting_activity() {
        return Err(KernelError::ActorBusy {
            actor: issuer,
            activity,
        });
    }

    let ready = exec.state().is_terminal();
    if ready {
        exec.register_simcall(Simcall::new(issuer, SimcallKind::ExecutionTest));
        exec.finish(platform, actors);
    } else {
        actors.answer(issuer, SimcallResult::ExecutionTest(false));
    }
    Ok(ready)
}
