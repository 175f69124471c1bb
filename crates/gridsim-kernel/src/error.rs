//! Error types for the activity kernel.
//!
//! Three families:
//! - [`ActivityError`]: recoverable conditions handed to a blocked caller
//!   when its activity ends abnormally.
//! - [`ExecError`]: misuse of an execution activity's configuration or
//!   operations, reported to whoever drove the call.
//! - [`KernelError`]: lookups and preconditions at the kernel entry points.
//!
//! Driving the state machine into an undefined state (answering callers of
//! a non-terminal activity, leaving a terminal state) is not an error value:
//! it panics, because it means the surrounding scheduler is broken.

use gridsim_types::{ActivityId, ActorId, HostId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Condition delivered to a caller whose activity did not complete normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ActivityError {
    /// The host running the activity went down.
    #[error("host {host} failed")]
    HostFailure { host: HostId },

    /// The binding was canceled while its host stayed up.
    #[error("execution canceled")]
    Canceled,

    /// The deadline fired before the work completed.
    #[error("execution timed out")]
    Timeout,
}

/// Misuse of an execution activity.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("activity {0} is already started")]
    AlreadyStarted(ActivityId),

    #[error("activity {0} is not running")]
    NotRunning(ActivityId),

    #[error("activity {0} has no host")]
    NoHost(ActivityId),

    #[error(
        "activity {activity}: {hosts} hosts but {flops} flops amounts and {bytes} bytes amounts"
    )]
    InvalidShape {
        activity: ActivityId,
        hosts: usize,
        flops: usize,
        bytes: usize,
    },

    #[error("activity {0} spans several hosts and cannot migrate")]
    ParallelMigration(ActivityId),
}

/// Errors returned by the kernel entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("unknown activity {0}")]
    UnknownActivity(ActivityId),

    #[error("unknown actor {0}")]
    UnknownActor(ActorId),

    #[error("actor {actor} is already blocked on {activity}")]
    ActorBusy {
        actor: ActorId,
        activity: ActivityId,
    },

    #[error("activity {0} still has callers to answer")]
    CallersPending(ActivityId),

    #[error("activity {0} has not terminated")]
    NotTerminal(ActivityId),

    #[error(transparent)]
    Exec(#[from] ExecError),
}
