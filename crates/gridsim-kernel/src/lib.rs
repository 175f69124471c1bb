//! # gridsim-kernel: Execution-activity kernel of `gridsim`
//!
//! The kernel owns the lifecycle of execution activities: computations
//! pinned to one host, or coupled computation and communication across
//! several hosts. It asks the platform for resource bindings, resolves the
//! terminal state once a binding changes, and answers the actors blocked on
//! the activity.
//!
//! ## Key Principles
//!
//! - **No time**: progress is computed by the resource model behind
//!   [`Platform`]; the kernel only reacts to reported state changes
//! - **Single mutator**: every operation runs to completion on `&mut self`
//! - **Mechanized modes**: under exploration or replay no binding is ever
//!   allocated and waits complete immediately
//!
//! ## Architecture
//!
//! - [`activity`]: lifecycle states and the caller queue
//! - [`exec`]: execution activities, their configuration and resolution
//! - [`simcall`]: the wait and test simcalls
//! - [`actor`]: what the kernel knows about simulated processes
//! - [`resource`]: binding and platform contracts
//! - [`signal`]: creation, completion and migration observers
//! - [`kernel`]: the registry tying it all together
//!
//! ## Example
//!
//! ```ignore
//! use gridsim_kernel::{ExecRequest, ExecutionMode, Kernel};
//!
//! let mut kernel = Kernel::new(platform, ExecutionMode::TIMED);
//! let actor = kernel.spawn_actor("worker", host);
//! let exec = kernel.exec_init(ExecRequest::sequential(host, 1e9).with_timeout(5.0))?;
//! kernel.simcall_execution_wait(actor, exec)?;
//! ```

pub mod activity;
pub mod actor;
pub mod error;
pub mod exec;
pub mod kernel;
pub mod mode;
pub mod resource;
pub mod signal;
pub mod simcall;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use activity::ActivityState;
pub use actor::{Actor, ActorTable};
pub use error::{ActivityError, ExecError, KernelError};
pub use exec::{ExecActivity, ExecRequest, Workload};
pub use kernel::Kernel;
pub use mode::ExecutionMode;
pub use resource::{BindingHandle, BindingState, Platform, ResourceBinding};
pub use signal::LifecycleSignals;
pub use simcall::{Simcall, SimcallKind, SimcallResult};
