//! Contracts the kernel consumes from the resource layer.
//!
//! The kernel never computes how fast work progresses. A resource model
//! (the fairness solver in a full simulator, or the reference platform in
//! `gridsim-sim`) hands out [`ResourceBinding`]s and reports which of them
//! changed state. The kernel only holds, queries and releases them.
//!
//! ## Ownership
//!
//! A binding is owned through a [`BindingHandle`]. The only way to give it
//! back is [`ResourceBinding::release`], which consumes the handle, so a
//! binding cannot be released twice and a forgotten binding is always the
//! result of an explicit `drop` rather than a missed decrement.

use std::fmt::Debug;

use gridsim_types::{ActivityId, HostId};
use serde::{Deserialize, Serialize};

/// State of a resource binding as reported by the resource model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingState {
    /// Still accruing consumption.
    Running,
    /// Interrupted: canceled, or its resource failed.
    Failed,
    /// All work consumed.
    Finished,
}

/// Handle to time-accruing consumption of a simulated resource.
pub trait ResourceBinding: Debug {
    /// Total amount of work the binding was created with.
    fn cost(&self) -> f64;

    /// Work left to do.
    ///
    /// For coupled parallel bindings this is already a fraction in `[0, 1]`.
    fn remains(&self) -> f64;

    /// Overrides the work left to do (used when migrating).
    fn set_remains(&mut self, remains: f64);

    fn priority(&self) -> f64;

    fn set_priority(&mut self, priority: f64);

    /// Caps the achievable rate. `0` means unbounded.
    fn set_bound(&mut self, bound: f64);

    /// Tracing category, forwarded to instrumentation.
    fn set_category(&mut self, category: &str);

    fn state(&self) -> BindingState;

    /// Interrupts the binding. Its state becomes [`BindingState::Failed`].
    fn cancel(&mut self);

    /// Associates the binding with an activity (or clears the association).
    ///
    /// State changes of an associated binding are reported back to the
    /// kernel with that activity id; a dissociated binding is never
    /// reported again.
    fn associate_activity(&mut self, activity: Option<ActivityId>);

    /// Gives the binding back to the resource model.
    fn release(self: Box<Self>);
}

/// Owning handle to a binding.
pub type BindingHandle = Box<dyn ResourceBinding>;

/// The platform as seen by the kernel: host liveness plus the processor
/// capability used to obtain bindings.
pub trait Platform {
    /// Returns true if the host is powered on.
    fn is_on(&self, host: HostId) -> bool;

    /// Starts a computation of `flops` on the host's processor.
    fn execution_start(&mut self, host: HostId, flops: f64) -> BindingHandle;

    /// Starts one coupled binding spanning all `hosts`.
    ///
    /// `flops[i]` is computed on `hosts[i]`, which also exchanges `bytes[i]`
    /// with the rest of the set. `rate < 0` means unlimited.
    fn execute_parallel(
        &mut self,
        hosts: &[HostId],
        flops: &[f64],
        bytes: &[f64],
        rate: f64,
    ) -> BindingHandle;

    /// Starts a timer binding on the host that finishes after `duration`.
    fn sleep(&mut self, host: HostId, duration: f64) -> BindingHandle;

    /// Drains the activities whose associated bindings changed state since
    /// the last call, in the order the changes happened. An activity may
    /// appear more than once if several of its bindings changed.
    fn take_state_changes(&mut self) -> Vec<ActivityId>;
}

impl<P: Platform + ?Sized> Platform for &mut P {
    fn is_on(&self, host: HostId) -> bool {
        (**self).is_on(host)
    }

    fn execution_start(&mut self, host: HostId, flops: f64) -> BindingHandle {
        (**self).execution_start(host, flops)
    }

    fn execute_parallel(
        &mut self,
        hosts: &[HostId],
        flops: &[f64],
        bytes: &[f64],
        rate: f64,
    ) -> BindingHandle {
        (**self).execute_parallel(hosts, flops, bytes, rate)
    }

    fn sleep(&mut self, host: HostId, duration: f64) -> BindingHandle {
        (**self).sleep(host, duration)
    }

    fn take_state_changes(&mut self) -> Vec<ActivityId> {
        (**self).take_state_changes()
    }
}
