//! Lifecycle signals for execution activities.
//!
//! Tracing and monitoring collaborators subscribe here. The subscriber
//! lists belong to one kernel instance, so two kernels in the same process
//! (or two tests) never see each other's events.
//!
//! Observers run synchronously, in registration order, right after the
//! kernel step that triggered them. They receive shared references and
//! cannot mutate the activity.

use std::fmt;

use gridsim_types::HostId;

use crate::exec::ExecActivity;

/// Callback for creation and completion events.
pub type ExecObserver = Box<dyn Fn(&ExecActivity)>;

/// Callback for migration events; receives the target host.
pub type MigrationObserver = Box<dyn Fn(&ExecActivity, HostId)>;

/// Subscriber lists for execution lifecycle events.
#[derive(Default)]
pub struct LifecycleSignals {
    creation: Vec<ExecObserver>,
    completion: Vec<ExecObserver>,
    migration: Vec<MigrationObserver>,
}

impl LifecycleSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to execution starts.
    pub fn on_creation(&mut self, observer: impl Fn(&ExecActivity) + 'static) {
        self.creation.push(Box::new(observer));
    }

    /// Subscribes to terminal transitions observed by the per-tick check.
    pub fn on_completion(&mut self, observer: impl Fn(&ExecActivity) + 'static) {
        self.completion.push(Box::new(observer));
    }

    /// Subscribes to migrations.
    pub fn on_migration(&mut self, observer: impl Fn(&ExecActivity, HostId) + 'static) {
        self.migration.push(Box::new(observer));
    }

    /// Total number of subscribers across the three signals.
    pub fn subscriber_count(&self) -> usize {
        self.creation.len() + self.completion.len() + self.migration.len()
    }

    pub(crate) fn fire_creation(&self, exec: &ExecActivity) {
        tracing::trace!(activity = %exec.id(), "signal: creation");
        for observer in &self.creation {
            observer(exec);
        }
    }

    pub(crate) fn fire_completion(&self, exec: &ExecActivity) {
        tracing::trace!(activity = %exec.id(), state = %exec.state(), "signal: completion");
        for observer in &self.completion {
            observer(exec);
        }
    }

    pub(crate) fn fire_migration(&self, exec: &ExecActivity, to: HostId) {
        tracing::trace!(activity = %exec.id(), to = %to, "signal: migration");
        for observer in &self.migration {
            observer(exec, to);
        }
    }
}

impl fmt::Debug for LifecycleSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleSignals")
            .field("creation", &self.creation.len())
            .field("completion", &self.completion.len())
            .field("migration", &self.migration.len())
            .finish()
    }
}
