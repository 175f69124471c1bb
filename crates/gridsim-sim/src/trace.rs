//! Lifecycle trace of executions.
//!
//! The recorder subscribes to the kernel's lifecycle signals and keeps one
//! [`TraceEvent`] per creation, completion and migration, stamped with the
//! simulated time. Two runs with the same seed produce the same trace,
//! which is what the determinism tests compare.

use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use gridsim_kernel::{ActivityState, ExecActivity, LifecycleSignals};
use gridsim_types::{ActivityId, HostId};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TraceEventKind {
    Created { hosts: Vec<HostId>, parallel: bool },
    Completed { state: ActivityState },
    Migrated { to: HostId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub time: f64,
    pub activity: ActivityId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

/// Collects lifecycle events. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    events: Rc<RefCell<Vec<TraceEvent>>>,
    now: Rc<Cell<f64>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes the recorder to all three lifecycle signals.
    pub fn attach(&self, signals: &mut LifecycleSignals) {
        let recorder = self.clone();
        signals.on_creation(move |exec| {
            let kind = TraceEventKind::Created {
                hosts: exec.hosts().to_vec(),
                parallel: exec.hosts().len() > 1,
            };
            recorder.record(exec, kind);
        });

        let recorder = self.clone();
        signals.on_completion(move |exec| {
            recorder.record(
                exec,
                TraceEventKind::Completed {
                    state: exec.state(),
                },
            );
        });

        let recorder = self.clone();
        signals.on_migration(move |exec, to| {
            recorder.record(exec, TraceEventKind::Migrated { to });
        });
    }

    /// Simulated time stamped on the next events.
    pub fn set_now(&self, now: f64) {
        self.now.set(now);
    }

    fn record(&self, exec: &ExecActivity, kind: TraceEventKind) {
        self.events.borrow_mut().push(TraceEvent {
            time: self.now.get(),
            activity: exec.id(),
            name: exec.name().to_string(),
            category: exec.tracing_category().map(str::to_string),
            kind,
        });
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&*self.events.borrow())
    }

    /// Writes the trace as pretty JSON, creating parent directories.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), SimError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        tracing::info!(path = %path.display(), events = self.len(), "trace written");
        Ok(())
    }
}
