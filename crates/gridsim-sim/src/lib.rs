//! # gridsim-sim: Deterministic simulation driver for `gridsim`
//!
//! This crate runs the activity kernel of `gridsim-kernel` against a
//! reference platform, in discrete simulated time.

#![allow(clippy::cast_precision_loss)] // Stats and host indices as f64
#![allow(clippy::cast_possible_truncation)] // Host indices fit in u64
#![cfg_attr(test, allow(clippy::float_cmp))] // Test assertions use exact float comparisons
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Simulation driver                       │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────┐   │
//! │  │ SimClock    │   │ EventQueue   │   │ SimRng           │   │
//! │  │ (seconds)   │   │ (host on/off)│   │ (deterministic)  │   │
//! │  └─────────────┘   └──────────────┘   └──────────────────┘   │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ Kernel<SimPlatform>                                    │  │
//! │  │  executions   actors   lifecycle signals ─> Trace      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │ SimPlatform: hosts, shared processors, FaultInjector   │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each [`Simulation::step`] jumps to the earliest of the next binding
//! completion and the next scheduled event, lets the platform progress
//! until then, applies the due events and has the kernel resolve every
//! execution whose bindings changed.
//!
//! ## Quick Start
//!
//! ```ignore
//! use gridsim_config::GridsimConfig;
//! use gridsim_kernel::ExecRequest;
//! use gridsim_sim::Simulation;
//!
//! let mut sim = Simulation::new(GridsimConfig::default())?;
//! let host = sim.host("host-0")?;
//! let actor = sim.spawn_actor("worker", host);
//! let exec = sim.exec_init(ExecRequest::sequential(host, 1e9))?;
//! sim.wait(actor, exec)?;
//!
//! let outcome = sim.run_until_answered(actor)?;
//! assert_eq!(outcome, Ok(ActivityState::Done));
//! assert_eq!(sim.now(), 1.0);
//! ```

mod clock;
mod error;
mod event;
mod fault;
pub mod logging;
pub mod platform;
mod rng;
pub mod trace;

use std::collections::BTreeMap;

use gridsim_config::{GridsimConfig, SimulationMode};
use gridsim_kernel::{
    Actor, ActivityError, ActivityState, ExecRequest, ExecutionMode, Kernel, KernelError,
};
use gridsim_types::{ActivityId, ActorId, HostId};

pub use clock::SimClock;
pub use error::SimError;
pub use event::{Event, EventId, EventKind, EventQueue};
pub use fault::{FaultInjector, FaultStats};
pub use platform::{BindingStats, SimBinding, SimPlatform};
pub use rng::SimRng;
pub use trace::{TraceEvent, TraceEventKind, TraceRecorder};

/// Kernel mode matching a configured driver.
pub fn execution_mode(mode: SimulationMode) -> ExecutionMode {
    match mode {
        SimulationMode::Timed => ExecutionMode::TIMED,
        SimulationMode::Exploration => ExecutionMode::EXPLORATION,
        SimulationMode::Replay => ExecutionMode::REPLAY,
    }
}

// ============================================================================
// Simulation Context
// ============================================================================

/// The simulation context: kernel, platform, time and scheduled events.
pub struct Simulation {
    config: GridsimConfig,
    clock: SimClock,
    events: EventQueue,
    /// Master RNG; components fork their own stream from it.
    rng: SimRng,
    faults: FaultInjector,
    kernel: Kernel<SimPlatform>,
    trace: TraceRecorder,
    /// Actors removed by the kernel, kept so their last answer can be read.
    reaped: BTreeMap<ActorId, Actor>,
    steps: u64,
}

impl Simulation {
    /// Creates a simulation from a validated configuration.
    pub fn new(config: GridsimConfig) -> Result<Self, SimError> {
        config.validate()?;

        let mode = execution_mode(config.simulation.mode);
        let mut kernel = Kernel::new(SimPlatform::from_config(&config.platform), mode);
        let trace = TraceRecorder::new();
        trace.attach(kernel.signals_mut());

        let mut rng = SimRng::new(config.simulation.seed);
        let faults = FaultInjector::new(&config.faults, rng.fork());

        let mut events = EventQueue::new();
        if faults.is_enabled() && mode.is_timed() {
            events.schedule(faults.check_interval(), EventKind::FaultCheck);
        }

        tracing::info!(
            seed = config.simulation.seed,
            hosts = config.platform.hosts.len(),
            mode = ?config.simulation.mode,
            "simulation created"
        );

        Ok(Self {
            config,
            clock: SimClock::new(),
            events,
            rng,
            faults,
            kernel,
            trace,
            reaped: BTreeMap::new(),
            steps: 0,
        })
    }

    pub fn config(&self) -> &GridsimConfig {
        &self.config
    }

    /// Current simulated time, in seconds.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn kernel(&self) -> &Kernel<SimPlatform> {
        &self.kernel
    }

    pub fn kernel_mut(&mut self) -> &mut Kernel<SimPlatform> {
        &mut self.kernel
    }

    pub fn platform(&self) -> &SimPlatform {
        self.kernel.platform()
    }

    pub fn trace(&self) -> &TraceRecorder {
        &self.trace
    }

    pub fn rng_mut(&mut self) -> &mut SimRng {
        &mut self.rng
    }

    pub fn fault_stats(&self) -> FaultStats {
        self.faults.stats()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Looks a host up by its configured name.
    pub fn host(&self, name: &str) -> Result<HostId, SimError> {
        self.platform()
            .host_by_name(name)
            .ok_or_else(|| SimError::UnknownHost(name.to_string()))
    }

    // ========================================================================
    // Actor-facing operations
    // ========================================================================

    pub fn spawn_actor(&mut self, name: impl Into<String>, host: HostId) -> ActorId {
        self.kernel.spawn_actor(name, host)
    }

    pub fn exec_init(&mut self, request: ExecRequest) -> Result<ActivityId, SimError> {
        Ok(self.kernel.exec_init(request)?)
    }

    pub fn wait(&mut self, actor: ActorId, exec: ActivityId) -> Result<(), SimError> {
        Ok(self.kernel.simcall_execution_wait(actor, exec)?)
    }

    pub fn test(&mut self, actor: ActorId, exec: ActivityId) -> Result<bool, SimError> {
        Ok(self.kernel.simcall_execution_test(actor, exec)?)
    }

    pub fn migrate(&mut self, exec: ActivityId, to: HostId) -> Result<(), SimError> {
        Ok(self.kernel.execution_migrate(exec, to)?)
    }

    /// Cancels the work of a running execution. It resolves as canceled at
    /// the next step, without advancing time.
    pub fn cancel(&mut self, exec: ActivityId) -> Result<(), SimError> {
        if self.kernel.execution(exec).is_none() {
            return Err(KernelError::UnknownActivity(exec).into());
        }
        let canceled = self.kernel.platform_mut().cancel_activity(exec);
        tracing::debug!(activity = %exec, bindings = canceled, "execution canceled");
        Ok(())
    }

    /// Consumes the answer to `actor`'s last wait, even if the actor has
    /// been terminated since.
    pub fn take_wait_outcome(
        &mut self,
        actor: ActorId,
    ) -> Option<Result<ActivityState, ActivityError>> {
        match self.kernel.actor_mut(actor) {
            Some(live) => live.take_wait_outcome(),
            None => self.reaped.get_mut(&actor)?.take_wait_outcome(),
        }
    }

    /// Returns true if the kernel terminated `actor`.
    pub fn is_terminated(&self, actor: ActorId) -> bool {
        self.reaped.contains_key(&actor)
    }

    // ========================================================================
    // Host events
    // ========================================================================

    pub fn schedule_host_off(&mut self, time: f64, host: HostId) -> Result<EventId, SimError> {
        self.check_host(host)?;
        Ok(self.events.schedule(time, EventKind::HostOff(host)))
    }

    pub fn schedule_host_on(&mut self, time: f64, host: HostId) -> Result<EventId, SimError> {
        self.check_host(host)?;
        Ok(self.events.schedule(time, EventKind::HostOn(host)))
    }

    fn check_host(&self, host: HostId) -> Result<(), SimError> {
        if host.index() < self.platform().host_count() {
            Ok(())
        } else {
            Err(SimError::UnknownHost(host.to_string()))
        }
    }

    fn power_off(&mut self, host: HostId) {
        if self.kernel.platform_mut().turn_off(host) {
            let killed = self.kernel.kill_actors_on(host);
            tracing::debug!(host = %host, killed, "actors on failed host marked to die");
        }
    }

    fn apply(&mut self, event: Event) {
        tracing::trace!(time = event.time, kind = ?event.kind, "event");
        match event.kind {
            EventKind::HostOff(host) => self.power_off(host),
            EventKind::HostOn(host) => {
                self.kernel.platform_mut().turn_on(host);
            }
            EventKind::FaultCheck => {
                let hosts_on = self.platform().hosts_on();
                for host in self.faults.check(&hosts_on) {
                    self.power_off(host);
                    self.events
                        .schedule(event.time + self.faults.downtime(), EventKind::HostOn(host));
                }
                self.events.schedule(
                    event.time + self.faults.check_interval(),
                    EventKind::FaultCheck,
                );
            }
        }
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Earliest instant at which something can happen.
    fn next_instant(&self) -> Option<f64> {
        let now = self.clock.now();
        let platform = self.platform();
        if platform.has_pending_changes() {
            return Some(now);
        }
        let completion = platform.next_completion().map(|delta| now + delta);
        match (completion, self.events.next_time()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advances to the next instant where something happens and processes
    /// it.
    ///
    /// Returns `None` once nothing is left to happen before `max_time`.
    pub fn step(&mut self) -> Option<StepReport> {
        let now = self.clock.now();
        let next = self.next_instant()?.max(now);
        if next > self.config.simulation.max_time {
            return None;
        }

        self.kernel.platform_mut().advance(next - now);
        self.clock.advance_to(next);
        self.trace.set_now(next);

        while self.events.next_time().is_some_and(|t| t <= next) {
            let Some(event) = self.events.pop() else {
                break;
            };
            self.apply(event);
        }

        let resolved = self.kernel.handle_state_changes();
        let answered = self.kernel.take_answered();
        let terminated: Vec<ActorId> = self
            .kernel
            .reap_dying()
            .into_iter()
            .map(|actor| {
                let id = actor.id();
                self.reaped.insert(id, actor);
                id
            })
            .collect();
        self.steps += 1;

        tracing::trace!(
            time = next,
            resolved,
            answered = answered.len(),
            terminated = terminated.len(),
            "step"
        );

        Some(StepReport {
            time: next,
            resolved,
            answered,
            terminated,
        })
    }

    /// Steps until `actor` is answered, and returns its wait outcome.
    pub fn run_until_answered(
        &mut self,
        actor: ActorId,
    ) -> Result<Result<ActivityState, ActivityError>, SimError> {
        loop {
            if let Some(outcome) = self.take_wait_outcome(actor) {
                return Ok(outcome);
            }
            if self.is_terminated(actor) {
                return Err(SimError::ActorTerminated(actor));
            }
            if self.kernel.actor(actor).is_none() {
                return Err(KernelError::UnknownActor(actor).into());
            }
            if self.step().is_none() {
                return Err(SimError::Stalled(actor));
            }
        }
    }

    /// Steps until no execution is running anymore, then writes the trace
    /// if a trace file is configured.
    pub fn run(&mut self) -> Result<SimSummary, SimError> {
        while !self.kernel.executions_in(ActivityState::Running).is_empty() {
            if self.step().is_none() {
                break;
            }
        }

        if let Some(path) = &self.config.logging.trace_file {
            self.trace.write_to(path)?;
        }

        let summary = self.summary();
        tracing::info!(
            time = summary.final_time,
            steps = summary.steps,
            done = summary.done,
            failed = summary.failed,
            canceled = summary.canceled,
            timed_out = summary.timed_out,
            "simulation finished"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> SimSummary {
        let mut summary = SimSummary {
            seed: self.config.simulation.seed,
            final_time: self.clock.now(),
            steps: self.steps,
            done: 0,
            failed: 0,
            canceled: 0,
            timed_out: 0,
            bindings: self.platform().stats(),
            faults: self.faults.stats(),
        };
        for event in self.trace.events() {
            if let TraceEventKind::Completed { state } = event.kind {
                match state {
                    ActivityState::Done => summary.done += 1,
                    ActivityState::Failed => summary.failed += 1,
                    ActivityState::Canceled => summary.canceled += 1,
                    ActivityState::TimedOut => summary.timed_out += 1,
                    ActivityState::Waiting | ActivityState::Running => {}
                }
            }
        }
        summary
    }
}

/// What one [`Simulation::step`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub time: f64,
    /// Executions that reached a terminal state.
    pub resolved: usize,
    /// Actors answered, in answering order.
    pub answered: Vec<ActorId>,
    /// Actors the kernel terminated.
    pub terminated: Vec<ActorId>,
}

// ============================================================================
// Simulation Summary
// ============================================================================

/// Summary of a simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimSummary {
    pub seed: u64,
    /// Final simulation time (seconds).
    pub final_time: f64,
    pub steps: u64,
    pub done: usize,
    pub failed: usize,
    pub canceled: usize,
    pub timed_out: usize,
    pub bindings: BindingStats,
    pub faults: FaultStats,
}
