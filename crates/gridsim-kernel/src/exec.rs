//! Execution activities: computation on one host, or coupled computation
//! and communication across several hosts.
//!
//! An [`ExecActivity`] is configured while [`ActivityState::Waiting`], then
//! started. Starting validates the host/work/payload vectors into a
//! [`Workload`] and asks the platform for the binding that will carry the
//! work. From then on the activity is driven by the kernel:
//!
//! - [`ExecActivity::post`] resolves the terminal state once a binding
//!   changed state, and releases every binding.
//! - [`ExecActivity::finish`] answers the pending callers.
//! - [`ExecActivity::migrate`] moves a sequential execution to another host
//!   without losing progress.
//!
//! Under exploration or replay no binding is ever allocated; the simcall
//! layer forces completion instead.

use gridsim_types::{ActivityId, ActorId, HostId};

use crate::activity::{ActivityCore, ActivityState};
use crate::actor::ActorTable;
use crate::error::{ActivityError, ExecError};
use crate::mode::ExecutionMode;
use crate::resource::{BindingHandle, BindingState, Platform, ResourceBinding};
use crate::signal::LifecycleSignals;
use crate::simcall::Simcall;

/// Rate passed to the platform for parallel bindings: no limit.
const UNLIMITED_RATE: f64 = -1.0;

// ============================================================================
// Workload
// ============================================================================

/// Validated shape of an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Workload {
    /// One host, one amount of work.
    Sequential { host: HostId, flops: f64 },
    /// Coupled work over several hosts; `flops[i]` and `bytes[i]` belong to
    /// `hosts[i]`.
    Parallel {
        hosts: Vec<HostId>,
        flops: Vec<f64>,
        bytes: Vec<f64>,
    },
}

impl Workload {
    /// Builds a workload from the configured vectors.
    ///
    /// One host means sequential and ignores `bytes`; more than one means
    /// parallel and requires all three vectors to have the same length.
    pub fn from_parts(
        activity: ActivityId,
        hosts: &[HostId],
        flops: &[f64],
        bytes: &[f64],
    ) -> Result<Self, ExecError> {
        let shape_error = || ExecError::InvalidShape {
            activity,
            hosts: hosts.len(),
            flops: flops.len(),
            bytes: bytes.len(),
        };

        match hosts {
            [] => Err(ExecError::NoHost(activity)),
            [host] => match flops {
                [amount] => Ok(Workload::Sequential {
                    host: *host,
                    flops: *amount,
                }),
                _ => Err(shape_error()),
            },
            _ => {
                if flops.len() != hosts.len() || bytes.len() != hosts.len() {
                    return Err(shape_error());
                }
                Ok(Workload::Parallel {
                    hosts: hosts.to_vec(),
                    flops: flops.to_vec(),
                    bytes: bytes.to_vec(),
                })
            }
        }
    }

    pub fn hosts(&self) -> &[HostId] {
        match self {
            Workload::Sequential { host, .. } => std::slice::from_ref(host),
            Workload::Parallel { hosts, .. } => hosts,
        }
    }

    pub fn is_parallel(&self) -> bool {
        matches!(self, Workload::Parallel { .. })
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Everything needed to configure and start an execution in one step.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecRequest {
    pub name: String,
    pub category: Option<String>,
    pub hosts: Vec<HostId>,
    pub flops: Vec<f64>,
    pub bytes: Vec<f64>,
    pub priority: f64,
    pub bound: f64,
    pub timeout: Option<f64>,
}

impl ExecRequest {
    /// Computation of `flops` on a single host.
    pub fn sequential(host: HostId, flops: f64) -> Self {
        Self {
            name: String::new(),
            category: None,
            hosts: vec![host],
            flops: vec![flops],
            bytes: Vec::new(),
            priority: 1.0,
            bound: 0.0,
            timeout: None,
        }
    }

    /// Coupled computation and communication over several hosts.
    pub fn parallel(hosts: Vec<HostId>, flops: Vec<f64>, bytes: Vec<f64>) -> Self {
        Self {
            hosts,
            flops,
            bytes,
            ..Self::sequential(HostId::default(), 0.0)
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_bound(mut self, bound: f64) -> Self {
        self.bound = bound;
        self
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// ============================================================================
// Execution activity
// ============================================================================

/// A computation consuming processor (and, when parallel, network) time.
#[derive(Debug)]
pub struct ExecActivity {
    core: ActivityCore,
    mode: ExecutionMode,
    category: Option<String>,

    // Configuration, frozen at start.
    hosts: Vec<HostId>,
    flops_amounts: Vec<f64>,
    bytes_amounts: Vec<f64>,
    priority: f64,
    bound: f64,

    /// Set at start.
    workload: Option<Workload>,
    /// Carries the work while running. Never set under exploration/replay.
    binding: Option<BindingHandle>,
    /// Deadline timer, independent of `binding`.
    timeout: Option<BindingHandle>,
}

impl ExecActivity {
    /// Creates a waiting execution.
    pub fn new(id: ActivityId, mode: ExecutionMode) -> Self {
        Self {
            core: ActivityCore::new(id),
            mode,
            category: None,
            hosts: Vec::new(),
            flops_amounts: Vec::new(),
            bytes_amounts: Vec::new(),
            priority: 1.0,
            bound: 0.0,
            workload: None,
            binding: None,
            timeout: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> ActivityId {
        self.core.id()
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn state(&self) -> ActivityState {
        self.core.state()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn tracing_category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Configured hosts. After a migration, see [`ExecActivity::workload`].
    pub fn hosts(&self) -> &[HostId] {
        &self.hosts
    }

    pub fn flops_amounts(&self) -> &[f64] {
        &self.flops_amounts
    }

    pub fn bytes_amounts(&self) -> &[f64] {
        &self.bytes_amounts
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    pub fn workload(&self) -> Option<&Workload> {
        self.workload.as_ref()
    }

    pub fn binding(&self) -> Option<&dyn ResourceBinding> {
        self.binding.as_deref()
    }

    pub fn timeout_binding(&self) -> Option<&dyn ResourceBinding> {
        self.timeout.as_deref()
    }

    pub fn pending_simcalls(&self) -> usize {
        self.core.pending_simcalls()
    }

    pub fn pending_callers(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.core.pending_callers()
    }

    // ------------------------------------------------------------------
    // Configuration (before start)
    // ------------------------------------------------------------------

    fn ensure_waiting(&self) -> Result<(), ExecError> {
        if self.state() == ActivityState::Waiting {
            Ok(())
        } else {
            Err(ExecError::AlreadyStarted(self.id()))
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.core.set_name(name);
        Ok(self)
    }

    pub fn set_tracing_category(
        &mut self,
        category: impl Into<String>,
    ) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.category = Some(category.into());
        Ok(self)
    }

    /// Runs on a single host.
    pub fn set_host(&mut self, host: HostId) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.hosts.clear();
        self.hosts.push(host);
        Ok(self)
    }

    pub fn set_hosts(&mut self, hosts: Vec<HostId>) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.hosts = hosts;
        Ok(self)
    }

    /// Amount of work for a sequential execution.
    pub fn set_flops_amount(&mut self, flops: f64) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.flops_amounts.clear();
        self.flops_amounts.push(flops);
        Ok(self)
    }

    pub fn set_flops_amounts(&mut self, flops: Vec<f64>) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.flops_amounts = flops;
        Ok(self)
    }

    /// Per-host payloads; only read for parallel executions.
    pub fn set_bytes_amounts(&mut self, bytes: Vec<f64>) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.bytes_amounts = bytes;
        Ok(self)
    }

    /// Rate cap forwarded to the binding at start. `0` means unbounded.
    pub fn set_bound(&mut self, bound: f64) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.bound = bound;
        Ok(self)
    }

    pub fn set_priority(&mut self, priority: f64) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        self.priority = priority;
        Ok(self)
    }

    /// Arms a deadline of `timeout` seconds on the first host.
    ///
    /// Non-positive timeouts are ignored, and so is any timeout under
    /// exploration or replay. Arming twice replaces the first timer.
    pub fn set_timeout<P: Platform + ?Sized>(
        &mut self,
        timeout: f64,
        platform: &mut P,
    ) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        if timeout > 0.0 && self.mode.is_timed() {
            let host = *self.hosts.first().ok_or(ExecError::NoHost(self.id()))?;
            let mut timer = platform.sleep(host, timeout);
            timer.associate_activity(Some(self.id()));
            if let Some(previous) = self.timeout.replace(timer) {
                release_binding(previous);
            }
            tracing::debug!(activity = %self.id(), host = %host, timeout, "timeout armed");
        }
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Validates the configuration, allocates the binding and moves to
    /// [`ActivityState::Running`].
    pub fn start<P: Platform + ?Sized>(
        &mut self,
        platform: &mut P,
        signals: &LifecycleSignals,
    ) -> Result<&mut Self, ExecError> {
        self.ensure_waiting()?;
        let workload = Workload::from_parts(
            self.id(),
            &self.hosts,
            &self.flops_amounts,
            &self.bytes_amounts,
        )?;

        self.core.transition_to(ActivityState::Running);

        if self.mode.is_timed() {
            let mut binding = match &workload {
                Workload::Sequential { host, flops } => {
                    let mut binding = platform.execution_start(*host, *flops);
                    binding.set_priority(self.priority);
                    if let Some(category) = &self.category {
                        binding.set_category(category);
                    }
                    if self.bound > 0.0 {
                        binding.set_bound(self.bound);
                    }
                    binding
                }
                Workload::Parallel {
                    hosts,
                    flops,
                    bytes,
                } => platform.execute_parallel(hosts, flops, bytes, UNLIMITED_RATE),
            };
            binding.associate_activity(Some(self.id()));
            self.binding = Some(binding);
        }
        self.workload = Some(workload);

        tracing::debug!(
            activity = %self.id(),
            name = self.name(),
            parallel = self.workload.as_ref().is_some_and(Workload::is_parallel),
            "execution started"
        );
        signals.fire_creation(self);
        Ok(self)
    }

    /// Fraction of a sequential execution's work still to do, in `[0, 1]`.
    pub fn seq_remaining_ratio(&self) -> f64 {
        match &self.binding {
            Some(binding) if binding.cost() > 0.0 => binding.remains() / binding.cost(),
            _ => 0.0,
        }
    }

    /// Fraction of a parallel execution's work still to do.
    ///
    /// Coupled bindings already report a fraction, since their per-host
    /// work amounts are not comparable.
    pub fn par_remaining_ratio(&self) -> f64 {
        self.binding.as_ref().map_or(0.0, |binding| binding.remains())
    }

    /// Resolves the terminal state after a binding changed state, releases
    /// the bindings and answers pending callers.
    ///
    /// # Panics
    ///
    /// Panics if the execution is not running.
    pub fn post<P: Platform + ?Sized>(
        &mut self,
        platform: &P,
        signals: &LifecycleSignals,
        actors: &mut ActorTable,
    ) {
        let state = self.resolve_terminal_state(platform);
        self.core.transition_to(state);

        match state {
            ActivityState::Done => {
                tracing::debug!(activity = %self.id(), "execution done");
            }
            _ => tracing::warn!(activity = %self.id(), state = %state, "execution ended abnormally"),
        }

        signals.fire_completion(self);

        if let Some(binding) = self.binding.take() {
            release_binding(binding);
        }
        if let Some(timer) = self.timeout.take() {
            release_binding(timer);
        }

        if self.core.has_simcalls() {
            self.finish(platform, actors);
        }
    }

    fn resolve_terminal_state<P: Platform + ?Sized>(&self, platform: &P) -> ActivityState {
        // Host failure is only detected for sequential executions. A parallel
        // execution whose hosts fail ends up canceled (its binding fails).
        if let Some(Workload::Sequential { host, .. }) = &self.workload {
            if !platform.is_on(*host) {
                return ActivityState::Failed;
            }
        }
        if self
            .binding
            .as_ref()
            .is_some_and(|b| b.state() == BindingState::Failed)
        {
            return ActivityState::Canceled;
        }
        if self
            .timeout
            .as_ref()
            .is_some_and(|t| t.state() == BindingState::Finished)
        {
            return ActivityState::TimedOut;
        }
        ActivityState::Done
    }

    /// Answers every pending caller, in attachment order.
    ///
    /// Calling it with no pending caller does nothing.
    ///
    /// # Panics
    ///
    /// Panics if a caller is pending while the execution is not terminal.
    pub fn finish<P: Platform + ?Sized>(&mut self, platform: &P, actors: &mut ActorTable) {
        while let Some(simcall) = self.core.pop_simcall() {
            self.answer(simcall, platform, actors);
        }
    }

    fn answer<P: Platform + ?Sized>(
        &self,
        simcall: Simcall,
        platform: &P,
        actors: &mut ActorTable,
    ) {
        let state = self.state();
        let issuer = simcall.issuer();
        debug_assert!(
            actors.get(issuer).is_some(),
            "caller {issuer} of {} left the actor table while still attached",
            self.id()
        );
        let Some(actor) = actors.get_mut(issuer) else {
            tracing::debug!(activity = %self.id(), actor = %issuer, "caller is gone");
            return;
        };
        let issuer_host_on = platform.is_on(actor.host());

        match state {
            ActivityState::Done => {
                tracing::debug!(activity = %self.id(), actor = %issuer, "execution successful");
            }
            ActivityState::Failed => {
                tracing::debug!(activity = %self.id(), host = %actor.host(), "host failed");
                actor.mark_to_die();
                // An actor whose own host died is killed, not handed an error.
                if issuer_host_on {
                    actor.set_error(ActivityError::HostFailure {
                        host: self.failed_host(),
                    });
                }
            }
            ActivityState::Canceled => {
                tracing::debug!(activity = %self.id(), actor = %issuer, "execution canceled");
                actor.set_error(ActivityError::Canceled);
            }
            ActivityState::TimedOut => {
                tracing::debug!(activity = %self.id(), actor = %issuer, "execution timed out");
                actor.set_error(ActivityError::Timeout);
            }
            ActivityState::Waiting | ActivityState::Running => panic!(
                "internal error in ExecActivity::finish: unexpected state {state} for {}",
                self.id()
            ),
        }

        if actor.waiting_activity() == Some(self.id()) {
            actor.clear_waiting();
        }
        if issuer_host_on {
            actors.answer(issuer, simcall.result_for(state));
        } else {
            actor.mark_to_die();
        }
    }

    fn failed_host(&self) -> HostId {
        self.workload
            .as_ref()
            .and_then(|w| w.hosts().first().copied())
            .unwrap_or_default()
    }

    /// Moves a running sequential execution to `to`, keeping its progress.
    /// A pending deadline moves along with the remaining time.
    ///
    /// Under exploration or replay only the migration signal fires.
    pub fn migrate<P: Platform + ?Sized>(
        &mut self,
        to: HostId,
        platform: &mut P,
        signals: &LifecycleSignals,
    ) -> Result<&mut Self, ExecError> {
        let id = self.id();
        if self.mode.is_timed() {
            if self.state() != ActivityState::Running {
                return Err(ExecError::NotRunning(id));
            }
            let Some(Workload::Sequential { host, .. }) = &mut self.workload else {
                return Err(ExecError::ParallelMigration(id));
            };
            let mut old = self.binding.take().ok_or(ExecError::NotRunning(id))?;

            let mut new = platform.execution_start(to, old.cost());
            new.set_remains(old.remains());
            new.set_priority(old.priority());
            if let Some(category) = &self.category {
                new.set_category(category);
            }
            if self.bound > 0.0 {
                new.set_bound(self.bound);
            }

            old.associate_activity(None);
            old.cancel();
            old.release();
            new.associate_activity(Some(id));

            // The deadline follows the work, keeping the time it has left.
            if self
                .timeout
                .as_ref()
                .is_some_and(|t| t.state() == BindingState::Running)
            {
                if let Some(old_timer) = self.timeout.take() {
                    let mut timer = platform.sleep(to, old_timer.remains());
                    timer.associate_activity(Some(id));
                    release_binding(old_timer);
                    self.timeout = Some(timer);
                }
            }

            tracing::debug!(activity = %id, from = %host, to = %to, "execution migrated");
            *host = to;
            self.hosts = vec![to];
            self.binding = Some(new);
        }

        signals.fire_migration(self, to);
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Simcall plumbing
    // ------------------------------------------------------------------

    pub(crate) fn register_simcall(&mut self, simcall: Simcall) {
        self.core.register_simcall(simcall);
    }

    pub(crate) fn unregister_simcalls_of(&mut self, actor: ActorId) -> usize {
        self.core.unregister_simcalls_of(actor)
    }

    /// Completes a running execution without any binding (mechanized
    /// drivers only).
    pub(crate) fn force_done(&mut self) {
        debug_assert!(self.mode.is_mechanized());
        if self.state() == ActivityState::Running {
            self.core.transition_to(ActivityState::Done);
        }
    }
}

impl Drop for ExecActivity {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            release_binding(binding);
        }
        if let Some(timer) = self.timeout.take() {
            release_binding(timer);
        }
    }
}

/// Dissociates a binding from its activity and gives it back.
fn release_binding(mut binding: BindingHandle) {
    binding.associate_activity(None);
    binding.release();
}
