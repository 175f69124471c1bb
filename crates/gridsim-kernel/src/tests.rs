//! Unit tests for gridsim-kernel
//!
//! The kernel never computes progress, so every scenario is driven by a
//! scripted platform: tests decide which binding finishes, fails or times
//! out, then let the kernel resolve the consequences.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use gridsim_types::{ActivityId, ActorId, HostId};
use proptest::prelude::*;
use test_case::test_case;

use crate::activity::ActivityState;
use crate::actor::ActorTable;
use crate::error::{ActivityError, ExecError, KernelError};
use crate::exec::{ExecActivity, ExecRequest, Workload};
use crate::kernel::Kernel;
use crate::mode::ExecutionMode;
use crate::resource::{BindingHandle, BindingState, Platform, ResourceBinding};
use crate::signal::LifecycleSignals;
use crate::simcall::{Simcall, SimcallKind, SimcallResult};

// ============================================================================
// Scripted platform
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Kind {
    Exec(HostId),
    Parallel(Vec<HostId>),
    Sleep(HostId),
}

impl Kind {
    fn touches(&self, host: HostId) -> bool {
        match self {
            Kind::Exec(h) | Kind::Sleep(h) => *h == host,
            Kind::Parallel(hosts) => hosts.contains(&host),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    kind: Kind,
    cost: f64,
    remains: f64,
    priority: f64,
    bound: f64,
    rate: f64,
    category: Option<String>,
    state: BindingState,
    activity: Option<ActivityId>,
    released: bool,
}

#[derive(Debug, Default)]
struct Ledger {
    next: u64,
    entries: BTreeMap<u64, Entry>,
    changes: Vec<ActivityId>,
    off: BTreeSet<HostId>,
}

impl Ledger {
    fn allocate(&mut self, kind: Kind, cost: f64, rate: f64) -> u64 {
        let id = self.next;
        self.next += 1;
        self.entries.insert(
            id,
            Entry {
                kind,
                cost,
                remains: cost,
                priority: 1.0,
                bound: 0.0,
                rate,
                category: None,
                state: BindingState::Running,
                activity: None,
                released: false,
            },
        );
        id
    }

    fn entry(&mut self, id: u64) -> &mut Entry {
        self.entries.get_mut(&id).expect("unknown binding")
    }

    /// Changes the state of a binding, reporting it if associated.
    fn set_state(&mut self, id: u64, state: BindingState) {
        let entry = self.entry(id);
        entry.state = state;
        if let Some(activity) = entry.activity {
            self.changes.push(activity);
        }
    }
}

#[derive(Debug)]
struct FakeBinding {
    id: u64,
    ledger: Rc<RefCell<Ledger>>,
}

impl FakeBinding {
    fn with<R>(&self, f: impl FnOnce(&mut Entry) -> R) -> R {
        f(self.ledger.borrow_mut().entry(self.id))
    }
}

impl ResourceBinding for FakeBinding {
    fn cost(&self) -> f64 {
        self.with(|e| e.cost)
    }

    fn remains(&self) -> f64 {
        self.with(|e| e.remains)
    }

    fn set_remains(&mut self, remains: f64) {
        self.with(|e| e.remains = remains);
    }

    fn priority(&self) -> f64 {
        self.with(|e| e.priority)
    }

    fn set_priority(&mut self, priority: f64) {
        self.with(|e| e.priority = priority);
    }

    fn set_bound(&mut self, bound: f64) {
        self.with(|e| e.bound = bound);
    }

    fn set_category(&mut self, category: &str) {
        self.with(|e| e.category = Some(category.to_string()));
    }

    fn state(&self) -> BindingState {
        self.with(|e| e.state)
    }

    fn cancel(&mut self) {
        self.ledger
            .borrow_mut()
            .set_state(self.id, BindingState::Failed);
    }

    fn associate_activity(&mut self, activity: Option<ActivityId>) {
        self.with(|e| e.activity = activity);
    }

    fn release(self: Box<Self>) {
        self.with(|e| {
            assert!(!e.released, "binding released twice");
            e.released = true;
        });
    }
}

/// Platform whose bindings only change state when a test says so.
#[derive(Debug, Clone, Default)]
struct FakePlatform {
    ledger: Rc<RefCell<Ledger>>,
}

impl FakePlatform {
    fn binding(&self, id: u64) -> BindingHandle {
        Box::new(FakeBinding {
            id,
            ledger: Rc::clone(&self.ledger),
        })
    }

    fn entry(&self, id: u64) -> Entry {
        self.ledger.borrow_mut().entry(id).clone()
    }

    /// Unreleased bindings associated with `activity`, in allocation order.
    fn bindings_of(&self, activity: ActivityId) -> Vec<u64> {
        self.ledger
            .borrow()
            .entries
            .iter()
            .filter(|(_, e)| !e.released && e.activity == Some(activity))
            .map(|(id, _)| *id)
            .collect()
    }

    fn work_of(&self, activity: ActivityId) -> u64 {
        self.find(activity, |k| !matches!(k, Kind::Sleep(_)))
    }

    fn timer_of(&self, activity: ActivityId) -> u64 {
        self.find(activity, |k| matches!(k, Kind::Sleep(_)))
    }

    fn find(&self, activity: ActivityId, pred: impl Fn(&Kind) -> bool) -> u64 {
        self.bindings_of(activity)
            .into_iter()
            .find(|id| pred(&self.entry(*id).kind))
            .expect("no such binding")
    }

    fn complete(&self, id: u64) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.entry(id).remains = 0.0;
        ledger.set_state(id, BindingState::Finished);
    }

    fn fail(&self, id: u64) {
        self.ledger.borrow_mut().set_state(id, BindingState::Failed);
    }

    fn set_remains(&self, id: u64, remains: f64) {
        self.ledger.borrow_mut().entry(id).remains = remains;
    }

    /// Powers the host off without touching any binding.
    fn power_off(&self, host: HostId) {
        self.ledger.borrow_mut().off.insert(host);
    }

    /// Powers the host off and fails every binding using it.
    fn turn_off(&self, host: HostId) {
        let mut ledger = self.ledger.borrow_mut();
        ledger.off.insert(host);
        let hit: Vec<u64> = ledger
            .entries
            .iter()
            .filter(|(_, e)| !e.released && e.kind.touches(host))
            .map(|(id, _)| *id)
            .collect();
        for id in hit {
            ledger.set_state(id, BindingState::Failed);
        }
    }

    fn allocated(&self) -> usize {
        self.ledger.borrow().entries.len()
    }

    fn live(&self) -> usize {
        self.ledger
            .borrow()
            .entries
            .values()
            .filter(|e| !e.released)
            .count()
    }
}

impl Platform for FakePlatform {
    fn is_on(&self, host: HostId) -> bool {
        !self.ledger.borrow().off.contains(&host)
    }

    fn execution_start(&mut self, host: HostId, flops: f64) -> BindingHandle {
        let id = self.ledger.borrow_mut().allocate(Kind::Exec(host), flops, 0.0);
        self.binding(id)
    }

    fn execute_parallel(
        &mut self,
        hosts: &[HostId],
        _flops: &[f64],
        _bytes: &[f64],
        rate: f64,
    ) -> BindingHandle {
        // Coupled bindings report remaining work as a fraction.
        let id = self
            .ledger
            .borrow_mut()
            .allocate(Kind::Parallel(hosts.to_vec()), 1.0, rate);
        self.binding(id)
    }

    fn sleep(&mut self, host: HostId, duration: f64) -> BindingHandle {
        let id = self
            .ledger
            .borrow_mut()
            .allocate(Kind::Sleep(host), duration, 0.0);
        self.binding(id)
    }

    fn take_state_changes(&mut self) -> Vec<ActivityId> {
        std::mem::take(&mut self.ledger.borrow_mut().changes)
    }
}

// ============================================================================
// Test Helpers
// ============================================================================

fn h(raw: u64) -> HostId {
    HostId::new(raw)
}

fn timed_kernel() -> (Kernel<FakePlatform>, FakePlatform) {
    let platform = FakePlatform::default();
    (
        Kernel::new(platform.clone(), ExecutionMode::TIMED),
        platform,
    )
}

fn wait_outcome(
    kernel: &mut Kernel<FakePlatform>,
    actor: ActorId,
) -> Option<Result<ActivityState, ActivityError>> {
    kernel
        .actor_mut(actor)
        .and_then(crate::actor::Actor::take_wait_outcome)
}

/// Records signal deliveries as `"<signal>:<activity>:<state>"`.
fn record_signals(kernel: &mut Kernel<FakePlatform>) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let signals = kernel.signals_mut();

    let l = Rc::clone(&log);
    signals.on_creation(move |e| l.borrow_mut().push(format!("create:{}:{}", e.id(), e.state())));
    let l = Rc::clone(&log);
    signals.on_completion(move |e| l.borrow_mut().push(format!("done:{}:{}", e.id(), e.state())));
    let l = Rc::clone(&log);
    signals.on_migration(move |e, to| l.borrow_mut().push(format!("migrate:{}:{to}", e.id())));
    log
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn sequential_execution_completes_and_answers_waiter() {
    let (mut kernel, platform) = timed_kernel();
    let log = record_signals(&mut kernel);
    let actor = kernel.spawn_actor("worker", h(0));

    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1e9).with_name("compute"))
        .expect("exec_init should succeed");
    kernel.simcall_execution_wait(actor, exec).unwrap();
    assert_eq!(kernel.actor(actor).unwrap().waiting_activity(), Some(exec));
    assert!(kernel.take_answered().is_empty());

    platform.complete(platform.work_of(exec));
    assert_eq!(kernel.handle_state_changes(), 1);

    let e = kernel.execution(exec).unwrap();
    assert_eq!(e.state(), ActivityState::Done);
    assert_eq!(e.name(), "compute");
    assert!(e.binding().is_none());
    assert_eq!(platform.live(), 0);

    assert_eq!(kernel.take_answered(), vec![actor]);
    assert_eq!(kernel.actor(actor).unwrap().waiting_activity(), None);
    assert_eq!(wait_outcome(&mut kernel, actor), Some(Ok(ActivityState::Done)));
    assert_eq!(
        *log.borrow(),
        vec![
            format!("create:{exec}:running"),
            format!("done:{exec}:done"),
        ]
    );
}

#[test]
fn timeout_fires_before_work_completes() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1e12).with_timeout(2.0))
        .unwrap();
    kernel.simcall_execution_wait(actor, exec).unwrap();
    assert_eq!(platform.bindings_of(exec).len(), 2);

    platform.complete(platform.timer_of(exec));
    kernel.handle_state_changes();

    assert_eq!(
        kernel.execution(exec).unwrap().state(),
        ActivityState::TimedOut
    );
    assert_eq!(platform.live(), 0);
    assert_eq!(kernel.take_answered(), vec![actor]);
    assert_eq!(
        wait_outcome(&mut kernel, actor),
        Some(Err(ActivityError::Timeout))
    );
}

#[test]
fn host_failure_fails_execution_and_kills_local_waiter() {
    let (mut kernel, platform) = timed_kernel();
    let local = kernel.spawn_actor("local", h(0));
    let remote = kernel.spawn_actor("remote", h(1));

    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1e9)).unwrap();
    kernel.simcall_execution_wait(local, exec).unwrap();
    kernel.simcall_execution_wait(remote, exec).unwrap();

    platform.turn_off(h(0));
    kernel.handle_state_changes();

    assert_eq!(kernel.execution(exec).unwrap().state(), ActivityState::Failed);
    assert_eq!(kernel.take_answered(), vec![remote]);

    let remote_actor = kernel.actor(remote).unwrap();
    assert!(remote_actor.wants_to_die());
    assert_eq!(
        remote_actor.pending_error(),
        Some(ActivityError::HostFailure { host: h(0) })
    );

    let local_actor = kernel.actor(local).unwrap();
    assert!(local_actor.wants_to_die());
    assert_eq!(local_actor.pending_error(), None);
    assert_eq!(local_actor.last_result(), None);

    let reaped = kernel.reap_dying();
    assert_eq!(reaped.len(), 2);
    assert!(kernel.actors().is_empty());
}

#[test]
fn canceled_binding_cancels_execution() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1e9).with_timeout(10.0))
        .unwrap();
    kernel.simcall_execution_wait(actor, exec).unwrap();

    platform.fail(platform.work_of(exec));
    kernel.handle_state_changes();

    assert_eq!(
        kernel.execution(exec).unwrap().state(),
        ActivityState::Canceled
    );
    assert_eq!(
        wait_outcome(&mut kernel, actor),
        Some(Err(ActivityError::Canceled))
    );
    assert!(!kernel.actor(actor).unwrap().wants_to_die());
    assert_eq!(platform.live(), 0);
}

#[test]
fn migration_preserves_progress() {
    let (mut kernel, platform) = timed_kernel();
    let log = record_signals(&mut kernel);
    let exec = kernel
        .exec_init(
            ExecRequest::sequential(h(0), 100.0)
                .with_priority(2.0)
                .with_bound(5.0)
                .with_category("phase-1"),
        )
        .unwrap();
    let old = platform.work_of(exec);
    platform.set_remains(old, 40.0);

    kernel.execution_migrate(exec, h(1)).unwrap();

    let old_entry = platform.entry(old);
    assert!(old_entry.released);
    assert_eq!(old_entry.activity, None);
    assert_eq!(old_entry.state, BindingState::Failed);

    let new = platform.work_of(exec);
    let new_entry = platform.entry(new);
    assert_eq!(new_entry.kind, Kind::Exec(h(1)));
    assert_eq!(new_entry.cost, 100.0);
    assert_eq!(new_entry.remains, 40.0);
    assert_eq!(new_entry.priority, 2.0);
    assert_eq!(new_entry.bound, 5.0);
    assert_eq!(new_entry.category.as_deref(), Some("phase-1"));

    let e = kernel.execution(exec).unwrap();
    assert_eq!(e.state(), ActivityState::Running);
    assert!((e.seq_remaining_ratio() - 0.4).abs() < 1e-12);
    assert_eq!(
        e.workload().map(Workload::hosts),
        Some([h(1)].as_slice())
    );

    // The canceled binding was dissociated first, so nothing is reported.
    assert_eq!(kernel.handle_state_changes(), 0);
    assert!(log.borrow().contains(&format!("migrate:{exec}:{}", h(1))));
}

#[test]
fn migration_moves_the_deadline_with_the_work() {
    let (mut kernel, platform) = timed_kernel();
    let waiter = kernel.spawn_actor("waiter", h(2));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1000.0).with_timeout(500.0))
        .unwrap();
    kernel.simcall_execution_wait(waiter, exec).unwrap();
    let old_timer = platform.timer_of(exec);
    platform.set_remains(old_timer, 499.0);

    kernel.execution_migrate(exec, h(1)).unwrap();

    assert!(platform.entry(old_timer).released);
    let timer = platform.entry(platform.timer_of(exec));
    assert_eq!(timer.kind, Kind::Sleep(h(1)));
    assert_eq!(timer.cost, 499.0);
    assert_eq!(platform.live(), 2);

    // The original host no longer holds anything of this execution.
    platform.turn_off(h(0));
    assert_eq!(kernel.handle_state_changes(), 0);
    assert_eq!(
        kernel.execution(exec).unwrap().state(),
        ActivityState::Running
    );
    assert!(kernel.take_answered().is_empty());

    platform.turn_off(h(1));
    kernel.handle_state_changes();
    assert_eq!(kernel.execution(exec).unwrap().state(), ActivityState::Failed);
    assert_eq!(kernel.take_answered(), vec![waiter]);
    assert_eq!(
        kernel.actor(waiter).unwrap().pending_error(),
        Some(ActivityError::HostFailure { host: h(1) })
    );
    assert_eq!(platform.live(), 0);
}

#[test]
fn migrated_deadline_still_times_out() {
    let (mut kernel, platform) = timed_kernel();
    let waiter = kernel.spawn_actor("waiter", h(2));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1000.0).with_timeout(5.0))
        .unwrap();
    kernel.simcall_execution_wait(waiter, exec).unwrap();
    kernel.execution_migrate(exec, h(1)).unwrap();

    platform.complete(platform.timer_of(exec));
    kernel.handle_state_changes();
    assert_eq!(
        wait_outcome(&mut kernel, waiter),
        Some(Err(ActivityError::Timeout))
    );
    assert_eq!(platform.live(), 0);
}

#[test]
fn successive_migrations_carry_remaining_work() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 100.0).with_priority(3.0))
        .unwrap();
    let original = platform.work_of(exec);
    platform.set_remains(original, 70.0);

    kernel.execution_migrate(exec, h(1)).unwrap();
    let first_hop = platform.work_of(exec);
    assert_eq!(platform.entry(first_hop).remains, 70.0);
    platform.set_remains(first_hop, 30.0);

    // A second release of any binding panics in the scripted platform.
    kernel.execution_migrate(exec, h(2)).unwrap();
    let second_hop = platform.work_of(exec);

    for id in [original, first_hop] {
        let entry = platform.entry(id);
        assert!(entry.released);
        assert_eq!(entry.state, BindingState::Failed);
        assert_eq!(entry.activity, None);
    }
    let entry = platform.entry(second_hop);
    assert_eq!(entry.kind, Kind::Exec(h(2)));
    assert_eq!(entry.cost, 100.0);
    assert_eq!(entry.remains, 30.0);
    assert_eq!(entry.priority, 3.0);
    assert_eq!(platform.allocated(), 3);
    assert_eq!(platform.live(), 1);

    let e = kernel.execution(exec).unwrap();
    assert!((e.seq_remaining_ratio() - 0.3).abs() < 1e-12);
    assert_eq!(e.hosts(), [h(2)].as_slice());
    assert_eq!(kernel.handle_state_changes(), 0);

    platform.complete(second_hop);
    kernel.handle_state_changes();
    assert_eq!(kernel.execution(exec).unwrap().state(), ActivityState::Done);
    assert_eq!(platform.live(), 0);
}

// ============================================================================
// Resolution order
// ============================================================================

#[test_case(false, false, false => ActivityState::Done; "clean completion")]
#[test_case(false, false, true => ActivityState::TimedOut; "timer finished")]
#[test_case(false, true, false => ActivityState::Canceled; "binding failed")]
#[test_case(false, true, true => ActivityState::Canceled; "failure beats timeout")]
#[test_case(true, false, false => ActivityState::Failed; "host off")]
#[test_case(true, true, true => ActivityState::Failed; "host off beats everything")]
fn terminal_state_resolution(host_off: bool, binding_failed: bool, timer_fired: bool) -> ActivityState {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 50.0).with_timeout(1.0))
        .unwrap();
    let work = platform.work_of(exec);
    let timer = platform.timer_of(exec);

    if host_off {
        platform.power_off(h(0));
    }
    if binding_failed {
        platform.fail(work);
    } else {
        platform.complete(work);
    }
    if timer_fired {
        platform.complete(timer);
    }

    assert_eq!(kernel.handle_state_changes(), 1);
    kernel.execution(exec).unwrap().state()
}

#[test]
fn work_and_timer_changing_together_resolve_once() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 50.0).with_timeout(1.0))
        .unwrap();
    kernel.simcall_execution_wait(actor, exec).unwrap();

    platform.complete(platform.work_of(exec));
    platform.complete(platform.timer_of(exec));

    assert_eq!(kernel.handle_state_changes(), 1);
    assert_eq!(kernel.take_answered(), vec![actor]);
}

// ============================================================================
// Simcalls
// ============================================================================

#[test]
fn waiters_are_answered_in_attachment_order() {
    let (mut kernel, platform) = timed_kernel();
    let a = kernel.spawn_actor("a", h(0));
    let b = kernel.spawn_actor("b", h(0));
    let c = kernel.spawn_actor("c", h(1));
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();

    for actor in [b, c, a] {
        kernel.simcall_execution_wait(actor, exec).unwrap();
    }
    assert_eq!(
        kernel.execution(exec).unwrap().pending_callers().collect::<Vec<_>>(),
        vec![b, c, a]
    );

    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();
    assert_eq!(kernel.take_answered(), vec![b, c, a]);
    assert_eq!(kernel.execution(exec).unwrap().pending_simcalls(), 0);
}

#[test]
fn wait_on_waiting_execution_is_rejected() {
    let (mut kernel, _platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let exec = kernel.create_execution();

    assert_eq!(
        kernel.simcall_execution_wait(actor, exec),
        Err(KernelError::Exec(ExecError::NotRunning(exec)))
    );
    assert_eq!(kernel.actor(actor).unwrap().waiting_activity(), None);
}

#[test]
fn actor_cannot_wait_on_two_executions() {
    let (mut kernel, _platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let first = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    let second = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();

    kernel.simcall_execution_wait(actor, first).unwrap();
    assert_eq!(
        kernel.simcall_execution_wait(actor, second),
        Err(KernelError::ActorBusy {
            actor,
            activity: first
        })
    );
}

#[test]
fn blocked_actor_cannot_test() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let long = kernel.exec_init(ExecRequest::sequential(h(0), 1e9)).unwrap();
    let quick = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    let other = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    platform.complete(platform.work_of(quick));
    kernel.handle_state_changes();

    kernel.simcall_execution_wait(actor, long).unwrap();
    let busy = Err(KernelError::ActorBusy {
        actor,
        activity: long,
    });
    assert_eq!(kernel.simcall_execution_test(actor, quick), busy);
    assert_eq!(kernel.actor(actor).unwrap().waiting_activity(), Some(long));
    assert_eq!(kernel.simcall_execution_wait(actor, other).map(|_| false), busy);

    assert_eq!(kernel.execution(long).unwrap().pending_simcalls(), 1);
    assert_eq!(kernel.execution(other).unwrap().pending_simcalls(), 0);
    assert!(kernel.take_answered().is_empty());

    platform.complete(platform.work_of(long));
    kernel.handle_state_changes();
    assert_eq!(kernel.take_answered(), vec![actor]);
    assert_eq!(kernel.actor(actor).unwrap().waiting_activity(), None);
}

#[test]
fn wait_on_terminated_execution_answers_immediately() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("late", h(0));
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();

    kernel.simcall_execution_wait(actor, exec).unwrap();
    assert_eq!(kernel.take_answered(), vec![actor]);
    assert_eq!(wait_outcome(&mut kernel, actor), Some(Ok(ActivityState::Done)));
}

#[test]
fn test_simcall_reports_readiness() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("poller", h(0));
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1.0).with_timeout(0.5))
        .unwrap();

    assert_eq!(kernel.simcall_execution_test(actor, exec), Ok(false));
    assert_eq!(kernel.take_answered(), vec![actor]);
    let outcome = kernel.actor_mut(actor).unwrap().take_test_outcome();
    assert_eq!(outcome, Some(Ok(false)));

    platform.complete(platform.timer_of(exec));
    kernel.handle_state_changes();

    assert_eq!(kernel.simcall_execution_test(actor, exec), Ok(true));
    assert_eq!(kernel.take_answered(), vec![actor]);
    let outcome = kernel.actor_mut(actor).unwrap().take_test_outcome();
    assert_eq!(outcome, Some(Err(ActivityError::Timeout)));
}

#[test]
fn unknown_ids_are_reported() {
    let (mut kernel, _platform) = timed_kernel();
    let actor = kernel.spawn_actor("worker", h(0));
    let missing = ActivityId::new(99);
    assert_eq!(
        kernel.simcall_execution_wait(actor, missing),
        Err(KernelError::UnknownActivity(missing))
    );

    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    let ghost = ActorId::new(42);
    assert_eq!(
        kernel.simcall_execution_wait(ghost, exec),
        Err(KernelError::UnknownActor(ghost))
    );
}

#[test]
fn reaped_waiter_is_detached_from_its_execution() {
    let (mut kernel, platform) = timed_kernel();
    let doomed = kernel.spawn_actor("doomed", h(2));
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    kernel.simcall_execution_wait(doomed, exec).unwrap();

    assert_eq!(kernel.kill_actors_on(h(2)), 1);
    let reaped = kernel.reap_dying();
    assert_eq!(reaped[0].id(), doomed);
    assert_eq!(kernel.execution(exec).unwrap().pending_simcalls(), 0);

    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();
    assert!(kernel.take_answered().is_empty());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn start_forwards_priority_category_and_bound() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(
            ExecRequest::sequential(h(3), 8.0)
                .with_priority(0.5)
                .with_bound(2.0)
                .with_category("io"),
        )
        .unwrap();
    let entry = platform.entry(platform.work_of(exec));
    assert_eq!(entry.kind, Kind::Exec(h(3)));
    assert_eq!(entry.cost, 8.0);
    assert_eq!(entry.priority, 0.5);
    assert_eq!(entry.bound, 2.0);
    assert_eq!(entry.category.as_deref(), Some("io"));
    assert_eq!(
        kernel.execution(exec).unwrap().tracing_category(),
        Some("io")
    );
}

#[test]
fn zero_bound_is_not_forwarded() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 8.0)).unwrap();
    let entry = platform.entry(platform.work_of(exec));
    assert_eq!(entry.bound, 0.0);
    assert_eq!(entry.category, None);
}

#[test]
fn parallel_execution_uses_one_unlimited_binding() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(ExecRequest::parallel(
            vec![h(0), h(1), h(2)],
            vec![1.0, 2.0, 3.0],
            vec![0.0, 10.0, 10.0],
        ))
        .unwrap();

    let bindings = platform.bindings_of(exec);
    assert_eq!(bindings.len(), 1);
    let entry = platform.entry(bindings[0]);
    assert_eq!(entry.kind, Kind::Parallel(vec![h(0), h(1), h(2)]));
    assert_eq!(entry.rate, -1.0);

    platform.set_remains(bindings[0], 0.25);
    let e = kernel.execution(exec).unwrap();
    assert!(e.workload().is_some_and(Workload::is_parallel));
    assert_eq!(e.par_remaining_ratio(), 0.25);
}

#[test]
fn parallel_host_failure_surfaces_as_cancel() {
    let (mut kernel, platform) = timed_kernel();
    let actor = kernel.spawn_actor("driver", h(5));
    let exec = kernel
        .exec_init(ExecRequest::parallel(
            vec![h(0), h(1)],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
        ))
        .unwrap();
    kernel.simcall_execution_wait(actor, exec).unwrap();

    platform.turn_off(h(1));
    kernel.handle_state_changes();

    assert_eq!(
        kernel.execution(exec).unwrap().state(),
        ActivityState::Canceled
    );
    assert_eq!(
        wait_outcome(&mut kernel, actor),
        Some(Err(ActivityError::Canceled))
    );
}

#[test]
fn configuring_a_started_execution_is_rejected() {
    let (mut kernel, _platform) = timed_kernel();
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    let e = kernel.execution_mut(exec).unwrap();
    assert_eq!(
        e.set_priority(3.0).err(),
        Some(ExecError::AlreadyStarted(exec))
    );
    assert_eq!(
        kernel.start_execution(exec),
        Err(KernelError::Exec(ExecError::AlreadyStarted(exec)))
    );
}

#[test]
fn step_by_step_configuration() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.create_execution();
    kernel
        .execution_mut(exec)
        .unwrap()
        .set_name("stepwise")
        .unwrap()
        .set_host(h(4))
        .unwrap()
        .set_flops_amount(12.0)
        .unwrap();
    kernel.set_execution_timeout(exec, 3.0).unwrap();
    assert_eq!(platform.allocated(), 1);

    kernel.start_execution(exec).unwrap();
    assert_eq!(platform.bindings_of(exec).len(), 2);
    assert_eq!(platform.entry(platform.timer_of(exec)).kind, Kind::Sleep(h(4)));
}

#[test]
fn timeout_without_host_is_rejected() {
    let (mut kernel, _platform) = timed_kernel();
    let exec = kernel.create_execution();
    assert_eq!(
        kernel.set_execution_timeout(exec, 3.0),
        Err(KernelError::Exec(ExecError::NoHost(exec)))
    );
}

#[test]
fn rearming_timeout_releases_previous_timer() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.create_execution();
    kernel.execution_mut(exec).unwrap().set_host(h(0)).unwrap();
    kernel.set_execution_timeout(exec, 3.0).unwrap();
    kernel.set_execution_timeout(exec, 5.0).unwrap();

    assert_eq!(platform.allocated(), 2);
    assert_eq!(platform.live(), 1);
    assert_eq!(platform.entry(platform.timer_of(exec)).cost, 5.0);
}

#[test]
fn non_positive_timeout_is_ignored() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1.0).with_timeout(0.0))
        .unwrap();
    assert_eq!(platform.bindings_of(exec).len(), 1);
    assert!(kernel.execution(exec).unwrap().timeout_binding().is_none());
}

#[test]
fn failed_init_discards_execution_and_timer() {
    let (mut kernel, platform) = timed_kernel();
    let result = kernel.exec_init(
        ExecRequest::parallel(vec![h(0), h(1)], vec![1.0], Vec::new()).with_timeout(3.0),
    );

    assert!(matches!(
        result,
        Err(KernelError::Exec(ExecError::InvalidShape {
            hosts: 2,
            flops: 1,
            bytes: 0,
            ..
        }))
    ));
    assert_eq!(kernel.activity_count(), 0);
    assert_eq!(platform.allocated(), 1);
    assert_eq!(platform.live(), 0);
}

// ============================================================================
// Migration edge cases
// ============================================================================

#[test]
fn migrating_parallel_execution_is_rejected() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel
        .exec_init(ExecRequest::parallel(
            vec![h(0), h(1)],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
        ))
        .unwrap();
    assert_eq!(
        kernel.execution_migrate(exec, h(2)),
        Err(KernelError::Exec(ExecError::ParallelMigration(exec)))
    );
    assert_eq!(platform.live(), 1);
}

#[test]
fn migrating_terminated_execution_is_rejected() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();
    assert_eq!(
        kernel.execution_migrate(exec, h(1)),
        Err(KernelError::Exec(ExecError::NotRunning(exec)))
    );
}

// ============================================================================
// Release
// ============================================================================

#[test]
fn release_requires_a_terminal_execution() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    assert_eq!(
        kernel.release_execution(exec),
        Err(KernelError::NotTerminal(exec))
    );

    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();
    kernel.release_execution(exec).unwrap();
    assert_eq!(kernel.activity_count(), 0);
    assert!(kernel.execution(exec).is_none());
}

#[test]
fn late_change_for_released_execution_is_ignored() {
    let (mut kernel, platform) = timed_kernel();
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();
    platform.complete(platform.work_of(exec));
    kernel.handle_state_changes();
    kernel.release_execution(exec).unwrap();

    platform.ledger.borrow_mut().changes.push(exec);
    assert_eq!(kernel.handle_state_changes(), 0);
}

// ============================================================================
// Mechanized modes
// ============================================================================

#[test_case(ExecutionMode::EXPLORATION; "exploration")]
#[test_case(ExecutionMode::REPLAY; "replay")]
fn mechanized_wait_completes_without_bindings(mode: ExecutionMode) {
    let platform = FakePlatform::default();
    let mut kernel = Kernel::new(platform.clone(), mode);
    let log = record_signals(&mut kernel);
    let actor = kernel.spawn_actor("checker", h(0));

    let exec = kernel
        .exec_init(ExecRequest::sequential(h(0), 1e9).with_timeout(1.0))
        .unwrap();
    assert_eq!(platform.allocated(), 0);
    assert!(kernel.execution(exec).unwrap().binding().is_none());

    kernel.simcall_execution_wait(actor, exec).unwrap();
    assert_eq!(kernel.execution(exec).unwrap().state(), ActivityState::Done);
    assert_eq!(kernel.take_answered(), vec![actor]);
    assert_eq!(wait_outcome(&mut kernel, actor), Some(Ok(ActivityState::Done)));

    // Forced completion does not go through the per-tick resolution.
    assert_eq!(*log.borrow(), vec![format!("create:{exec}:running")]);
}

#[test]
fn mechanized_migration_only_signals() {
    let platform = FakePlatform::default();
    let mut kernel = Kernel::new(platform.clone(), ExecutionMode::EXPLORATION);
    let log = record_signals(&mut kernel);
    let exec = kernel.exec_init(ExecRequest::sequential(h(0), 1.0)).unwrap();

    kernel.execution_migrate(exec, h(1)).unwrap();
    assert_eq!(platform.allocated(), 0);
    assert_eq!(log.borrow().len(), 2);
}

// ============================================================================
// Activity-level behavior
// ============================================================================

#[test]
fn finish_without_callers_is_a_no_op() {
    let mut platform = FakePlatform::default();
    let signals = LifecycleSignals::new();
    let mut actors = ActorTable::new();

    let mut exec = ExecActivity::new(ActivityId::new(1), ExecutionMode::TIMED);
    exec.set_host(h(0)).unwrap().set_flops_amount(1.0).unwrap();
    exec.start(&mut platform, &signals).unwrap();
    exec.post(&platform, &signals, &mut actors);

    exec.finish(&platform, &mut actors);
    exec.finish(&platform, &mut actors);
    assert!(actors.take_answered().is_empty());
    assert_eq!(platform.live(), 0);
}

#[test]
fn dropping_a_running_execution_releases_its_bindings() {
    let mut platform = FakePlatform::default();
    let signals = LifecycleSignals::new();
    let mut exec = ExecActivity::new(ActivityId::new(1), ExecutionMode::TIMED);
    exec.set_host(h(0)).unwrap().set_flops_amount(1.0).unwrap();
    exec.set_timeout(4.0, &mut platform).unwrap();
    exec.start(&mut platform, &signals).unwrap();
    assert_eq!(platform.live(), 2);

    drop(exec);
    assert_eq!(platform.live(), 0);
}

#[test]
fn caller_on_dead_host_is_killed_not_answered() {
    let mut platform = FakePlatform::default();
    let signals = LifecycleSignals::new();
    let mut actors = ActorTable::new();
    let actor = actors.spawn("stranded", h(7));

    let mut exec = ExecActivity::new(ActivityId::new(1), ExecutionMode::TIMED);
    exec.set_host(h(0)).unwrap().set_flops_amount(1.0).unwrap();
    exec.start(&mut platform, &signals).unwrap();
    exec.register_simcall(Simcall::new(actor, SimcallKind::ExecutionWait));

    platform.power_off(h(7));
    platform.complete(platform.work_of(exec.id()));
    exec.post(&platform, &signals, &mut actors);

    assert_eq!(exec.state(), ActivityState::Done);
    assert!(actors.take_answered().is_empty());
    assert!(actors.get(actor).unwrap().wants_to_die());
}

#[test]
#[should_panic(expected = "internal error in ExecActivity::finish")]
fn finishing_a_running_execution_with_callers_panics() {
    let mut platform = FakePlatform::default();
    let signals = LifecycleSignals::new();
    let mut actors = ActorTable::new();
    let actor = actors.spawn("eager", h(0));

    let mut exec = ExecActivity::new(ActivityId::new(1), ExecutionMode::TIMED);
    exec.set_host(h(0)).unwrap().set_flops_amount(1.0).unwrap();
    exec.start(&mut platform, &signals).unwrap();
    exec.register_simcall(Simcall::new(actor, SimcallKind::ExecutionWait));
    exec.finish(&platform, &mut actors);
}

#[test]
fn answered_result_matches_simcall_kind() {
    let wait = Simcall::new(ActorId::new(1), SimcallKind::ExecutionWait);
    let test = Simcall::new(ActorId::new(1), SimcallKind::ExecutionTest);
    assert_eq!(
        wait.result_for(ActivityState::Canceled),
        SimcallResult::ExecutionWait(ActivityState::Canceled)
    );
    assert_eq!(
        test.result_for(ActivityState::Canceled),
        SimcallResult::ExecutionTest(true)
    );
}

// ============================================================================
// Property-based tests
// ============================================================================

proptest! {
    #[test]
    fn workload_shape_validation(hosts in 0usize..5, flops in 0usize..5, bytes in 0usize..5) {
        let host_ids: Vec<HostId> = (0..hosts as u64).map(HostId::new).collect();
        let result = Workload::from_parts(
            ActivityId::new(1),
            &host_ids,
            &vec![1.0; flops],
            &vec![1.0; bytes],
        );
        let valid = match hosts {
            0 => false,
            1 => flops == 1,
            n => flops == n && bytes == n,
        };
        prop_assert_eq!(result.is_ok(), valid);
        if hosts == 0 {
            prop_assert_eq!(result, Err(ExecError::NoHost(ActivityId::new(1))));
        }
    }

    #[test]
    fn seq_remaining_ratio_is_bounded_and_monotonic(
        cost in 1.0f64..1e12,
        mut fractions in prop::collection::vec(0.0f64..=1.0, 1..20),
    ) {
        let (mut kernel, platform) = timed_kernel();
        let exec = kernel.exec_init(ExecRequest::sequential(h(0), cost)).unwrap();
        let binding = platform.work_of(exec);

        fractions.sort_by(|a, b| b.total_cmp(a));
        let mut previous = 1.0;
        for fraction in fractions {
            platform.set_remains(binding, cost * fraction);
            let ratio = kernel.execution(exec).unwrap().seq_remaining_ratio();
            prop_assert!((0.0..=1.0).contains(&ratio));
            prop_assert!(ratio <= previous + 1e-12);
            previous = ratio;
        }
    }

    #[test]
    fn par_remaining_ratio_is_bounded_and_monotonic(
        hosts in 2usize..5,
        mut fractions in prop::collection::vec(0.0f64..=1.0, 1..20),
    ) {
        let (mut kernel, platform) = timed_kernel();
        let host_ids: Vec<HostId> = (0..hosts as u64).map(HostId::new).collect();
        let exec = kernel
            .exec_init(ExecRequest::parallel(host_ids, vec![10.0; hosts], vec![1.0; hosts]))
            .unwrap();
        let binding = platform.work_of(exec);
        prop_assert_eq!(kernel.execution(exec).unwrap().par_remaining_ratio(), 1.0);

        fractions.sort_by(|a, b| b.total_cmp(a));
        let mut previous = 1.0;
        for fraction in fractions {
            platform.set_remains(binding, fraction);
            let ratio = kernel.execution(exec).unwrap().par_remaining_ratio();
            prop_assert!((0.0..=1.0).contains(&ratio));
            prop_assert!(ratio <= previous);
            previous = ratio;
        }

        platform.complete(binding);
        kernel.handle_state_changes();
        let e = kernel.execution(exec).unwrap();
        prop_assert!(e.binding().is_none());
        prop_assert_eq!(e.par_remaining_ratio(), 0.0);
    }

    #[test]
    fn every_binding_is_released_exactly_once(outcomes in prop::collection::vec(0u8..4, 1..12)) {
        let (mut kernel, platform) = timed_kernel();
        for (i, outcome) in outcomes.iter().enumerate() {
            let exec = kernel
                .exec_init(ExecRequest::sequential(h(i as u64 % 3), 10.0).with_timeout(5.0))
                .unwrap();
            match outcome {
                0 => platform.complete(platform.work_of(exec)),
                1 => platform.complete(platform.timer_of(exec)),
                2 => platform.fail(platform.work_of(exec)),
                _ => kernel.execution_migrate(exec, h(9)).unwrap(),
            }
        }
        kernel.handle_state_changes();
        for id in kernel.executions_in(ActivityState::Running) {
            platform.complete(platform.work_of(id));
        }
        kernel.handle_state_changes();

        prop_assert_eq!(platform.live(), 0);
        prop_assert!(kernel.executions_in(ActivityState::Running).is_empty());
    }
}
