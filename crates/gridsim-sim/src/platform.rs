//! Reference platform: hosts with a processor, and the resource model that
//! turns bindings into progress over simulated time.
//!
//! The model is deliberately small:
//!
//! - **Computations** on a host share its speed in proportion to their
//!   priority (max-min fairness with weights). A bound caps an action's
//!   rate and hands the surplus back to the others.
//! - **Parallel tasks** progress as a fraction. A task finishes when its
//!   slowest host would, given `flops[i] / speed[i] + bytes[i] / bandwidth`.
//!   They do not compete with computations for the processor.
//! - **Sleeps** progress at one unit per simulated second.
//!
//! Powering a host off fails every action that uses it. Bindings are owned
//! by the kernel; the model keeps the action state behind a shared cell so
//! both sides observe the same values.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use gridsim_config::PlatformConfig;
use gridsim_kernel::{BindingHandle, BindingState, Platform, ResourceBinding};
use gridsim_types::{ActivityId, HostId};

/// Remaining amounts at or below this fraction of the cost count as done.
const PRECISION: f64 = 1e-9;

/// Identifier of an action inside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActionId(u64);

#[derive(Debug, Clone)]
pub struct Host {
    pub name: String,
    /// Flops per second.
    pub speed: f64,
    pub on: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum ActionKind {
    Compute {
        host: HostId,
    },
    Parallel {
        hosts: Vec<HostId>,
        /// Seconds needed when running alone.
        duration: f64,
        /// Flops per second cap for the whole task; `<= 0` means none.
        rate: f64,
        total_flops: f64,
    },
    Sleep {
        host: HostId,
    },
}

impl ActionKind {
    fn uses(&self, host: HostId) -> bool {
        match self {
            ActionKind::Compute { host: h } | ActionKind::Sleep { host: h } => *h == host,
            ActionKind::Parallel { hosts, .. } => hosts.contains(&host),
        }
    }
}

#[derive(Debug, Clone)]
struct Action {
    kind: ActionKind,
    cost: f64,
    remains: f64,
    priority: f64,
    bound: f64,
    category: Option<String>,
    state: BindingState,
    activity: Option<ActivityId>,
}

/// Counters of binding traffic, for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BindingStats {
    pub allocated: u64,
    pub released: u64,
}

impl BindingStats {
    /// Bindings handed out and not given back yet.
    pub fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

#[derive(Debug)]
struct Model {
    hosts: Vec<Host>,
    bandwidth: f64,
    actions: BTreeMap<ActionId, Action>,
    next_action: u64,
    changes: Vec<ActivityId>,
    stats: BindingStats,
}

impl Model {
    fn host(&self, host: HostId) -> Option<&Host> {
        self.hosts.get(host.index())
    }

    fn is_on(&self, host: HostId) -> bool {
        self.host(host).is_some_and(|h| h.on)
    }

    fn action(&mut self, id: ActionId) -> &mut Action {
        match self.actions.get_mut(&id) {
            Some(action) => action,
            None => panic!("action {id:?} used after release"),
        }
    }

    fn allocate(&mut self, kind: ActionKind, cost: f64, alive: bool) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action += 1;
        self.stats.allocated += 1;
        self.actions.insert(
            id,
            Action {
                kind,
                cost,
                remains: cost,
                priority: 1.0,
                bound: 0.0,
                category: None,
                state: if alive {
                    BindingState::Running
                } else {
                    BindingState::Failed
                },
                activity: None,
            },
        );
        id
    }

    fn set_state(&mut self, id: ActionId, state: BindingState) {
        let action = self.action(id);
        if action.state == state {
            return;
        }
        action.state = state;
        if let Some(activity) = action.activity {
            self.changes.push(activity);
        }
    }

    /// Current progress rate of every running action, in cost units per
    /// second.
    fn rates(&self) -> BTreeMap<ActionId, f64> {
        let mut rates = BTreeMap::new();
        let mut per_host: BTreeMap<HostId, Vec<(ActionId, f64, f64)>> = BTreeMap::new();

        for (id, action) in &self.actions {
            if action.state != BindingState::Running {
                continue;
            }
            match &action.kind {
                ActionKind::Compute { host } => per_host.entry(*host).or_default().push((
                    *id,
                    action.priority,
                    action.bound,
                )),
                ActionKind::Parallel {
                    duration,
                    rate,
                    total_flops,
                    ..
                } => {
                    let mut progress = if *duration > 0.0 {
                        1.0 / duration
                    } else {
                        f64::INFINITY
                    };
                    if *rate > 0.0 && *total_flops > 0.0 {
                        progress = progress.min(rate / total_flops);
                    }
                    rates.insert(*id, progress);
                }
                ActionKind::Sleep { .. } => {
                    rates.insert(*id, 1.0);
                }
            }
        }

        for (host, demands) in per_host {
            let capacity = self.host(host).map_or(0.0, |h| h.speed);
            rates.extend(share(capacity, demands));
        }
        rates
    }
}

/// Weighted max-min sharing of `capacity` between `(id, weight, bound)`
/// demands. A bound of zero means unbounded.
fn share(capacity: f64, mut demands: Vec<(ActionId, f64, f64)>) -> Vec<(ActionId, f64)> {
    let mut granted = Vec::with_capacity(demands.len());
    let mut remaining = capacity;
    demands.retain(|&(id, weight, _)| {
        if weight > 0.0 {
            true
        } else {
            granted.push((id, 0.0));
            false
        }
    });

    loop {
        let total_weight: f64 = demands.iter().map(|&(_, w, _)| w).sum();
        if demands.is_empty() || total_weight <= 0.0 {
            break;
        }
        let per_weight = remaining / total_weight;
        let (capped, free): (Vec<_>, Vec<_>) = demands
            .iter()
            .partition(|&&(_, w, bound)| bound > 0.0 && bound < per_weight * w);
        if capped.is_empty() {
            granted.extend(free.into_iter().map(|&(id, w, _)| (id, per_weight * w)));
            break;
        }
        for &(id, _, bound) in &capped {
            granted.push((*id, *bound));
            remaining -= bound;
        }
        demands = free.into_iter().copied().collect();
    }
    granted
}

/// Handle to one action of a [`SimPlatform`].
#[derive(Debug)]
pub struct SimBinding {
    id: ActionId,
    model: Rc<RefCell<Model>>,
}

impl SimBinding {
    fn with<R>(&self, f: impl FnOnce(&mut Action) -> R) -> R {
        f(self.model.borrow_mut().action(self.id))
    }
}

impl ResourceBinding for SimBinding {
    fn cost(&self) -> f64 {
        self.with(|a| a.cost)
    }

    fn remains(&self) -> f64 {
        self.with(|a| match a.kind {
            // Coupled tasks report the fraction left.
            ActionKind::Parallel { .. } => a.remains / a.cost,
            _ => a.remains,
        })
    }

    fn set_remains(&mut self, remains: f64) {
        self.with(|a| a.remains = remains.clamp(0.0, a.cost));
    }

    fn priority(&self) -> f64 {
        self.with(|a| a.priority)
    }

    fn set_priority(&mut self, priority: f64) {
        self.with(|a| a.priority = priority);
    }

    fn set_bound(&mut self, bound: f64) {
        self.with(|a| a.bound = bound);
    }

    fn set_category(&mut self, category: &str) {
        self.with(|a| a.category = Some(category.to_string()));
    }

    fn state(&self) -> BindingState {
        self.with(|a| a.state)
    }

    fn cancel(&mut self) {
        let mut model = self.model.borrow_mut();
        if model.action(self.id).state == BindingState::Running {
            model.set_state(self.id, BindingState::Failed);
        }
    }

    fn associate_activity(&mut self, activity: Option<ActivityId>) {
        let mut model = self.model.borrow_mut();
        let action = model.action(self.id);
        action.activity = activity;
        // Report bindings that ended before anyone was listening.
        if let (Some(activity), false) = (activity, action.state == BindingState::Running) {
            model.changes.push(activity);
        }
    }

    fn release(self: Box<Self>) {
        let mut model = self.model.borrow_mut();
        if model.actions.remove(&self.id).is_some() {
            model.stats.released += 1;
        }
    }
}

/// The reference platform. Cloning yields another handle to the same
/// platform.
#[derive(Debug, Clone)]
pub struct SimPlatform {
    model: Rc<RefCell<Model>>,
}

impl SimPlatform {
    /// Creates a platform from `(name, speed)` pairs. Host ids follow the
    /// order of the list.
    pub fn new(hosts: impl IntoIterator<Item = (String, f64)>, bandwidth: f64) -> Self {
        let hosts = hosts
            .into_iter()
            .map(|(name, speed)| Host {
                name,
                speed,
                on: true,
            })
            .collect();
        Self {
            model: Rc::new(RefCell::new(Model {
                hosts,
                bandwidth,
                actions: BTreeMap::new(),
                next_action: 0,
                changes: Vec::new(),
                stats: BindingStats::default(),
            })),
        }
    }

    pub fn from_config(config: &PlatformConfig) -> Self {
        Self::new(
            config.hosts.iter().map(|h| (h.name.clone(), h.speed)),
            config.bandwidth,
        )
    }

    pub fn host_count(&self) -> usize {
        self.model.borrow().hosts.len()
    }

    pub fn host(&self, host: HostId) -> Option<Host> {
        self.model.borrow().host(host).cloned()
    }

    pub fn host_by_name(&self, name: &str) -> Option<HostId> {
        self.model
            .borrow()
            .hosts
            .iter()
            .position(|h| h.name == name)
            .map(|i| HostId::new(i as u64))
    }

    /// Ids of the hosts currently powered on.
    pub fn hosts_on(&self) -> Vec<HostId> {
        self.model
            .borrow()
            .hosts
            .iter()
            .enumerate()
            .filter(|(_, h)| h.on)
            .map(|(i, _)| HostId::new(i as u64))
            .collect()
    }

    pub fn stats(&self) -> BindingStats {
        self.model.borrow().stats
    }

    /// Returns true if state changes are waiting for the kernel.
    pub fn has_pending_changes(&self) -> bool {
        !self.model.borrow().changes.is_empty()
    }

    /// Number of actions still held by the model.
    pub fn action_count(&self) -> usize {
        self.model.borrow().actions.len()
    }

    /// Powers a host off, failing every action that uses it. Returns false
    /// if it was already off.
    pub fn turn_off(&mut self, host: HostId) -> bool {
        let mut model = self.model.borrow_mut();
        match model.hosts.get_mut(host.index()) {
            Some(h) if h.on => h.on = false,
            _ => return false,
        }
        let hit: Vec<ActionId> = model
            .actions
            .iter()
            .filter(|(_, a)| a.state == BindingState::Running && a.kind.uses(host))
            .map(|(id, _)| *id)
            .collect();
        for id in hit {
            model.set_state(id, BindingState::Failed);
        }
        tracing::info!(host = %host, "host turned off");
        true
    }

    /// Powers a host back on. Actions that failed stay failed.
    pub fn turn_on(&mut self, host: HostId) -> bool {
        let mut model = self.model.borrow_mut();
        match model.hosts.get_mut(host.index()) {
            Some(h) if !h.on => h.on = true,
            _ => return false,
        }
        tracing::info!(host = %host, "host turned on");
        true
    }

    /// Cancels the work bindings associated with `activity`, leaving its
    /// timer alone. Returns how many were canceled.
    pub fn cancel_activity(&mut self, activity: ActivityId) -> usize {
        let mut model = self.model.borrow_mut();
        let targets: Vec<ActionId> = model
            .actions
            .iter()
            .filter(|(_, a)| {
                a.activity == Some(activity)
                    && a.state == BindingState::Running
                    && !matches!(a.kind, ActionKind::Sleep { .. })
            })
            .map(|(id, _)| *id)
            .collect();
        for id in &targets {
            model.set_state(*id, BindingState::Failed);
        }
        targets.len()
    }

    /// Seconds until the next running action completes, if any will.
    pub fn next_completion(&self) -> Option<f64> {
        let model = self.model.borrow();
        let rates = model.rates();
        model
            .actions
            .iter()
            .filter(|(_, a)| a.state == BindingState::Running)
            .filter_map(|(id, a)| {
                let rate = rates.get(id).copied().unwrap_or(0.0);
                if a.remains <= PRECISION * a.cost.max(1.0) || rate.is_infinite() {
                    Some(0.0)
                } else if rate > 0.0 {
                    Some(a.remains / rate)
                } else {
                    None
                }
            })
            .min_by(f64::total_cmp)
    }

    /// Lets `delta` seconds of progress happen. Actions reaching the end of
    /// their work switch to [`BindingState::Finished`] and are reported.
    pub fn advance(&mut self, delta: f64) {
        debug_assert!(delta >= 0.0, "cannot advance by {delta}");
        let mut model = self.model.borrow_mut();
        let rates = model.rates();
        let mut finished = Vec::new();
        for (id, action) in &mut model.actions {
            let Some(&rate) = rates.get(id) else {
                continue;
            };
            action.remains = if rate.is_infinite() {
                0.0
            } else {
                (action.remains - rate * delta).max(0.0)
            };
            if action.remains <= PRECISION * action.cost.max(1.0) {
                action.remains = 0.0;
                finished.push(*id);
            }
        }
        for id in finished {
            model.set_state(id, BindingState::Finished);
        }
    }

    /// Category a binding was tagged with, for instrumentation.
    pub fn category_of(&self, activity: ActivityId) -> Option<String> {
        self.model
            .borrow()
            .actions
            .values()
            .find(|a| a.activity == Some(activity) && a.category.is_some())
            .and_then(|a| a.category.clone())
    }

    fn binding(&self, id: ActionId) -> BindingHandle {
        Box::new(SimBinding {
            id,
            model: Rc::clone(&self.model),
        })
    }
}

impl Platform for SimPlatform {
    fn is_on(&self, host: HostId) -> bool {
        self.model.borrow().is_on(host)
    }

    fn execution_start(&mut self, host: HostId, flops: f64) -> BindingHandle {
        let mut model = self.model.borrow_mut();
        let alive = model.is_on(host);
        let id = model.allocate(ActionKind::Compute { host }, flops, alive);
        drop(model);
        tracing::trace!(host = %host, flops, "computation started");
        self.binding(id)
    }

    fn execute_parallel(
        &mut self,
        hosts: &[HostId],
        flops: &[f64],
        bytes: &[f64],
        rate: f64,
    ) -> BindingHandle {
        let mut model = self.model.borrow_mut();
        let bandwidth = model.bandwidth;
        let mut duration: f64 = 0.0;
        for (i, host) in hosts.iter().enumerate() {
            let speed = model.host(*host).map_or(0.0, |h| h.speed);
            let compute = match flops.get(i) {
                Some(f) if *f > 0.0 => f / speed,
                _ => 0.0,
            };
            let comm = bytes.get(i).map_or(0.0, |b| b / bandwidth);
            duration = duration.max(compute + comm);
        }
        let alive = hosts.iter().all(|h| model.is_on(*h));
        let id = model.allocate(
            ActionKind::Parallel {
                hosts: hosts.to_vec(),
                duration,
                rate,
                total_flops: flops.iter().sum(),
            },
            1.0,
            alive,
        );
        drop(model);
        tracing::trace!(hosts = hosts.len(), duration, "parallel task started");
        self.binding(id)
    }

    fn sleep(&mut self, host: HostId, duration: f64) -> BindingHandle {
        let mut model = self.model.borrow_mut();
        let alive = model.is_on(host);
        let id = model.allocate(ActionKind::Sleep { host }, duration, alive);
        drop(model);
        self.binding(id)
    }

    fn take_state_changes(&mut self) -> Vec<ActivityId> {
        std::mem::take(&mut self.model.borrow_mut().changes)
    }
}
