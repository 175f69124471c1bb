//! Random host failures.
//!
//! At every check, each powered-on host goes down with the configured
//! probability and comes back after the configured downtime. Decisions
//! draw from a forked [`SimRng`], so a seed fully determines which hosts
//! fail and when.

use gridsim_config::FaultConfig;
use gridsim_types::HostId;

use crate::rng::SimRng;

/// Counters of injected faults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub checks: u64,
    pub host_failures: u64,
}

/// Decides which hosts fail at each fault check.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    rng: SimRng,
    probability: f64,
    check_interval: f64,
    downtime: f64,
    stats: FaultStats,
}

impl FaultInjector {
    pub fn new(config: &FaultConfig, rng: SimRng) -> Self {
        Self {
            rng,
            probability: config.host_failure_probability,
            check_interval: config.check_interval,
            downtime: config.downtime,
            stats: FaultStats::default(),
        }
    }

    /// Returns true if checks can ever fail a host.
    pub fn is_enabled(&self) -> bool {
        self.probability > 0.0
    }

    pub fn check_interval(&self) -> f64 {
        self.check_interval
    }

    pub fn downtime(&self) -> f64 {
        self.downtime
    }

    pub fn stats(&self) -> FaultStats {
        self.stats
    }

    /// Picks the hosts to power off among `hosts_on`.
    ///
    /// One draw is made per host, in the given order.
    pub fn check(&mut self, hosts_on: &[HostId]) -> Vec<HostId> {
        self.stats.checks += 1;
        let failed: Vec<HostId> = hosts_on
            .iter()
            .copied()
            .filter(|_| self.rng.next_bool_with_probability(self.probability))
            .collect();
        self.stats.host_failures += failed.len() as u64;
        failed
    }
}
