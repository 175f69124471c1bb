//! Configuration management for gridsim
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (GRIDSIM_* prefix, highest precedence)
//! 2. gridsim.local.toml (gitignored, local overrides)
//! 3. gridsim.toml (git-tracked, project config)
//! 4. ~/.config/gridsim/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_FILE, PROJECT_FILE, Paths};

/// Main gridsim configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridsimConfig {
    pub simulation: SimulationConfig,
    pub platform: PlatformConfig,
    pub faults: FaultConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed for every random decision of the run.
    pub seed: u64,
    /// Simulated seconds after which the driver stops.
    pub max_time: f64,
    pub mode: SimulationMode,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_time: 1.0e6,
            mode: SimulationMode::Timed,
        }
    }
}

/// Which driver runs the kernel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SimulationMode {
    Timed,
    Exploration,
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub hosts: Vec<HostConfig>,
    /// Bytes per second each host can exchange within a parallel task.
    pub bandwidth: f64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            hosts: vec![HostConfig {
                name: "host-0".to_string(),
                speed: 1.0e9,
            }],
            bandwidth: 1.25e8,
        }
    }
}

/// Host definition from config
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    pub name: String,
    /// Processor speed in flops per second.
    pub speed: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    /// Probability that a host goes down at each check.
    pub host_failure_probability: f64,
    /// Seconds between two fault checks.
    pub check_interval: f64,
    /// Seconds a failed host stays down.
    pub downtime: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            host_failure_probability: 0.0,
            check_interval: 1.0,
            downtime: 10.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Where to write the lifecycle trace, if anywhere.
    pub trace_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gridsim=info".to_string(),
            trace_file: None,
        }
    }
}

impl GridsimConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Read a single TOML file, without layering.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration for state-space exploration
    pub fn exploration() -> Self {
        Self {
            simulation: SimulationConfig {
                mode: SimulationMode::Exploration,
                ..Default::default()
            },
            faults: FaultConfig {
                host_failure_probability: 0.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create a configuration with random host failures enabled
    pub fn chaos(host_failure_probability: f64) -> Self {
        Self {
            faults: FaultConfig {
                host_failure_probability,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Check value ranges the loader cannot express through types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let hosts = &self.platform.hosts;
        if hosts.is_empty() {
            return Err(ConfigError::NoHosts);
        }
        for (i, host) in hosts.iter().enumerate() {
            if !(host.speed > 0.0 && host.speed.is_finite()) {
                return Err(ConfigError::InvalidSpeed {
                    host: host.name.clone(),
                    speed: host.speed,
                });
            }
            if hosts[..i].iter().any(|h| h.name == host.name) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }
        }

        positive("platform.bandwidth", self.platform.bandwidth)?;
        positive("simulation.max_time", self.simulation.max_time)?;
        positive("faults.check_interval", self.faults.check_interval)?;
        positive("faults.downtime", self.faults.downtime)?;

        let probability = self.faults.host_failure_probability;
        if !(0.0..=1.0).contains(&probability) {
            return Err(ConfigError::OutOfRange {
                field: "faults.host_failure_probability",
                value: probability,
                expected: "between 0 and 1",
            });
        }
        Ok(())
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();

        if let Some(trace_file) = &self.logging.trace_file {
            if trace_file.is_relative() {
                self.logging.trace_file = Some(base.join(trace_file));
            }
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected: "positive",
        })
    }
}
