//! Errors of the simulation driver.

use gridsim_config::ConfigError;
use gridsim_kernel::KernelError;
use gridsim_types::ActorId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown host {0:?}")]
    UnknownHost(String),

    /// The actor was killed before it got an answer.
    #[error("actor {0} terminated before being answered")]
    ActorTerminated(ActorId),

    /// Nothing left to simulate and the actor is still blocked.
    #[error("simulation stalled while actor {0} is blocked")]
    Stalled(ActorId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}
