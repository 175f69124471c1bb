//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("platform.hosts must list at least one host")]
    NoHosts,

    #[error("host {0:?} is declared twice")]
    DuplicateHost(String),

    #[error("host {host:?} has invalid speed {speed}")]
    InvalidSpeed { host: String, speed: f64 },

    #[error("{field} = {value} is out of range ({expected})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        expected: &'static str,
    },

    #[error("no home directory to look for the user configuration")]
    NoUserDir,
}
