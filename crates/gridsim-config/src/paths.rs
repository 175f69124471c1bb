//! Where configuration files live.
//!
//! | layer   | file                                   |
//! |---------|----------------------------------------|
//! | user    | `$XDG_CONFIG_HOME/gridsim/config.toml` |
//! | project | `<project>/gridsim.toml`               |
//! | local   | `<project>/gridsim.local.toml`         |

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Project file, checked into version control.
pub const PROJECT_FILE: &str = "gridsim.toml";

/// Per-checkout overrides, kept out of version control.
pub const LOCAL_FILE: &str = "gridsim.local.toml";

/// XDG locations for gridsim.
#[derive(Debug, Clone)]
pub struct Paths {
    dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            dirs: ProjectDirs::from("io", "Gridsim", "gridsim"),
        }
    }

    /// `config.toml` in the user's configuration directory.
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        let dirs = self.dirs.as_ref().ok_or(ConfigError::NoUserDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn project_config_file(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_FILE)
    }

    pub fn local_config_file(project_dir: &Path) -> PathBuf {
        project_dir.join(LOCAL_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
