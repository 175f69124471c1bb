//! Layered configuration loading.
//!
//! Layers are merged in increasing precedence: built-in defaults, the user
//! file, the project file, the local file, then `GRIDSIM_*` environment
//! variables. Nested keys use a double underscore in the environment, e.g.
//! `GRIDSIM_SIMULATION__SEED=9` or `GRIDSIM_LOGGING__FILTER=debug`.

use crate::{GridsimConfig, Paths};
use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};

/// Builder for a layered [`GridsimConfig`].
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "GRIDSIM".to_string(),
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Ignores the user file, so runs only depend on the project.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Files to merge, lowest precedence first. Missing files are skipped.
    fn files(&self) -> Vec<PathBuf> {
        let mut files = Vec::with_capacity(3);
        if self.user_config {
            if let Ok(user) = Paths::new().user_config_file() {
                files.push(user);
            }
        }
        files.push(Paths::project_config_file(&self.project_dir));
        files.push(Paths::local_config_file(&self.project_dir));
        files.retain(|path| path.exists());
        files
    }

    pub fn load(self) -> Result<GridsimConfig> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&GridsimConfig::default()).context("encoding defaults")?);

        for path in self.files() {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: GridsimConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .context("loading gridsim configuration")?;
        loaded.resolve_paths(&self.project_dir);
        loaded.validate().context("invalid gridsim configuration")?;
        Ok(loaded)
    }

    /// Like [`ConfigLoader::load`], falling back to the defaults on error.
    pub fn load_or_default(self) -> GridsimConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
