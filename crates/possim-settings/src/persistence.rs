//! Settings Persistence
//!
//! Locates the configuration file and keeps the loaded [`Config`] with
//! the path it came from.

use crate::config::Config;
use crate::error::{SettingsError, SettingsResult};
use std::path::{Path, PathBuf};

/// Directory name under the platform config directory
const APP_DIR: &str = "possim";
/// File name of the default configuration
const CONFIG_FILE: &str = "config.toml";

/// Configuration bound to its file
#[derive(Debug, Clone)]
pub struct SettingsPersistence {
    path: PathBuf,
    config: Config,
}

impl SettingsPersistence {
    /// Platform config directory for possim
    pub fn config_dir() -> SettingsResult<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| {
                SettingsError::ConfigDirectory("no configuration directory on this platform".into())
            })
    }

    /// Default configuration file
    pub fn default_path() -> SettingsResult<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load `path`, or an empty config when the file does not exist
    pub fn load_or_default(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            Config::load_from_file(&path)?
        } else {
            tracing::info!("No configuration at {}, starting empty", path.display());
            Config::default()
        };
        Ok(Self { path, config })
    }

    /// Load the file at `path`, which must exist
    pub fn load_from_file(path: impl Into<PathBuf>) -> SettingsResult<Self> {
        let path = path.into();
        let config = Config::load_from_file(&path)?;
        Ok(Self { path, config })
    }

    /// Save to the bound path, creating its directory
    pub fn save(&self) -> SettingsResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        self.config.save_to_file(&self.path)
    }

    /// Path the configuration is bound to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get reference to config
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable reference to config
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }
}
