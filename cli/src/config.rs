//! User configuration at `~/.quire/config.toml`.
//!
//! ```toml
//! [session]
//! debounce_ms = 200
//! watchdog_interval_secs = 60
//!
//! [log]
//! level = "debug"
//! stderr = false
//! ```

use std::path::{Path, PathBuf};

use quire_lsp::SessionConfig;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: Option<String>,
    /// Log to stderr instead of the log file.
    #[serde(default)]
    pub stderr: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuireConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl QuireConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".quire").join("config.toml"))
}
