use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::ConnectionConfig;
use crate::error::{Result, ShimError};

/// Which backend a [`crate::db::Database`] connects to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Sqlite,
    Postgresql,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SqliteConfig {
    pub path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sqlshim.db"),
        }
    }
}

/// Contents of `config.toml`:
///
/// ```toml
/// driver = "postgresql"
///
/// [postgresql]
/// host = "db.internal"
/// database = "review"
/// username = "review"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: Driver,
    pub sqlite: SqliteConfig,
    pub postgresql: ConnectionConfig,
}

impl DatabaseConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sqlshim")
            .join("config.toml")
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| ShimError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ShimError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
