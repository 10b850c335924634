//! Configuration for the board store
//!
//! Read from a TOML file, or from defaults plus the `KANBAN_ENV` mode flag.

use crate::error::{KanbanError, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Environment variable selecting development or production mode
pub const MODE_ENV_VAR: &str = "KANBAN_ENV";

/// Development mode reseeds the store with fixtures on every open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Development,
    #[default]
    Production,
}

impl FromStr for Mode {
    type Err = KanbanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Mode::Development),
            "production" | "prod" => Ok(Mode::Production),
            _ => Err(KanbanError::ConfigError(format!(
                "Invalid mode '{}'. Valid modes: development, production",
                s
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Where board documents are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// `boards.json` in the data directory
    #[default]
    File,
    /// `kanban.db` in the data directory; needs the `sqlite-storage` feature
    Sqlite,
    /// Nothing survives the process
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,

    /// Directory for the board table and the selection file
    pub data_dir: PathBuf,

    pub backend: Backend,

    /// Reject new columns whose name already exists on the board
    pub unique_column_names: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            data_dir: default_data_dir(),
            backend: Backend::default(),
            unique_column_names: false,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kanban")
}

impl Config {
    /// Load config from a TOML file, falling back to defaults when it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| KanbanError::ConfigError(format!("Invalid config: {}", e)))
    }

    /// Save config to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| KanbanError::ConfigError(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults with the mode taken from `KANBAN_ENV`
    pub fn from_env() -> Result<Self> {
        Self::default().with_mode_var(std::env::var(MODE_ENV_VAR).ok())
    }

    fn with_mode_var(mut self, value: Option<String>) -> Result<Self> {
        if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
            self.mode = value.parse()?;
        }
        Ok(self)
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn is_development(&self) -> bool {
        self.mode == Mode::Development
    }

    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("kanban.db")
    }

    pub fn selection_path(&self) -> PathBuf {
        self.data_dir.join(crate::selection::SELECTION_FILE)
    }
}
