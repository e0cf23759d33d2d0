//! Store connection configuration

use serde::Deserialize;
use std::path::PathBuf;

/// Path value that selects an in-memory database
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Connection parameters for [`crate::Database::connect`]
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Database file, or `:memory:`
    #[serde(default = "default_path")]
    pub path: String,
    /// Pool size for file-backed stores (in-memory stores always use one)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    /// Explicit migrations directory; embedded migrations are used when unset
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Configuration for a file-backed store with defaults
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Configuration for an in-memory store
    #[must_use]
    pub fn in_memory() -> Self {
        Self::file(IN_MEMORY_PATH)
    }

    /// True when the path selects an in-memory database
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            migrations_dir: None,
        }
    }
}

fn default_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("fabula").join("fabula.db"))
        .unwrap_or_else(|| PathBuf::from("fabula.db"))
        .display()
        .to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    5
}
