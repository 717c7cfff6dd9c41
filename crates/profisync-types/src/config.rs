//! Global configuration types for Profisync.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls run
//! budgets and storage. All fields have sensible defaults; an absent file is
//! equivalent to `GlobalConfig::default()`.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the Profisync engine and front door.
///
/// Loaded from `~/.profisync/config.toml` (directory overridable via
/// `PROFISYNC_DATA_DIR`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default wall-clock budget per workflow run, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    /// SQLite database URL; defaults to `sqlite://<data_dir>/profisync.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Capacity of the engine event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            database_url: None,
            event_capacity: default_event_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.event_capacity, 1024);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.event_capacity, 1024);
    }

    #[test]
    fn test_deserialize_with_values() {
        let toml_str = r#"
default_timeout_secs = 60
database_url = "sqlite:///tmp/test.db"
event_capacity = 64
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_timeout_secs, 60);
        assert_eq!(config.database_url.as_deref(), Some("sqlite:///tmp/test.db"));
        assert_eq!(config.event_capacity, 64);
    }
}
