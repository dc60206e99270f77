//! Configuration for keend.

use std::path::PathBuf;

use keen_coordinator::KeenConfig;
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Coordinator behaviour, read from the top-level `queue`,
    /// `ready_check`, `cooldown`, `deferred` and `idle` tables
    #[serde(flatten)]
    pub keen: KeenConfig,

    /// Where the violation ledger lives
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Participant ids allowed to clear the violation ledger
    #[serde(default)]
    pub admins: Vec<u64>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Nothing survives a restart
    Memory,

    /// JSON file, rewritten after every change
    File {
        #[serde(default = "default_ledger_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            path: default_ledger_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("violations.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration: defaults, then `path` if given, then `KEEN__`
    /// environment variables (`KEEN__QUEUE__CAPACITY=8` sets `queue.capacity`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KEEN")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Whether `id` may perform privileged operations.
    pub fn is_admin(&self, id: u64) -> bool {
        self.admins.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.keen.queue.capacity, 5);
        assert!(matches!(
            config.storage,
            StorageConfig::File { ref path } if path == &PathBuf::from("violations.json")
        ));
        assert_eq!(config.logging.level, "info");
        assert!(config.admins.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
admins = [7]

[queue]
capacity = 8

[storage]
type = "memory"
"#
        )
        .unwrap();

        let config = DaemonConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.keen.queue.capacity, 8);
        assert_eq!(config.keen.ready_check.confirmation_window_secs, 600);
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(config.is_admin(7));
        assert!(!config.is_admin(8));
    }

    #[test]
    fn test_environment_overrides_coordinator_settings() {
        std::env::set_var("KEEN__DEFERRED__MAX_DELAY_SECS", "7200");
        let config = DaemonConfig::load(None);
        std::env::remove_var("KEEN__DEFERRED__MAX_DELAY_SECS");

        let config = config.unwrap();
        assert_eq!(config.keen.deferred.max_delay_secs, 7200);
        assert_eq!(config.keen.deferred.confirmation_window_secs, 300);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DaemonConfig::load(Some("/nonexistent/keend")).unwrap();
        assert_eq!(config.keen.idle.idle_threshold_secs, 3600);
    }
}
