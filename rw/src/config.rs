//! RelWatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main RelWatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Checker scheduling and concurrency
    pub checker: CheckerConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if self.checker.pool_size == 0 {
            return Err(eyre::eyre!("checker pool-size must be at least 1"));
        }
        if self.checker.error_threshold == 0 {
            return Err(eyre::eyre!("checker error-threshold must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .relwatch.yml
        let local_config = PathBuf::from(".relwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/relwatch/relwatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("relwatch").join("relwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Checker scheduling and concurrency limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Worker pool size for concurrent project checks
    #[serde(rename = "pool-size")]
    pub pool_size: usize,

    /// Delay between successive runs in seconds
    #[serde(rename = "run-interval-seconds")]
    pub run_interval_seconds: u64,

    /// Upper bound on a single run in seconds; checks still outstanding when
    /// it elapses are counted as errors
    #[serde(rename = "run-timeout-seconds")]
    pub run_timeout_seconds: u64,

    /// Consecutive-failure count that makes a project delete-eligible
    #[serde(rename = "error-threshold")]
    pub error_threshold: u32,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            run_interval_seconds: 300,
            run_timeout_seconds: 3600,
            error_threshold: 100,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database
    #[serde(rename = "database-path")]
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/relwatch on Linux)
        let database_path = dirs::data_dir()
            .map(|dir| dir.join("relwatch"))
            .unwrap_or_else(|| PathBuf::from(".relwatch"))
            .join("relwatch.db");

        Self { database_path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.checker.pool_size, 10);
        assert_eq!(config.checker.run_interval_seconds, 300);
        assert_eq!(config.checker.run_timeout_seconds, 3600);
        assert_eq!(config.checker.error_threshold, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
checker:
  pool-size: 25
  run-interval-seconds: 60
  run-timeout-seconds: 600
  error-threshold: 50

storage:
  database-path: /var/lib/relwatch/relwatch.db
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.checker.pool_size, 25);
        assert_eq!(config.checker.run_interval_seconds, 60);
        assert_eq!(config.checker.run_timeout_seconds, 600);
        assert_eq!(config.checker.error_threshold, 50);
        assert_eq!(
            config.storage.database_path,
            PathBuf::from("/var/lib/relwatch/relwatch.db")
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
checker:
  pool-size: 4
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        // Specified value
        assert_eq!(config.checker.pool_size, 4);

        // Defaults for unspecified
        assert_eq!(config.checker.run_interval_seconds, 300);
        assert_eq!(config.checker.error_threshold, 100);
    }

    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut config = Config::default();
        config.checker.pool_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let mut config = Config::default();
        config.checker.error_threshold = 0;
        assert!(config.validate().is_err());
    }
}
