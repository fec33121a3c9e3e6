//! Configuration management.

pub use crate::storage::hybrid::{HybridConfig, PrimaryBackend};

use crate::observability::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for docvault.
#[derive(Debug, Clone)]
pub struct DocvaultConfig {
    /// Path to the embedded backend's bare repository.
    pub embedded_repo_path: PathBuf,
    /// Path to the disk backend's worktree repository.
    pub disk_repo_path: PathBuf,
    /// Hybrid orchestrator settings.
    pub hybrid: HybridConfig,
    /// Log output format.
    pub log_format: LogFormat,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Storage section.
    pub storage: Option<ConfigFileStorage>,
    /// Logging section.
    pub logging: Option<ConfigFileLogging>,
}

/// Storage section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Embedded repository path.
    pub embedded_repo_path: Option<String>,
    /// Disk repository path.
    pub disk_repo_path: Option<String>,
    /// Primary backend name: "embedded" or "disk".
    pub primary: Option<String>,
    /// Whether fallback is enabled.
    pub fallback_enabled: Option<bool>,
    /// Per-operation timeout in milliseconds.
    pub operation_timeout_ms: Option<u64>,
    /// Whether replication and reconciliation run.
    pub sync_enabled: Option<bool>,
    /// Reconciliation interval in seconds.
    pub sync_interval_secs: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Output format: "pretty" or "json".
    pub format: Option<String>,
}

impl Default for DocvaultConfig {
    fn default() -> Self {
        let data_dir = directories::BaseDirs::new().map_or_else(
            || PathBuf::from(".docvault"),
            |dirs| dirs.data_local_dir().join("docvault"),
        );
        Self {
            embedded_repo_path: data_dir.join("embedded.git"),
            disk_repo_path: data_dir.join("vault"),
            hybrid: HybridConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl DocvaultConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: e.to_string(),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir first, then `~/.config/docvault/` for
    /// Unix compatibility. Returns default configuration if no config file
    /// is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs.config_dir().join("docvault").join("config.toml");
        if platform_config.exists() {
            if let Ok(config) = Self::load_from_file(&platform_config) {
                return config;
            }
        }

        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("docvault")
            .join("config.toml");
        if xdg_config.exists() {
            if let Ok(config) = Self::load_from_file(&xdg_config) {
                return config;
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `DocvaultConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(storage) = file.storage {
            if let Some(path) = storage.embedded_repo_path {
                config.embedded_repo_path = PathBuf::from(path);
            }
            if let Some(path) = storage.disk_repo_path {
                config.disk_repo_path = PathBuf::from(path);
            }
            if let Some(primary) = storage.primary {
                config.hybrid.primary = PrimaryBackend::parse(&primary);
            }
            if let Some(v) = storage.fallback_enabled {
                config.hybrid.fallback_enabled = v;
            }
            if let Some(ms) = storage.operation_timeout_ms {
                config.hybrid.operation_timeout = Duration::from_millis(ms);
            }
            if let Some(v) = storage.sync_enabled {
                config.hybrid.sync_enabled = v;
            }
            if let Some(secs) = storage.sync_interval_secs {
                config.hybrid.sync_interval = Duration::from_secs(secs);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(format) = logging.format {
                config.log_format = LogFormat::parse(&format);
            }
        }

        config
    }

    /// Sets the embedded repository path.
    #[must_use]
    pub fn with_embedded_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.embedded_repo_path = path.into();
        self
    }

    /// Sets the disk repository path.
    #[must_use]
    pub fn with_disk_repo_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_repo_path = path.into();
        self
    }

    /// Sets the hybrid orchestrator settings.
    #[must_use]
    pub fn with_hybrid(mut self, hybrid: HybridConfig) -> Self {
        self.hybrid = hybrid;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[storage]
embedded_repo_path = "/tmp/docs.git"
disk_repo_path = "/tmp/vault"
primary = "disk"
fallback_enabled = false
operation_timeout_ms = 2500
sync_enabled = true
sync_interval_secs = 30

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = DocvaultConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.embedded_repo_path, PathBuf::from("/tmp/docs.git"));
        assert_eq!(config.disk_repo_path, PathBuf::from("/tmp/vault"));
        assert_eq!(config.hybrid.primary, PrimaryBackend::Disk);
        assert!(!config.hybrid.fallback_enabled);
        assert_eq!(config.hybrid.operation_timeout, Duration::from_millis(2500));
        assert!(config.hybrid.sync_enabled);
        assert_eq!(config.hybrid.sync_interval, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[storage]\nprimary = \"embedded\"").unwrap();

        let config = DocvaultConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.hybrid.primary, PrimaryBackend::Embedded);
        assert!(config.hybrid.fallback_enabled);
        assert_eq!(config.hybrid.operation_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_toml_errors() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not valid toml [[[").unwrap();
        assert!(DocvaultConfig::load_from_file(file.path()).is_err());
    }
}
