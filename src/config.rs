//! Scan configuration

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{MsolapError, MsolapResult};

/// Default per-command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u32 = 60;

/// Default rows per output batch.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Scan configuration, usually read from `<config_dir>/msolap/config.toml`.
///
/// ```toml
/// timeout_seconds = 120
/// batch_size = 1024
///
/// [connections]
/// sales = "Server=localhost;Database=Sales;Integrated Security=SSPI"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Command timeout applied when a call does not pass one
    pub timeout_seconds: u32,

    /// Rows per output batch
    pub batch_size: usize,

    /// Named connection strings, referenced as `@name`
    pub connections: BTreeMap<String, String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            batch_size: DEFAULT_BATCH_SIZE,
            connections: BTreeMap::new(),
        }
    }
}

impl ScanConfig {
    /// Create a new configuration builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Default config file location, if the platform has a config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("msolap").join("config.toml"))
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> MsolapResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| MsolapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> MsolapResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                tracing::debug!("Loaded config from {}", path.display());
                Self::from_toml(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load from the default location.
    pub fn load_default() -> MsolapResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Reject zero timeouts and batch sizes.
    pub fn validate(&self) -> MsolapResult<()> {
        if self.timeout_seconds == 0 {
            return Err(MsolapError::Config(
                "timeout_seconds must be a positive integer".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MsolapError::Config(
                "batch_size must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand `@name` to a configured connection string; anything else is
    /// returned unchanged.
    pub fn resolve_connection<'a>(&'a self, input: &'a str) -> MsolapResult<&'a str> {
        match input.strip_prefix('@') {
            Some(name) => self
                .connections
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| MsolapError::Config(format!("Unknown connection '@{}'", name))),
            None => Ok(input),
        }
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Set the default command timeout
    pub fn timeout(mut self, seconds: u32) -> Self {
        self.config.timeout_seconds = seconds;
        self
    }

    /// Set the batch size
    pub fn batch_size(mut self, rows: usize) -> Self {
        self.config.batch_size = rows;
        self
    }

    /// Register a named connection
    pub fn connection(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.connections.insert(name.into(), value.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> ScanConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = ScanConfig::from_toml("").unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.timeout_seconds, 60);
    }

    #[test]
    fn test_parse_toml() {
        let config = ScanConfig::from_toml(
            r#"
            batch_size = 10

            [connections]
            sales = "Server=localhost;Database=Sales"
            "#,
        )
        .unwrap();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);
        assert_eq!(
            config.resolve_connection("@sales").unwrap(),
            "Server=localhost;Database=Sales"
        );
    }

    #[test]
    fn test_malformed_is_config_error() {
        assert!(matches!(
            ScanConfig::from_toml("batch_size = \"many\""),
            Err(MsolapError::Config(_))
        ));
        assert!(matches!(
            ScanConfig::from_toml("timeout_seconds = 0"),
            Err(MsolapError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = ScanConfig::load(Path::new("/nonexistent/msolap/config.toml")).unwrap();
        assert_eq!(config, ScanConfig::default());
    }

    #[test]
    fn test_resolve_connection() {
        let config = ScanConfig::builder()
            .connection("a", "Server=x")
            .timeout(5)
            .build();
        assert_eq!(config.resolve_connection("Server=y").unwrap(), "Server=y");
        assert_eq!(config.resolve_connection("@a").unwrap(), "Server=x");
        assert!(config.resolve_connection("@b").is_err());
        assert_eq!(config.timeout_seconds, 5);
    }
}
