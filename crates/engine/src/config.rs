//! Counts store configuration via `counts.toml`
//!
//! Settings can be loaded from a TOML file or built in code:
//!
//! ```ignore
//! let config = CountsConfig::new("/data/counts")
//!     .with_rotation_timeout(Duration::from_secs(30))
//!     .with_page_cache_pages(1024);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Config file name conventionally placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "counts.toml";

/// Default rotation wait: 10 minutes
pub const DEFAULT_ROTATION_TIMEOUT_MS: u64 = 600_000;

/// Default page cache size in pages (128 entries each)
pub const DEFAULT_PAGE_CACHE_PAGES: usize = 256;

/// Default snapshot file name prefix
pub const DEFAULT_FILE_PREFIX: &str = "counts";

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Rotation timeout must be non-zero
    #[error("rotation_timeout_ms must be greater than zero")]
    ZeroRotationTimeout,

    /// Page cache must hold at least one page
    #[error("page_cache_pages must be greater than zero")]
    ZeroPageCache,

    /// Prefix empty or not usable in a file name
    #[error("invalid file_prefix '{0}': must be non-empty ASCII alphanumerics, '-' or '_'")]
    InvalidPrefix(String),

    /// Config file could not be read
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file could not be parsed
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<ConfigError> for countsdb_core::Error {
    fn from(e: ConfigError) -> Self {
        countsdb_core::Error::Config(e.to_string())
    }
}

/// Counts store configuration loaded from `counts.toml`.
///
/// # Example
///
/// ```toml
/// directory = "/data/counts"
/// # Maximum time a rotation waits for its target transaction (default: 10 min)
/// rotation_timeout_ms = 600000
/// # Page cache size, 128 entries per page (default: 256)
/// page_cache_pages = 256
/// # fsync snapshot file and directory on publish (default: true)
/// sync_on_rotate = true
/// file_prefix = "counts"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountsConfig {
    /// Directory holding the snapshot files
    #[serde(default)]
    pub directory: PathBuf,
    /// Maximum time `rotate` waits for its target transaction
    #[serde(default = "default_rotation_timeout_ms")]
    pub rotation_timeout_ms: u64,
    /// Page cache capacity in pages
    #[serde(default = "default_page_cache_pages")]
    pub page_cache_pages: usize,
    /// fsync on publish
    #[serde(default = "default_sync_on_rotate")]
    pub sync_on_rotate: bool,
    /// Snapshot file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

fn default_rotation_timeout_ms() -> u64 {
    DEFAULT_ROTATION_TIMEOUT_MS
}

fn default_page_cache_pages() -> usize {
    DEFAULT_PAGE_CACHE_PAGES
}

fn default_sync_on_rotate() -> bool {
    true
}

fn default_file_prefix() -> String {
    DEFAULT_FILE_PREFIX.to_string()
}

impl Default for CountsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            rotation_timeout_ms: default_rotation_timeout_ms(),
            page_cache_pages: default_page_cache_pages(),
            sync_on_rotate: default_sync_on_rotate(),
            file_prefix: default_file_prefix(),
        }
    }
}

impl CountsConfig {
    /// Default configuration for a store in `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Configuration for tests
    ///
    /// - Short rotation timeout (2 seconds)
    /// - Small page cache
    /// - No fsync
    pub fn for_testing(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            rotation_timeout_ms: 2_000,
            page_cache_pages: 16,
            sync_on_rotate: false,
            file_prefix: default_file_prefix(),
        }
    }

    /// Set the store directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Set the rotation timeout
    pub fn with_rotation_timeout(mut self, timeout: Duration) -> Self {
        self.rotation_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Set the page cache capacity
    pub fn with_page_cache_pages(mut self, pages: usize) -> Self {
        self.page_cache_pages = pages;
        self
    }

    /// Enable or disable fsync on publish
    pub fn with_sync_on_rotate(mut self, sync: bool) -> Self {
        self.sync_on_rotate = sync;
        self
    }

    /// Set the snapshot file prefix
    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    /// Rotation timeout as a Duration
    pub fn rotation_timeout(&self) -> Duration {
        Duration::from_millis(self.rotation_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rotation_timeout_ms == 0 {
            return Err(ConfigError::ZeroRotationTimeout);
        }
        if self.page_cache_pages == 0 {
            return Err(ConfigError::ZeroPageCache);
        }
        let prefix_ok = !self.file_prefix.is_empty()
            && self
                .file_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !prefix_ok {
            return Err(ConfigError::InvalidPrefix(self.file_prefix.clone()));
        }
        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: CountsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file
    ///
    /// A relative or missing `directory` resolves against the file's parent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        if config.directory.is_relative() {
            if let Some(parent) = path.parent() {
                config.directory = parent.join(&config.directory);
            }
        }
        Ok(config)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CountsConfig::default();
        assert_eq!(config.rotation_timeout(), Duration::from_secs(600));
        assert_eq!(config.page_cache_pages, 256);
        assert!(config.sync_on_rotate);
        assert_eq!(config.file_prefix, "counts");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_testing_config() {
        let config = CountsConfig::for_testing("/tmp/x");
        assert!(!config.sync_on_rotate);
        assert!(config.rotation_timeout() < Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = CountsConfig::new("/data")
            .with_rotation_timeout(Duration::from_secs(5))
            .with_page_cache_pages(8)
            .with_sync_on_rotate(false)
            .with_file_prefix("stats");
        assert_eq!(config.directory, PathBuf::from("/data"));
        assert_eq!(config.rotation_timeout_ms, 5_000);
        assert_eq!(config.page_cache_pages, 8);
        assert!(!config.sync_on_rotate);
        assert_eq!(config.file_prefix, "stats");
    }

    #[test]
    fn test_validation_errors() {
        let zero_timeout = CountsConfig::default().with_rotation_timeout(Duration::ZERO);
        assert!(matches!(
            zero_timeout.validate(),
            Err(ConfigError::ZeroRotationTimeout)
        ));

        let zero_cache = CountsConfig::default().with_page_cache_pages(0);
        assert!(matches!(zero_cache.validate(), Err(ConfigError::ZeroPageCache)));

        for prefix in ["", "a/b", "counts.v2", "space here"] {
            let bad = CountsConfig::default().with_file_prefix(prefix);
            assert!(matches!(bad.validate(), Err(ConfigError::InvalidPrefix(_))));
        }
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = CountsConfig::from_toml_str("rotation_timeout_ms = 1500\n").unwrap();
        assert_eq!(config.rotation_timeout_ms, 1500);
        assert_eq!(config.page_cache_pages, DEFAULT_PAGE_CACHE_PAGES);
        assert_eq!(config.file_prefix, DEFAULT_FILE_PREFIX);
    }

    #[test]
    fn test_parse_rejects_invalid() {
        assert!(matches!(
            CountsConfig::from_toml_str("page_cache_pages = 0\n"),
            Err(ConfigError::ZeroPageCache)
        ));
        assert!(matches!(
            CountsConfig::from_toml_str("rotation_timeout_ms = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = CountsConfig::new("/data/counts").with_page_cache_pages(99);
        let text = config.to_toml_string().unwrap();
        assert_eq!(CountsConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_resolves_relative_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "directory = \"snapshots\"\nsync_on_rotate = false\n").unwrap();

        let config = CountsConfig::load(&path).unwrap();
        assert_eq!(config.directory, temp_dir.path().join("snapshots"));
        assert!(!config.sync_on_rotate);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = CountsConfig::load(&temp_dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_into_store_error() {
        let err: countsdb_core::Error = ConfigError::ZeroPageCache.into();
        assert!(matches!(err, countsdb_core::Error::Config(_)));
    }
}
