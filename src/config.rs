//! Configuration file parser for ~/.config/headlines/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Environment variable holding the news API key. Wins over the config file.
pub const API_KEY_ENV: &str = "NEWS_API_KEY";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `Debug` masks `api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the news API, e.g. `https://newsapi.org/v2`.
    pub base_url: String,

    /// API key (alternative to the NEWS_API_KEY env var).
    pub api_key: Option<String>,

    /// Two-letter country code for top headlines.
    pub country: String,

    /// Articles requested for the breaking news feed.
    pub breaking_page_size: u32,

    /// Articles requested per search page.
    pub search_page_size: u32,

    /// Cached breaking news younger than this is served without a fetch.
    pub freshness_minutes: u64,

    /// Non-bookmarked articles older than this are deleted on startup.
    pub retention_days: u64,

    pub request_timeout_secs: u64,

    /// Database file. Defaults to `headlines.db` in the config directory.
    pub database_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org/v2".to_string(),
            api_key: None,
            country: "in".to_string(),
            breaking_page_size: 100,
            search_page_size: 20,
            freshness_minutes: 5,
            retention_days: 7,
            request_timeout_secs: 30,
            database_path: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("country", &self.country)
            .field("breaking_page_size", &self.breaking_page_size)
            .field("search_page_size", &self.search_page_size)
            .field("freshness_minutes", &self.freshness_minutes)
            .field("retention_days", &self.retention_days)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("database_path", &self.database_path)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 9] = [
        "base_url",
        "api_key",
        "country",
        "breaking_page_size",
        "search_page_size",
        "freshness_minutes",
        "retention_days",
        "request_timeout_secs",
        "database_path",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading so a corrupted file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            base_url = %config.base_url,
            country = %config.country,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// The API key to send, if any. `NEWS_API_KEY` takes precedence.
    pub fn api_key(&self) -> Option<SecretString> {
        self.api_key_with_env(std::env::var(API_KEY_ENV).ok())
    }

    fn api_key_with_env(&self, env: Option<String>) -> Option<SecretString> {
        env.filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .map(SecretString::from)
    }

    /// Freshness window in milliseconds.
    pub fn freshness_millis(&self) -> i64 {
        (self.freshness_minutes as i64).saturating_mul(60_000)
    }

    /// Retention window in milliseconds.
    pub fn retention_millis(&self) -> i64 {
        (self.retention_days as i64).saturating_mul(24 * 60 * 60 * 1000)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://newsapi.org/v2");
        assert_eq!(config.country, "in");
        assert_eq!(config.breaking_page_size, 100);
        assert_eq!(config.search_page_size, 20);
        assert_eq!(config.freshness_minutes, 5);
        assert_eq!(config.retention_days, 7);
        assert!(config.api_key.is_none());
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.country, "in");
    }

    #[test]
    fn test_empty_file_returns_default() {
        let (_dir, path) = write_config("  \n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.search_page_size, 20);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("country = \"us\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.country, "us");
        assert_eq!(config.freshness_minutes, 5);
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
base_url = "https://news.example/v2"
api_key = "file-key"
country = "gb"
breaking_page_size = 50
search_page_size = 10
freshness_minutes = 15
retention_days = 30
request_timeout_secs = 5
database_path = "/tmp/news.db"
"#,
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_url, "https://news.example/v2");
        assert_eq!(config.api_key.as_deref(), Some("file-key"));
        assert_eq!(config.country, "gb");
        assert_eq!(config.breaking_page_size, 50);
        assert_eq!(config.search_page_size, 10);
        assert_eq!(config.freshness_millis(), 15 * 60_000);
        assert_eq!(config.retention_millis(), 30 * 86_400_000);
        assert_eq!(config.request_timeout_secs, 5);
        assert_eq!(config.database_path.as_deref(), Some("/tmp/news.db"));
    }

    #[test]
    fn test_unknown_keys_are_accepted() {
        let (_dir, path) = write_config("countyr = \"us\"\ncountry = \"de\"\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.country, "de");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let (_dir, path) = write_config("country = \n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let (_dir, path) = write_config("retention_days = \"a week\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_oversized_file_rejected() {
        let padding = format!("# {}\n", "x".repeat(Config::MAX_FILE_SIZE as usize));
        let (_dir, path) = write_config(&padding);
        assert!(matches!(Config::load(&path), Err(ConfigError::TooLarge(_))));
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            api_key: Some("secret-value".to_string()),
            ..Config::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_env_key_wins_over_file_key() {
        let config = Config {
            api_key: Some("file-key".to_string()),
            ..Config::default()
        };
        let key = config.api_key_with_env(Some("env-key".to_string())).unwrap();
        assert_eq!(key.expose_secret(), "env-key");
    }

    #[test]
    fn test_file_key_used_without_env() {
        let config = Config {
            api_key: Some("file-key".to_string()),
            ..Config::default()
        };
        let key = config.api_key_with_env(None).unwrap();
        assert_eq!(key.expose_secret(), "file-key");
    }

    #[test]
    fn test_blank_keys_are_ignored() {
        let config = Config {
            api_key: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(config.api_key_with_env(Some(String::new())).is_none());
    }
}
