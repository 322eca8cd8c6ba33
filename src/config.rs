//! Configuration file parser and feed list loader.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings since they are
//! usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::content::{ExtractorBackend, ExtractorConfig, DEFAULT_READER_BASE_URL};
use crate::feed::FetchOptions;
use crate::util::HostPolicy;

/// Environment variable that overrides `reader_api_key` from the file.
pub const READER_API_KEY_ENV: &str = "READER_API_KEY";

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

    #[error("Feed list not found: {0}")]
    FeedListMissing(PathBuf),

    #[error("Invalid feed list {path}: {source}")]
    FeedListMalformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feed list {0} contains no feed URLs")]
    FeedListEmpty(PathBuf),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Which content extractor backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Html,
    Reader,
}

/// Top-level collector configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The custom Debug impl masks `reader_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding feeds, articles and logs.
    pub database_path: PathBuf,

    /// JSON array of feed URLs, re-read at the start of every cycle.
    pub feeds_file: PathBuf,

    /// Append diagnostic output to this file instead of stderr.
    pub log_file: Option<PathBuf>,

    /// Seconds to wait between fetch cycles.
    pub interval_secs: u64,

    pub feed_timeout_secs: u64,

    /// Upper bound on feeds fetched at once. Unset = one task per feed.
    pub max_concurrent_feeds: Option<usize>,

    pub content_timeout_secs: u64,

    /// Articles extracted in parallel per cycle.
    pub content_concurrency: usize,

    pub extractor: ExtractorKind,

    pub reader_base_url: String,

    /// Reader service API key. `READER_API_KEY` takes precedence.
    pub reader_api_key: Option<String>,

    /// Permit article links on loopback/private hosts.
    pub allow_private_hosts: bool,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/rss_collector.db"),
            feeds_file: PathBuf::from("data/feeds.json"),
            log_file: None,
            interval_secs: 180,
            feed_timeout_secs: 10,
            max_concurrent_feeds: None,
            content_timeout_secs: 20,
            content_concurrency: 4,
            extractor: ExtractorKind::Html,
            reader_base_url: DEFAULT_READER_BASE_URL.to_string(),
            reader_api_key: None,
            allow_private_hosts: false,
            user_agent: concat!("feed-collector/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("feeds_file", &self.feeds_file)
            .field("log_file", &self.log_file)
            .field("interval_secs", &self.interval_secs)
            .field("feed_timeout_secs", &self.feed_timeout_secs)
            .field("max_concurrent_feeds", &self.max_concurrent_feeds)
            .field("content_timeout_secs", &self.content_timeout_secs)
            .field("content_concurrency", &self.content_concurrency)
            .field("extractor", &self.extractor)
            .field("reader_base_url", &self.reader_base_url)
            .field(
                "reader_api_key",
                &self.reader_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("allow_private_hosts", &self.allow_private_hosts)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// A loaded [`Config`] plus what happened while loading it.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// False when defaults were used (file missing or blank).
    pub from_file: bool,
    /// Top-level keys that match no field, usually typos.
    pub unknown_keys: Vec<String>,
}

impl LoadedConfig {
    fn defaults() -> Self {
        Self {
            config: Config::default(),
            from_file: false,
            unknown_keys: Vec::new(),
        }
    }

    /// Emit the load diagnostics. Call once a subscriber is installed.
    pub fn log(&self, path: &Path) {
        for key in &self.unknown_keys {
            tracing::warn!(path = %path.display(), key = %key, "Unknown key in config file, ignoring");
        }
        if self.from_file {
            tracing::info!(
                path = %path.display(),
                database = %self.config.database_path.display(),
                "Loaded configuration"
            );
        } else {
            tracing::debug!(path = %path.display(), "No config file content, using defaults");
        }
    }
}

const KNOWN_KEYS: &[&str] = &[
    "database_path",
    "feeds_file",
    "log_file",
    "interval_secs",
    "feed_timeout_secs",
    "max_concurrent_feeds",
    "content_timeout_secs",
    "content_concurrency",
    "extractor",
    "reader_base_url",
    "reader_api_key",
    "allow_private_hosts",
    "user_agent",
];

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file, logging what
    /// [`Config::load_checked`] reports.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let loaded = Self::load_checked(path)?;
        loaded.log(path);
        Ok(loaded.config)
    }

    /// Load configuration from a TOML file without logging.
    ///
    /// - Missing file → defaults, `from_file == false`
    /// - Empty file → defaults, `from_file == false`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, returned in `unknown_keys`
    ///
    /// The binary loads its config before the tracing subscriber exists (the
    /// subscriber needs `log_file`), so diagnostics are returned and logged
    /// by the caller afterwards.
    pub fn load_checked(path: &Path) -> Result<LoadedConfig, ConfigError> {
        // Check size before reading so a corrupted file can't exhaust memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedConfig::defaults());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            // File deleted between metadata and read
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LoadedConfig::defaults());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            return Ok(LoadedConfig::defaults());
        }

        let unknown_keys = content
            .parse::<toml::Table>()
            .map(|raw| {
                raw.keys()
                    .filter(|key| !KNOWN_KEYS.contains(&key.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let config: Config = toml::from_str(&content)?;
        Ok(LoadedConfig {
            config,
            from_file: true,
            unknown_keys,
        })
    }

    /// Reader API key, preferring the environment over the file.
    pub fn reader_api_key(&self) -> Option<SecretString> {
        resolve_api_key(
            std::env::var(READER_API_KEY_ENV).ok(),
            self.reader_api_key.as_deref(),
        )
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.feed_timeout_secs),
            max_concurrent: self.max_concurrent_feeds,
        }
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            backend: match self.extractor {
                ExtractorKind::Html => ExtractorBackend::Html,
                ExtractorKind::Reader => ExtractorBackend::Reader,
            },
            timeout: Duration::from_secs(self.content_timeout_secs),
            concurrency: self.content_concurrency,
            host_policy: if self.allow_private_hosts {
                HostPolicy::AllowPrivate
            } else {
                HostPolicy::PublicOnly
            },
            reader_base_url: self.reader_base_url.clone(),
            reader_api_key: self.reader_api_key(),
        }
    }
}

fn resolve_api_key(env: Option<String>, file: Option<&str>) -> Option<SecretString> {
    env.filter(|k| !k.trim().is_empty())
        .or_else(|| file.filter(|k| !k.trim().is_empty()).map(str::to_string))
        .map(SecretString::from)
}

// ============================================================================
// Feed List
// ============================================================================

/// Read the feed list: a JSON array of URL strings.
///
/// Entries are trimmed, blanks dropped and exact duplicates removed keeping
/// the first occurrence. A list with no usable URL is an error, since a
/// cycle over zero feeds would silently do nothing.
pub fn load_feed_list(path: &Path) -> Result<Vec<String>, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::FeedListMissing(path.to_path_buf()));
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let raw: Vec<String> =
        serde_json::from_str(&content).map_err(|source| ConfigError::FeedListMalformed {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    let urls: Vec<String> = raw
        .into_iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect();

    if urls.is_empty() {
        return Err(ConfigError::FeedListEmpty(path.to_path_buf()));
    }

    tracing::debug!(path = %path.display(), feeds = urls.len(), "Loaded feed list");
    Ok(urls)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, PathBuf::from("data/rss_collector.db"));
        assert_eq!(config.feeds_file, PathBuf::from("data/feeds.json"));
        assert_eq!(config.interval_secs, 180);
        assert_eq!(config.feed_timeout_secs, 10);
        assert_eq!(config.max_concurrent_feeds, None);
        assert_eq!(config.content_timeout_secs, 20);
        assert_eq!(config.content_concurrency, 4);
        assert_eq!(config.extractor, ExtractorKind::Html);
        assert!(!config.allow_private_hosts);
        assert!(config.log_file.is_none());
        assert!(config.user_agent.starts_with("feed-collector/"));
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.interval_secs, 180);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "   \n  \n  ");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.content_concurrency, 4);
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "interval_secs = 60\n");

        let config = Config::load(&path).unwrap();
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.feed_timeout_secs, 10);
    }

    #[test]
    fn test_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.toml",
            r#"
database_path = "/var/lib/collector/articles.db"
feeds_file = "/etc/collector/feeds.json"
log_file = "/var/log/collector.log"
interval_secs = 600
feed_timeout_secs = 5
max_concurrent_feeds = 16
content_timeout_secs = 30
content_concurrency = 8
extractor = "reader"
reader_base_url = "https://reader.example.org"
reader_api_key = "test-key-123"
allow_private_hosts = true
user_agent = "collector-test"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path,
            PathBuf::from("/var/lib/collector/articles.db")
        );
        assert_eq!(config.log_file, Some(PathBuf::from("/var/log/collector.log")));
        assert_eq!(config.max_concurrent_feeds, Some(16));
        assert_eq!(config.extractor, ExtractorKind::Reader);
        assert_eq!(config.reader_api_key.as_deref(), Some("test-key-123"));

        let extractor = config.extractor_config();
        assert_eq!(extractor.backend, ExtractorBackend::Reader);
        assert_eq!(extractor.timeout, Duration::from_secs(30));
        assert_eq!(extractor.concurrency, 8);
        assert_eq!(extractor.host_policy, HostPolicy::AllowPrivate);

        let fetch = config.fetch_options();
        assert_eq!(fetch.timeout, Duration::from_secs(5));
        assert_eq!(fetch.max_concurrent, Some(16));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "this is not [valid toml");

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_extractor_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", "extractor = \"readability\"\n");

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "config.toml",
            "interval_secs = 30\ntotally_fake_key = \"should not fail\"\n",
        );

        let loaded = Config::load_checked(&path).unwrap();
        assert_eq!(loaded.config.interval_secs, 30);
        assert!(loaded.from_file);
        assert_eq!(loaded.unknown_keys, vec!["totally_fake_key".to_string()]);
    }

    #[test]
    fn test_missing_file_reports_defaults_without_warnings() {
        let dir = TempDir::new().unwrap();
        let loaded = Config::load_checked(&dir.path().join("absent.toml")).unwrap();
        assert!(!loaded.from_file);
        assert!(loaded.unknown_keys.is_empty());
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "config.toml", &"a".repeat(1_048_577));

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn test_debug_masks_api_key() {
        let config = Config {
            reader_api_key: Some("super-secret-key-12345".to_string()),
            ..Config::default()
        };

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-key-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_env_key_overrides_file_key() {
        let key = resolve_api_key(Some("from-env".to_string()), Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-env");

        let key = resolve_api_key(None, Some("from-file")).unwrap();
        assert_eq!(key.expose_secret(), "from-file");

        assert!(resolve_api_key(Some("  ".to_string()), None).is_none());
    }

    #[test]
    fn test_feed_list_dedups_and_trims() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "feeds.json",
            r#"["https://a.example/rss", " https://b.example/atom ", "", "https://a.example/rss"]"#,
        );

        let urls = load_feed_list(&path).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://a.example/rss".to_string(),
                "https://b.example/atom".to_string(),
            ]
        );
    }

    #[test]
    fn test_feed_list_missing() {
        let dir = TempDir::new().unwrap();
        let result = load_feed_list(&dir.path().join("feeds.json"));
        assert!(matches!(result, Err(ConfigError::FeedListMissing(_))));
    }

    #[test]
    fn test_feed_list_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "feeds.json", r#"{"feeds": ["https://a.example/rss"]}"#);

        let result = load_feed_list(&path);
        assert!(matches!(result, Err(ConfigError::FeedListMalformed { .. })));
    }

    #[test]
    fn test_feed_list_empty() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "feeds.json", r#"["", "   "]"#);

        assert!(matches!(
            load_feed_list(&path),
            Err(ConfigError::FeedListEmpty(_))
        ));
    }
}
