//! TrendSpotter configuration file handling
//!
//! Loads and manages the ~/.config/trendspotter/config.yaml file. Every field has
//! a default, so an empty file (or no file at all) yields a working setup.

use crate::Result;
use serde::{Deserialize, Serialize};
use social_api::{RecencyMode, RecencyStamper};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Evaluation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the evaluation service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds (unset = no timeout)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

fn default_base_url() -> String {
    social_api::DEFAULT_BASE_URL.to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Time-to-live for each cache partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlConfig {
    /// User directory TTL (default 5 minutes)
    #[serde(default = "default_users_ttl_ms")]
    pub users_ttl_ms: u64,

    /// Per-user posts TTL (default 30 seconds)
    #[serde(default = "default_posts_ttl_ms")]
    pub posts_ttl_ms: u64,

    /// Per-post comments TTL (default 60 seconds)
    #[serde(default = "default_comments_ttl_ms")]
    pub comments_ttl_ms: u64,
}

fn default_users_ttl_ms() -> u64 {
    300_000
}

fn default_posts_ttl_ms() -> u64 {
    30_000
}

fn default_comments_ttl_ms() -> u64 {
    60_000
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            users_ttl_ms: default_users_ttl_ms(),
            posts_ttl_ms: default_posts_ttl_ms(),
            comments_ttl_ms: default_comments_ttl_ms(),
        }
    }
}

impl CacheTtlConfig {
    pub fn users_ttl(&self) -> Duration {
        Duration::from_millis(self.users_ttl_ms)
    }

    pub fn posts_ttl(&self) -> Duration {
        Duration::from_millis(self.posts_ttl_ms)
    }

    pub fn comments_ttl(&self) -> Duration {
        Duration::from_millis(self.comments_ttl_ms)
    }
}

/// Limits used by the aggregation passes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Users whose posts are loaded by `initialize`
    #[serde(default = "default_initial_users")]
    pub initial_users: usize,

    /// Posts whose comments are loaded by `initialize`
    #[serde(default = "default_initial_posts")]
    pub initial_posts: usize,

    /// Length of the top users list
    #[serde(default = "default_top_users_limit")]
    pub top_users_limit: usize,
}

fn default_initial_users() -> usize {
    10
}

fn default_initial_posts() -> usize {
    20
}

fn default_top_users_limit() -> usize {
    5
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            initial_users: default_initial_users(),
            initial_posts: default_initial_posts(),
            top_users_limit: default_top_users_limit(),
        }
    }
}

/// Refresh intervals for the live views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_top_users_interval_ms")]
    pub top_users_interval_ms: u64,

    #[serde(default = "default_trending_interval_ms")]
    pub trending_interval_ms: u64,

    #[serde(default = "default_feed_interval_ms")]
    pub feed_interval_ms: u64,

    /// Random users sampled on each feed refresh
    #[serde(default = "default_feed_sample_size")]
    pub feed_sample_size: usize,
}

fn default_top_users_interval_ms() -> u64 {
    30_000
}

fn default_trending_interval_ms() -> u64 {
    20_000
}

fn default_feed_interval_ms() -> u64 {
    30_000
}

fn default_feed_sample_size() -> usize {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            top_users_interval_ms: default_top_users_interval_ms(),
            trending_interval_ms: default_trending_interval_ms(),
            feed_interval_ms: default_feed_interval_ms(),
            feed_sample_size: default_feed_sample_size(),
        }
    }
}

/// Synthetic recency timestamps for fetched posts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecencyConfig {
    /// Upper bound of the random offset subtracted from "now"
    #[serde(default = "default_max_offset_ms")]
    pub max_offset_ms: u64,

    /// Fixed RNG seed for reproducible timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default)]
    pub mode: RecencyMode,
}

fn default_max_offset_ms() -> u64 {
    social_api::DEFAULT_MAX_RECENCY_OFFSET.as_millis() as u64
}

impl Default for RecencyConfig {
    fn default() -> Self {
        Self {
            max_offset_ms: default_max_offset_ms(),
            seed: None,
            mode: RecencyMode::default(),
        }
    }
}

impl RecencyConfig {
    pub fn stamper(&self) -> RecencyStamper {
        RecencyStamper::new(Duration::from_millis(self.max_offset_ms), self.mode, self.seed)
    }
}

/// TrendSpotter configuration
///
/// Represents the complete ~/.config/trendspotter/config.yaml file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrendSpotterConfig {
    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub cache: CacheTtlConfig,

    #[serde(default)]
    pub aggregation: AggregationConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub recency: RecencyConfig,
}

impl TrendSpotterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::TrendSpotterError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading TrendSpotter configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = if content.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        tracing::debug!(
            base_url = %config.api.base_url,
            posts_ttl_ms = config.cache.posts_ttl_ms,
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving TrendSpotter configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/trendspotter/config.yaml)
    pub fn default_path() -> PathBuf {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("trendspotter");
        path.push("config.yaml");
        path
    }

    /// Build an API client from the `api` and `recency` sections
    pub fn api_client(&self) -> Result<social_api::ApiClient> {
        let mut builder =
            social_api::ApiClient::builder(self.api.base_url.clone()).stamper(self.recency.stamper());
        if let Some(timeout) = self.api.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_match_refresh_contract() {
        let config = TrendSpotterConfig::new();
        assert_eq!(config.cache.users_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.posts_ttl(), Duration::from_secs(30));
        assert_eq!(config.cache.comments_ttl(), Duration::from_secs(60));
        assert_eq!(config.refresh.top_users_interval_ms, 30_000);
        assert_eq!(config.refresh.trending_interval_ms, 20_000);
        assert_eq!(config.refresh.feed_interval_ms, 30_000);
        assert_eq!(config.refresh.feed_sample_size, 5);
        assert_eq!(config.aggregation.top_users_limit, 5);
        assert!(config.api.request_timeout().is_none());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "cache:\n  posts_ttl_ms: 1000\nrecency:\n  seed: 42\n  mode: stable\n";
        let config: TrendSpotterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.cache.posts_ttl_ms, 1000);
        assert_eq!(config.cache.users_ttl_ms, 300_000);
        assert_eq!(config.recency.seed, Some(42));
        assert_eq!(config.recency.mode, RecencyMode::Stable);
        assert_eq!(config.api.base_url, social_api::DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = TrendSpotterConfig::new();
        config.api.base_url = "http://localhost:9999".to_string();
        config.refresh.feed_sample_size = 3;
        config.save(path).unwrap();

        let loaded = TrendSpotterConfig::load(path).unwrap();
        assert_eq!(loaded.api.base_url, "http://localhost:9999");
        assert_eq!(loaded.refresh.feed_sample_size, 3);
    }

    #[test]
    fn test_empty_file_is_default() {
        let temp_file = NamedTempFile::new().unwrap();
        let loaded = TrendSpotterConfig::load(temp_file.path()).unwrap();
        assert_eq!(loaded.cache.comments_ttl_ms, 60_000);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(TrendSpotterConfig::load("/nonexistent/config.yaml").is_err());
        let config = TrendSpotterConfig::load_or_default("/nonexistent/config.yaml").unwrap();
        assert_eq!(config.aggregation.initial_users, 10);
    }

    #[test]
    fn test_default_path() {
        let path = TrendSpotterConfig::default_path();
        assert!(path.ends_with("trendspotter/config.yaml"));
    }

    #[test]
    fn test_api_client_from_config() {
        let mut config = TrendSpotterConfig::new();
        config.api.base_url = "http://localhost:8080/evaluation-service/".to_string();
        config.api.request_timeout_ms = Some(500);
        let client = config.api_client().unwrap();
        assert_eq!(client.base_url().path(), "/evaluation-service");
    }
}
