use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Stories whose pages are not stories at all; never requested.
///
/// 672 is a news item filed under a public-news category and 680 is the chat
/// page, neither of which resolves to a story category.
pub const KNOWN_NON_STORY_IDS: &[u64] = &[672, 680];

/// Main configuration structure for Whateley-Fetch
///
/// Every section is optional; a missing file section falls back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub client: ClientConfig,
    pub crawl: CrawlConfig,
    pub rules: RulesConfig,
}

/// Local cache configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the SQLite cache database
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Age after which a cached entry must be re-fetched (hours)
    #[serde(rename = "stale-period-hours")]
    pub stale_period_hours: u64,

    /// Never touch the network; cached entries never go stale
    pub offline: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            database_path: "./cache.db".to_string(),
            stale_period_hours: 196,
            offline: false,
        }
    }
}

/// Longest accepted staleness threshold, a hundred years
pub const MAX_STALE_PERIOD_HOURS: u64 = 100 * 8766;

impl CacheConfig {
    /// The staleness threshold as a chrono duration
    ///
    /// Fails instead of overflowing when the hour count does not fit.
    pub fn stale_period(&self) -> Result<chrono::Duration, ConfigError> {
        i64::try_from(self.stale_period_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                ConfigError::Validation(format!(
                    "stale-period-hours {} is out of range",
                    self.stale_period_hours
                ))
            })
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme and host of the story site
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Descriptive client identity sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Number of concurrent fetch workers
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://whateleyacademy.net".to_string(),
            user_agent: "Whateley ebook tool (+github.com/riking/whateley-ebooks)".to_string(),
            timeout_secs: 15,
            max_concurrency: 10,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Crawl range and filtering configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// First story id to request (inclusive)
    #[serde(rename = "first-id")]
    pub first_id: u64,

    /// Last story id to request (exclusive)
    #[serde(rename = "last-id")]
    pub last_id: u64,

    /// Additional ids to skip on top of the known non-story pages
    #[serde(rename = "skip-ids")]
    pub skip_ids: Vec<u64>,

    /// Accepted category patterns ("*", "slug", "slug/*")
    pub categories: Vec<String>,

    /// Site sections whose pages have no parseable story URL
    #[serde(rename = "excluded-sections")]
    pub excluded_sections: Vec<String>,

    /// Number of processing workers; 0 means one per logical core
    #[serde(rename = "process-workers")]
    pub process_workers: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            first_id: 1,
            last_id: 800,
            skip_ids: Vec::new(),
            categories: vec![
                "original-timeline".to_string(),
                "stories".to_string(),
                "2nd-gen-canon".to_string(),
            ],
            excluded_sections: vec!["community".to_string(), "the-library".to_string()],
            process_workers: 0,
        }
    }
}

impl CrawlConfig {
    /// Resolves the processing pool size
    pub fn process_workers(&self) -> usize {
        if self.process_workers > 0 {
            return self.process_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    }

    /// Returns true if the id is never requested
    pub fn is_skipped(&self, id: u64) -> bool {
        KNOWN_NON_STORY_IDS.contains(&id) || self.skip_ids.contains(&id)
    }
}

/// Typo rule configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Path to the YAML rule file
    pub path: String,

    /// Execution context tag matched against a rule's `onlywhen` list
    pub context: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "./typos.yml".to_string(),
            context: "ebook".to_string(),
        }
    }
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub offline: bool,
    pub max_requests: Option<usize>,
    pub rules_path: Option<String>,
    pub database_path: Option<String>,
}

impl Config {
    /// Applies command-line overrides on top of the loaded values
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if overrides.offline {
            self.cache.offline = true;
        }
        if let Some(n) = overrides.max_requests {
            self.client.max_concurrency = n;
        }
        if let Some(path) = &overrides.rules_path {
            self.rules.path = path.clone();
        }
        if let Some(path) = &overrides.database_path {
            self.cache.database_path = path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.stale_period_hours, 196);
        assert!(!config.cache.offline);
        assert_eq!(config.client.timeout(), Duration::from_secs(15));
        assert_eq!(config.crawl.last_id, 800);
        assert_eq!(config.rules.context, "ebook");
    }

    #[test]
    fn test_stale_period_overflow_is_an_error() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.stale_period().unwrap(), chrono::Duration::hours(196));

        cache.stale_period_hours = 3_000_000_000_000_000;
        assert!(matches!(cache.stale_period(), Err(ConfigError::Validation(_))));

        cache.stale_period_hours = u64::MAX;
        assert!(cache.stale_period().is_err());
    }

    #[test]
    fn test_known_non_story_ids_always_skipped() {
        let crawl = CrawlConfig::default();
        assert!(crawl.is_skipped(672));
        assert!(crawl.is_skipped(680));
        assert!(!crawl.is_skipped(279));
    }

    #[test]
    fn test_extra_skip_ids() {
        let crawl = CrawlConfig {
            skip_ids: vec![5],
            ..CrawlConfig::default()
        };
        assert!(crawl.is_skipped(5));
        assert!(crawl.is_skipped(672));
    }

    #[test]
    fn test_process_workers_auto() {
        let crawl = CrawlConfig::default();
        assert!(crawl.process_workers() >= 1);

        let fixed = CrawlConfig {
            process_workers: 3,
            ..CrawlConfig::default()
        };
        assert_eq!(fixed.process_workers(), 3);
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        config.apply_overrides(&Overrides {
            offline: true,
            max_requests: Some(2),
            rules_path: Some("other.yml".to_string()),
            database_path: None,
        });
        assert!(config.cache.offline);
        assert_eq!(config.client.max_concurrency, 2);
        assert_eq!(config.rules.path, "other.yml");
        assert_eq!(config.cache.database_path, "./cache.db");
    }
}
