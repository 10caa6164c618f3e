//! Configuration module for Whateley-Fetch
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional, so running without a file works with defaults.
//!
//! # Example
//!
//! ```no_run
//! use whateley_fetch::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("whateley.toml")).unwrap();
//! println!("Crawling ids {}..{}", config.crawl.first_id, config.crawl.last_id);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheConfig, ClientConfig, Config, CrawlConfig, Overrides, RulesConfig, KNOWN_NON_STORY_IDS,
    MAX_STALE_PERIOD_HOURS,
};

// Re-export parser functions
pub use parser::{compute_file_hash, hash_bytes, load_config, load_config_or_default, parse_config};
pub use validation::validate;
