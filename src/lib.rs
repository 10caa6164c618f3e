//! Whateley-Fetch: cached acquisition and cleanup of serialized fiction chapters
//!
//! This crate turns the numbered story pages of a single site into a locally
//! cached, normalized document set, ready for downstream ebook packaging.
//! It combines a SQLite-backed page/asset cache, a fetch client with an
//! offline mode, a canonicalizing content resolver, a declarative rule engine
//! for markup fix-ups, and a staged concurrent crawl pipeline.

pub mod config;
pub mod crawler;
pub mod output;
pub mod page;
pub mod rules;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Whateley-Fetch operations
#[derive(Debug, Error)]
pub enum WhateleyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] page::ResolveError),

    #[error("Rule error: {0}")]
    Rules(#[from] rules::RuleError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Wraps a failure with the story id it happened for
    #[error("story {id}")]
    Story {
        id: String,
        #[source]
        source: Box<WhateleyError>,
    },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::PageState,
        to: state::PageState,
    },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl WhateleyError {
    /// Attaches the story id as context for the error chain
    pub fn for_story(id: impl Into<String>, source: impl Into<WhateleyError>) -> Self {
        Self::Story {
            id: id.into(),
            source: Box::new(source.into()),
        }
    }

    /// Returns the innermost error, skipping story context wrappers
    pub fn root(&self) -> &WhateleyError {
        match self {
            Self::Story { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Malformed story URL {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("Bad host for asset cache: {url} (expected host {expected})")]
    ForeignHost { url: String, expected: String },
}

/// Result type alias for Whateley-Fetch operations
pub type Result<T> = std::result::Result<T, WhateleyError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::SiteAccess;
pub use page::{Document, ResolvedPage, Resolver};
pub use rules::{RuleEngine, RuleTable, TypoFix};
pub use state::{FailureKind, PageState};
pub use self::url::StoryIdentity;
