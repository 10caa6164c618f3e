//! Classification of per-story failures
//!
//! Every story that does not reach the collector ends in exactly one of
//! these kinds. The kind decides whether the crawl skips the story or stops.

use crate::config::CrawlConfig;
use crate::crawler::FetchError;
use crate::page::ResolveError;
use crate::url::is_excluded_section;
use crate::WhateleyError;
use std::fmt;

/// Why a story never reached the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    /// HTTP 404
    NotFound,
    /// HTTP 403
    Forbidden,
    /// Any other non-success status
    HttpStatus,
    /// Offline mode and nothing cached
    Offline,
    /// Timeout or transport error
    Network,
    /// Page lives in a section without story URLs
    ExcludedSection,
    /// Story resolved into a category this run does not want
    ExcludedCategory,
    /// Canonical identity could not be read for an unknown reason
    CanonicalParse,
    /// Cache failure
    Storage,
    /// Anything else; the code no longer matches the site or local state
    Unexpected,
}

impl FailureKind {
    /// Returns true if the crawl drops the story and continues
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::NotFound
                | Self::Forbidden
                | Self::HttpStatus
                | Self::Offline
                | Self::Network
                | Self::ExcludedSection
                | Self::ExcludedCategory
        )
    }

    /// Classifies an error by its structure, never by its message
    ///
    /// Story context wrappers are looked through. A canonical link that
    /// points into one of the configured excluded sections is an expected
    /// skip; any other unparseable canonical link is not.
    ///
    /// # Arguments
    ///
    /// * `err` - The failure, possibly wrapped with story context
    /// * `crawl` - Crawl configuration holding the excluded sections
    pub fn classify(err: &WhateleyError, crawl: &CrawlConfig) -> Self {
        match err.root() {
            WhateleyError::Fetch(fetch) => match fetch {
                FetchError::Status { .. } if fetch.is_not_found() => Self::NotFound,
                FetchError::Status { .. } if fetch.is_forbidden() => Self::Forbidden,
                FetchError::Status { .. } => Self::HttpStatus,
                FetchError::Offline { .. } => Self::Offline,
                FetchError::Timeout { .. } | FetchError::Request { .. } => Self::Network,
                FetchError::Client(_) => Self::Unexpected,
            },
            WhateleyError::Resolve(resolve) => match resolve {
                ResolveError::Canonical { .. } => match resolve.section() {
                    Some(section) if is_excluded_section(section, crawl) => Self::ExcludedSection,
                    _ => Self::CanonicalParse,
                },
                ResolveError::MissingCanonical => Self::CanonicalParse,
                ResolveError::Selector(_) | ResolveError::MissingDate { .. } => Self::Unexpected,
            },
            WhateleyError::Storage(_) => Self::Storage,
            _ => Self::Unexpected,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::HttpStatus => "http_status",
            Self::Offline => "offline",
            Self::Network => "network",
            Self::ExcludedSection => "excluded_section",
            Self::ExcludedCategory => "excluded_category",
            Self::CanonicalParse => "canonical_parse",
            Self::Storage => "storage",
            Self::Unexpected => "unexpected",
        }
    }

    /// All kinds, in report order
    pub fn all() -> &'static [FailureKind] {
        &[
            Self::NotFound,
            Self::Forbidden,
            Self::HttpStatus,
            Self::Offline,
            Self::Network,
            Self::ExcludedSection,
            Self::ExcludedCategory,
            Self::CanonicalParse,
            Self::Storage,
            Self::Unexpected,
        ]
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
