//! URL handling module for Whateley-Fetch
//!
//! This module provides story identities and their URL forms, asset cache
//! keys, category pattern matching, and category classification.

mod domain;
mod identity;
mod matcher;

use crate::config::CrawlConfig;

// Re-export main items
pub use domain::{asset_cache_key, extract_host};
pub(crate) use identity::split_id_and_slug;
pub use identity::{section_of_link, StoryIdentity};
pub use matcher::{matches_any_category, matches_category};

/// Category classification types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryClassification {
    /// Category matches an accepted pattern
    Accepted,
    /// Page lives in a section whose pages are skipped outright
    ExcludedSection,
    /// Story resolved but its category is not wanted in this run
    Rejected,
}

impl CategoryClassification {
    /// Returns true if the story should be handed to processing
    pub fn should_process(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Classifies a resolved story according to the crawl configuration
///
/// This function checks the category in the following priority order:
/// 1. Excluded sections, unless a pattern other than `*` names the category
///    (so `the-library/*` opts the library back in)
/// 2. Accepted category patterns
/// 3. Rejected (default)
///
/// # Examples
///
/// ```
/// use whateley_fetch::config::CrawlConfig;
/// use whateley_fetch::url::{classify_category, CategoryClassification, StoryIdentity};
///
/// let crawl = CrawlConfig::default();
/// let id = StoryIdentity::new("stories", "279", "hive-part-4-who-dun-it");
/// assert_eq!(classify_category(&id, &crawl), CategoryClassification::Accepted);
/// ```
pub fn classify_category(identity: &StoryIdentity, config: &CrawlConfig) -> CategoryClassification {
    // Priority 1: excluded sections; the catch-all never opts a section in
    if is_excluded_section(identity.section(), config) {
        let explicit = config
            .categories
            .iter()
            .filter(|p| p.as_str() != "*")
            .any(|p| matches_category(p, &identity.category));
        if !explicit {
            return CategoryClassification::ExcludedSection;
        }
    }

    // Priority 2: accepted patterns
    if matches_any_category(&config.categories, &identity.category) {
        return CategoryClassification::Accepted;
    }

    CategoryClassification::Rejected
}

/// Returns true if the section name is in the excluded list
pub fn is_excluded_section(section: &str, config: &CrawlConfig) -> bool {
    config.excluded_sections.iter().any(|s| s == section)
}
