//! Transforms for the crawl reports
//!
//! Each report is a [`Transform`] run by the pipeline plus a printer for its
//! collected output:
//! - Publication order: canonical URLs sorted by publish date
//! - Word count: stories sorted by length, with a total
//! - Catalog: unique authors, categories, and tags across all stories

use super::coordinator::Transform;
use crate::page::{ResolvedPage, StoryTag};
use crate::Result;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use url::Url;

/// One story in publication order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedStory {
    pub id: u64,
    pub url: String,
    pub published: DateTime<FixedOffset>,
}

/// Sorts stories by publish date
#[derive(Debug, Clone)]
pub struct PublicationOrder {
    base: Url,
}

impl PublicationOrder {
    /// # Arguments
    ///
    /// * `base` - Site base URL the canonical URLs are built on
    pub fn new(base: Url) -> Self {
        Self { base }
    }
}

impl Transform for PublicationOrder {
    type Record = PublishedStory;
    type WorkerState = ();

    fn apply(&self, page: &ResolvedPage, _state: &mut ()) -> Result<PublishedStory> {
        let identity = page.identity();
        Ok(PublishedStory {
            id: story_number(page),
            url: identity.request_url(&self.base)?.to_string(),
            published: page.publish_date()?,
        })
    }

    fn compare(&self, a: &PublishedStory, b: &PublishedStory) -> Ordering {
        a.published.cmp(&b.published).then(a.id.cmp(&b.id))
    }
}

/// One story's length
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoryLength {
    pub id: u64,
    pub title: String,
    pub words: usize,
}

/// Sorts stories by word count, shortest first
#[derive(Debug, Clone, Default)]
pub struct WordCount;

impl Transform for WordCount {
    type Record = StoryLength;
    type WorkerState = ();

    fn apply(&self, page: &ResolvedPage, _state: &mut ()) -> Result<StoryLength> {
        Ok(StoryLength {
            id: story_number(page),
            title: page.title().to_string(),
            words: page.word_count(),
        })
    }

    fn compare(&self, a: &StoryLength, b: &StoryLength) -> Ordering {
        a.words.cmp(&b.words).then(a.id.cmp(&b.id))
    }
}

/// A category as shown in story bylines
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CategoryEntry {
    pub text: String,
    pub slug: String,
    pub link: String,
}

/// Unique values seen by one processing worker, or by all of them once merged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSet {
    pub authors: BTreeSet<String>,
    pub categories: BTreeSet<CategoryEntry>,
    pub tags: BTreeSet<StoryTag>,
}

impl CatalogSet {
    /// Adds everything from another set
    pub fn merge(&mut self, other: CatalogSet) {
        self.authors.extend(other.authors);
        self.categories.extend(other.categories);
        self.tags.extend(other.tags);
    }
}

/// Collects unique authors, categories, and tags
///
/// Values accumulate in per-worker sets; [`Catalog::merge_states`] combines
/// them after the pool drains. The records themselves are only the story ids.
#[derive(Debug, Clone, Default)]
pub struct Catalog;

impl Catalog {
    pub fn merge_states(states: Vec<CatalogSet>) -> CatalogSet {
        states.into_iter().fold(CatalogSet::default(), |mut all, set| {
            all.merge(set);
            all
        })
    }
}

impl Transform for Catalog {
    type Record = u64;
    type WorkerState = CatalogSet;

    fn apply(&self, page: &ResolvedPage, state: &mut CatalogSet) -> Result<u64> {
        let author = page.author().trim();
        if !author.is_empty() {
            state.authors.insert(author.to_string());
        }
        if !page.category_name().is_empty() {
            state.categories.insert(CategoryEntry {
                text: page.category_name().to_string(),
                slug: page.identity().category.clone(),
                link: page.category_link().unwrap_or_default().to_string(),
            });
        }
        state.tags.extend(page.tags().iter().cloned());
        Ok(story_number(page))
    }

    fn compare(&self, a: &u64, b: &u64) -> Ordering {
        a.cmp(b)
    }
}

fn story_number(page: &ResolvedPage) -> u64 {
    page.identity().numeric_id().unwrap_or_default()
}

/// Prints canonical URLs in publication order
pub fn print_publication_order(stories: &[PublishedStory]) {
    for story in stories {
        println!("{}", story.url);
    }
}

/// Prints each story's word count and the total
pub fn print_word_counts(stories: &[StoryLength]) {
    for story in stories {
        println!("{:>8}  {:>4}  {}", story.words, story.id, story.title);
    }
    let total: usize = stories.iter().map(|s| s.words).sum();
    println!("{:>8}  total ({} stories)", total, stories.len());
}

/// Prints the merged catalog
pub fn print_catalog(catalog: &CatalogSet) {
    println!("=== Catalog ===\n");

    println!("Authors ({}):", catalog.authors.len());
    for author in &catalog.authors {
        println!("  {}", author);
    }
    println!();

    println!("Categories ({}):", catalog.categories.len());
    for category in &catalog.categories {
        println!("  {} ({}) {}", category.text, category.slug, category.link);
    }
    println!();

    println!("Tags ({}):", catalog.tags.len());
    for tag in &catalog.tags {
        println!("  {:>4} {} ({})", tag.id, tag.name, tag.slug);
    }
}
