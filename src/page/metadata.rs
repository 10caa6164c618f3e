//! Story metadata read from a cleaned page
//!
//! Everything here is extracted once, when the page is resolved, so a
//! `ResolvedPage` is plain owned data that can move between workers.

use super::dom::{parse_selector, Document, SelectorError};
use super::resolver::ResolveError;
use crate::url::{split_id_and_slug, StoryIdentity};
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use ego_tree::NodeId;
use scraper::Selector;
use serde::Serialize;
use tracing::debug;

/// Container of the story text
pub const STORY_BODY_SELECTOR: &str = r#".item-page div[itemprop="articleBody"]"#;

const VIEW_COUNT_PREFIX: &str = "UserPageVisits:";

/// One entry of a story's tag list
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StoryTag {
    pub id: String,
    pub slug: String,
    pub name: String,
}

/// Precompiled selectors for the metadata fields
#[derive(Debug)]
pub struct PageSelectors {
    body: Selector,
    title: Selector,
    head_title: Selector,
    author: Selector,
    category: Selector,
    hits: Selector,
    tags: Selector,
    tag_link: Selector,
    time_published: Selector,
    dd_published: Selector,
    meta_published: Selector,
}

impl PageSelectors {
    pub fn new() -> Result<Self, SelectorError> {
        Ok(Self {
            body: parse_selector(STORY_BODY_SELECTOR)?,
            title: parse_selector(r#".item-page .page-header h2[itemprop="name"]"#)?,
            head_title: parse_selector("head title")?,
            author: parse_selector(r#"[itemprop="author"] [itemprop="name"]"#)?,
            category: parse_selector(".category-name a")?,
            hits: parse_selector(r#".hits [itemprop="interactionCount"]"#)?,
            tags: parse_selector("ul.tags li")?,
            tag_link: parse_selector("a")?,
            time_published: parse_selector(r#"time[itemprop="datePublished"]"#)?,
            dd_published: parse_selector("dd.published")?,
            meta_published: parse_selector(
                r#"meta[itemprop="datePublished"], meta[property="article:published_time"]"#,
            )?,
        })
    }

    /// Selector for the story text container
    pub fn body(&self) -> &Selector {
        &self.body
    }
}

/// A page reduced to its story content, with its canonical identity
///
/// Holds the serialized cleaned document rather than a live tree; call
/// [`ResolvedPage::document`] for a mutable copy.
#[derive(Debug, Clone)]
pub struct ResolvedPage {
    identity: StoryIdentity,
    html: String,
    body_html: String,
    title: String,
    author: String,
    category_name: String,
    category_link: Option<String>,
    publish_date: Option<DateTime<FixedOffset>>,
    tags: Vec<StoryTag>,
    view_count: Option<u64>,
    word_count: usize,
}

impl ResolvedPage {
    /// Reads all metadata out of a cleaned document
    ///
    /// # Arguments
    ///
    /// * `identity` - Canonical identity already extracted from the page
    /// * `doc` - The cleaned document
    /// * `selectors` - Precompiled field selectors
    /// * `date_override` - Literal publish date patched in for pages whose
    ///   own date is broken
    pub(crate) fn extract(
        identity: StoryIdentity,
        doc: &Document,
        selectors: &PageSelectors,
        date_override: Option<DateTime<FixedOffset>>,
    ) -> Self {
        let bodies = doc.select(&selectors.body);
        let body_html = bodies
            .first()
            .map(|id| doc.inner_html(*id))
            .unwrap_or_default();
        let word_count = bodies
            .iter()
            .map(|id| doc.text(*id).split_whitespace().count())
            .sum();

        let title = first_text(doc, &selectors.title)
            .filter(|t| !t.is_empty())
            .or_else(|| first_text(doc, &selectors.head_title))
            .unwrap_or_default();

        let category = doc.select_first(&selectors.category);
        let category_name = category
            .map(|id| doc.text(id).trim().to_string())
            .unwrap_or_default();
        let category_link = category.and_then(|id| doc.attr(id, "href").map(str::to_string));

        let publish_date = date_override.or_else(|| find_publish_date(doc, selectors));

        let view_count = doc
            .select_first(&selectors.hits)
            .and_then(|id| doc.attr(id, "content"))
            .and_then(parse_view_count);
        if view_count.is_none() {
            debug!("no view counter in page {}", identity);
        }

        let tags = doc
            .select(&selectors.tags)
            .into_iter()
            .map(|li| parse_tag(doc, li, &selectors.tag_link))
            .collect();

        Self {
            author: all_text(doc, &selectors.author),
            html: doc.html(),
            identity,
            body_html,
            title,
            category_name,
            category_link,
            publish_date,
            tags,
            view_count,
            word_count,
        }
    }

    pub fn identity(&self) -> &StoryIdentity {
        &self.identity
    }

    /// The whole cleaned document
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Inner HTML of the story text container
    pub fn body_html(&self) -> &str {
        &self.body_html
    }

    /// Parses the cleaned document into a tree that can be edited
    pub fn document(&self) -> Document {
        Document::parse(&self.html)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Author names as printed in the byline
    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn category_name(&self) -> &str {
        &self.category_name
    }

    pub fn category_link(&self) -> Option<&str> {
        self.category_link.as_deref()
    }

    /// Publish date of the story
    ///
    /// # Returns
    ///
    /// * `Ok(DateTime)` - From the page, or from the override table
    /// * `Err(ResolveError::MissingDate)` - No known location held a date
    pub fn publish_date(&self) -> Result<DateTime<FixedOffset>, ResolveError> {
        self.publish_date.ok_or_else(|| ResolveError::MissingDate {
            id: self.identity.id.clone(),
        })
    }

    pub fn tags(&self) -> &[StoryTag] {
        &self.tags
    }

    /// Site-reported page views, if the counter was present
    pub fn view_count(&self) -> Option<u64> {
        self.view_count
    }

    /// Whitespace-separated words in the story text
    pub fn word_count(&self) -> usize {
        self.word_count
    }
}

fn first_text(doc: &Document, selector: &Selector) -> Option<String> {
    doc.select_first(selector)
        .map(|id| doc.text(id).trim().to_string())
}

fn all_text(doc: &Document, selector: &Selector) -> String {
    let joined: String = doc
        .select(selector)
        .into_iter()
        .map(|id| doc.text(id))
        .collect();
    joined.trim().to_string()
}

/// Tries each known date location in turn
fn find_publish_date(doc: &Document, selectors: &PageSelectors) -> Option<DateTime<FixedOffset>> {
    let attr_of = |selector: &Selector, name: &str| {
        doc.select_first(selector)
            .and_then(|id| doc.attr(id, name))
            .map(str::to_string)
    };

    if let Some(date) = attr_of(&selectors.time_published, "datetime")
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    {
        return Some(date);
    }

    if let Some(date) = first_text(doc, &selectors.dd_published).and_then(|s| parse_labeled_date(&s))
    {
        return Some(date);
    }

    attr_of(&selectors.meta_published, "content")
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
}

/// Parses a labeled field such as `Published: 10 March 2016` as midnight UTC
fn parse_labeled_date(text: &str) -> Option<DateTime<FixedOffset>> {
    let value = match text.split_once(':') {
        Some((_, rest)) => rest.trim(),
        None => text.trim(),
    };
    let date = NaiveDate::parse_from_str(value, "%d %B %Y").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(FixedOffset::east_opt(0)?.from_utc_datetime(&midnight))
}

fn parse_view_count(content: &str) -> Option<u64> {
    content
        .trim()
        .strip_prefix(VIEW_COUNT_PREFIX)?
        .trim()
        .parse()
        .ok()
}

/// Parses one `ul.tags li` entry
///
/// The id comes from the first class (`tag-<n>`), the slug from the link's
/// last path segment (`<n>-<slug>`).
fn parse_tag(doc: &Document, li: NodeId, link: &Selector) -> StoryTag {
    let id = doc
        .attr(li, "class")
        .and_then(|class| class.split_whitespace().next())
        .and_then(|first| first.strip_prefix("tag-"))
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or_default()
        .to_string();

    let anchor = doc
        .element(li)
        .and_then(|e| e.select(link).next())
        .map(|a| a.id());

    let slug = anchor
        .and_then(|a| doc.attr(a, "href"))
        .and_then(|href| {
            let last = href.rsplit('/').next()?;
            split_id_and_slug(last).map(|(_, slug)| slug.to_string())
        })
        .unwrap_or_default();

    let name = anchor
        .map(|a| doc.text(a).trim().to_string())
        .unwrap_or_default();

    StoryTag { id, slug, name }
}
