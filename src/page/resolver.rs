//! Content resolver
//!
//! Turns a raw story page into a [`ResolvedPage`]:
//! 1. Parse the bytes into a fresh tree
//! 2. Compute the keep set and strip everything else
//! 3. Collapse whitespace-only text runs
//! 4. Read the canonical identity from the cleaned page
//! 5. Extract metadata, applying the publish date patch table

use super::dom::{parse_selector, Document, SelectorError};
use super::metadata::{PageSelectors, ResolvedPage};
use crate::url::{section_of_link, StoryIdentity};
use crate::UrlError;
use chrono::{DateTime, FixedOffset};
use ego_tree::NodeId;
use scraper::Selector;
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

/// Elements that survive chrome stripping, along with their subtrees and
/// ancestor chains
const KEEP_SELECTORS: &[&str] = &[
    "head base",
    r#"head link[rel="canonical"]"#,
    r#"meta[name="rights"]"#,
    r#"meta[http-equiv="content-type"]"#,
    "head title",
    "div.item-page",
    ".article-info",
    "ul.tags",
    r#"div[itemprop="articleBody"]"#,
];

/// Pages whose recorded publish date is wrong, with the date to use instead
const PUBLISH_DATE_OVERRIDES: &[(&str, &str)] = &[
    // Date of record is broken; sits between the previous and next chapter
    ("551", "2016-03-10T08:53:07-08:00"),
];

/// Errors produced while resolving a page
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("no print link, <base href> or canonical link in page")]
    MissingCanonical,

    /// The canonical link was found but is not a story URL
    #[error("could not parse canonical URL {href}")]
    Canonical {
        href: String,
        /// Site section the link points into, when one could be read
        section: Option<String>,
        #[source]
        source: UrlError,
    },

    #[error("no publish date found for story {id}")]
    MissingDate { id: String },
}

impl ResolveError {
    /// Site section named by an unparseable canonical link
    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Canonical { section, .. } => section.as_deref(),
            _ => None,
        }
    }

    fn canonical(href: &str, source: UrlError) -> Self {
        Self::Canonical {
            href: href.to_string(),
            section: section_of_link(href),
            source,
        }
    }
}

/// Page resolver with all selectors compiled up front
#[derive(Debug)]
pub struct Resolver {
    keep: Vec<Selector>,
    strip: Selector,
    print_link: Selector,
    base_href: Selector,
    canonical_link: Selector,
    fields: PageSelectors,
}

impl Resolver {
    pub fn new() -> Result<Self, ResolveError> {
        let keep = KEEP_SELECTORS
            .iter()
            .map(|css| parse_selector(css))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keep,
            strip: parse_selector("script, style")?,
            print_link: parse_selector(".print-icon a")?,
            base_href: parse_selector("head base")?,
            canonical_link: parse_selector(r#"head link[rel="canonical"]"#)?,
            fields: PageSelectors::new()?,
        })
    }

    /// Selectors for the metadata fields, including the story body
    pub fn selectors(&self) -> &PageSelectors {
        &self.fields
    }

    /// Resolves a raw page
    ///
    /// # Arguments
    ///
    /// * `raw` - Page bytes as fetched or as read from the cache
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedPage)` - Cleaned page with its canonical identity
    /// * `Err(ResolveError::MissingCanonical)` - Nothing identifies the page
    /// * `Err(ResolveError::Canonical)` - The identifying link is not a story URL
    pub fn resolve(&self, raw: &[u8]) -> Result<ResolvedPage, ResolveError> {
        let source = String::from_utf8_lossy(raw);
        let mut doc = Document::parse(&source);

        self.strip_chrome(&mut doc);
        let identity = self.canonical_identity(&doc)?;
        let date_override = publish_date_override(&identity.id);

        Ok(ResolvedPage::extract(
            identity,
            &doc,
            &self.fields,
            date_override,
        ))
    }

    /// Removes everything outside the keep set, then scripts and styles,
    /// then collapses whitespace-only text runs
    ///
    /// Running it again on its own output changes nothing.
    pub fn strip_chrome(&self, doc: &mut Document) {
        let keep = self.keep_set(doc);

        let mut stack = vec![doc.root_element()];
        let mut removed = 0usize;
        while let Some(id) = stack.pop() {
            for child in doc.children(id) {
                if doc.is_element(child) {
                    if keep.contains(&child) {
                        stack.push(child);
                    } else {
                        doc.remove(child);
                        removed += 1;
                    }
                } else if doc.text_value(child).is_none() {
                    // Comments and processing instructions
                    doc.remove(child);
                }
            }
        }

        for id in doc.select(&self.strip) {
            doc.remove(id);
        }

        let collapsed = collapse_whitespace(doc);
        debug!(
            "stripped {} elements, collapsed {} whitespace nodes",
            removed, collapsed
        );
    }

    /// Computes the closed keep set with a worklist
    ///
    /// Seeds are the keep selector matches. Every element below a seed is
    /// kept, as is every ancestor of a seed. The root element is always kept.
    fn keep_set(&self, doc: &Document) -> HashSet<NodeId> {
        let mut keep = HashSet::new();
        let mut seeds = Vec::new();
        for selector in &self.keep {
            for id in doc.select(selector) {
                if keep.insert(id) {
                    seeds.push(id);
                }
            }
        }

        let mut work = seeds.clone();
        while let Some(id) = work.pop() {
            for child in doc.children(id) {
                if doc.is_element(child) && keep.insert(child) {
                    work.push(child);
                }
            }
        }

        let mut climbed = HashSet::new();
        for seed in seeds {
            let mut current = doc.parent_element(seed);
            while let Some(id) = current {
                if !climbed.insert(id) {
                    break;
                }
                keep.insert(id);
                current = doc.parent_element(id);
            }
        }

        keep.insert(doc.root_element());
        keep
    }

    /// Reads the canonical identity from a cleaned page
    ///
    /// The print link is the only place the current slug is emitted, so it
    /// wins. `<base href>` and `<link rel="canonical">` are fallbacks.
    fn canonical_identity(&self, doc: &Document) -> Result<StoryIdentity, ResolveError> {
        if let Some(href) = first_href(doc, &self.print_link) {
            return StoryIdentity::parse_print_link(href)
                .map_err(|e| ResolveError::canonical(href, e));
        }

        let fallback =
            first_href(doc, &self.base_href).or_else(|| first_href(doc, &self.canonical_link));
        match fallback {
            Some(href) => {
                warn!("no print link, falling back to {}", href);
                StoryIdentity::parse_canonical_url(href)
                    .map_err(|e| ResolveError::canonical(href, e))
            }
            None => Err(ResolveError::MissingCanonical),
        }
    }
}

fn first_href<'a>(doc: &'a Document, selector: &Selector) -> Option<&'a str> {
    doc.select_first(selector)
        .and_then(|id| doc.attr(id, "href"))
        .filter(|href| !href.trim().is_empty())
}

/// Looks up a patched publish date for a story id
fn publish_date_override(id: &str) -> Option<DateTime<FixedOffset>> {
    PUBLISH_DATE_OVERRIDES
        .iter()
        .find(|(story, _)| *story == id)
        .and_then(|(_, date)| DateTime::parse_from_rfc3339(date).ok())
}

/// Merges adjacent whitespace-only text nodes into one newline and
/// normalizes a lone whitespace node containing a line break to a newline
fn collapse_whitespace(doc: &mut Document) -> usize {
    let mut collapsed = 0;
    for id in doc.text_nodes(doc.root_element()) {
        let Some(text) = doc.text_value(id) else {
            continue;
        };
        if !text.trim().is_empty() {
            continue;
        }
        let has_newline = text.contains('\n');

        let next_blank = doc
            .next_sibling(id)
            .filter(|next| doc.text_value(*next).map_or(false, |t| t.trim().is_empty()));

        if let Some(next) = next_blank {
            doc.set_text(next, "\n");
            doc.remove(id);
            collapsed += 1;
        } else if has_newline && text != "\n" {
            doc.set_text(id, "\n");
            collapsed += 1;
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORY_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <base href="http://whateleyacademy.net/index.php/stories/279-hive-part-4-who-dun-it" />
  <title>Hive Part 4</title>
  <script>var tracking = 1;</script>
  <link rel="stylesheet" href="/templates/x.css" />
</head>
<body>
  <div id="header"><ul class="menu"><li><a href="/">Home</a></li></ul></div>
  <!-- sidebar -->
  <div class="sidebar"><p>Ads</p></div>
  <div id="content">
    <div class="item-page">
      <ul class="actions"><li class="print-icon"><a href="/index.php/original-timeline/279-hive-part-4-who-dun-it?tmpl=component&amp;print=1">Print</a></li></ul>
      <div class="page-header"><h2 itemprop="name">Hive Part 4: Who Dun It?</h2></div>
      <dl class="article-info">
        <dd class="published"><time datetime="2015-06-01T10:00:00-07:00" itemprop="datePublished">1 June</time></dd>
      </dl>
      <div itemprop="articleBody">
        <p>The story.</p>


        <style>p { color: red }</style>
        <p>More story.</p>
      </div>
    </div>
    <div class="comments"><p>Nice!</p></div>
  </div>
  <div id="footer">Copyright</div>
</body>
</html>"#;

    fn resolver() -> Resolver {
        Resolver::new().unwrap()
    }

    #[test]
    fn test_resolve_story_page() {
        let page = resolver().resolve(STORY_PAGE.as_bytes()).unwrap();
        let id = page.identity();
        assert_eq!(id.id, "279");
        assert_eq!(id.slug, "hive-part-4-who-dun-it");
        assert_eq!(id.category, "original-timeline");
        assert_eq!(page.title(), "Hive Part 4: Who Dun It?");
        assert_eq!(page.word_count(), 4);
    }

    #[test]
    fn test_strip_removes_chrome() {
        let page = resolver().resolve(STORY_PAGE.as_bytes()).unwrap();
        let html = page.html();
        assert!(!html.contains("Ads"));
        assert!(!html.contains("Copyright"));
        assert!(!html.contains("Nice!"));
        assert!(!html.contains("tracking"));
        assert!(!html.contains("color: red"));
        assert!(!html.contains("sidebar"));
        assert!(!html.contains("stylesheet"));
        assert!(html.contains("<title>Hive Part 4</title>"));
        assert!(html.contains("The story."));
        assert!(html.contains(r#"id="content""#));
    }

    #[test]
    fn test_strip_is_idempotent() {
        let r = resolver();
        let mut doc = Document::parse(STORY_PAGE);
        r.strip_chrome(&mut doc);
        let once = doc.html();
        r.strip_chrome(&mut doc);
        assert_eq!(doc.html(), once);
    }

    #[test]
    fn test_whitespace_runs_collapse() {
        let page = resolver().resolve(STORY_PAGE.as_bytes()).unwrap();
        assert!(!page.html().contains("\n\n\n"));
        assert!(!page.html().contains("  <p>"));
    }

    #[test]
    fn test_base_href_fallback() {
        let html = STORY_PAGE.replace(r#"<li class="print-icon">"#, "<li>");
        let page = resolver().resolve(html.as_bytes()).unwrap();
        assert_eq!(page.identity().category, "stories");
        assert_eq!(page.identity().id, "279");
    }

    #[test]
    fn test_canonical_link_fallback() {
        let html = r#"<html><head><link rel="canonical" href="http://whateleyacademy.net/index.php/2nd-gen-canon/600-a-story"></head>
<body><div class="item-page"><div itemprop="articleBody"><p>x</p></div></div></body></html>"#;
        let page = resolver().resolve(html.as_bytes()).unwrap();
        assert_eq!(page.identity().id, "600");
        assert_eq!(page.identity().category, "2nd-gen-canon");
    }

    #[test]
    fn test_missing_canonical_is_error() {
        let err = resolver()
            .resolve(b"<html><body><p>hello</p></body></html>")
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingCanonical));
    }

    #[test]
    fn test_unparseable_canonical_carries_section() {
        let html = r#"<html><head><base href="http://whateleyacademy.net/index.php/community/forum"></head><body></body></html>"#;
        let err = resolver().resolve(html.as_bytes()).unwrap_err();
        assert!(matches!(err, ResolveError::Canonical { .. }));
        assert_eq!(err.section(), Some("community"));
    }

    #[test]
    fn test_publish_date_override() {
        let html = STORY_PAGE.replace("279-hive-part-4-who-dun-it", "551-hive-part-20");
        let page = resolver().resolve(html.as_bytes()).unwrap();
        assert_eq!(page.identity().id, "551");
        assert_eq!(
            page.publish_date().unwrap().to_rfc3339(),
            "2016-03-10T08:53:07-08:00"
        );
    }

    #[test]
    fn test_resolve_cleaned_output_again() {
        let r = resolver();
        let first = r.resolve(STORY_PAGE.as_bytes()).unwrap();
        let second = r.resolve(first.html().as_bytes()).unwrap();
        assert_eq!(second.identity(), first.identity());
        assert_eq!(second.identity().slug, first.identity().slug);
        assert_eq!(second.body_html(), first.body_html());
        assert_eq!(second.word_count(), first.word_count());
    }
}
