use crate::{UrlError, UrlResult};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use url::Url;

/// Ids whose canonical page needs extra query parameters to show the whole story
const URL_OVERRIDES: &[(&str, &str)] = &[
    ("341", "showall=&start=1"),
    ("342", "showall=&start=1"),
];

/// The `(category, id, slug)` triple naming one story page
///
/// Only `id` is stable: the site renames pages, so two identities are the
/// same story whenever their ids match, whatever their slug or category.
#[derive(Debug, Clone, Serialize)]
pub struct StoryIdentity {
    /// Category path, possibly nested (`the-library/stories`)
    pub category: String,
    /// Numeric story id, kept in its textual form
    pub id: String,
    /// URL slug; empty when only the id is known
    pub slug: String,
}

impl PartialEq for StoryIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StoryIdentity {}

impl Hash for StoryIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for StoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.slug.is_empty() {
            write!(f, "#{}", self.id)
        } else {
            write!(f, "{}/{}-{}", self.category, self.id, self.slug)
        }
    }
}

impl StoryIdentity {
    pub fn new(
        category: impl Into<String>,
        id: impl Into<String>,
        slug: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            id: id.into(),
            slug: slug.into(),
        }
    }

    /// An identity known only by its numeric id, as emitted by the scheduler
    pub fn from_id(id: u64) -> Self {
        Self::new("", id.to_string(), "")
    }

    /// The id as a number, if it is one
    pub fn numeric_id(&self) -> Option<u64> {
        self.id.parse().ok()
    }

    /// Cache key for the story's page; independent of slug and category
    pub fn cache_key(&self) -> String {
        format!("story-{}", self.id)
    }

    /// First segment of the category path
    pub fn section(&self) -> &str {
        self.category.split('/').next().unwrap_or_default()
    }

    /// Builds the URL used to request this story
    ///
    /// Without a slug the site's id-only article route is used; the site
    /// answers it with the same page as the slugged URL.
    ///
    /// # Arguments
    ///
    /// * `base` - Scheme and host of the site
    pub fn request_url(&self, base: &Url) -> UrlResult<Url> {
        let mut url = if self.slug.is_empty() {
            let mut url = base
                .join("/index.php")
                .map_err(|e| UrlError::Parse(e.to_string()))?;
            url.query_pairs_mut()
                .append_pair("option", "com_content")
                .append_pair("view", "article")
                .append_pair("id", &self.id);
            url
        } else {
            let path = if self.category.is_empty() {
                format!("/index.php/{}-{}", self.id, self.slug)
            } else {
                format!("/index.php/{}/{}-{}", self.category, self.id, self.slug)
            };
            base.join(&path).map_err(|e| UrlError::Parse(e.to_string()))?
        };

        if let Some((_, query)) = URL_OVERRIDES.iter().find(|(id, _)| *id == self.id) {
            if !self.slug.is_empty() {
                url.set_query(Some(query));
            }
        }

        Ok(url)
    }

    /// Parses the "print this page" link found in article chrome
    ///
    /// The link is the one place the site emits the current slug. Its path is
    /// `/index.php[/category...]/<id>-<slug>` with one to three category
    /// segments in between (or none).
    pub fn parse_print_link(href: &str) -> UrlResult<Self> {
        let path = link_path(href)?;
        let parts: Vec<&str> = path.split('/').collect();

        if parts.len() < 3 || !parts[0].is_empty() || parts[1] != "index.php" {
            return Err(malformed(href, "doesn't start with /index.php"));
        }
        if parts.len() > 5 {
            return Err(malformed(href, "wrong number of path segments"));
        }

        let (id, slug) = split_id_and_slug(parts[parts.len() - 1])
            .ok_or_else(|| malformed(href, "failed to extract id and slug"))?;

        Ok(Self::new(parts[2..parts.len() - 1].join("/"), id, slug))
    }

    /// Parses an absolute canonical story URL (`<base href>` or
    /// `<link rel=canonical>`): `/index.php/<category>/<id>-<slug>`
    pub fn parse_canonical_url(href: &str) -> UrlResult<Self> {
        let url = Url::parse(href).map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(url.scheme().to_string()));
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.collect())
            .unwrap_or_default();

        if segments.len() < 3 || segments[0] != "index.php" {
            return Err(malformed(href, "not a story URL"));
        }
        let category = segments[1];
        if !is_slug(category) {
            return Err(malformed(href, "bad category segment"));
        }
        let (id, slug) = split_id_and_slug(segments[2])
            .ok_or_else(|| malformed(href, "failed to extract id and slug"))?;

        Ok(Self::new(category, id, slug))
    }
}

/// First path segment after `/index.php` of a site link, if any
///
/// Used to name the site section of a page that could not be parsed as a
/// story, such as `/index.php/community/forum`.
pub fn section_of_link(href: &str) -> Option<String> {
    let path = link_path(href).ok()?;
    let mut parts = path.split('/').skip_while(|p| *p != "index.php").skip(1);
    parts
        .next()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn malformed(url: &str, reason: &str) -> UrlError {
    UrlError::Malformed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Path part of an absolute or root-relative link
fn link_path(href: &str) -> UrlResult<String> {
    match Url::parse(href) {
        Ok(url) => Ok(url.path().to_string()),
        Err(::url::ParseError::RelativeUrlWithoutBase) => Ok(href
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string()),
        Err(e) => Err(UrlError::Parse(format!("{}: {}", href, e))),
    }
}

fn is_slug(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Splits `279-hive-part-4` into `("279", "hive-part-4")`
pub(crate) fn split_id_and_slug(part: &str) -> Option<(&str, &str)> {
    let (id, slug) = part.split_once('-')?;
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) || !is_slug(slug) {
        return None;
    }
    Some((id, slug))
}
