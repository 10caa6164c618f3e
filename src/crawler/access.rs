//! Cache-backed access to the story site
//!
//! Every lookup goes cache first. A missing or stale page is fetched,
//! resolved, and written back as its cleaned HTML under the story's id-based
//! key, so renamed pages keep hitting the same row. Check, fetch, and write
//! for one key run under that key's lock.

use super::fetcher::FetchClient;
use crate::config::Config;
use crate::page::{ResolvedPage, Resolver};
use crate::storage::{
    lock_cache, open_cache, CacheKind, CacheStatus, CacheStore, CachedBody, KeyLocks, SharedCache,
    SqliteCache,
};
use crate::url::{asset_cache_key, extract_host, StoryIdentity};
use crate::{Result, UrlError, WhateleyError};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::Url;

/// One occurrence of a search string in a cached story
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: u64,
    /// The match with the requested characters of context on each side
    pub snippet: String,
}

/// Site accessor shared by every worker
pub struct SiteAccess {
    base_url: Url,
    host: String,
    client: FetchClient,
    cache: SharedCache,
    locks: KeyLocks,
    resolver: Resolver,
}

impl SiteAccess {
    /// Opens the cache and builds the client from the configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SiteAccess)` - Ready accessor
    /// * `Err(WhateleyError)` - Cache could not be opened or migrated, or the
    ///   base URL or client is unusable
    pub fn new(config: &Config) -> Result<Self> {
        let cache = open_cache(&config.cache)?;
        Self::with_cache(config, cache)
    }

    /// Builds an accessor around an already opened cache
    pub fn with_cache(config: &Config, cache: SqliteCache) -> Result<Self> {
        let base_url = Url::parse(&config.client.base_url)?;
        let host = extract_host(&base_url)
            .ok_or_else(|| UrlError::Parse(format!("{} has no host", base_url)))?;
        let client = FetchClient::new(&config.client, config.cache.offline)?;

        Ok(Self {
            base_url,
            host,
            client,
            cache: Arc::new(Mutex::new(cache)),
            locks: KeyLocks::new(),
            resolver: Resolver::new()?,
        })
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_offline()
    }

    /// Gets a resolved story, from the cache when possible
    ///
    /// The request URL is built from the identity; the cache key only from
    /// its numeric id.
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedPage)` - The story
    /// * `Err(WhateleyError::Story)` - The failure, tagged with the story id
    pub async fn get_story(&self, identity: &StoryIdentity) -> Result<ResolvedPage> {
        self.load_story(identity)
            .await
            .map_err(|e| WhateleyError::for_story(identity.id.clone(), e))
    }

    /// Gets a resolved story by numeric id alone
    pub async fn get_story_by_id(&self, id: u64) -> Result<ResolvedPage> {
        self.get_story(&StoryIdentity::from_id(id)).await
    }

    async fn load_story(&self, identity: &StoryIdentity) -> Result<ResolvedPage> {
        let key = identity.cache_key();
        let _guard = self.locks.lock(&key).await;

        let status = lock_cache(&self.cache)?.check_stale(CacheKind::Page, &key, Utc::now())?;
        if let CacheStatus::Fresh(row_id) = status {
            let cached = lock_cache(&self.cache)?.read(CacheKind::Page, row_id)?;
            debug!("cache hit for {}", key);
            return Ok(self.resolver.resolve(&cached.body)?);
        }

        let url = identity.request_url(&self.base_url)?;
        let response = self.client.get(&url).await?;
        let page = self.resolver.resolve(&response.body)?;

        self.write_back(CacheKind::Page, status, &key, page.html().as_bytes(), None);
        Ok(page)
    }

    /// Gets an asset (image, stylesheet) from the site
    ///
    /// Only assets on the site's own host are served; the cache key is the
    /// URL path.
    ///
    /// # Returns
    ///
    /// * `Ok(CachedBody)` - Bytes with their content type
    /// * `Err(WhateleyError::UrlError)` - The asset is on another host
    /// * `Err(WhateleyError::Fetch)` - Not cached and could not be fetched
    pub async fn get_asset(&self, url: &Url) -> Result<CachedBody> {
        let key = asset_cache_key(url, &self.host)?;
        let _guard = self.locks.lock(&key).await;

        let status = lock_cache(&self.cache)?.check_stale(CacheKind::Asset, &key, Utc::now())?;
        if let CacheStatus::Fresh(row_id) = status {
            return Ok(lock_cache(&self.cache)?.read(CacheKind::Asset, row_id)?);
        }

        let response = self.client.get(url).await?;
        let content_type = response.content_type().map(str::to_string);
        self.write_back(
            CacheKind::Asset,
            status,
            &key,
            &response.body,
            content_type.as_deref(),
        );

        Ok(CachedBody {
            body: response.body,
            content_type,
        })
    }

    /// Writes fetched content to the cache, reusing the row of a stale entry
    ///
    /// A failed write is logged; the caller still gets the fetched content.
    fn write_back(
        &self,
        kind: CacheKind,
        status: CacheStatus,
        key: &str,
        body: &[u8],
        content_type: Option<&str>,
    ) {
        let written = lock_cache(&self.cache).and_then(|mut cache| {
            cache.write(kind, status.row_id(), key, body, content_type, Utc::now())
        });
        match written {
            Ok(row_id) => debug!("cached {} in row {}", key, row_id),
            Err(e) => warn!("could not cache {}: {}", key, e),
        }
    }

    /// Ids of cached stories containing `needle`, ascending
    ///
    /// Scans every cached page body; see [`CacheStore::pages_containing`].
    pub fn search_fulltext(&self, needle: &str) -> Result<Vec<u64>> {
        let keys = lock_cache(&self.cache)?.search_fulltext(needle.as_bytes())?;
        let mut ids: Vec<u64> = keys
            .iter()
            .filter_map(|key| key.strip_prefix("story-"))
            .filter_map(|id| id.parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    /// Every occurrence of `needle` in the cached stories, with context
    ///
    /// Stories that fail to load are logged and skipped.
    ///
    /// # Arguments
    ///
    /// * `needle` - Literal text to find
    /// * `before` - Characters of context before each match
    /// * `after` - Characters of context after each match
    pub async fn search_with_context(
        &self,
        needle: &str,
        before: usize,
        after: usize,
    ) -> Result<Vec<SearchHit>> {
        let mut hits = Vec::new();
        for id in self.search_fulltext(needle)? {
            let page = match self.get_story_by_id(id).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("{:3}: {:#}", id, e);
                    continue;
                }
            };
            hits.extend(
                snippets(page.html(), needle, before, after)
                    .into_iter()
                    .map(|snippet| SearchHit { id, snippet }),
            );
        }
        Ok(hits)
    }
}

/// Cuts each occurrence of `needle` out of `text` with surrounding context
///
/// Context is counted in characters, so multi-byte text is never split.
fn snippets(text: &str, needle: &str, before: usize, after: usize) -> Vec<String> {
    if needle.is_empty() {
        return Vec::new();
    }
    text.match_indices(needle)
        .map(|(start, matched)| {
            let end = start + matched.len();
            let from = if before == 0 {
                start
            } else {
                text[..start]
                    .char_indices()
                    .rev()
                    .nth(before - 1)
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            };
            let to = text[end..]
                .char_indices()
                .nth(after)
                .map(|(i, _)| end + i)
                .unwrap_or(text.len());
            text[from..to].to_string()
        })
        .collect()
}
