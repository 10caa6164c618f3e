//! Crawler module for story fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with an offline mode
//! - Cache-backed site access shared by all workers
//! - Id scheduling for the producer stage
//! - The staged pipeline and its report transforms

mod access;
mod coordinator;
mod fetcher;
mod report;
mod scheduler;

pub use access::{SearchHit, SiteAccess};
pub use coordinator::{run_pipeline, CrawlOutcome, Transform};
pub use fetcher::{build_http_client, FetchClient, FetchError, FetchResponse};
pub use report::{
    print_catalog, print_publication_order, print_word_counts, Catalog, CatalogSet,
    CategoryEntry, PublicationOrder, PublishedStory, StoryLength, WordCount,
};
pub use scheduler::Scheduler;

use crate::config::Config;
use crate::Result;
use std::sync::Arc;

/// Runs a complete crawl with the given transform
///
/// This is the main entry point for a crawl. It will:
/// 1. Open the cache and build the HTTP client
/// 2. Emit every id of the configured range
/// 3. Fetch, resolve, and filter pages with `client.max-concurrency` workers
/// 4. Apply the transform on `crawl.process-workers` workers
/// 5. Return the sorted records and the run summary
///
/// # Arguments
///
/// * `config` - The resolved configuration
/// * `transform` - Work applied to every accepted page
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Crawl completed
/// * `Err(WhateleyError)` - Setup failed, or a story failed fatally
pub async fn crawl<T: Transform>(config: &Config, transform: T) -> Result<CrawlOutcome<T>> {
    let access = Arc::new(SiteAccess::new(config)?);
    run_pipeline(
        access,
        &config.crawl,
        config.client.max_concurrency,
        Arc::new(transform),
    )
    .await
}
