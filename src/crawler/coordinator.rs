//! Crawler coordinator - the staged crawl pipeline
//!
//! This module wires the four stages of a crawl together:
//! - A producer emitting story ids
//! - A fixed pool of async fetch workers (cache check, fetch, resolve, filter)
//! - A fixed pool of blocking processing workers applying a [`Transform`]
//! - A collector that sorts the records once every upstream stage is done
//!
//! Stages are joined by unbounded channels. Each stage's output channel
//! closes only after every worker of that stage has exited, so the
//! collector sees exactly the records the workers produced.
//!
//! A failing processing worker raises a shared stop flag; the fetch pool is
//! aborted as soon as it is seen, so no further ids are requested.

use crate::config::CrawlConfig;
use crate::crawler::access::SiteAccess;
use crate::crawler::scheduler::Scheduler;
use crate::output::CrawlSummary;
use crate::page::ResolvedPage;
use crate::state::{FailureKind, PageState};
use crate::url::{classify_category, CategoryClassification};
use crate::{Result, WhateleyError};
use std::cmp::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::{self, JoinHandle, JoinSet};

/// Per-page work done by the processing stage
///
/// One `WorkerState` is created per processing worker and handed back in
/// [`CrawlOutcome::worker_states`] when the pool has drained, so transforms
/// can accumulate sets without sharing them across threads.
pub trait Transform: Send + Sync + 'static {
    /// Result sent to the collector for each page
    type Record: Send + 'static;

    /// Worker-local accumulator
    type WorkerState: Default + Send + 'static;

    /// Turns one accepted page into a record
    ///
    /// An error here is fatal to the crawl.
    fn apply(&self, page: &ResolvedPage, state: &mut Self::WorkerState) -> Result<Self::Record>;

    /// Sort order of the collected records
    fn compare(&self, a: &Self::Record, b: &Self::Record) -> Ordering;
}

/// Everything a finished crawl produced
pub struct CrawlOutcome<T: Transform> {
    /// Collected records, sorted with [`Transform::compare`]
    pub records: Vec<T::Record>,

    /// One state per processing worker
    pub worker_states: Vec<T::WorkerState>,

    pub summary: CrawlSummary,
}

/// Runs a full crawl over the configured id range
///
/// # Arguments
///
/// * `access` - Shared cache-backed site accessor
/// * `crawl` - Id range, skip list, and category filter
/// * `fetch_workers` - Size of the fetch pool (at least one worker runs)
/// * `transform` - Work applied to every accepted page
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Every stage finished; skipped stories are counted
///   in the summary
/// * `Err(WhateleyError)` - A story failed for a reason that is not
///   skippable; the error carries the story id
pub async fn run_pipeline<T: Transform>(
    access: Arc<SiteAccess>,
    crawl: &CrawlConfig,
    fetch_workers: usize,
    transform: Arc<T>,
) -> Result<CrawlOutcome<T>> {
    let started = Instant::now();
    let crawl = Arc::new(crawl.clone());
    let fetch_workers = fetch_workers.max(1);
    let process_workers = crawl.process_workers().max(1);

    let scheduler = Scheduler::new(&crawl);
    tracing::info!(
        "Starting crawl of {} ids with {} fetch and {} processing workers",
        scheduler.len(),
        fetch_workers,
        process_workers
    );

    let (id_tx, id_rx) = mpsc::unbounded_channel::<u64>();
    let (page_tx, page_rx) = mpsc::unbounded_channel::<ResolvedPage>();
    let (record_tx, record_rx) = mpsc::unbounded_channel::<T::Record>();

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let stop_tx = Arc::new(stop_tx);

    let producer = scheduler.spawn_producer(id_tx);
    let collector = spawn_collector(Arc::clone(&transform), record_rx);

    // Stage 3
    let page_rx = Arc::new(Mutex::new(page_rx));
    let mut processors: Vec<JoinHandle<Result<T::WorkerState>>> =
        Vec::with_capacity(process_workers);
    for _ in 0..process_workers {
        let transform = Arc::clone(&transform);
        let pages = Arc::clone(&page_rx);
        let records = record_tx.clone();
        let stop = Arc::clone(&stop_tx);
        processors.push(task::spawn_blocking(move || {
            let result = process_worker(transform.as_ref(), &pages, &records);
            if result.is_err() {
                stop.send_replace(true);
            }
            result
        }));
    }
    drop(record_tx);
    drop(page_rx);

    // Stage 2
    let id_rx = Arc::new(tokio::sync::Mutex::new(id_rx));
    let mut fetchers = JoinSet::new();
    for worker in 0..fetch_workers {
        fetchers.spawn(fetch_worker(
            worker,
            Arc::clone(&access),
            Arc::clone(&crawl),
            Arc::clone(&id_rx),
            page_tx.clone(),
        ));
    }
    drop(id_rx);

    let mut summary = CrawlSummary::default();
    let mut fatal: Option<WhateleyError> = None;
    let mut stopped = false;
    loop {
        tokio::select! {
            joined = fetchers.join_next() => {
                let Some(joined) = joined else {
                    break;
                };
                match joined {
                    Ok(Ok(local)) => summary.merge(&local),
                    Ok(Err(e)) => {
                        if fatal.is_none() {
                            tracing::error!("Stopping crawl: {}", error_chain(&e));
                            fetchers.abort_all();
                            fatal = Some(e);
                        }
                    }
                    Err(e) if e.is_cancelled() => {}
                    Err(e) => {
                        fetchers.abort_all();
                        fatal.get_or_insert(WhateleyError::Join(e));
                    }
                }
            }
            Ok(()) = stop_rx.changed(), if !stopped => {
                // The processing error itself is reported when that pool is joined
                tracing::error!("Processing failed; stopping fetch workers");
                fetchers.abort_all();
                stopped = true;
            }
        }
    }
    // Every fetch worker is gone; this closes the processing stage's input
    drop(page_tx);

    summary.emitted = producer.await?;

    let mut worker_states = Vec::with_capacity(process_workers);
    for handle in processors {
        match handle.await {
            Ok(Ok(state)) => worker_states.push(state),
            Ok(Err(e)) => {
                fatal.get_or_insert(e);
            }
            Err(e) => {
                fatal.get_or_insert(WhateleyError::Join(e));
            }
        }
    }

    let records = collector.await?;
    if let Some(e) = fatal {
        return Err(e);
    }

    summary.collected = records.len();
    summary.elapsed = started.elapsed();
    tracing::info!(
        "Crawl complete: {} ids, {} accepted, {} collected, {} skipped in {:.1}s",
        summary.emitted,
        summary.accepted,
        summary.collected,
        summary.total_skipped(),
        summary.elapsed.as_secs_f64()
    );

    Ok(CrawlOutcome {
        records,
        worker_states,
        summary,
    })
}

/// Stage 2: pulls ids until the producer is done
///
/// Skippable failures are counted in the returned summary; any other
/// failure ends the worker with the error.
async fn fetch_worker(
    worker: usize,
    access: Arc<SiteAccess>,
    crawl: Arc<CrawlConfig>,
    ids: Arc<tokio::sync::Mutex<UnboundedReceiver<u64>>>,
    pages: UnboundedSender<ResolvedPage>,
) -> Result<CrawlSummary> {
    let mut summary = CrawlSummary::default();

    loop {
        let next = ids.lock().await.recv().await;
        let Some(id) = next else {
            break;
        };

        let state = PageState::Pending.transition(PageState::Fetching)?;
        tracing::debug!("fetch worker {} took id {}", worker, id);

        let page = match access.get_story_by_id(id).await {
            Ok(page) => page,
            Err(e) => {
                let kind = FailureKind::classify(&e, &crawl);
                let failed = match kind {
                    FailureKind::CanonicalParse | FailureKind::ExcludedSection => {
                        PageState::ParseFailed
                    }
                    _ => PageState::FetchFailed,
                };
                state.transition(failed)?;

                if !kind.is_skippable() {
                    return Err(e);
                }
                tracing::debug!("skipping {} ({}): {}", id, kind, error_chain(&e));
                summary.record_skip(kind);
                continue;
            }
        };

        let state = state.transition(PageState::Resolved)?;
        summary.resolved += 1;

        let kind = match classify_category(page.identity(), &crawl) {
            CategoryClassification::Accepted => {
                state.transition(PageState::FilteredIn)?;
                summary.accepted += 1;
                if pages.send(page).is_err() {
                    // Every processing worker has exited; its error is reported
                    // when the pool is joined
                    tracing::warn!("processing stage closed; fetch worker {} stops", worker);
                    break;
                }
                continue;
            }
            CategoryClassification::ExcludedSection => FailureKind::ExcludedSection,
            CategoryClassification::Rejected => FailureKind::ExcludedCategory,
        };

        state.transition(PageState::FilteredOut)?;
        tracing::info!(
            "ignoring page {} with category {}",
            id,
            page.identity().category
        );
        summary.record_skip(kind);
    }

    Ok(summary)
}

/// Stage 3: applies the transform on a blocking thread until the page
/// channel closes
fn process_worker<T: Transform>(
    transform: &T,
    pages: &Mutex<UnboundedReceiver<ResolvedPage>>,
    records: &UnboundedSender<T::Record>,
) -> Result<T::WorkerState> {
    let mut state = T::WorkerState::default();

    loop {
        let next = match pages.lock() {
            Ok(mut rx) => rx.blocking_recv(),
            Err(_) => {
                return Err(WhateleyError::Invariant(
                    "page queue lock poisoned".to_string(),
                ))
            }
        };
        let Some(page) = next else {
            break;
        };

        let record = transform
            .apply(&page, &mut state)
            .map_err(|e| WhateleyError::for_story(page.identity().id.clone(), e))?;
        PageState::FilteredIn.transition(PageState::Done)?;

        if records.send(record).is_err() {
            return Err(WhateleyError::Invariant(
                "collector closed before the processing stage".to_string(),
            ));
        }
    }

    Ok(state)
}

/// Stage 4: gathers records in completion order, sorts them once the
/// channel closes
fn spawn_collector<T: Transform>(
    transform: Arc<T>,
    mut records: UnboundedReceiver<T::Record>,
) -> JoinHandle<Vec<T::Record>> {
    tokio::spawn(async move {
        let mut collected = Vec::new();
        while let Some(record) = records.recv().await {
            collected.push(record);
        }
        collected.sort_by(|a, b| transform.compare(a, b));
        collected
    })
}

/// Formats an error with its sources, outermost first
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FetchError;

    #[test]
    fn test_error_chain() {
        let err = WhateleyError::for_story(
            "12",
            FetchError::Status {
                url: "http://x/index.php".to_string(),
                status: 404,
            },
        );
        let chain = error_chain(&err);
        assert!(chain.starts_with("story 12: "));
        assert!(chain.contains("404"));
    }
}
