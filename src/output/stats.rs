//! Crawl and cache statistics
//!
//! This module provides the end-of-run summary (per-kind skip counts and
//! totals) and the cache contents report printed by the `stats` command.

use crate::state::FailureKind;
use crate::storage::{CacheStatistics, CacheStore};
use crate::Result;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counts for one crawl run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Ids handed out by the producer
    pub emitted: usize,

    /// Pages resolved to a canonical identity
    pub resolved: usize,

    /// Pages that passed the category filter
    pub accepted: usize,

    /// Records that reached the collector
    pub collected: usize,

    /// Stories dropped, by failure kind
    pub skipped: BTreeMap<FailureKind, usize>,

    pub elapsed: Duration,
}

impl CrawlSummary {
    /// Counts one dropped story
    pub fn record_skip(&mut self, kind: FailureKind) {
        *self.skipped.entry(kind).or_insert(0) += 1;
    }

    /// Adds another worker's counts to this one
    pub fn merge(&mut self, other: &CrawlSummary) {
        self.emitted += other.emitted;
        self.resolved += other.resolved;
        self.accepted += other.accepted;
        self.collected += other.collected;
        for (kind, count) in &other.skipped {
            *self.skipped.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn skipped_count(&self, kind: FailureKind) -> usize {
        self.skipped.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

/// Loads cache statistics from a cache backend
pub fn load_statistics(cache: &dyn CacheStore) -> Result<CacheStatistics> {
    Ok(cache.statistics()?)
}

/// Prints the end-of-run summary to stdout
///
/// # Arguments
///
/// * `summary` - Counts collected by the pipeline
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Ids requested: {}", summary.emitted);
    println!("  Pages resolved: {}", summary.resolved);
    println!("  Pages accepted: {}", summary.accepted);
    println!("  Records collected: {}", summary.collected);
    println!("  Elapsed: {:.1}s", summary.elapsed.as_secs_f64());
    println!();

    if summary.total_skipped() > 0 {
        println!("Skipped ({}):", summary.total_skipped());
        for kind in FailureKind::all() {
            let count = summary.skipped_count(*kind);
            if count > 0 {
                println!("  {}: {}", kind, count);
            }
        }
        println!();
    }
}

/// Prints cache statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CacheStatistics) {
    println!("=== Cache Statistics ===\n");

    println!("Pages:");
    println!("  Entries: {}", stats.page_count);
    println!("  Size: {}", human_bytes(stats.page_bytes));
    if let Some(oldest) = &stats.oldest_page {
        println!("  Least recently fetched: {}", oldest);
    }
    println!();

    println!("Assets:");
    println!("  Entries: {}", stats.asset_count);
    println!("  Size: {}", human_bytes(stats.asset_bytes));
    println!();

    println!("Schema migrations applied: {}", stats.migrations);
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
