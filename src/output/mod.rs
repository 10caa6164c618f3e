//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Counting and printing the end-of-run summary
//! - Printing cache contents statistics

pub mod stats;

pub use stats::{load_statistics, print_statistics, print_summary, CrawlSummary};
