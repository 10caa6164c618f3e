//! State module for tracking crawl progress
//!
//! This module provides the per-story state machine and the closed set of
//! failure kinds a story can end in.
//!
//! # Components
//!
//! - `PageState`: Tracks one story id through the pipeline (pending, fetching, resolved, filtered, done)
//! - `FailureKind`: Structured classification of a failed story, deciding skip vs. abort

mod failure;
mod page_state;

// Re-export main types
pub use failure::FailureKind;
pub use page_state::PageState;
