//! Page model and content resolver
//!
//! This module handles everything between raw page bytes and story content:
//! - An editable HTML document over a node arena
//! - Chrome stripping with a closed keep set
//! - Canonical identity extraction
//! - Story metadata (title, byline, date, tags, counts)

mod dom;
mod metadata;
mod resolver;

pub use dom::{parse_selector, Document, SelectorError};
pub use metadata::{PageSelectors, ResolvedPage, StoryTag, STORY_BODY_SELECTOR};
pub use resolver::{ResolveError, Resolver};
