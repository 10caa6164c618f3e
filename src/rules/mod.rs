//! Rule engine for story markup fix-ups
//!
//! This module handles the ebook preparation pass over a resolved page:
//! - Loading the YAML rule table (per-story rule lists and a shared library)
//! - Applying declarative rules (selection, modifiers, one action each)
//! - Normalizing scene separators to `<hr>`
//! - Repairing control characters left over from the source documents

mod separators;
mod table;
mod typo;

pub use separators::{divider_pattern, SeparatorNormalizer};
pub use table::RuleTable;
pub use typo::{Action, Modifier, TypoFix};

use crate::config::RulesConfig;
use crate::page::{parse_selector, Document, ResolvedPage, SelectorError, STORY_BODY_SELECTOR};
use crate::{StoryIdentity, WhateleyError};
use scraper::Selector;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Control characters found in story text, and their intended characters
const CONTROL_CHAR_FIXES: &[(&str, &str)] = &[
    ("\u{12}", "\u{2019}"),
    ("\u{16}", "\u{2014}"),
    ("\u{5}", "\u{2026}"),
    ("oe\u{1c}", "\u{153}"),
];

/// Errors from the rule file, a single rule, or the separator pattern
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("could not read rule file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("syntax error in rule file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("could not serialize rules: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad rule file: {0}")]
    Format(String),

    #[error("rule file key {0:?} is not a story id")]
    InvalidStoryKey(String),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("unknown action {0:?}")]
    UnknownAction(String),

    #[error("{0} is not supported")]
    Unsupported(&'static str),

    #[error("action {action} needs {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("rule has neither select nor findtext")]
    NoTarget,

    #[error("separator pattern does not compile: {0}")]
    SeparatorPattern(String),

    #[error("separator pattern failed self-test #{index} ({sample:?})")]
    SeparatorSelfTest { index: usize, sample: String },
}

/// Rule table, execution context, and compiled helpers for the ebook pass
///
/// Constructed once at startup and shared by reference.
#[derive(Debug)]
pub struct RuleEngine {
    table: RuleTable,
    context: String,
    body: Selector,
    separators: SeparatorNormalizer,
}

impl RuleEngine {
    /// Creates an engine; fails if the separator pattern fails its self-test
    ///
    /// # Arguments
    ///
    /// * `table` - Loaded rule table
    /// * `context` - Tag matched against each rule's `onlywhen` list
    pub fn new(table: RuleTable, context: impl Into<String>) -> Result<Self, RuleError> {
        Ok(Self {
            table,
            context: context.into(),
            body: parse_selector(STORY_BODY_SELECTOR)?,
            separators: SeparatorNormalizer::new()?,
        })
    }

    /// Loads the rule file named in the configuration
    pub fn from_config(config: &RulesConfig) -> Result<Self, RuleError> {
        let table = RuleTable::load(Path::new(&config.path))?;
        Self::new(table, config.context.clone())
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// Rules for a story, includes expanded
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<&TypoFix>)` - Possibly empty rule list
    /// * `Err(WhateleyError::Invariant)` - The identity has no slug, so it was
    ///   never resolved from a page
    pub fn rules_for(&self, identity: &StoryIdentity) -> Result<Vec<&TypoFix>, WhateleyError> {
        if identity.slug.is_empty() {
            return Err(WhateleyError::Invariant(format!(
                "story {} has an empty slug at rule lookup",
                identity.id
            )));
        }
        let rules = self.table.rules_for(&identity.id);
        debug!("#{}: {} typo fixes", identity.id, rules.len());
        Ok(rules)
    }

    /// Applies rules in order
    ///
    /// Rules gated out by `onlywhen` are skipped. A malformed rule is logged
    /// and skipped; the remaining rules still run.
    ///
    /// # Returns
    ///
    /// The number of rules that ran.
    pub fn apply_rules(&self, doc: &mut Document, rules: &[&TypoFix]) -> usize {
        let mut applied = 0;
        for rule in rules {
            if !rule.applies_in(&self.context) {
                continue;
            }
            match rule.apply(doc, STORY_BODY_SELECTOR) {
                Ok(targets) => {
                    if targets == 0 {
                        debug!("rule {:?} matched nothing", rule);
                    }
                    applied += 1;
                }
                Err(e) => warn!("skipping rule {:?}: {}", rule, e),
            }
        }
        applied
    }

    /// Replaces scene dividers in the story body with `<hr>`
    pub fn normalize_separators(&self, doc: &mut Document) -> usize {
        self.separators.normalize(doc, &self.body)
    }

    /// Prepares a page for the ebook
    ///
    /// Order: control character repair, the story's rules, separator
    /// normalization. The page itself is not modified.
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - The fixed-up copy of the page
    /// * `Err(WhateleyError::Invariant)` - The page identity has no slug
    pub fn fix_for_ebook(&self, page: &ResolvedPage) -> Result<Document, WhateleyError> {
        let rules = self.rules_for(page.identity())?;
        let mut doc = page.document();

        let repaired = repair_control_chars(&mut doc, &self.body);
        let applied = self.apply_rules(&mut doc, &rules);
        let separators = self.normalize_separators(&mut doc);

        debug!(
            "#{}: repaired {} text nodes, ran {} rules, replaced {} separators",
            page.identity().id,
            repaired,
            applied,
            separators
        );
        Ok(doc)
    }
}

/// Replaces stray control characters in the story body's text
fn repair_control_chars(doc: &mut Document, body: &Selector) -> usize {
    let mut repaired = 0;
    for container in doc.select(body) {
        for id in doc.text_nodes(container) {
            let Some(text) = doc.text_value(id) else {
                continue;
            };
            if !text.contains(|c: char| c.is_control() && c != '\n' && c != '\t' && c != '\r') {
                continue;
            }
            let fixed = CONTROL_CHAR_FIXES
                .iter()
                .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to));
            doc.set_text(id, &fixed);
            repaired += 1;
        }
    }
    repaired
}
