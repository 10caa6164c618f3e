//! Rule table loaded from the YAML rule file
//!
//! Top-level keys are story ids, each mapping to a list of rules. The
//! `library` key holds named rule lists that story entries pull in with
//! `include`.

use super::typo::TypoFix;
use super::RuleError;
use crate::config::hash_bytes;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

const LIBRARY_KEY: &str = "library";

/// All rules, keyed by story id, plus the shared library
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleTable {
    #[serde(flatten)]
    by_story: BTreeMap<String, Vec<TypoFix>>,
    library: BTreeMap<String, Vec<TypoFix>>,
}

impl RuleTable {
    /// Parses a rule file
    ///
    /// Story ids may be written as YAML integers or strings.
    pub fn from_yaml(source: &str) -> Result<Self, RuleError> {
        let mut table = Self::default();

        let mapping = match serde_yaml::from_str::<Value>(source)? {
            Value::Mapping(mapping) => mapping,
            Value::Null => return Ok(table),
            _ => return Err(RuleError::Format("top level must be a mapping".to_string())),
        };

        for (key, rules) in mapping {
            let key = match key {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => return Err(RuleError::InvalidStoryKey(format!("{:?}", other))),
            };

            if key == LIBRARY_KEY {
                if !rules.is_null() {
                    table.library = serde_yaml::from_value(rules)?;
                }
                continue;
            }

            if key.is_empty() || !key.chars().all(|c| c.is_ascii_digit()) {
                return Err(RuleError::InvalidStoryKey(key));
            }
            let rules: Vec<TypoFix> = if rules.is_null() {
                Vec::new()
            } else {
                serde_yaml::from_value(rules)?
            };
            table.by_story.insert(key, rules);
        }

        Ok(table)
    }

    /// Reads and parses the rule file, logging its digest
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML rule file
    ///
    /// # Returns
    ///
    /// * `Ok(RuleTable)` - Loaded table
    /// * `Err(RuleError::Io)` - File missing or unreadable
    /// * `Err(RuleError::Yaml | Format | InvalidStoryKey)` - Bad file contents
    pub fn load(path: &Path) -> Result<Self, RuleError> {
        let bytes = std::fs::read(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_yaml(&String::from_utf8_lossy(&bytes))?;

        info!(
            "loaded rules for {} stories and {} library lists from {} (sha256 {})",
            table.by_story.len(),
            table.library.len(),
            path.display(),
            hash_bytes(&bytes)
        );
        Ok(table)
    }

    /// Rules for one story with includes spliced in
    ///
    /// Includes expand one level; an include inside a library list is
    /// skipped with a warning.
    pub fn rules_for(&self, id: &str) -> Vec<&TypoFix> {
        let Some(rules) = self.by_story.get(id) else {
            return Vec::new();
        };

        let mut expanded = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.include.is_empty() {
                expanded.push(rule);
                continue;
            }
            match self.library.get(&rule.include) {
                Some(list) => {
                    for included in list {
                        if included.include.is_empty() {
                            expanded.push(included);
                        } else {
                            warn!(
                                "#{}: nested include {:?} in library list {:?} skipped",
                                id, included.include, rule.include
                            );
                        }
                    }
                }
                None => warn!("#{}: unknown library list {:?}", id, rule.include),
            }
        }
        expanded
    }

    /// Number of stories with rule entries
    pub fn story_count(&self) -> usize {
        self.by_story.len()
    }

    pub fn library(&self) -> &BTreeMap<String, Vec<TypoFix>> {
        &self.library
    }

    /// Serializes the table as pretty JSON
    pub fn to_json(&self) -> Result<String, RuleError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
