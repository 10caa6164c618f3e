//! A single declarative fix-up rule
//!
//! A rule picks target elements inside the story body (by selector, or by
//! the paragraphs containing a piece of text), optionally moves the
//! selection with modifiers, then applies one action to the targets.

use super::RuleError;
use crate::page::{parse_selector, Document};
use ego_tree::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// One fix-up rule as written in the rule file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TypoFix {
    /// Selector, relative to the story body
    #[serde(rename = "select", skip_serializing_if = "String::is_empty")]
    pub select: String,

    /// Text to find; without a selector, targets the body paragraphs
    /// containing it
    #[serde(rename = "findtext", skip_serializing_if = "String::is_empty")]
    pub find_text: String,

    /// Not supported; rules using it are skipped
    #[serde(rename = "findhtml", skip_serializing_if = "String::is_empty")]
    pub find_html: String,

    #[serde(rename = "selectmod", skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<String>,

    #[serde(rename = "replacetext", skip_serializing_if = "String::is_empty")]
    pub replace_text: String,

    #[serde(rename = "replace", skip_serializing_if = "String::is_empty")]
    pub replace_html: String,

    /// Older spelling of `replace`; wins when both are set
    #[serde(rename = "replacehtml", skip_serializing_if = "String::is_empty")]
    pub replace_html_alt: String,

    #[serde(rename = "attr", skip_serializing_if = "String::is_empty")]
    pub attribute: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub action: String,

    /// Name of a library list to splice in place of this rule
    #[serde(skip_serializing_if = "String::is_empty")]
    pub include: String,

    /// Comma-separated contexts the rule runs in; empty means always
    #[serde(rename = "onlywhen", skip_serializing_if = "String::is_empty")]
    pub only_when: String,
}

/// What a rule does to its targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Unwrap,
    Wrap,
    WrapAll,
    WrapInner,
    DeleteAttr,
    SetAttr,
    InsertBefore,
    ReplaceText,
    ReplaceHtml,
    ParagraphsToLinebreaks,
}

impl Action {
    /// Parses an action name, ignoring ASCII case
    pub fn parse(name: &str) -> Option<Self> {
        const NAMES: &[(&str, Action)] = &[
            ("unwrap", Action::Unwrap),
            ("wrap", Action::Wrap),
            ("wrapAll", Action::WrapAll),
            ("wrapInner", Action::WrapInner),
            ("deleteAttr", Action::DeleteAttr),
            ("setAttr", Action::SetAttr),
            ("insertBefore", Action::InsertBefore),
            ("replaceText", Action::ReplaceText),
            ("replaceHtml", Action::ReplaceHtml),
            ("paragraphsToLinebreaks", Action::ParagraphsToLinebreaks),
        ];
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name.trim()))
            .map(|(_, a)| *a)
    }
}

/// Selection modifier, applied in order after the initial selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// Replace each target with its parent
    Parent,
    /// Add each target's next element sibling
    AddNextSibling,
    /// Replace each target with its next element sibling
    NextSibling,
}

impl Modifier {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "parent" => Some(Self::Parent),
            "addNextSibling" => Some(Self::AddNextSibling),
            "nextSibling" => Some(Self::NextSibling),
            _ => None,
        }
    }
}

impl TypoFix {
    /// Returns true if the rule runs in the given context
    pub fn applies_in(&self, context: &str) -> bool {
        self.only_when.trim().is_empty()
            || self.only_when.split(',').any(|tag| tag.trim() == context)
    }

    /// The action to run, after applying the implicit forms
    ///
    /// A rule with `findtext` and `replacetext` replaces text whatever its
    /// `action` says.
    pub fn action(&self) -> Result<Action, RuleError> {
        if !self.find_text.is_empty() && !self.replace_text.is_empty() {
            return Ok(Action::ReplaceText);
        }
        Action::parse(&self.action).ok_or_else(|| RuleError::UnknownAction(self.action.clone()))
    }

    /// Replacement HTML, honoring the older field name
    pub fn replacement(&self) -> &str {
        if self.replace_html_alt.is_empty() {
            &self.replace_html
        } else {
            &self.replace_html_alt
        }
    }

    /// Resolves the rule's targets
    ///
    /// # Arguments
    ///
    /// * `doc` - Document to search
    /// * `scope` - CSS of the story body; the rule selector is appended to it
    ///   the way a descendant selector would be
    pub fn targets(&self, doc: &Document, scope: &str) -> Result<Vec<NodeId>, RuleError> {
        if !self.find_html.is_empty() {
            return Err(RuleError::Unsupported("findhtml"));
        }

        let mut targets = if !self.select.is_empty() {
            let selector = parse_selector(&format!("{} {}", scope, self.select))?;
            doc.select(&selector)
        } else if !self.find_text.is_empty() {
            let paragraphs = parse_selector(&format!("{} p", scope))?;
            doc.select(&paragraphs)
                .into_iter()
                .filter(|id| doc.text(*id).contains(&self.find_text))
                .collect()
        } else {
            return Err(RuleError::NoTarget);
        };

        for name in &self.modifiers {
            match Modifier::parse(name) {
                Some(modifier) => targets = apply_modifier(doc, &targets, modifier),
                None => warn!("ignoring unknown selection modifier {:?}", name),
            }
        }
        Ok(targets)
    }

    /// Applies the rule to a document
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - Number of targets the action ran on
    /// * `Err(RuleError)` - The rule is malformed; the document is untouched
    pub fn apply(&self, doc: &mut Document, scope: &str) -> Result<usize, RuleError> {
        let action = self.action()?;
        let targets = self.targets(doc, scope)?;

        match action {
            Action::Unwrap => {
                for parent in unique_parents(doc, &targets) {
                    doc.unwrap(parent);
                }
            }
            Action::Wrap => {
                for id in &targets {
                    doc.wrap(*id, self.replacement());
                }
            }
            Action::WrapAll => doc.wrap_all(&targets, self.replacement()),
            Action::WrapInner => {
                for id in &targets {
                    doc.wrap_inner(*id, self.replacement());
                }
            }
            Action::DeleteAttr => {
                let attr = self.required_attribute("deleteAttr")?;
                for id in &targets {
                    doc.remove_attr(*id, attr);
                }
            }
            Action::SetAttr => {
                let attr = self.required_attribute("setAttr")?;
                for id in &targets {
                    doc.set_attr(*id, attr, self.replacement());
                }
            }
            Action::InsertBefore => {
                for id in &targets {
                    doc.insert_html_before(*id, self.replacement());
                }
            }
            Action::ReplaceText => {
                if self.find_text.is_empty() {
                    return Err(RuleError::MissingField {
                        action: "replaceText",
                        field: "findtext",
                    });
                }
                for id in &targets {
                    if !doc.is_attached(*id) {
                        continue;
                    }
                    let html = doc
                        .outer_html(*id)
                        .replace(&self.find_text, &self.replace_text);
                    doc.replace_with_html(*id, &html);
                }
            }
            Action::ReplaceHtml => {
                for id in &targets {
                    doc.replace_with_html(*id, self.replacement());
                }
            }
            Action::ParagraphsToLinebreaks => paragraphs_to_linebreaks(doc, &targets)?,
        }

        Ok(targets.len())
    }

    fn required_attribute(&self, action: &'static str) -> Result<&str, RuleError> {
        if self.attribute.is_empty() {
            Err(RuleError::MissingField {
                action,
                field: "attr",
            })
        } else {
            Ok(&self.attribute)
        }
    }
}

fn apply_modifier(doc: &Document, targets: &[NodeId], modifier: Modifier) -> Vec<NodeId> {
    match modifier {
        Modifier::Parent => unique_parents(doc, targets),
        Modifier::NextSibling => dedup(
            targets
                .iter()
                .filter_map(|id| doc.next_element_sibling(*id)),
        ),
        Modifier::AddNextSibling => dedup(
            targets.iter().copied().chain(
                targets
                    .iter()
                    .filter_map(|id| doc.next_element_sibling(*id)),
            ),
        ),
    }
}

fn unique_parents(doc: &Document, targets: &[NodeId]) -> Vec<NodeId> {
    dedup(targets.iter().filter_map(|id| doc.parent_element(*id)))
}

fn dedup(ids: impl Iterator<Item = NodeId>) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Ends each target with a line break, then dissolves the paragraphs that
/// sit inside the targets so their content flows into one block
fn paragraphs_to_linebreaks(doc: &mut Document, targets: &[NodeId]) -> Result<(), RuleError> {
    let inner = parse_selector("p > *")?;

    for id in targets {
        doc.append_html(*id, "<br>");
    }

    let mut paragraphs = Vec::new();
    for id in targets {
        let Some(target) = doc.element(*id) else {
            continue;
        };
        let children: Vec<NodeId> = target.select(&inner).map(|e| e.id()).collect();
        paragraphs.extend(unique_parents(doc, &children));
    }
    for paragraph in dedup(paragraphs.into_iter()) {
        doc.unwrap(paragraph);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::STORY_BODY_SELECTOR;

    fn story(body: &str) -> Document {
        Document::parse(&format!(
            r#"<html><body><div class="item-page"><div itemprop="articleBody">{}</div></div></body></html>"#,
            body
        ))
    }

    fn body_html(doc: &Document) -> String {
        let body = doc
            .select_first(&parse_selector(STORY_BODY_SELECTOR).unwrap())
            .unwrap();
        doc.inner_html(body)
    }

    fn rule(yaml: &str) -> TypoFix {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn apply(doc: &mut Document, fix: &TypoFix) -> usize {
        fix.apply(doc, STORY_BODY_SELECTOR).unwrap()
    }

    #[test]
    fn test_deserialize_field_names() {
        let fix = rule(
            "select: p.x\nselectmod: [parent]\nreplace: <hr>\nattr: style\naction: setAttr\nonlywhen: ebook,web\n",
        );
        assert_eq!(fix.select, "p.x");
        assert_eq!(fix.modifiers, vec!["parent".to_string()]);
        assert_eq!(fix.replacement(), "<hr>");
        assert_eq!(fix.attribute, "style");
        assert_eq!(fix.action().unwrap(), Action::SetAttr);
    }

    #[test]
    fn test_replacehtml_alias_wins() {
        let fix = rule("replace: <b>a</b>\nreplacehtml: <i>b</i>\n");
        assert_eq!(fix.replacement(), "<i>b</i>");
    }

    #[test]
    fn test_only_when_gate() {
        assert!(rule("action: unwrap\n").applies_in("ebook"));
        assert!(rule("onlywhen: web, ebook\n").applies_in("ebook"));
        assert!(!rule("onlywhen: web\n").applies_in("ebook"));
    }

    #[test]
    fn test_findtext_implies_replace_text() {
        let fix = rule("findtext: teh\nreplacetext: the\n");
        assert_eq!(fix.action().unwrap(), Action::ReplaceText);

        let mut doc = story("<p>teh cat sat on teh mat</p><p>a dog</p>");
        assert_eq!(apply(&mut doc, &fix), 1);
        assert_eq!(
            body_html(&doc),
            "<p>the cat sat on the mat</p><p>a dog</p>"
        );
    }

    #[test]
    fn test_selector_is_scoped_to_body() {
        let mut doc = Document::parse(
            r#"<html><body><p class="x">outside</p><div class="item-page"><div itemprop="articleBody"><p class="x">inside</p></div></div></body></html>"#,
        );
        let fix = rule("select: p.x\naction: replacehtml\nreplace: <hr>\n");
        assert_eq!(apply(&mut doc, &fix), 1);
        assert!(doc.html().contains("outside"));
        assert_eq!(body_html(&doc), "<hr>");
    }

    #[test]
    fn test_unwrap() {
        let mut doc = story("<div class=\"w\"><p>a</p><p>b</p></div>");
        let fix = rule("select: div.w > p\naction: unwrap\n");
        apply(&mut doc, &fix);
        assert_eq!(body_html(&doc), "<p>a</p><p>b</p>");
    }

    #[test]
    fn test_wrap_all_with_add_next_sibling() {
        let mut doc = story("<p class=\"s\">a</p><p>b</p><p>c</p>");
        let fix = rule(
            "select: p.s\nselectmod: [addNextSibling]\naction: wrapAll\nreplace: <blockquote></blockquote>\n",
        );
        assert_eq!(apply(&mut doc, &fix), 2);
        assert_eq!(
            body_html(&doc),
            "<blockquote><p class=\"s\">a</p><p>b</p></blockquote><p>c</p>"
        );
    }

    #[test]
    fn test_next_sibling_and_delete_attr() {
        let mut doc = story("<p class=\"s\">a</p><p style=\"x\">b</p>");
        let fix = rule("select: p.s\nselectmod: [nextSibling]\naction: deleteAttr\nattr: style\n");
        apply(&mut doc, &fix);
        assert_eq!(body_html(&doc), "<p class=\"s\">a</p><p>b</p>");
    }

    #[test]
    fn test_parent_modifier_and_insert_before() {
        let mut doc = story("<p><em>a</em></p>");
        let fix = rule("select: em\nselectmod: [parent]\naction: insertBefore\nreplace: <h3>Part 2</h3>\n");
        apply(&mut doc, &fix);
        assert_eq!(body_html(&doc), "<h3>Part 2</h3><p><em>a</em></p>");
    }

    #[test]
    fn test_wrap_inner() {
        let mut doc = story("<p>song</p>");
        let fix = rule("select: p\naction: wrapInner\nreplace: <i></i>\n");
        apply(&mut doc, &fix);
        assert_eq!(body_html(&doc), "<p><i>song</i></p>");
    }

    #[test]
    fn test_paragraphs_to_linebreaks() {
        let mut doc = story("<div class=\"letter\"><p><span>one</span></p><p><span>two</span></p></div>");
        let fix = rule("select: div.letter\naction: paragraphsToLinebreaks\n");
        apply(&mut doc, &fix);
        assert_eq!(
            body_html(&doc),
            "<div class=\"letter\"><span>one</span><span>two</span><br></div>"
        );
    }

    #[test]
    fn test_paragraphs_to_linebreaks_on_paragraphs() {
        let mut doc = story("<h4>x</h4><p>line one</p><p>line two</p>");
        let fix = rule("select: p\naction: paragraphsToLinebreaks\n");
        assert_eq!(apply(&mut doc, &fix), 2);
        assert_eq!(body_html(&doc), "<h4>x</h4>line one<br>line two<br>");
    }

    #[test]
    fn test_malformed_rules_are_errors() {
        let mut doc = story("<p>a</p>");

        let unknown = rule("select: p\naction: explode\n");
        assert!(matches!(
            unknown.apply(&mut doc, STORY_BODY_SELECTOR),
            Err(RuleError::UnknownAction(_))
        ));

        let find_html = rule("findhtml: <b>\naction: unwrap\n");
        assert!(matches!(
            find_html.apply(&mut doc, STORY_BODY_SELECTOR),
            Err(RuleError::Unsupported("findhtml"))
        ));

        let no_attr = rule("select: p\naction: deleteAttr\n");
        assert!(matches!(
            no_attr.apply(&mut doc, STORY_BODY_SELECTOR),
            Err(RuleError::MissingField { .. })
        ));

        assert_eq!(body_html(&doc), "<p>a</p>");
    }
}
