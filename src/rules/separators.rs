//! Scene separator normalization
//!
//! Authors mark scene breaks with divider images, marker divs, styled rules,
//! or paragraphs of asterisks and spaces. All of them become a plain `<hr>`.

use super::RuleError;
use crate::page::{parse_selector, Document};
use ego_tree::NodeId;
use regex::Regex;
use scraper::Selector;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Elements inside the story body that are always dividers
const DIVIDER_SELECTORS: &[&str] = &[
    r#"* > img[src="/images/breaks/linebreak-bluearcs.jpg"]"#,
    r#"* > img[src="/images/hr1.gif"]"#,
    r#"center > img[alt="linebreak shadow"]"#,
    "div.hr",
    "div.hr2",
    "hr[style]",
];

/// Exact paragraph texts that are dividers
const DIVIDER_TEXTS: &[&str] = &[
    " ",
    "\u{a0}",
    "*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*",
];

/// Strings the pattern must match, checked when it is built
const SELF_TEST: &[&str] = &[
    "* * * *",
    " * * * * ",
    " ",
    "\u{a0}",
    "*\u{a0}*\u{a0}*\u{a0}*",
    "*\u{a0} *\u{a0} *\u{a0} *",
    "*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0} *\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}\u{a0}*",
    "\u{a0}*\u{a0}*\u{a0}*\u{a0}*\u{a0}",
];

/// Elements whose whole text may make them a divider
const TEXT_DIVIDER_TAGS: &[&str] = &["p", "div", "strong", "span"];

/// Wrappers replaced by their `<hr>` when it is their only content
const HR_WRAPPER_TAGS: &[&str] = &["p", "center"];

#[derive(Debug, Clone)]
enum PatternFailure {
    Build(String),
    SelfTest(usize),
}

static DIVIDER_PATTERN: OnceLock<Result<Regex, PatternFailure>> = OnceLock::new();

/// The divider text pattern, built and self-tested on first use
///
/// # Returns
///
/// * `Ok(&Regex)` - The shared pattern
/// * `Err(RuleError::SeparatorPattern | SeparatorSelfTest)` - The pattern is
///   broken; every later call fails the same way
pub fn divider_pattern() -> Result<&'static Regex, RuleError> {
    match DIVIDER_PATTERN.get_or_init(build_pattern) {
        Ok(regex) => Ok(regex),
        Err(PatternFailure::Build(reason)) => Err(RuleError::SeparatorPattern(reason.clone())),
        Err(PatternFailure::SelfTest(index)) => Err(RuleError::SeparatorSelfTest {
            index: *index,
            sample: SELF_TEST[*index].to_string(),
        }),
    }
}

fn build_pattern() -> Result<Regex, PatternFailure> {
    let mut alternatives = vec![r"[\*\p{Zs}]+".to_string()];
    alternatives.extend(DIVIDER_TEXTS.iter().map(|t| regex::escape(t)));
    let source = format!(r"\A({})\z", alternatives.join("|"));

    let regex = Regex::new(&source).map_err(|e| PatternFailure::Build(e.to_string()))?;
    check_pattern(&regex, SELF_TEST).map_err(PatternFailure::SelfTest)?;
    Ok(regex)
}

/// Returns the index of the first sample the pattern misses
fn check_pattern(regex: &Regex, samples: &[&str]) -> Result<(), usize> {
    match samples.iter().position(|s| !regex.is_match(s)) {
        Some(index) => Err(index),
        None => Ok(()),
    }
}

/// Compiled divider selectors plus the shared text pattern
#[derive(Debug)]
pub struct SeparatorNormalizer {
    dividers: Vec<Selector>,
    hr: Selector,
    double_hr: Selector,
    pattern: &'static Regex,
}

impl SeparatorNormalizer {
    pub fn new() -> Result<Self, RuleError> {
        let dividers = DIVIDER_SELECTORS
            .iter()
            .map(|css| parse_selector(css))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dividers,
            hr: parse_selector("hr")?,
            double_hr: parse_selector("hr + hr")?,
            pattern: divider_pattern()?,
        })
    }

    /// Returns true if an element's whole text marks a divider
    pub fn is_divider_text(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// Replaces every divider in the story body with `<hr>`
    ///
    /// Known divider elements and text-only dividers are replaced in document
    /// order; a match inside an already replaced element is skipped. Then a
    /// `<p>` or `<center>` left holding only an `<hr>` is replaced by it, and
    /// the second of two adjacent `<hr>` is removed.
    ///
    /// # Returns
    ///
    /// The number of elements replaced with `<hr>`.
    pub fn normalize(&self, doc: &mut Document, body: &Selector) -> usize {
        let mut known = HashSet::new();
        for selector in &self.dividers {
            known.extend(doc.select_within(body, selector));
        }

        let mut candidates = Vec::new();
        for container in doc.select(body) {
            for id in doc.descendants(container) {
                if known.contains(&id) || self.is_text_divider(doc, id) {
                    candidates.push(id);
                }
            }
        }

        let mut replaced = 0;
        for id in candidates {
            if doc.is_attached(id) {
                doc.replace_with_html(id, "<hr>");
                replaced += 1;
            }
        }

        for hr in doc.select_within(body, &self.hr) {
            if !doc.is_attached(hr) {
                continue;
            }
            if let Some(wrapper) = self.sole_hr_wrapper(doc, hr) {
                doc.replace_with_html(wrapper, "<hr>");
                replaced += 1;
            }
        }

        for hr in doc.select_within(body, &self.double_hr) {
            doc.remove(hr);
        }

        replaced
    }

    fn is_text_divider(&self, doc: &Document, id: NodeId) -> bool {
        doc.tag_name(id)
            .map_or(false, |tag| TEXT_DIVIDER_TAGS.contains(&tag))
            && self.is_divider_text(&doc.text(id))
    }

    /// The `<p>`/`<center>` parent of an `<hr>` that holds nothing else but
    /// whitespace
    fn sole_hr_wrapper(&self, doc: &Document, hr: NodeId) -> Option<NodeId> {
        let parent = doc.parent_element(hr)?;
        if !doc
            .tag_name(parent)
            .map_or(false, |tag| HR_WRAPPER_TAGS.contains(&tag))
        {
            return None;
        }
        let alone = doc.children(parent).into_iter().all(|child| {
            child == hr
                || doc
                    .text_value(child)
                    .map_or(false, |text| text.trim().is_empty())
        });
        alone.then_some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::STORY_BODY_SELECTOR;

    fn story(body: &str) -> Document {
        Document::parse(&format!(
            r#"<html><body><p>* * *</p><div class="item-page"><div itemprop="articleBody">{}</div></div></body></html>"#,
            body
        ))
    }

    fn normalize(body: &str) -> (String, Document) {
        let mut doc = story(body);
        let scope = parse_selector(STORY_BODY_SELECTOR).unwrap();
        SeparatorNormalizer::new()
            .unwrap()
            .normalize(&mut doc, &scope);
        let id = doc.select_first(&scope).unwrap();
        (doc.inner_html(id), doc)
    }

    #[test]
    fn test_pattern_self_test_passes() {
        assert!(divider_pattern().is_ok());
    }

    #[test]
    fn test_check_pattern_reports_first_miss() {
        let regex = Regex::new(r"\A\*+\z").unwrap();
        assert_eq!(check_pattern(&regex, &["**", "* *", "*"]), Err(1));
        assert_eq!(check_pattern(&regex, &["*"]), Ok(()));
    }

    #[test]
    fn test_divider_texts() {
        let n = SeparatorNormalizer::new().unwrap();
        assert!(n.is_divider_text("* * * *"));
        assert!(n.is_divider_text("\u{a0}"));
        assert!(n.is_divider_text("***"));
        assert!(!n.is_divider_text("She said * nothing."));
        assert!(!n.is_divider_text("The end."));
        assert!(!n.is_divider_text(""));
    }

    #[test]
    fn test_text_dividers_become_hr() {
        let (html, _) = normalize("<p>a</p><p>* * * *</p><p>b</p><p>\u{a0}</p><p>c</p>");
        assert_eq!(html, "<p>a</p><hr><p>b</p><hr><p>c</p>");
    }

    #[test]
    fn test_prose_is_untouched() {
        let body = "<p>It was *really* late.</p><p><strong>Loud</strong> noises.</p>";
        let (html, _) = normalize(body);
        assert_eq!(html, body);
    }

    #[test]
    fn test_dividers_outside_body_are_untouched() {
        let (_, doc) = normalize("<p>a</p>");
        assert!(doc.html().contains("<p>* * *</p>"));
    }

    #[test]
    fn test_known_divider_elements() {
        let (html, _) = normalize(
            r#"<p>a</p><div class="hr"></div><p>b</p><hr style="width: 50%"><p>c</p>"#,
        );
        assert_eq!(html, "<p>a</p><hr><p>b</p><hr><p>c</p>");
    }

    #[test]
    fn test_image_divider_wrapper_collapses() {
        let (html, _) = normalize(
            r#"<p>a</p><center><img src="/x.png" alt="linebreak shadow"></center><p>b</p>"#,
        );
        assert_eq!(html, "<p>a</p><hr><p>b</p>");
    }

    #[test]
    fn test_nested_match_replaced_once() {
        let (html, _) = normalize("<p>a</p><div><span>* * *</span></div><p>b</p>");
        assert_eq!(html, "<p>a</p><hr><p>b</p>");
    }

    #[test]
    fn test_adjacent_hrs_collapse() {
        let (html, _) = normalize("<p>a</p><p>* * *</p><hr><p>b</p>");
        assert_eq!(html, "<p>a</p><hr><p>b</p>");
    }

    #[test]
    fn test_hr_with_text_keeps_wrapper() {
        let (html, _) = normalize("<center>The End<hr></center>");
        assert_eq!(html, "<center>The End<hr></center>");
    }
}
