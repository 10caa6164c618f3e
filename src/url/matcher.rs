/// Checks if a story category matches a category pattern
///
/// This function supports three types of patterns:
/// 1. Match-all: "*" matches every category, including the empty one
/// 2. Exact match: "stories" matches only "stories"
/// 3. Section match: "the-library/*" matches:
///    - "the-library" (the section itself)
///    - "the-library/stories" (a nested category)
///    - "the-library/a/b" (deeper nesting)
///
/// # Arguments
///
/// * `pattern` - The category pattern
/// * `category` - The category path to check against the pattern
///
/// # Returns
///
/// * `true` - If the category matches the pattern
/// * `false` - Otherwise
///
/// # Examples
///
/// ```
/// use whateley_fetch::url::matches_category;
///
/// assert!(matches_category("*", "stories"));
/// assert!(matches_category("stories", "stories"));
/// assert!(!matches_category("stories", "original-timeline/stories"));
/// assert!(matches_category("the-library/*", "the-library/stories"));
/// assert!(!matches_category("the-library/*", "the-library-annex"));
/// ```
pub fn matches_category(pattern: &str, category: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(base) = pattern.strip_suffix("/*") {
        // Section pattern: matches the section itself or anything nested below it
        category == base
            || category
                .strip_prefix(base)
                .map_or(false, |rest| rest.starts_with('/'))
    } else {
        // Exact match only
        category == pattern
    }
}

/// Returns true if any pattern in the list matches the category
pub fn matches_any_category(patterns: &[String], category: &str) -> bool {
    patterns.iter().any(|p| matches_category(p, category))
}
