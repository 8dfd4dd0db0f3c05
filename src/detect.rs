use once_cell::sync::Lazy;
use regex::Regex;

/// Issue key directly after a `browse/` path segment.
static BROWSE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"browse/([A-Z][A-Z0-9]*-[0-9]+)").expect("valid browse key pattern")
});

/// Issue key in a board's `selectedIssue=` query parameter.
static SELECTED_ISSUE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"selectedIssue=([A-Z][A-Z0-9]*-[0-9]+)").expect("valid selectedIssue key pattern")
});

/// Extract the JIRA issue key from a page URL. `browse/` wins over
/// `selectedIssue=` when both are present.
pub fn tracker_key(url: &str) -> Option<String> {
    [&*BROWSE_KEY, &*SELECTED_ISSUE_KEY]
        .into_iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
