//! Matcher predicates for hook selection.
//!
//! Tool events (`PreToolUse`/`PostToolUse`) interpret the pattern as a regular
//! expression; a pattern containing neither `^` nor `$` is anchored on both
//! sides so `mcp__.*` means "the whole name", not "somewhere inside it". A
//! pattern that fails to compile never errors the invocation: it degrades to
//! literal string equality. Trigger and source matchers are literal equality
//! only.

use regex::Regex;
use tracing::debug;

/// True when the pattern should match every value.
fn is_wildcard(pattern: &str) -> bool {
    pattern.is_empty() || pattern == "*"
}

/// Regex matching for tool-name values.
pub fn tool_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.trim();
    if is_wildcard(pattern) {
        return true;
    }

    let anchored = if pattern.contains('^') || pattern.contains('$') {
        pattern.to_string()
    } else {
        format!("^{pattern}$")
    };

    match Regex::new(&anchored) {
        Ok(re) => re.is_match(value),
        Err(e) => {
            debug!(pattern, error = %e, "matcher is not a valid regex, using literal equality");
            pattern == value
        }
    }
}

/// Literal matching for trigger/source values.
pub fn literal_matches(pattern: &str, value: &str) -> bool {
    let pattern = pattern.trim();
    is_wildcard(pattern) || pattern == value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        assert!(tool_matches("", "anything"));
        assert!(tool_matches("*", "anything"));
        assert!(tool_matches("  *  ", "anything"));
        assert!(literal_matches("", "anything"));
        assert!(literal_matches("*", "anything"));
    }

    #[test]
    fn unanchored_pattern_is_wrapped_to_exact() {
        assert!(tool_matches("Bash", "Bash"));
        assert!(!tool_matches("Bash", "BashOutput"));
        assert!(tool_matches("mcp__.*", "mcp__github_search"));
        assert!(!tool_matches("mcp__.*", "WebSearch"));
        assert!(tool_matches("Write|Edit", "Edit"));
        assert!(!tool_matches("Write|Edit", "EditFile"));
    }

    #[test]
    fn anchored_pattern_is_used_as_is() {
        assert!(tool_matches("^Bash", "BashOutput"));
        assert!(tool_matches("Search$", "WebSearch"));
        assert!(!tool_matches("^Bash$", "BashOutput"));
    }

    #[test]
    fn invalid_regex_falls_back_to_literal_equality() {
        assert!(!tool_matches("[unclosed", "anything"));
        assert!(tool_matches("[unclosed", "[unclosed"));
        assert!(tool_matches("(open", "(open"));
    }

    #[test]
    fn literal_matcher_never_uses_regex() {
        assert!(literal_matches("auto", "auto"));
        assert!(!literal_matches("auto|manual", "auto"));
        assert!(!literal_matches("man.*", "manual"));
    }
}
