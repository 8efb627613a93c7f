//! Unit tests for the URL matcher: anchoring, precedence and raw expressions.

use rstest::rstest;
use scriptbridge::services::url_matcher::{matches, UrlMatcher};
use scriptbridge::types::script::{ScriptMetadata, ScriptRecord};

fn metadata(r#match: &[&str], include: &[&str], exclude: &[&str]) -> ScriptMetadata {
    ScriptMetadata {
        r#match: r#match.iter().map(|s| s.to_string()).collect(),
        include: include.iter().map(|s| s.to_string()).collect(),
        exclude: exclude.iter().map(|s| s.to_string()).collect(),
        ..ScriptMetadata::default()
    }
}

#[rstest]
#[case("*://example.com/*", "https://example.com/path", true)]
#[case("*://example.com/*", "http://example.com/", true)]
#[case("*://example.com/*", "https://example.com.evil.com/path", false)]
#[case("*://example.com/*", "https://evil.com/?r=https://example.com/", false)]
#[case("https://*.example.com/*", "https://www.example.com/a", true)]
#[case("https://*.example.com/*", "http://www.example.com/a", false)]
#[case("https://example.com/page?", "https://example.com/page1", true)]
#[case("https://example.com/page?", "https://example.com/page", false)]
#[case("<all_urls>", "file:///home/user/a.html", true)]
#[case("<all_urls>", "chrome://settings", false)]
fn test_pattern_anchoring(#[case] pattern: &str, #[case] url: &str, #[case] expected: bool) {
    let matcher = UrlMatcher::new();
    assert_eq!(matcher.pattern_matches(pattern, url), expected, "{pattern} vs {url}");
}

#[test]
fn test_empty_match_and_include_applies_everywhere() {
    let m = metadata(&[], &[], &[]);
    assert!(matches(&m, "https://anything.test/"));
    assert!(matches(&m, "about:blank"));
}

#[test]
fn test_exclude_wins_over_match() {
    let m = metadata(&["*://a.com/*"], &[], &["*://a.com/private/*"]);
    assert!(matches(&m, "https://a.com/public"));
    assert!(!matches(&m, "https://a.com/private/x"));
}

#[test]
fn test_exclude_match_joins_exclusions() {
    let mut m = metadata(&["*://a.com/*"], &[], &[]);
    m.exclude_match.push("*://a.com/admin*".to_string());
    assert!(!matches(&m, "https://a.com/admin/users"));
}

#[test]
fn test_exclude_applies_to_empty_candidate_list() {
    let m = metadata(&[], &[], &["*://blocked.com/*"]);
    assert!(!matches(&m, "https://blocked.com/"));
    assert!(matches(&m, "https://open.com/"));
}

#[test]
fn test_match_and_include_are_one_candidate_list() {
    let m = metadata(&["*://a.com/*"], &["*://b.com/*"], &[]);
    assert!(matches(&m, "https://a.com/"));
    assert!(matches(&m, "https://b.com/"));
    assert!(!matches(&m, "https://c.com/"));
}

#[test]
fn test_raw_regex_include_is_unanchored() {
    let m = metadata(&[], &[r"/example\.(com|org)/"], &[]);
    assert!(matches(&m, "https://www.example.org/x"));
    assert!(!matches(&m, "https://example.net/"));
}

#[test]
fn test_case_insensitive_raw_regex() {
    let matcher = UrlMatcher::new();
    assert!(matcher.pattern_matches("/EXAMPLE/i", "https://example.com/"));
}

#[test]
fn test_malformed_pattern_never_matches() {
    let m = metadata(&["/(broken/"], &[], &[]);
    assert!(!matches(&m, "https://anything/"));

    let excluded_by_broken = metadata(&["*://a.com/*"], &[], &["/(broken/"]);
    assert!(matches(&excluded_by_broken, "https://a.com/"));
}

#[test]
fn test_absent_metadata_never_matches() {
    assert!(!UrlMatcher::new().matches(None, "https://a.com/"));
}

#[test]
fn test_disabled_record_never_matches() {
    let mut record = ScriptRecord::new("", metadata(&["*://a.com/*"], &[], &[]));
    let matcher = UrlMatcher::new();
    assert!(matcher.matches_record(Some(&record), "https://a.com/"));
    record.enabled = false;
    assert!(!matcher.matches_record(Some(&record), "https://a.com/"));
    assert!(!matcher.matches_record(None, "https://a.com/"));
}

#[test]
fn test_clear_cache_empties_pattern_cache() {
    let matcher = UrlMatcher::new();
    matcher.pattern_matches("*://a.com/*", "https://a.com/");
    matcher.pattern_matches("*://b.com/*", "https://a.com/");
    assert_eq!(matcher.cached_patterns(), 2);
    matcher.clear_cache();
    assert_eq!(matcher.cached_patterns(), 0);
}
