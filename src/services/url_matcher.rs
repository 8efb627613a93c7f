//! URL Matcher for Scriptbridge.
//!
//! Decides whether a script applies to a URL. Exclusions are evaluated first
//! and win over everything; `@match` and `@include` form one candidate list;
//! a script with no candidates at all applies everywhere.

use std::collections::HashMap;
use std::sync::Mutex;

use regex::Regex;
use tracing::warn;

use crate::types::errors::MatchError;
use crate::types::script::{ScriptMetadata, ScriptRecord};

/// Schemes accepted by a leading `*://` wildcard.
const WILDCARD_SCHEMES: &str = "(?:https?|file|ftp)";

/// Matches every URL with a wildcard-eligible scheme.
pub const ALL_URLS: &str = "<all_urls>";

/// Translates a glob pattern into an anchored regular expression source.
///
/// `*` matches any run of characters, `?` exactly one, and every other
/// character (including `.`) is literal. A leading `*://` only accepts the
/// schemes in [`WILDCARD_SCHEMES`].
pub fn glob_to_regex_source(pattern: &str) -> String {
    let (prefix, rest) = match pattern.strip_prefix("*://") {
        Some(rest) => (format!("{WILDCARD_SCHEMES}://"), rest),
        None => (String::new(), pattern),
    };

    let mut source = String::with_capacity(rest.len() * 2 + prefix.len() + 2);
    source.push('^');
    source.push_str(&prefix);
    for ch in rest.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    source
}

/// Compiles one `@match`/`@include`/`@exclude` pattern.
///
/// Patterns written as `/expr/` (optionally `/expr/i`) are raw regular
/// expressions evaluated unanchored.
pub fn compile_pattern(pattern: &str) -> Result<Regex, MatchError> {
    let source = if pattern == ALL_URLS {
        format!("^{WILDCARD_SCHEMES}://.*$")
    } else if let Some(expr) = raw_regex_body(pattern) {
        expr
    } else {
        glob_to_regex_source(pattern)
    };

    Regex::new(&source).map_err(|e| MatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn raw_regex_body(pattern: &str) -> Option<String> {
    if pattern.len() > 3 && pattern.starts_with('/') && pattern.ends_with("/i") {
        return Some(format!("(?i){}", &pattern[1..pattern.len() - 2]));
    }
    if pattern.len() > 2 && pattern.starts_with('/') && pattern.ends_with('/') {
        return Some(pattern[1..pattern.len() - 1].to_string());
    }
    None
}

/// Evaluates patterns against URLs, memoizing compiled patterns.
pub struct UrlMatcher {
    cache: Mutex<HashMap<String, Result<Regex, MatchError>>>,
}

impl UrlMatcher {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Full decision for a stored record, honoring `enabled`.
    pub fn matches_record(&self, record: Option<&ScriptRecord>, url: &str) -> bool {
        match record {
            Some(r) if r.enabled => self.matches(Some(&r.metadata), url),
            _ => false,
        }
    }

    /// Decision for bare metadata. Absent metadata never matches.
    pub fn matches(&self, metadata: Option<&ScriptMetadata>, url: &str) -> bool {
        let Some(metadata) = metadata else {
            return false;
        };

        let excluded = metadata
            .exclude
            .iter()
            .chain(metadata.exclude_match.iter())
            .any(|pattern| self.pattern_matches(pattern, url));
        if excluded {
            return false;
        }

        let mut candidates = metadata.r#match.iter().chain(metadata.include.iter()).peekable();
        if candidates.peek().is_none() {
            return true;
        }
        candidates.any(|pattern| self.pattern_matches(pattern, url))
    }

    /// Whether one pattern fully matches `url`. Malformed patterns never match.
    pub fn pattern_matches(&self, pattern: &str, url: &str) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        let compiled = cache
            .entry(pattern.to_string())
            .or_insert_with(|| compile_pattern(pattern));
        match compiled {
            Ok(regex) => regex.is_match(url),
            Err(e) => {
                warn!("{e}");
                false
            }
        }
    }

    /// Number of distinct patterns compiled so far.
    pub fn cached_patterns(&self) -> usize {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }
}

impl Default for UrlMatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot convenience around [`UrlMatcher::matches`].
pub fn matches(metadata: &ScriptMetadata, url: &str) -> bool {
    UrlMatcher::new().matches(Some(metadata), url)
}
