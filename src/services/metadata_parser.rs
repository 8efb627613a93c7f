//! Metadata Parser for Scriptbridge.
//!
//! Extracts the directive block from a userscript header. Two formats are
//! understood: the traditional `// @key value` block and a compact block
//! holding a single JSON object. A document carrying a compact block is
//! always read through it first; the traditional block is only consulted
//! when the compact one is absent or malformed.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::errors::ParseError;
use crate::types::script::{
    InjectInto, RequireEntry, ResourceEntry, RunAt, ScriptMetadata, DEFAULT_SCRIPT_NAME,
    DEFAULT_SCRIPT_VERSION, UNIVERSAL_PATTERN,
};

pub const TRADITIONAL_START: &str = "// ==UserScript==";
pub const TRADITIONAL_END: &str = "// ==/UserScript==";
pub const COMPACT_START: &str = "/* ==UserScript.json==";
pub const COMPACT_END: &str = "==/UserScript.json== */";

/// Every interior line of a traditional block starts with this.
const LINE_PREFIX: &str = "// ";

/// Header flavour, which decides a few defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    Traditional,
    Compact,
}

impl HeaderFormat {
    fn default_run_at(&self) -> RunAt {
        match self {
            HeaderFormat::Traditional => RunAt::DocumentEnd,
            HeaderFormat::Compact => RunAt::DocumentIdle,
        }
    }
}

/// Parses a script's header into normalized metadata.
///
/// Returns `None` when no well-formed header exists in either format.
pub fn parse(raw_content: &str) -> Option<ScriptMetadata> {
    match parse_detailed(raw_content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            debug!("no usable metadata header: {e}");
            None
        }
    }
}

/// Like [`parse`] but reports why parsing failed.
pub fn parse_detailed(raw_content: &str) -> Result<ScriptMetadata, ParseError> {
    let lines: Vec<&str> = raw_content.lines().collect();

    if lines.iter().any(|l| l.trim() == COMPACT_START) {
        match parse_compact(&lines) {
            Ok(metadata) => return Ok(metadata),
            Err(e) => warn!("compact metadata block rejected, trying traditional header: {e}"),
        }
    }

    parse_traditional(&lines)
}

/// Locates the start and end marker lines (compared after trimming).
fn header_bounds(lines: &[&str], start: &str, end: &str) -> Result<(usize, usize), ParseError> {
    let start_idx = lines
        .iter()
        .position(|l| l.trim() == start)
        .ok_or(ParseError::MissingStartMarker)?;
    let end_idx = lines
        .iter()
        .position(|l| l.trim() == end)
        .ok_or(ParseError::MissingEndMarker)?;
    if end_idx <= start_idx {
        return Err(ParseError::MarkersOutOfOrder);
    }
    Ok((start_idx, end_idx))
}

fn parse_traditional(lines: &[&str]) -> Result<ScriptMetadata, ParseError> {
    let (start, end) = header_bounds(lines, TRADITIONAL_START, TRADITIONAL_END)?;
    let mut builder = HeaderBuilder::default();

    for line in &lines[start + 1..end] {
        let Some(body) = line.trim_start().strip_prefix(LINE_PREFIX) else {
            continue;
        };
        let Some(directive) = body.trim_start().strip_prefix('@') else {
            continue;
        };
        let (key_part, value) = match directive.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (directive.trim_end(), ""),
        };
        let (key, locale) = match key_part.split_once(':') {
            Some((k, l)) if !l.is_empty() => (k, Some(l)),
            _ => (key_part, None),
        };
        if key.is_empty() {
            continue;
        }
        if let Err(e) = builder.apply(key, locale, value) {
            warn!("skipping directive @{key}: {e}");
        }
    }

    Ok(builder.finish(HeaderFormat::Traditional))
}

fn parse_compact(lines: &[&str]) -> Result<ScriptMetadata, ParseError> {
    let (start, end) = header_bounds(lines, COMPACT_START, COMPACT_END)?;
    let body = lines[start + 1..end].join("\n");
    let json: Value =
        serde_json::from_str(&body).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = json else {
        return Err(ParseError::InvalidJson("header is not a JSON object".to_string()));
    };

    let mut builder = HeaderBuilder::default();
    for (key_part, value) in &map {
        let (key, locale) = match key_part.split_once(':') {
            Some((k, l)) if !l.is_empty() => (k, Some(l)),
            _ => (key_part.as_str(), None),
        };
        if let Err(e) = apply_json_value(&mut builder, key, locale, value) {
            warn!("skipping compact directive {key_part}: {e}");
        }
    }

    Ok(builder.finish(HeaderFormat::Compact))
}

fn apply_json_value(
    builder: &mut HeaderBuilder,
    key: &str,
    locale: Option<&str>,
    value: &Value,
) -> Result<(), ParseError> {
    match value {
        Value::String(s) => builder.apply(key, locale, s),
        Value::Bool(true) => builder.apply(key, locale, ""),
        Value::Bool(false) | Value::Null => Ok(()),
        Value::Number(n) => builder.apply(key, locale, &n.to_string()),
        Value::Array(items) => {
            for item in items {
                apply_json_value(builder, key, locale, item)?;
            }
            Ok(())
        }
        Value::Object(entries) if key == "resource" => {
            for (name, url) in entries {
                let url = url.as_str().ok_or_else(|| {
                    ParseError::InvalidDirective(format!("resource {name} has no URL string"))
                })?;
                builder.apply("resource", None, &format!("{name} {url}"))?;
            }
            Ok(())
        }
        Value::Object(_) => Err(ParseError::InvalidDirective(format!(
            "{key} does not accept an object"
        ))),
    }
}

/// Accumulates directives in document order. Defaults are applied in `finish`.
#[derive(Default)]
struct HeaderBuilder {
    metadata: ScriptMetadata,
    name: Option<String>,
    version: Option<String>,
    run_at: Option<RunAt>,
}

impl HeaderBuilder {
    fn apply(&mut self, key: &str, locale: Option<&str>, value: &str) -> Result<(), ParseError> {
        let m = &mut self.metadata;

        if let Some(locale) = locale {
            let entry = m.locales.entry(locale.to_string()).or_default();
            match key {
                "name" => entry.name = Some(value.to_string()),
                "description" => entry.description = Some(value.to_string()),
                _ => {
                    m.meta.insert(format!("{key}:{locale}"), value.to_string());
                }
            }
            return Ok(());
        }

        match key {
            "name" => self.name = Some(value.to_string()),
            "version" => self.version = Some(value.to_string()),
            "namespace" => m.namespace = Some(value.to_string()),
            "description" => m.description = Some(value.to_string()),
            "author" => m.author = Some(value.to_string()),
            "homepage" | "homepageURL" | "website" => m.homepage = Some(value.to_string()),
            "icon" | "iconURL" => m.icon = Some(value.to_string()),
            "match" => push_non_empty(&mut m.r#match, value),
            "include" => push_non_empty(&mut m.include, value),
            "exclude" => push_non_empty(&mut m.exclude, value),
            "exclude-match" | "excludeMatch" => push_non_empty(&mut m.exclude_match, value),
            "connect" => push_non_empty(&mut m.connect, value),
            "require" => {
                if !value.is_empty() {
                    m.require.push(RequireEntry::new(value));
                }
            }
            "resource" => {
                let (name, url) = value
                    .split_once(char::is_whitespace)
                    .map(|(n, u)| (n, u.trim()))
                    .filter(|(n, u)| !n.is_empty() && !u.is_empty())
                    .ok_or_else(|| {
                        ParseError::InvalidDirective(format!("resource needs a name and URL: {value}"))
                    })?;
                m.resource.push(ResourceEntry::new(name, url));
            }
            "grant" => {
                if !value.is_empty() && !m.grant.iter().any(|g| g == value) {
                    m.grant.push(value.to_string());
                }
            }
            "run-at" | "run_at" | "runAt" => {
                let run_at = RunAt::parse(value).ok_or_else(|| {
                    ParseError::InvalidDirective(format!("unknown run-at value: {value}"))
                })?;
                self.run_at = Some(run_at);
            }
            "inject-into" | "injectInto" => {
                m.inject_into = InjectInto::parse(value).ok_or_else(|| {
                    ParseError::InvalidDirective(format!("unknown inject-into value: {value}"))
                })?;
            }
            "noframes" => m.noframes = true,
            "unwrap" => m.unwrap = true,
            _ => {
                m.meta.insert(key.to_string(), value.to_string());
            }
        }
        Ok(())
    }

    fn finish(self, format: HeaderFormat) -> ScriptMetadata {
        let mut metadata = self.metadata;
        metadata.name = self
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_SCRIPT_NAME.to_string());
        metadata.version = self
            .version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SCRIPT_VERSION.to_string());
        metadata.run_at = self.run_at.unwrap_or_else(|| format.default_run_at());
        metadata.grant.retain(|g| g != "none");
        if metadata.r#match.is_empty() && metadata.include.is_empty() {
            metadata.r#match.push(UNIVERSAL_PATTERN.to_string());
        }
        metadata
    }
}

fn push_non_empty(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() {
        list.push(value.to_string());
    }
}
