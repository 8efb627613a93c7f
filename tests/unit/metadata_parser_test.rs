//! Unit tests for the metadata parser: both header formats, defaults and
//! the fallback between them.

use rstest::rstest;
use scriptbridge::services::metadata_parser::{parse, parse_detailed};
use scriptbridge::types::errors::ParseError;
use scriptbridge::types::script::{InjectInto, RunAt, UNIVERSAL_PATTERN};

fn traditional(lines: &[&str]) -> String {
    let mut out = vec!["// ==UserScript=="];
    out.extend_from_slice(lines);
    out.push("// ==/UserScript==");
    out.push("console.log('body');");
    out.join("\n")
}

#[test]
fn test_minimal_traditional_header() {
    let raw = "// ==UserScript==\n// @name Foo\n// @match *://a.com/*\n// ==/UserScript==";
    let metadata = parse(raw).expect("header should parse");
    assert_eq!(metadata.name, "Foo");
    assert_eq!(metadata.r#match, vec!["*://a.com/*".to_string()]);
    assert_eq!(metadata.version, "1.0");
    assert_eq!(metadata.run_at, RunAt::DocumentEnd);
    assert_eq!(metadata.inject_into, InjectInto::Auto);
}

#[test]
fn test_missing_match_and_include_defaults_to_universal() {
    let metadata = parse(&traditional(&["// @name NoMatch"])).unwrap();
    assert_eq!(metadata.r#match, vec![UNIVERSAL_PATTERN.to_string()]);
}

#[test]
fn test_include_only_keeps_match_empty() {
    let metadata = parse(&traditional(&["// @include https://a.com/*"])).unwrap();
    assert!(metadata.r#match.is_empty());
    assert_eq!(metadata.include, vec!["https://a.com/*".to_string()]);
}

#[test]
fn test_empty_name_and_version_use_defaults() {
    let metadata = parse(&traditional(&["// @name", "// @version"])).unwrap();
    assert_eq!(metadata.name, "Untitled Script");
    assert_eq!(metadata.version, "1.0");
}

#[test]
fn test_multi_valued_directives_keep_order_and_duplicates() {
    let metadata = parse(&traditional(&[
        "// @match *://b.com/*",
        "// @match *://a.com/*",
        "// @match *://b.com/*",
        "// @exclude *://a.com/private/*",
        "// @exclude-match *://a.com/admin/*",
        "// @connect api.a.com",
    ]))
    .unwrap();
    assert_eq!(metadata.r#match, vec!["*://b.com/*", "*://a.com/*", "*://b.com/*"]);
    assert_eq!(metadata.exclude, vec!["*://a.com/private/*"]);
    assert_eq!(metadata.exclude_match, vec!["*://a.com/admin/*"]);
    assert_eq!(metadata.connect, vec!["api.a.com"]);
}

#[test]
fn test_grants_deduplicated_and_none_dropped() {
    let metadata = parse(&traditional(&[
        "// @grant GM_setValue",
        "// @grant none",
        "// @grant GM_getValue",
        "// @grant GM_setValue",
    ]))
    .unwrap();
    assert_eq!(metadata.grant, vec!["GM_setValue", "GM_getValue"]);
    assert!(metadata.has_grant("GM_getValue"));
    assert!(!metadata.has_grant("none"));
}

#[test]
fn test_require_and_resource_entries() {
    let metadata = parse(&traditional(&[
        "// @require https://cdn.example.com/lib.js#sha256=abc",
        "// @resource css https://cdn.example.com/style.css",
        "// @resource broken",
    ]))
    .unwrap();
    assert_eq!(metadata.require.len(), 1);
    assert_eq!(metadata.require[0].url, "https://cdn.example.com/lib.js#sha256=abc");
    assert!(!metadata.require[0].loaded);
    assert_eq!(metadata.resource.len(), 1);
    let css = metadata.resource("css").unwrap();
    assert_eq!(css.url, "https://cdn.example.com/style.css");
    assert!(css.res_text.is_none());
}

#[test]
fn test_locale_overrides_and_resolution() {
    let metadata = parse(&traditional(&[
        "// @name Hello",
        "// @name:es Hola",
        "// @description Greets",
        "// @description:fr Salue",
    ]))
    .unwrap();
    assert_eq!(metadata.localized_name("es"), "Hola");
    assert_eq!(metadata.localized_name("es-MX"), "Hola");
    assert_eq!(metadata.localized_name("de"), "Hello");
    assert_eq!(metadata.localized_description("fr_CA"), Some("Salue"));
    assert_eq!(metadata.localized_description("es"), Some("Greets"));
}

#[test]
fn test_flags_and_unknown_keys() {
    let metadata = parse(&traditional(&[
        "// @noframes",
        "// @unwrap",
        "// @homepageURL https://example.com",
        "// @supportURL https://example.com/issues",
    ]))
    .unwrap();
    assert!(metadata.noframes);
    assert!(metadata.unwrap);
    assert_eq!(metadata.homepage.as_deref(), Some("https://example.com"));
    assert_eq!(
        metadata.meta.get("supportURL").map(String::as_str),
        Some("https://example.com/issues")
    );
}

#[rstest]
#[case("document-start", RunAt::DocumentStart)]
#[case("document_start", RunAt::DocumentStart)]
#[case("document-end", RunAt::DocumentEnd)]
#[case("document-body", RunAt::DocumentEnd)]
#[case("document-idle", RunAt::DocumentIdle)]
fn test_run_at_spellings(#[case] value: &str, #[case] expected: RunAt) {
    let line = format!("// @run-at {}", value);
    let metadata = parse(&traditional(&[&line])).unwrap();
    assert_eq!(metadata.run_at, expected);
}

#[test]
fn test_invalid_run_at_keeps_default() {
    let metadata = parse(&traditional(&["// @run-at whenever"])).unwrap();
    assert_eq!(metadata.run_at, RunAt::DocumentEnd);
}

#[rstest]
#[case("page", InjectInto::Page)]
#[case("content", InjectInto::Content)]
#[case("auto", InjectInto::Auto)]
fn test_inject_into_values(#[case] value: &str, #[case] expected: InjectInto) {
    let line = format!("// @inject-into {}", value);
    assert_eq!(parse(&traditional(&[&line])).unwrap().inject_into, expected);
}

#[test]
fn test_compact_header() {
    let raw = r#"/* ==UserScript.json==
{
  "name": "Compact",
  "name:de": "Kompakt",
  "version": "2.1",
  "match": ["*://a.com/*", "*://b.com/*"],
  "grant": ["GM_log"],
  "resource": {"logo": "https://a.com/logo.png"},
  "noframes": true
}
==/UserScript.json== */
console.log('x');"#;
    let metadata = parse(raw).unwrap();
    assert_eq!(metadata.name, "Compact");
    assert_eq!(metadata.localized_name("de"), "Kompakt");
    assert_eq!(metadata.version, "2.1");
    assert_eq!(metadata.r#match, vec!["*://a.com/*", "*://b.com/*"]);
    assert_eq!(metadata.grant, vec!["GM_log"]);
    assert_eq!(metadata.resource("logo").unwrap().url, "https://a.com/logo.png");
    assert!(metadata.noframes);
    assert_eq!(metadata.run_at, RunAt::DocumentIdle);
}

#[test]
fn test_compact_resource_as_array() {
    let raw = "/* ==UserScript.json==\n{\"resource\": [\"a https://x/a\", \"b https://x/b\"]}\n==/UserScript.json== */";
    let metadata = parse(raw).unwrap();
    let names: Vec<&str> = metadata.resource.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_malformed_compact_falls_back_to_traditional() {
    let raw = "/* ==UserScript.json==\n{not json\n==/UserScript.json== */\n// ==UserScript==\n// @name Fallback\n// ==/UserScript==";
    let metadata = parse(raw).unwrap();
    assert_eq!(metadata.name, "Fallback");
    assert_eq!(metadata.run_at, RunAt::DocumentEnd);
}

#[test]
fn test_malformed_compact_without_traditional_reports_error() {
    let raw = "/* ==UserScript.json==\n[1, 2]\n==/UserScript.json== */";
    assert_eq!(parse_detailed(raw), Err(ParseError::MissingStartMarker));
    assert!(parse(raw).is_none());
}

#[rstest]
#[case("console.log(1);", ParseError::MissingStartMarker)]
#[case("// ==UserScript==\n// @name A", ParseError::MissingEndMarker)]
#[case("// ==/UserScript==\n// ==UserScript==", ParseError::MarkersOutOfOrder)]
fn test_header_errors(#[case] raw: &str, #[case] expected: ParseError) {
    assert_eq!(parse_detailed(raw), Err(expected));
}

#[test]
fn test_parse_is_deterministic() {
    let raw = traditional(&["// @name Same", "// @match *://*.a.com/*", "// @grant GM_log"]);
    assert_eq!(parse(&raw), parse(&raw));
}
