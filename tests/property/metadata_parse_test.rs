//! Property-based tests for the metadata parser.
//!
//! For arbitrary traditional headers: parsing is deterministic, directive
//! order is preserved and a header without targets applies everywhere.

use proptest::prelude::*;
use scriptbridge::services::metadata_parser::{parse, parse_detailed};
use scriptbridge::types::script::UNIVERSAL_PATTERN;

fn arb_pattern() -> impl Strategy<Value = String> {
    ("(https?|\\*)", "[a-z]{1,8}(\\.[a-z]{2,3})?", "[a-z/*]{0,10}")
        .prop_map(|(scheme, host, path)| format!("{scheme}://{host}/{path}"))
}

fn arb_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9 ]{0,20}[A-Za-z0-9]".prop_map(|s| s.to_string())
}

fn header(name: &str, matches: &[String], grants: &[String]) -> String {
    let mut lines = vec!["// ==UserScript==".to_string(), format!("// @name {name}")];
    lines.extend(matches.iter().map(|m| format!("// @match {m}")));
    lines.extend(grants.iter().map(|g| format!("// @grant {g}")));
    lines.push("// ==/UserScript==".to_string());
    lines.push("void 0;".to_string());
    lines.join("\n")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn parsing_is_deterministic(
        name in arb_name(),
        matches in prop::collection::vec(arb_pattern(), 0..6),
    ) {
        let raw = header(&name, &matches, &[]);
        prop_assert_eq!(parse(&raw), parse(&raw));
    }

    #[test]
    fn match_order_is_preserved(
        name in arb_name(),
        matches in prop::collection::vec(arb_pattern(), 1..8),
    ) {
        let metadata = parse(&header(&name, &matches, &[])).unwrap();
        prop_assert_eq!(metadata.name, name);
        prop_assert_eq!(metadata.r#match, matches);
    }

    #[test]
    fn no_targets_means_universal(name in arb_name()) {
        let metadata = parse(&header(&name, &[], &[])).unwrap();
        prop_assert_eq!(metadata.r#match, vec![UNIVERSAL_PATTERN.to_string()]);
    }

    #[test]
    fn grants_are_unique_and_never_none(
        grants in prop::collection::vec(
            prop_oneof![
                Just("none".to_string()),
                Just("GM_getValue".to_string()),
                Just("GM_setValue".to_string()),
                Just("GM_log".to_string()),
            ],
            0..10,
        ),
    ) {
        let metadata = parse(&header("G", &[], &grants)).unwrap();
        let mut seen = std::collections::HashSet::new();
        for grant in &metadata.grant {
            prop_assert!(grant != "none");
            prop_assert!(seen.insert(grant.clone()));
        }
        for grant in grants.iter().filter(|g| *g != "none") {
            prop_assert!(metadata.has_grant(grant));
        }
    }

    #[test]
    fn text_without_markers_never_parses(body in "[a-z ;=()0-9]{0,80}") {
        prop_assert!(parse_detailed(&body).is_err());
    }
}
