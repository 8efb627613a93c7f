//! Property-based tests for ManagerSettings serialization and persistence.

use proptest::prelude::*;
use scriptbridge::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use scriptbridge::types::injection::StrategyKind;
use scriptbridge::types::settings::{
    DependencySettings, DetectionSettings, InjectionSettings, LoggingSettings, ManagerSettings,
    RiskWeights,
};
use tempfile::TempDir;

fn arb_strategy_order() -> impl Strategy<Value = Vec<StrategyKind>> {
    proptest::sample::subsequence(StrategyKind::ALL.to_vec(), 0..=8).prop_shuffle()
}

fn arb_injection_settings() -> impl Strategy<Value = InjectionSettings> {
    (
        1u64..60_000,
        0u64..5_000,
        arb_strategy_order(),
        0u64..1_000,
        0u64..10_000,
        0u64..10_000,
        0u64..10_000,
    )
        .prop_map(
            |(
                attempt_timeout_ms,
                idle_settle_delay_ms,
                default_strategy_order,
                mutation_synthetic_delay_ms,
                mutation_fallback_ms,
                bridge_ack_timeout_ms,
                event_fallback_ms,
            )| InjectionSettings {
                attempt_timeout_ms,
                idle_settle_delay_ms,
                default_strategy_order,
                mutation_synthetic_delay_ms,
                mutation_fallback_ms,
                bridge_ack_timeout_ms,
                event_fallback_ms,
            },
        )
}

fn arb_risk_weights() -> impl Strategy<Value = RiskWeights> {
    proptest::array::uniform7(0u32..100).prop_map(|w| RiskWeights {
        csp_none: w[0],
        csp_loose: w[1],
        csp_moderate: w[2],
        csp_strict: w[3],
        csp_unknown: w[4],
        per_security_header: w[5],
        per_anti_script_technique: w[6],
    })
}

fn arb_detection_settings() -> impl Strategy<Value = DetectionSettings> {
    (
        any::<bool>(),
        0u64..86_400,
        1u64..30_000,
        arb_risk_weights(),
        proptest::array::uniform4(0u32..200),
    )
        .prop_map(
            |(enabled, cache_ttl_secs, probe_timeout_ms, risk_weights, mut risk_thresholds)| {
                risk_thresholds.sort_unstable();
                DetectionSettings {
                    enabled,
                    cache_ttl_secs,
                    probe_timeout_ms,
                    risk_weights,
                    risk_thresholds,
                }
            },
        )
}

fn arb_manager_settings() -> impl Strategy<Value = ManagerSettings> {
    (
        arb_injection_settings(),
        arb_detection_settings(),
        (1u64..600, 1u64..(64 << 20)),
        prop_oneof![
            Just("error"),
            Just("warn"),
            Just("info"),
            Just("debug"),
            Just("scriptbridge=trace")
        ],
    )
        .prop_map(
            |(injection, detection, (fetch_timeout_secs, max_bytes), level)| ManagerSettings {
                injection,
                detection,
                dependencies: DependencySettings {
                    fetch_timeout_secs,
                    max_bytes,
                },
                logging: LoggingSettings {
                    level: level.to_string(),
                },
            },
        )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn settings_serialization_roundtrip(settings in arb_manager_settings()) {
        let json = serde_json::to_string(&settings).unwrap();
        let back: ManagerSettings = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, settings);
    }

    #[test]
    fn settings_survive_save_and_load(settings in arb_manager_settings()) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json").to_string_lossy().to_string();
        std::fs::write(&path, serde_json::to_string_pretty(&settings).unwrap()).unwrap();

        let mut engine = SettingsEngine::new(Some(path.clone()));
        prop_assert_eq!(engine.load().unwrap(), settings.clone());

        engine.save().unwrap();
        let mut reopened = SettingsEngine::new(Some(path));
        prop_assert_eq!(reopened.load().unwrap(), settings);
    }
}
