use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::injection::{InjectionOptions, StrategyKind};

/// Top-level manager settings container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ManagerSettings {
    pub injection: InjectionSettings,
    pub detection: DetectionSettings,
    pub dependencies: DependencySettings,
    pub logging: LoggingSettings,
}

/// Timing and ordering knobs for the injection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InjectionSettings {
    pub attempt_timeout_ms: u64,
    /// Extra delay after load completes before `document_idle` scripts run.
    pub idle_settle_delay_ms: u64,
    /// Order used when security detection is disabled.
    pub default_strategy_order: Vec<StrategyKind>,
    pub mutation_synthetic_delay_ms: u64,
    pub mutation_fallback_ms: u64,
    pub bridge_ack_timeout_ms: u64,
    pub event_fallback_ms: u64,
}

impl Default for InjectionSettings {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 5000,
            idle_settle_delay_ms: 250,
            default_strategy_order: StrategyKind::ALL.to_vec(),
            mutation_synthetic_delay_ms: 50,
            mutation_fallback_ms: 1500,
            bridge_ack_timeout_ms: 3000,
            event_fallback_ms: 3000,
        }
    }
}

impl InjectionSettings {
    pub fn idle_settle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_settle_delay_ms)
    }

    /// Builds fresh per-attempt options carrying these timings.
    pub fn attempt_options(&self, nonce: Option<String>) -> InjectionOptions {
        InjectionOptions {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            timeout: Duration::from_millis(self.attempt_timeout_ms),
            nonce,
            mutation_synthetic_delay: Duration::from_millis(self.mutation_synthetic_delay_ms),
            mutation_fallback: Duration::from_millis(self.mutation_fallback_ms),
            bridge_ack_timeout: Duration::from_millis(self.bridge_ack_timeout_ms),
            event_fallback: Duration::from_millis(self.event_fallback_ms),
        }
    }
}

/// Security detector settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    pub enabled: bool,
    pub cache_ttl_secs: u64,
    pub probe_timeout_ms: u64,
    pub risk_weights: RiskWeights,
    /// Ascending upper bounds for minimal, low, moderate and high. Anything above is extreme.
    pub risk_thresholds: [u32; 4],
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: 300,
            probe_timeout_ms: 3000,
            risk_weights: RiskWeights::default(),
            risk_thresholds: [10, 25, 45, 65],
        }
    }
}

impl DetectionSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Weights of the risk score. Heuristic, not a formal policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskWeights {
    pub csp_none: u32,
    pub csp_loose: u32,
    pub csp_moderate: u32,
    pub csp_strict: u32,
    pub csp_unknown: u32,
    pub per_security_header: u32,
    pub per_anti_script_technique: u32,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            csp_none: 0,
            csp_loose: 10,
            csp_moderate: 25,
            csp_strict: 40,
            csp_unknown: 20,
            per_security_header: 3,
            per_anti_script_technique: 10,
        }
    }
}

/// Settings for `@require` / `@resource` fetching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DependencySettings {
    pub fetch_timeout_secs: u64,
    pub max_bytes: u64,
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}
