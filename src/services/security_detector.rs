//! Security Detector for Scriptbridge.
//!
//! Profiles a frame's CSP, security headers, framework fingerprint and
//! anti-script countermeasures, scores the risk, and recommends an ordered
//! list of injection strategies. Profiles are cached per (tab, frame) for a
//! short TTL. Detection never fails outright: individual probe failures
//! degrade to neutral values and a wholesale failure yields the
//! default-moderate profile.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

use crate::services::page_probe::{CspSignals, PageProbe};
use crate::types::errors::DetectionError;
use crate::types::injection::{FrameTarget, StrategyKind, TabId};
use crate::types::security::{
    AntiScriptInfo, AntiScriptTechnique, CspInfo, CspLevel, RiskLevel, SecurityHeaders,
    SecurityProfile,
};
use crate::types::settings::{DetectionSettings, RiskWeights};

/// Used when no recommendation rule applies.
pub const FALLBACK_STRATEGIES: [StrategyKind; 3] = [
    StrategyKind::SandboxBridge,
    StrategyKind::WorkerTunnel,
    StrategyKind::MutationTimed,
];

/// Moved to the front when the page blocks script insertion.
const SCRIPT_BLOCKING_PROMOTED: [StrategyKind; 2] =
    [StrategyKind::IsolatedWorld, StrategyKind::EventTimed];

struct CachedProfile {
    profile: SecurityProfile,
    computed_at: Instant,
}

/// Profile cache keyed by (tab, frame). Entries are replaced whole under the write lock.
struct ProfileCache {
    entries: RwLock<HashMap<FrameTarget, CachedProfile>>,
    ttl: Duration,
}

impl ProfileCache {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn get(&self, target: &FrameTarget) -> Option<SecurityProfile> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(target)
            .filter(|cached| cached.computed_at.elapsed() < self.ttl)
            .map(|cached| cached.profile.clone())
    }

    fn insert(&self, target: FrameTarget, profile: SecurityProfile) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.retain(|_, cached| cached.computed_at.elapsed() < self.ttl);
        entries.insert(
            target,
            CachedProfile {
                profile,
                computed_at: Instant::now(),
            },
        );
    }

    fn remove_tab(&self, tab_id: TabId) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.retain(|target, _| target.tab_id != tab_id);
    }

    fn clear(&self) {
        self.entries.write().unwrap_or_else(|p| p.into_inner()).clear();
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Per-session security detector. Owns its cache; drop it to tear the cache down.
pub struct SecurityDetector {
    probe: Arc<dyn PageProbe>,
    settings: DetectionSettings,
    cache: ProfileCache,
}

impl SecurityDetector {
    pub fn new(probe: Arc<dyn PageProbe>, settings: DetectionSettings) -> Self {
        let cache = ProfileCache::new(settings.cache_ttl());
        Self {
            probe,
            settings,
            cache,
        }
    }

    /// Returns the (possibly cached) profile for a frame.
    pub async fn analyze(&self, target: FrameTarget) -> SecurityProfile {
        if let Some(profile) = self.cache.get(&target) {
            debug!("security profile cache hit for {target}");
            return profile;
        }

        match self.run_probes(target).await {
            Ok(profile) => {
                self.cache.insert(target, profile.clone());
                profile
            }
            Err(e) => {
                warn!("security analysis failed for {target}, using default profile: {e}");
                default_moderate_profile(&self.settings.risk_weights)
            }
        }
    }

    /// Swaps in new settings. Cached profiles were scored with the old weights, so they go.
    pub fn update_settings(&mut self, settings: DetectionSettings) {
        self.cache = ProfileCache::new(settings.cache_ttl());
        self.settings = settings;
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    /// Returns a cached, unexpired profile without probing.
    pub fn cached(&self, target: &FrameTarget) -> Option<SecurityProfile> {
        self.cache.get(target)
    }

    pub fn invalidate_tab(&self, tab_id: TabId) {
        self.cache.remove_tab(tab_id);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn run_probes(&self, target: FrameTarget) -> Result<SecurityProfile, DetectionError> {
        let limit = self.settings.probe_timeout();
        let (csp, headers, frameworks, anti_script) = tokio::join!(
            bounded("csp", limit, self.probe.csp(target)),
            bounded("headers", limit, self.probe.security_headers(target)),
            bounded("frameworks", limit, self.probe.frameworks(target)),
            bounded("anti_script", limit, self.probe.anti_script(target)),
        );

        if csp.is_err() && headers.is_err() && frameworks.is_err() && anti_script.is_err() {
            return Err(DetectionError::ProbeFailed {
                probe: "all".to_string(),
                reason: format!("every probe failed for {target}"),
            });
        }

        let csp = match csp {
            Ok(signals) => csp_info(&signals),
            Err(e) => {
                warn!("{e}");
                CspInfo {
                    level: CspLevel::Unknown,
                    ..CspInfo::default()
                }
            }
        };
        let headers = headers.unwrap_or_else(|e| {
            warn!("{e}");
            SecurityHeaders::default()
        });
        let frameworks = frameworks.unwrap_or_else(|e| {
            warn!("{e}");
            Vec::new()
        });
        let anti_script = AntiScriptInfo {
            techniques: anti_script
                .unwrap_or_else(|e| {
                    warn!("{e}");
                    Vec::new()
                })
                .iter()
                .map(|name| AntiScriptTechnique::from_name(name))
                .collect::<BTreeSet<_>>(),
        };

        let risk_score = score_risk(csp.level, &headers, &anti_script, &self.settings.risk_weights);
        let risk_level = risk_level_for(risk_score, &self.settings.risk_thresholds);
        let recommended_strategy = recommend_strategies(&csp, &anti_script);

        Ok(SecurityProfile {
            csp,
            headers,
            frameworks,
            anti_script,
            risk_score,
            risk_level,
            recommended_strategy,
            fallback: false,
        })
    }
}

async fn bounded<T>(
    probe: &str,
    limit: Duration,
    fut: impl std::future::Future<Output = Result<T, DetectionError>>,
) -> Result<T, DetectionError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DetectionError::ProbeFailed {
            probe: probe.to_string(),
            reason: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}

fn csp_info(signals: &CspSignals) -> CspInfo {
    CspInfo {
        level: classify_csp(&signals.policies),
        nonce: extract_nonce(&signals.policies, &signals.script_nonces),
        policies: signals.policies.clone(),
    }
}

/// Classifies one policy string.
///
/// Checks run in a fixed order: `strict-dynamic` without `unsafe-inline` is
/// strict; otherwise no unsafe source at all is moderate; otherwise loose.
pub fn classify_policy(policy: &str) -> CspLevel {
    let policy = policy.to_ascii_lowercase();
    let unsafe_inline = policy.contains("unsafe-inline");
    let unsafe_eval = policy.contains("unsafe-eval");

    if policy.contains("strict-dynamic") && !unsafe_inline {
        CspLevel::Strict
    } else if !unsafe_inline && !unsafe_eval {
        CspLevel::Moderate
    } else {
        CspLevel::Loose
    }
}

/// Classifies every discovered policy in order. A later policy overrides an earlier one.
pub fn classify_csp(policies: &[String]) -> CspLevel {
    policies
        .iter()
        .filter(|p| !p.trim().is_empty())
        .fold(CspLevel::None, |_, policy| classify_policy(policy))
}

fn nonce_source_regex() -> Option<&'static Regex> {
    static NONCE: OnceLock<Option<Regex>> = OnceLock::new();
    NONCE
        .get_or_init(|| Regex::new(r"'nonce-([A-Za-z0-9+/=_\-]+)'").ok())
        .as_ref()
}

/// Picks a usable nonce: a script element's nonce first, then one named in a policy.
pub fn extract_nonce(policies: &[String], script_nonces: &[String]) -> Option<String> {
    if let Some(nonce) = script_nonces.iter().find(|n| !n.is_empty()) {
        return Some(nonce.clone());
    }
    policies.iter().find_map(|policy| {
        nonce_source_regex()?
            .captures(policy)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Weighted risk score. CSP dominates, headers and countermeasures add on top.
pub fn score_risk(
    level: CspLevel,
    headers: &SecurityHeaders,
    anti_script: &AntiScriptInfo,
    weights: &RiskWeights,
) -> u32 {
    let csp = match level {
        CspLevel::None => weights.csp_none,
        CspLevel::Loose => weights.csp_loose,
        CspLevel::Moderate => weights.csp_moderate,
        CspLevel::Strict => weights.csp_strict,
        CspLevel::Unknown => weights.csp_unknown,
    };
    // Weights are user-configurable, so the sum saturates instead of wrapping.
    let techniques = u32::try_from(anti_script.techniques.len()).unwrap_or(u32::MAX);
    csp.saturating_add(headers.count().saturating_mul(weights.per_security_header))
        .saturating_add(techniques.saturating_mul(weights.per_anti_script_technique))
}

pub fn risk_level_for(score: u32, thresholds: &[u32; 4]) -> RiskLevel {
    if score < thresholds[0] {
        RiskLevel::Minimal
    } else if score < thresholds[1] {
        RiskLevel::Low
    } else if score < thresholds[2] {
        RiskLevel::Moderate
    } else if score < thresholds[3] {
        RiskLevel::High
    } else {
        RiskLevel::Extreme
    }
}

/// Builds the strategy priority list. Never returns an empty list.
pub fn recommend_strategies(csp: &CspInfo, anti_script: &AntiScriptInfo) -> Vec<StrategyKind> {
    use StrategyKind::*;

    let mut strategies = match csp.level {
        CspLevel::Strict => vec![SandboxBridge, WorkerTunnel, MutationTimed],
        CspLevel::Moderate if csp.nonce.is_some() => vec![Nonce, BlobUrl, DirectPage],
        CspLevel::Moderate => vec![BlobUrl, SandboxBridge, DirectPage],
        CspLevel::Loose | CspLevel::None => vec![DirectPage, IsolatedWorld, BlobUrl],
        CspLevel::Unknown => Vec::new(),
    };

    if anti_script.blocks_scripts() {
        strategies.retain(|s| !SCRIPT_BLOCKING_PROMOTED.contains(s));
        let mut promoted = SCRIPT_BLOCKING_PROMOTED.to_vec();
        promoted.extend(strategies);
        strategies = promoted;
    }

    if strategies.is_empty() {
        strategies = FALLBACK_STRATEGIES.to_vec();
    }
    strategies
}

/// Profile returned when analysis fails as a whole. Never cached.
pub fn default_moderate_profile(weights: &RiskWeights) -> SecurityProfile {
    let csp = CspInfo {
        level: CspLevel::Moderate,
        nonce: None,
        policies: Vec::new(),
    };
    let anti_script = AntiScriptInfo::default();
    let recommended_strategy = recommend_strategies(&csp, &anti_script);
    SecurityProfile {
        csp,
        headers: SecurityHeaders::default(),
        frameworks: Vec::new(),
        anti_script,
        risk_score: weights.csp_moderate,
        risk_level: RiskLevel::Moderate,
        recommended_strategy,
        fallback: true,
    }
}
