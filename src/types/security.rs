use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::injection::StrategyKind;

/// Strictness of the Content-Security-Policy observed on a page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CspLevel {
    #[default]
    None,
    Loose,
    Moderate,
    Strict,
    Unknown,
}

impl CspLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CspLevel::None => "none",
            CspLevel::Loose => "loose",
            CspLevel::Moderate => "moderate",
            CspLevel::Strict => "strict",
            CspLevel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CspLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal risk bucket derived from the weighted score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Extreme,
}

/// Countermeasures a page may deploy against injected scripts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AntiScriptTechnique {
    ScriptBlocking,
    EvalBlocking,
    MutationObserverTampering,
    FunctionToStringTampering,
    DevtoolsDetection,
    TrustedTypes,
    Other(String),
}

impl AntiScriptTechnique {
    pub fn from_name(name: &str) -> Self {
        match name {
            "script_blocking" | "scriptBlocking" => AntiScriptTechnique::ScriptBlocking,
            "eval_blocking" | "evalBlocking" => AntiScriptTechnique::EvalBlocking,
            "mutation_observer_tampering" | "mutationObserverTampering" => {
                AntiScriptTechnique::MutationObserverTampering
            }
            "function_to_string_tampering" | "functionToStringTampering" => {
                AntiScriptTechnique::FunctionToStringTampering
            }
            "devtools_detection" | "devtoolsDetection" => AntiScriptTechnique::DevtoolsDetection,
            "trusted_types" | "trustedTypes" => AntiScriptTechnique::TrustedTypes,
            other => AntiScriptTechnique::Other(other.to_string()),
        }
    }
}

/// CSP section of a [`SecurityProfile`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CspInfo {
    pub level: CspLevel,
    pub nonce: Option<String>,
    /// Raw policy strings in the order they were discovered.
    pub policies: Vec<String>,
}

/// Security headers inferred for the document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SecurityHeaders {
    pub x_frame_options: bool,
    pub strict_transport_security: bool,
    pub x_content_type_options: bool,
    pub referrer_policy: bool,
    pub permissions_policy: bool,
}

impl SecurityHeaders {
    pub fn count(&self) -> u32 {
        [
            self.x_frame_options,
            self.strict_transport_security,
            self.x_content_type_options,
            self.referrer_policy,
            self.permissions_policy,
        ]
        .iter()
        .filter(|present| **present)
        .count() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AntiScriptInfo {
    pub techniques: BTreeSet<AntiScriptTechnique>,
}

impl AntiScriptInfo {
    pub fn blocks_scripts(&self) -> bool {
        self.techniques.contains(&AntiScriptTechnique::ScriptBlocking)
    }
}

/// Ephemeral per-frame security assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProfile {
    pub csp: CspInfo,
    pub headers: SecurityHeaders,
    pub frameworks: Vec<String>,
    pub anti_script: AntiScriptInfo,
    pub risk_score: u32,
    pub risk_level: RiskLevel,
    /// Primary strategy first. Never empty.
    pub recommended_strategy: Vec<StrategyKind>,
    /// True when analysis failed and the default-moderate profile was returned.
    pub fallback: bool,
}

impl SecurityProfile {
    pub fn primary_strategy(&self) -> Option<StrategyKind> {
        self.recommended_strategy.first().copied()
    }
}
