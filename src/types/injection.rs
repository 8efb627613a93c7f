use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Browser tab identifier as handed out by the host.
pub type TabId = i64;

/// Frame identifier within a tab. `0` is the top-level document.
pub type FrameId = i64;

pub const TOP_FRAME_ID: FrameId = 0;

/// Identifiers for the interchangeable injection techniques.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DirectPage,
    IsolatedWorld,
    BlobUrl,
    MutationTimed,
    SandboxBridge,
    WorkerTunnel,
    Nonce,
    EventTimed,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 8] = [
        StrategyKind::DirectPage,
        StrategyKind::IsolatedWorld,
        StrategyKind::BlobUrl,
        StrategyKind::MutationTimed,
        StrategyKind::Nonce,
        StrategyKind::EventTimed,
        StrategyKind::SandboxBridge,
        StrategyKind::WorkerTunnel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::DirectPage => "direct_page",
            StrategyKind::IsolatedWorld => "isolated_world",
            StrategyKind::BlobUrl => "blob_url",
            StrategyKind::MutationTimed => "mutation_timed",
            StrategyKind::SandboxBridge => "sandbox_bridge",
            StrategyKind::WorkerTunnel => "worker_tunnel",
            StrategyKind::Nonce => "nonce",
            StrategyKind::EventTimed => "event_timed",
        }
    }

    /// Strategies that never rely on inserting a classic inline script tag.
    pub fn avoids_inline_tag(&self) -> bool {
        matches!(
            self,
            StrategyKind::SandboxBridge | StrategyKind::WorkerTunnel | StrategyKind::MutationTimed
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the host evaluates code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionWorld {
    /// The page's own JavaScript context.
    Main,
    /// The extension-private context sharing the DOM.
    Isolated,
}

/// A (tab, frame) pair addressed by injection and detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct FrameTarget {
    pub tab_id: TabId,
    pub frame_id: FrameId,
}

impl FrameTarget {
    pub fn new(tab_id: TabId, frame_id: FrameId) -> Self {
        Self { tab_id, frame_id }
    }

    pub fn is_top(&self) -> bool {
        self.frame_id == TOP_FRAME_ID
    }
}

impl fmt::Display for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab {} frame {}", self.tab_id, self.frame_id)
    }
}

/// A frame as reported by the host's frame query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub parent_frame_id: Option<FrameId>,
    pub url: String,
    #[serde(default)]
    pub error_occurred: bool,
}

/// Navigation lifecycle phase of a frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NavigationPhase {
    Loading,
    Complete,
}

/// Per-attempt knobs handed to a strategy.
#[derive(Debug, Clone)]
pub struct InjectionOptions {
    /// Correlates DOM nodes created by the attempt so they can be cleaned up.
    pub attempt_id: String,
    pub timeout: Duration,
    /// Nonce already known from security detection, if any.
    pub nonce: Option<String>,
    pub mutation_synthetic_delay: Duration,
    pub mutation_fallback: Duration,
    pub bridge_ack_timeout: Duration,
    pub event_fallback: Duration,
}

impl Default for InjectionOptions {
    fn default() -> Self {
        Self {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            timeout: Duration::from_millis(5000),
            nonce: None,
            mutation_synthetic_delay: Duration::from_millis(50),
            mutation_fallback: Duration::from_millis(1500),
            bridge_ack_timeout: Duration::from_millis(3000),
            event_fallback: Duration::from_millis(3000),
        }
    }
}

impl InjectionOptions {
    /// Caps an in-page deadline at four fifths of the attempt timeout, so a
    /// launcher always settles before the attempt is abandoned.
    pub fn within_attempt(&self, deadline: Duration) -> Duration {
        deadline.min(self.timeout.saturating_sub(self.timeout / 5))
    }
}

/// One (script, frame, strategy) trial.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InjectionAttempt {
    pub strategy: StrategyKind,
    pub succeeded: bool,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

/// Why a (script, frame) pair was not attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    ErroredFrame,
    BlankFrame,
    WrongPhase,
    Disabled,
    NoStrategies,
}

/// Terminal state of the per-(script, frame) state machine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum InjectionOutcome {
    Succeeded { strategy: StrategyKind },
    Exhausted,
    Skipped { reason: SkipReason },
}

/// Result of driving one script into one frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InjectionReport {
    pub script_id: String,
    pub target: FrameTarget,
    pub attempts: Vec<InjectionAttempt>,
    pub outcome: InjectionOutcome,
}

impl InjectionReport {
    pub fn skipped(script_id: &str, target: FrameTarget, reason: SkipReason) -> Self {
        Self {
            script_id: script_id.to_string(),
            target,
            attempts: Vec::new(),
            outcome: InjectionOutcome::Skipped { reason },
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, InjectionOutcome::Succeeded { .. })
    }

    pub fn exhausted(&self) -> bool {
        matches!(self.outcome, InjectionOutcome::Exhausted)
    }
}

/// Aggregate of every report produced for one navigation event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TabInjectionSummary {
    pub tab_id: TabId,
    pub reports: Vec<InjectionReport>,
}

impl TabInjectionSummary {
    pub fn injected_count(&self) -> usize {
        self.reports.iter().filter(|r| r.succeeded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.reports.iter().filter(|r| r.exhausted()).count()
    }

    /// Text for the toolbar badge: number of distinct scripts running in the tab.
    pub fn badge_text(&self) -> String {
        let mut ids: Vec<&str> = self
            .reports
            .iter()
            .filter(|r| r.succeeded())
            .map(|r| r.script_id.as_str())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            String::new()
        } else {
            ids.len().to_string()
        }
    }
}
