//! Injection Orchestrator for Scriptbridge.
//!
//! Drives each (script, frame) pair through its strategy list:
//! `pending -> trying(i) -> succeeded | trying(i + 1) -> ... -> exhausted`.
//! Strategies run strictly in order and the first success ends the pair.
//! Failures of one pair never affect another.

use std::time::Instant;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::services::injection_strategies::StrategySet;
use crate::services::script_payload::PreparedScript;
use crate::types::errors::InjectionError;
use crate::types::injection::{
    FrameInfo, FrameTarget, InjectionAttempt, InjectionOptions, InjectionOutcome, InjectionReport,
    NavigationPhase, SkipReason, StrategyKind,
};
use crate::types::script::{InjectInto, RunAt, ScriptRecord};
use crate::types::settings::InjectionSettings;

/// Everything needed to inject into one frame.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub target: FrameTarget,
    pub frame: FrameInfo,
    /// Matched scripts with their prepared payloads, in store order.
    pub scripts: Vec<(ScriptRecord, PreparedScript)>,
    pub order: Vec<StrategyKind>,
    pub nonce: Option<String>,
}

/// Why a frame must not receive any script, if it must not.
pub fn frame_skip_reason(frame: &FrameInfo) -> Option<SkipReason> {
    if frame.error_occurred {
        Some(SkipReason::ErroredFrame)
    } else if frame.url.is_empty() || frame.url.starts_with("about:blank") {
        Some(SkipReason::BlankFrame)
    } else {
        None
    }
}

/// Whether a script with `run_at` may run during `phase`.
pub fn phase_allows(run_at: RunAt, phase: NavigationPhase) -> bool {
    match run_at {
        RunAt::DocumentStart => phase == NavigationPhase::Loading,
        RunAt::DocumentEnd | RunAt::DocumentIdle => phase == NavigationPhase::Complete,
    }
}

/// Adjusts a recommended order to the script's `@inject-into` preference.
pub fn order_for_script(inject_into: InjectInto, order: &[StrategyKind]) -> Vec<StrategyKind> {
    match inject_into {
        InjectInto::Auto => order.to_vec(),
        InjectInto::Page => order
            .iter()
            .copied()
            .filter(|k| *k != StrategyKind::IsolatedWorld)
            .collect(),
        InjectInto::Content => {
            let mut adjusted = vec![StrategyKind::IsolatedWorld];
            adjusted.extend(order.iter().copied().filter(|k| *k != StrategyKind::IsolatedWorld));
            adjusted
        }
    }
}

pub struct InjectionOrchestrator {
    strategies: StrategySet,
    settings: InjectionSettings,
}

impl InjectionOrchestrator {
    pub fn new(strategies: StrategySet, settings: InjectionSettings) -> Self {
        Self {
            strategies,
            settings,
        }
    }

    pub fn settings(&self) -> &InjectionSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, settings: InjectionSettings) {
        self.settings = settings;
    }

    /// Tries `order` until one strategy succeeds.
    pub async fn run_strategies(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        order: &[StrategyKind],
        options: &InjectionOptions,
    ) -> InjectionReport {
        if order.is_empty() {
            return InjectionReport::skipped(&script.script_id, target, SkipReason::NoStrategies);
        }

        let mut attempts = Vec::with_capacity(order.len());
        for &kind in order {
            let started = Instant::now();
            let result = match self.strategies.get(kind) {
                Some(strategy) => strategy.attempt(script, target, options).await,
                None => Err(InjectionError::StrategyFailed {
                    strategy: kind.to_string(),
                    reason: "strategy not registered".to_string(),
                }),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    debug!("injected {} into {target} via {kind}", script.script_id);
                    attempts.push(InjectionAttempt {
                        strategy: kind,
                        succeeded: true,
                        error: None,
                        elapsed_ms,
                    });
                    return InjectionReport {
                        script_id: script.script_id.clone(),
                        target,
                        attempts,
                        outcome: InjectionOutcome::Succeeded { strategy: kind },
                    };
                }
                Err(e) => {
                    debug!("{} into {target}: {e}", script.script_id);
                    attempts.push(InjectionAttempt {
                        strategy: kind,
                        succeeded: false,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        warn!(
            "script {} ({}) exhausted {} strategies in {target}",
            script.script_id,
            script.name,
            attempts.len()
        );
        InjectionReport {
            script_id: script.script_id.clone(),
            target,
            attempts,
            outcome: InjectionOutcome::Exhausted,
        }
    }

    /// Injects one record into one frame, applying skip and timing rules.
    #[allow(clippy::too_many_arguments)]
    pub async fn inject(
        &self,
        record: &ScriptRecord,
        script: &PreparedScript,
        frame: &FrameInfo,
        target: FrameTarget,
        phase: NavigationPhase,
        order: &[StrategyKind],
        nonce: Option<String>,
    ) -> InjectionReport {
        if let Some(reason) = frame_skip_reason(frame) {
            return InjectionReport::skipped(&record.id, target, reason);
        }
        if !record.enabled {
            return InjectionReport::skipped(&record.id, target, SkipReason::Disabled);
        }
        if !phase_allows(record.metadata.run_at, phase) {
            return InjectionReport::skipped(&record.id, target, SkipReason::WrongPhase);
        }

        let order = order_for_script(record.metadata.inject_into, order);
        let options = self.settings.attempt_options(nonce);
        self.run_strategies(script, target, &order, &options).await
    }

    /// Injects every script of one frame, sequentially and in order.
    /// `document_idle` scripts wait for the settle delay once, right before the first of them.
    pub async fn inject_frame(&self, plan: &FramePlan, phase: NavigationPhase) -> Vec<InjectionReport> {
        let mut reports = Vec::with_capacity(plan.scripts.len());
        let mut settled = false;

        for (record, script) in &plan.scripts {
            let idle = record.metadata.run_at == RunAt::DocumentIdle;
            if idle
                && !settled
                && phase == NavigationPhase::Complete
                && frame_skip_reason(&plan.frame).is_none()
            {
                tokio::time::sleep(self.settings.idle_settle_delay()).await;
                settled = true;
            }
            let report = self
                .inject(
                    record,
                    script,
                    &plan.frame,
                    plan.target,
                    phase,
                    &plan.order,
                    plan.nonce.clone(),
                )
                .await;
            reports.push(report);
        }
        reports
    }

    /// Fans out across frames concurrently and collects every report.
    pub async fn inject_frames(&self, plans: &[FramePlan], phase: NavigationPhase) -> Vec<InjectionReport> {
        let per_frame = join_all(plans.iter().map(|plan| self.inject_frame(plan, phase))).await;
        let reports: Vec<InjectionReport> = per_frame.into_iter().flatten().collect();

        let injected = reports.iter().filter(|r| r.succeeded()).count();
        let failed = reports.iter().filter(|r| r.exhausted()).count();
        if injected > 0 || failed > 0 {
            info!(
                "{} frame(s): {injected} injected, {failed} exhausted",
                plans.len()
            );
        }
        reports
    }
}
