//! App Core for Scriptbridge.
//!
//! Central struct holding the stores, matcher, detector, orchestrator and
//! page bridge for one session. A navigation event flows through
//! [`App::on_navigation`]: list scripts, match each frame's URL, profile the
//! frame, prepare payloads and hand the plans to the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::managers::menu_command_registry::MenuCommandRegistry;
use crate::managers::script_store::{ScriptStore, ScriptStoreTrait};
use crate::managers::value_store::{ValueStore, ValueStoreTrait};
use crate::platform::host::HostPlatform;
use crate::services::dependency_loader::{DependencyCache, DependencyFetcher, DependencyLoader, HttpFetcher};
use crate::services::grant_api::GrantApi;
use crate::services::injection_orchestrator::{frame_skip_reason, phase_allows, FramePlan, InjectionOrchestrator};
use crate::services::injection_strategies::StrategySet;
use crate::services::message_bridge::MessageBridge;
use crate::services::page_probe::ScriptedPageProbe;
use crate::services::script_payload::{PreparedScript, ScriptPayloadBuilder};
use crate::services::security_detector::SecurityDetector;
use crate::services::settings_engine::{SettingsEngine, SettingsEngineTrait};
use crate::services::url_matcher::UrlMatcher;
use crate::types::bridge::PageCommand;
use crate::types::errors::{BridgeError, StoreError};
use crate::types::injection::{
    FrameInfo, FrameTarget, NavigationPhase, StrategyKind, TabId, TabInjectionSummary, TOP_FRAME_ID,
};
use crate::types::script::ScriptRecord;
use crate::types::settings::ManagerSettings;

/// Per-session application context.
///
/// Everything with state (pattern cache, profile cache, menu registry,
/// pending bridge commands) hangs off this struct and is torn down by
/// [`App::shutdown`].
pub struct App<H: HostPlatform + 'static> {
    pub db: Arc<Database>,
    pub host: Arc<H>,
    pub script_store: Arc<ScriptStore>,
    pub value_store: Arc<ValueStore>,
    pub menu_commands: Arc<MenuCommandRegistry>,
    pub url_matcher: UrlMatcher,
    pub security_detector: SecurityDetector,
    pub orchestrator: InjectionOrchestrator,
    pub bridge: MessageBridge<H>,
    pub dependency_loader: DependencyLoader,
    pub settings_engine: SettingsEngine,
}

impl<H: HostPlatform + 'static> App<H> {
    /// Opens the database at `db_path`, loads settings and wires every component.
    ///
    /// A settings file that cannot be read is logged and replaced by defaults.
    pub fn new(
        host: Arc<H>,
        db_path: &str,
        settings_path: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Arc::new(Database::open(db_path)?);

        let mut settings_engine = SettingsEngine::new(settings_path);
        if let Err(e) = settings_engine.load() {
            warn!("using default settings: {e}");
        }

        let fetcher = HttpFetcher::new(&settings_engine.get_settings().dependencies)
            .map_err(|e| format!("HttpFetcher init failed: {}", e))?;

        Ok(Self::with_parts(host, db, settings_engine, Arc::new(fetcher)))
    }

    /// Wires an app from already-open parts. Settings are taken as loaded.
    pub fn with_parts(
        host: Arc<H>,
        db: Arc<Database>,
        settings_engine: SettingsEngine,
        fetcher: Arc<dyn DependencyFetcher>,
    ) -> Self {
        let settings = settings_engine.get_settings().clone();

        let script_store = Arc::new(ScriptStore::new(db.clone()));
        let value_store = Arc::new(ValueStore::new(db.clone()));
        let menu_commands = Arc::new(MenuCommandRegistry::new());

        let probe = Arc::new(ScriptedPageProbe::new(host.clone()));
        let security_detector = SecurityDetector::new(probe, settings.detection.clone());
        let orchestrator = InjectionOrchestrator::new(
            StrategySet::with_defaults(host.clone()),
            settings.injection.clone(),
        );

        let scripts: Arc<dyn ScriptStoreTrait> = script_store.clone();
        let values: Arc<dyn ValueStoreTrait> = value_store.clone();
        let grant_api = Arc::new(GrantApi::new(scripts, values, menu_commands.clone()));
        let bridge = MessageBridge::new(
            host.clone(),
            grant_api,
            Duration::from_millis(settings.injection.bridge_ack_timeout_ms),
        );

        let dependency_loader = DependencyLoader::new(fetcher, DependencyCache::new(db.clone()));

        Self {
            db,
            host,
            script_store,
            value_store,
            menu_commands,
            url_matcher: UrlMatcher::new(),
            security_detector,
            orchestrator,
            bridge,
            dependency_loader,
            settings_engine,
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        self.settings_engine.get_settings()
    }

    /// Pushes the engine's current settings into the running components.
    ///
    /// Dependency fetch limits are fixed when the fetcher is built and apply from the next start.
    pub fn apply_settings(&mut self) {
        let settings = self.settings_engine.get_settings().clone();
        self.orchestrator.update_settings(settings.injection.clone());
        self.security_detector.update_settings(settings.detection);
        self.bridge
            .set_timeout(Duration::from_millis(settings.injection.bridge_ack_timeout_ms));
    }

    /// Handles one navigation lifecycle event of a tab.
    ///
    /// Host or store failures are logged and yield an empty summary.
    pub async fn on_navigation(&self, tab_id: TabId, phase: NavigationPhase) -> TabInjectionSummary {
        let mut summary = TabInjectionSummary {
            tab_id,
            reports: Vec::new(),
        };

        if phase == NavigationPhase::Loading {
            // New document: menus and profiles of the old one are stale.
            self.menu_commands.clear_tab(tab_id);
            self.security_detector.invalidate_tab(tab_id);
        }

        let frames = match self.host.query_frames(tab_id).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!("cannot list frames of tab {tab_id}: {e}");
                return summary;
            }
        };
        let records = match self.script_store.list() {
            Ok(records) => records,
            Err(e) => {
                warn!("cannot list scripts: {e}");
                return summary;
            }
        };
        if records.is_empty() {
            return summary;
        }

        let plans: Vec<FramePlan> = join_all(
            frames
                .into_iter()
                .map(|frame| self.plan_frame(tab_id, frame, &records, phase)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        summary.reports = self.orchestrator.inject_frames(&plans, phase).await;
        if !summary.reports.is_empty() {
            info!(
                "tab {tab_id} {phase:?}: badge '{}', {} failed",
                summary.badge_text(),
                summary.failed_count()
            );
        }
        summary
    }

    /// Scripts that should run in `frame` during `phase`, in store order.
    pub fn scripts_for_frame<'r>(
        &self,
        frame: &FrameInfo,
        records: &'r [ScriptRecord],
        phase: NavigationPhase,
    ) -> Vec<&'r ScriptRecord> {
        let top = frame.frame_id == TOP_FRAME_ID;
        records
            .iter()
            .filter(|r| top || !r.metadata.noframes)
            .filter(|r| phase_allows(r.metadata.run_at, phase))
            .filter(|r| self.url_matcher.matches_record(Some(*r), &frame.url))
            .collect()
    }

    async fn plan_frame(
        &self,
        tab_id: TabId,
        frame: FrameInfo,
        records: &[ScriptRecord],
        phase: NavigationPhase,
    ) -> Option<FramePlan> {
        let target = FrameTarget::new(tab_id, frame.frame_id);
        if let Some(reason) = frame_skip_reason(&frame) {
            debug!("not injecting into {target}: {reason:?}");
            return None;
        }

        let matched = self.scripts_for_frame(&frame, records, phase);
        if matched.is_empty() {
            return None;
        }

        let (order, nonce) = self.strategy_order(target).await;
        let scripts = join_all(matched.into_iter().map(|record| async move {
            let prepared = self.prepare(record).await;
            (record.clone(), prepared)
        }))
        .await;

        Some(FramePlan {
            target,
            frame,
            scripts,
            order,
            nonce,
        })
    }

    /// Recommended order and nonce for a frame, or the configured order when detection is off.
    async fn strategy_order(&self, target: FrameTarget) -> (Vec<StrategyKind>, Option<String>) {
        if self.security_detector.settings().enabled {
            let profile = self.security_detector.analyze(target).await;
            debug!(
                "{target}: csp {}, risk {:?}, primary {:?}",
                profile.csp.level,
                profile.risk_level,
                profile.primary_strategy()
            );
            (profile.recommended_strategy, profile.csp.nonce)
        } else {
            (self.orchestrator.settings().default_strategy_order.clone(), None)
        }
    }

    /// Loads dependencies into a copy of the record and builds its payload.
    pub async fn prepare(&self, record: &ScriptRecord) -> PreparedScript {
        let mut resolved = record.clone();
        let failed = self.dependency_loader.resolve(&mut resolved.metadata).await;
        if failed > 0 {
            debug!("{}: {failed} dependency(ies) unavailable", record.metadata.name);
        }

        let values = self.value_store.snapshot(&record.id).unwrap_or_else(|e| {
            warn!("no value snapshot for {}: {e}", record.metadata.name);
            Map::new()
        });
        ScriptPayloadBuilder::new(&resolved).with_values(values).build()
    }

    /// Runs a registered menu command in the frame that registered it.
    pub async fn invoke_menu_command(&self, tab_id: TabId, command_id: &str) -> Result<Value, BridgeError> {
        let command = self
            .menu_commands
            .get(tab_id, command_id)
            .ok_or_else(|| BridgeError::Handler(format!("no menu command {command_id} in tab {tab_id}")))?;
        self.bridge
            .send_command(
                command.target,
                PageCommand::InvokeMenuCommand {
                    command_id: command.id,
                },
            )
            .await
    }

    /// Removes a script together with its values and menu entries.
    pub fn remove_script(&self, id: &str) -> Result<(), StoreError> {
        self.script_store.remove(id)?;
        self.menu_commands.remove_script(id);
        Ok(())
    }

    /// Teardown: fail pending commands, drop caches and registries.
    pub async fn shutdown(&self) {
        self.bridge.shutdown().await;
        self.security_detector.clear_cache();
        self.menu_commands.clear();
        self.url_matcher.clear_cache();
        info!("scriptbridge session closed");
    }
}
