//! Unit tests for the RPC handler: every method dispatched by `handle_method`.
//!
//! Most tests go through the same path as the `scriptbridge-rpc` binary: an
//! App on a temporary on-disk database with no page host attached.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::RwLock;

use scriptbridge::app::App;
use scriptbridge::database::Database;
use scriptbridge::platform::host::{DetachedHost, HostPlatform};
use scriptbridge::rpc_handler::{handle_method, parse_request, RpcRequest};
use scriptbridge::services::dependency_loader::{DependencyFetcher, FetchedBody};
use scriptbridge::services::settings_engine::SettingsEngine;
use scriptbridge::types::bridge::BRIDGE_CHANNEL;
use scriptbridge::types::errors::{DependencyError, HostError};
use scriptbridge::types::injection::{ExecutionWorld, FrameInfo, FrameTarget, NavigationPhase, TabId};

const SCRIPT: &str = "// ==UserScript==\n// @name Rpc Script\n// @match *://a.com/*\n// @grant GM_registerMenuCommand\n// ==/UserScript==\nwindow.rpcTestPayload = 1;";

/// Create a fresh App backed by a temp directory DB.
fn setup() -> (RwLock<App<DetachedHost>>, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let db_path = tmp.path().join("test.db");
    let settings_path = tmp.path().join("settings.json").to_string_lossy().to_string();
    let app = App::new(
        Arc::new(DetachedHost),
        db_path.to_str().unwrap(),
        Some(settings_path),
    )
    .expect("Failed to init App");
    (RwLock::new(app), tmp)
}

async fn add(app: &RwLock<App<DetachedHost>>) -> String {
    let res = handle_method(app, "script.add", &json!({"content": SCRIPT}))
        .await
        .unwrap();
    res["id"].as_str().unwrap().to_string()
}

// ─── Decoding ───

#[tokio::test]
async fn test_unknown_method_returns_error() {
    let (app, _tmp) = setup();
    let err = handle_method(&app, "nonexistent.method", &json!({})).await.unwrap_err();
    assert!(err.contains("unknown method"), "{err}");
}

#[tokio::test]
async fn test_missing_params_are_reported() {
    let (app, _tmp) = setup();
    let err = handle_method(&app, "script.add", &json!({})).await.unwrap_err();
    assert!(err.starts_with("invalid params for script.add"), "{err}");
}

#[test]
fn test_null_params_decode_for_parameterless_methods() {
    assert_eq!(parse_request("script.list", &Value::Null), Ok(RpcRequest::ScriptList {}));
    assert_eq!(
        parse_request("bridge.message", &json!({"tabId": 3, "message": "{}"})),
        Ok(RpcRequest::BridgeMessage {
            tab_id: 3,
            frame_id: 0,
            message: "{}".to_string()
        })
    );
    assert_eq!(
        parse_request("tab.navigate", &json!({"tabId": 1, "phase": "loading"})),
        Ok(RpcRequest::TabNavigate {
            tab_id: 1,
            phase: NavigationPhase::Loading
        })
    );
}

// ─── Scripts ───

#[tokio::test]
async fn test_script_add_get_and_list() {
    let (app, _tmp) = setup();
    let id = add(&app).await;

    let got = handle_method(&app, "script.get", &json!({"id": id})).await.unwrap();
    assert_eq!(got["metadata"]["name"], "Rpc Script");
    assert_eq!(got["enabled"], true);
    assert!(got["addedAt"].as_i64().unwrap() > 0);

    let list = handle_method(&app, "script.list", &json!({})).await.unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["id"], id.as_str());
}

#[tokio::test]
async fn test_script_update_keeps_id() {
    let (app, _tmp) = setup();
    let id = add(&app).await;
    let updated = handle_method(
        &app,
        "script.update",
        &json!({"id": id, "content": SCRIPT.replace("Rpc Script", "Renamed")}),
    )
    .await
    .unwrap();
    assert_eq!(updated["id"], id.as_str());
    assert_eq!(updated["metadata"]["name"], "Renamed");
}

#[tokio::test]
async fn test_script_toggle_and_remove() {
    let (app, _tmp) = setup();
    let id = add(&app).await;

    let toggled = handle_method(&app, "script.toggle", &json!({"id": id})).await.unwrap();
    assert_eq!(toggled, json!({"id": id, "enabled": false}));

    let removed = handle_method(&app, "script.remove", &json!({"id": id})).await.unwrap();
    assert_eq!(removed, json!({"ok": true}));

    let err = handle_method(&app, "script.get", &json!({"id": id})).await.unwrap_err();
    assert!(err.contains("Script not found"), "{err}");
}

#[tokio::test]
async fn test_script_parse() {
    let (app, _tmp) = setup();
    let meta = handle_method(&app, "script.parse", &json!({"content": SCRIPT})).await.unwrap();
    assert_eq!(meta["name"], "Rpc Script");
    assert_eq!(meta["match"], json!(["*://a.com/*"]));

    let err = handle_method(&app, "script.parse", &json!({"content": "alert(1)"}))
        .await
        .unwrap_err();
    assert_eq!(err, "Metadata start marker not found");
}

#[tokio::test]
async fn test_script_match_honours_noframes_and_enabled() {
    let (app, _tmp) = setup();
    let id = add(&app).await;
    let top_only = handle_method(
        &app,
        "script.add",
        &json!({"content": "// ==UserScript==\n// @noframes\n// ==/UserScript=="}),
    )
    .await
    .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let top = handle_method(&app, "script.match", &json!({"url": "https://a.com/x"}))
        .await
        .unwrap();
    assert_eq!(top, json!([id, top_only]));

    let sub = handle_method(
        &app,
        "script.match",
        &json!({"url": "https://a.com/x", "subframe": true}),
    )
    .await
    .unwrap();
    assert_eq!(sub, json!([id]));

    handle_method(&app, "script.toggle", &json!({"id": id})).await.unwrap();
    let after = handle_method(&app, "script.match", &json!({"url": "https://a.com/x"}))
        .await
        .unwrap();
    assert_eq!(after, json!([top_only]));
}

// ─── Settings ───

#[tokio::test]
async fn test_settings_get_and_set() {
    let (app, _tmp) = setup();
    let settings = handle_method(&app, "settings.get", &Value::Null).await.unwrap();
    assert_eq!(settings["injection"]["attempt_timeout_ms"], 5000);

    let ok = handle_method(
        &app,
        "settings.set",
        &json!({"key": "injection.attempt_timeout_ms", "value": 750}),
    )
    .await
    .unwrap();
    assert_eq!(ok, json!({"ok": true}));
    assert_eq!(app.read().await.orchestrator.settings().attempt_timeout_ms, 750);

    let err = handle_method(&app, "settings.set", &json!({"key": "nope.key", "value": 1}))
        .await
        .unwrap_err();
    assert!(err.contains("Invalid settings key"), "{err}");
}

#[tokio::test]
async fn test_security_clear_cache() {
    let (app, _tmp) = setup();
    let res = handle_method(&app, "security.clear_cache", &json!({})).await.unwrap();
    assert_eq!(res, json!({"ok": true}));
}

// ─── Page lifecycle and bridge ───

#[tokio::test]
async fn test_navigate_without_host_is_empty() {
    let (app, _tmp) = setup();
    add(&app).await;
    let res = handle_method(&app, "tab.navigate", &json!({"tabId": 9, "phase": "complete"}))
        .await
        .unwrap();
    assert_eq!(res["tabId"], 9);
    assert_eq!(res["reports"], json!([]));
    assert_eq!(res["badge"], "");
}

#[tokio::test]
async fn test_bridge_message_registers_menu_command() {
    let (app, _tmp) = setup();
    let id = add(&app).await;
    let message = json!({
        "kind": "request",
        "channel": BRIDGE_CHANNEL,
        "id": "m1",
        "scriptId": id,
        "request": {"type": "register_menu_command", "caption": "Open"}
    })
    .to_string();

    let res = handle_method(&app, "bridge.message", &json!({"tabId": 2, "message": message}))
        .await
        .unwrap();
    assert_eq!(res["kind"], "response");
    assert_eq!(res["id"], "m1");
    let command_id = res["result"].as_str().unwrap().to_string();

    let menus = handle_method(&app, "menu.list", &json!({"tabId": 2})).await.unwrap();
    assert_eq!(menus[0]["id"], command_id.as_str());
    assert_eq!(menus[0]["caption"], "Open");

    // No host to deliver into.
    let err = handle_method(
        &app,
        "menu.invoke",
        &json!({"tabId": 2, "commandId": command_id}),
    )
    .await
    .unwrap_err();
    assert!(err.starts_with("Bridge host error"), "{err}");
}

#[tokio::test]
async fn test_bridge_message_rejects_garbage() {
    let (app, _tmp) = setup();
    let err = handle_method(&app, "bridge.message", &json!({"tabId": 1, "message": "nope"}))
        .await
        .unwrap_err();
    assert!(err.starts_with("Invalid bridge message"), "{err}");
}

/// Host with a single top frame where every launch succeeds.
struct AcceptingHost;

#[async_trait]
impl HostPlatform for AcceptingHost {
    async fn execute_script(
        &self,
        _target: FrameTarget,
        _world: ExecutionWorld,
        code: &str,
    ) -> Result<Value, HostError> {
        if code.contains("rpcTestPayload") {
            Ok(json!({"ok": true}))
        } else {
            Err(HostError::ExecutionFailed("probe unsupported".to_string()))
        }
    }

    async fn query_frames(&self, _tab_id: TabId) -> Result<Vec<FrameInfo>, HostError> {
        Ok(vec![FrameInfo {
            frame_id: 0,
            parent_frame_id: None,
            url: "https://a.com/".to_string(),
            error_occurred: false,
        }])
    }
}

struct NoFetch;

#[async_trait]
impl DependencyFetcher for NoFetch {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, DependencyError> {
        Err(DependencyError::Network(url.to_string()))
    }
}

#[tokio::test]
async fn test_navigate_reports_badge() {
    let tmp = TempDir::new().unwrap();
    let settings = SettingsEngine::new(Some(
        tmp.path().join("settings.json").to_string_lossy().to_string(),
    ));
    let app = RwLock::new(App::with_parts(
        Arc::new(AcceptingHost),
        Arc::new(Database::open_in_memory().unwrap()),
        settings,
        Arc::new(NoFetch),
    ));
    handle_method(&app, "script.add", &json!({"content": SCRIPT})).await.unwrap();

    let res = handle_method(&app, "tab.navigate", &json!({"tabId": 1, "phase": "complete"}))
        .await
        .unwrap();
    assert_eq!(res["badge"], "1");
    assert_eq!(res["reports"][0]["outcome"]["state"], "succeeded");
}
