//! RPC method handler for the Scriptbridge JSON-RPC protocol.
//!
//! Extracted from `rpc_server.rs` so it can be unit-tested independently.
//! Requests decode into the [`RpcRequest`] command enum and are dispatched
//! by one exhaustive `match` onto the `App`.

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::app::App;
use crate::managers::script_store::ScriptStoreTrait;
use crate::platform::host::HostPlatform;
use crate::services::metadata_parser;
use crate::services::settings_engine::SettingsEngineTrait;
use crate::types::injection::{FrameId, FrameTarget, NavigationPhase, TabId};

/// Every method the server understands, with its parameters.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "method", content = "params")]
pub enum RpcRequest {
    #[serde(rename = "script.add")]
    ScriptAdd { content: String },
    #[serde(rename = "script.update")]
    ScriptUpdate { id: String, content: String },
    #[serde(rename = "script.toggle")]
    ScriptToggle { id: String },
    #[serde(rename = "script.remove")]
    ScriptRemove { id: String },
    #[serde(rename = "script.list")]
    ScriptList {},
    #[serde(rename = "script.get")]
    ScriptGet { id: String },
    #[serde(rename = "script.parse")]
    ScriptParse { content: String },
    #[serde(rename = "script.match")]
    ScriptMatch {
        url: String,
        #[serde(default)]
        subframe: bool,
    },
    #[serde(rename = "security.clear_cache")]
    SecurityClearCache {},
    #[serde(rename = "tab.navigate")]
    TabNavigate {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        phase: NavigationPhase,
    },
    #[serde(rename = "bridge.message")]
    BridgeMessage {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        /// Defaults to the top frame.
        #[serde(rename = "frameId", default)]
        frame_id: FrameId,
        message: String,
    },
    #[serde(rename = "menu.list")]
    MenuList {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    #[serde(rename = "menu.invoke")]
    MenuInvoke {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        #[serde(rename = "commandId")]
        command_id: String,
    },
    #[serde(rename = "settings.get")]
    SettingsGet {},
    #[serde(rename = "settings.set")]
    SettingsSet { key: String, value: Value },
}

/// Decodes `method` and `params` into a request.
pub fn parse_request(method: &str, params: &Value) -> Result<RpcRequest, String> {
    let params = match params {
        Value::Null => json!({}),
        other => other.clone(),
    };
    serde_json::from_value(json!({ "method": method, "params": params })).map_err(|e| {
        let message = e.to_string();
        if message.starts_with("unknown variant") {
            format!("unknown method: {}", method)
        } else {
            format!("invalid params for {}: {}", method, message)
        }
    })
}

/// Dispatch a JSON-RPC method call to the appropriate handler.
///
/// Returns `Ok(Value)` on success or `Err(String)` with an error message.
pub async fn handle_method<H: HostPlatform + 'static>(
    app: &RwLock<App<H>>,
    method: &str,
    params: &Value,
) -> Result<Value, String> {
    let request = parse_request(method, params)?;
    handle_request(app, request).await
}

pub async fn handle_request<H: HostPlatform + 'static>(
    app: &RwLock<App<H>>,
    request: RpcRequest,
) -> Result<Value, String> {
    match request {
        // ─── Scripts ───
        RpcRequest::ScriptAdd { content } => {
            let a = app.read().await;
            let record = a.script_store.add_script(&content).map_err(|e| e.to_string())?;
            serde_json::to_value(record).map_err(|e| e.to_string())
        }
        RpcRequest::ScriptUpdate { id, content } => {
            let a = app.read().await;
            let record = a
                .script_store
                .update_content(&id, &content)
                .map_err(|e| e.to_string())?;
            serde_json::to_value(record).map_err(|e| e.to_string())
        }
        RpcRequest::ScriptToggle { id } => {
            let a = app.read().await;
            let enabled = a.script_store.toggle(&id).map_err(|e| e.to_string())?;
            Ok(json!({"id": id, "enabled": enabled}))
        }
        RpcRequest::ScriptRemove { id } => {
            let a = app.read().await;
            a.remove_script(&id).map_err(|e| e.to_string())?;
            Ok(json!({"ok": true}))
        }
        RpcRequest::ScriptList {} => {
            let a = app.read().await;
            let records = a.script_store.list().map_err(|e| e.to_string())?;
            serde_json::to_value(records).map_err(|e| e.to_string())
        }
        RpcRequest::ScriptGet { id } => {
            let a = app.read().await;
            let record = a.script_store.get(&id).map_err(|e| e.to_string())?;
            serde_json::to_value(record).map_err(|e| e.to_string())
        }
        RpcRequest::ScriptParse { content } => {
            let metadata = metadata_parser::parse_detailed(&content).map_err(|e| e.to_string())?;
            serde_json::to_value(metadata).map_err(|e| e.to_string())
        }
        RpcRequest::ScriptMatch { url, subframe } => {
            let a = app.read().await;
            let records = a.script_store.list().map_err(|e| e.to_string())?;
            let ids: Vec<&str> = records
                .iter()
                .filter(|r| !(subframe && r.metadata.noframes))
                .filter(|r| a.url_matcher.matches_record(Some(*r), &url))
                .map(|r| r.id.as_str())
                .collect();
            Ok(json!(ids))
        }

        // ─── Security ───
        RpcRequest::SecurityClearCache {} => {
            let a = app.read().await;
            a.security_detector.clear_cache();
            Ok(json!({"ok": true}))
        }

        // ─── Page lifecycle and bridge ───
        RpcRequest::TabNavigate { tab_id, phase } => {
            let a = app.read().await;
            let summary = a.on_navigation(tab_id, phase).await;
            let badge = summary.badge_text();
            let mut value = serde_json::to_value(summary).map_err(|e| e.to_string())?;
            value["badge"] = json!(badge);
            Ok(value)
        }
        RpcRequest::BridgeMessage { tab_id, frame_id, message } => {
            let a = app.read().await;
            let target = FrameTarget::new(tab_id, frame_id);
            let response = a
                .bridge
                .handle_inbound(target, &message)
                .await
                .map_err(|e| e.to_string())?;
            serde_json::to_value(response).map_err(|e| e.to_string())
        }
        RpcRequest::MenuList { tab_id } => {
            let a = app.read().await;
            serde_json::to_value(a.menu_commands.list(tab_id)).map_err(|e| e.to_string())
        }
        RpcRequest::MenuInvoke { tab_id, command_id } => {
            let a = app.read().await;
            a.invoke_menu_command(tab_id, &command_id)
                .await
                .map_err(|e| e.to_string())
        }

        // ─── Settings ───
        RpcRequest::SettingsGet {} => {
            let a = app.read().await;
            serde_json::to_value(a.settings()).map_err(|e| e.to_string())
        }
        RpcRequest::SettingsSet { key, value } => {
            let mut a = app.write().await;
            a.settings_engine.set_value(&key, value).map_err(|e| e.to_string())?;
            a.apply_settings();
            Ok(json!({"ok": true}))
        }
    }
}
