//! Manager side of the granted capabilities.
//!
//! Every page request is checked against the calling script's `@grant`
//! list before it touches storage or the menu registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::managers::menu_command_registry::MenuCommandRegistry;
use crate::managers::script_store::ScriptStoreTrait;
use crate::managers::value_store::ValueStoreTrait;
use crate::services::message_bridge::BridgeHandler;
use crate::types::bridge::BridgeRequest;
use crate::types::errors::{BridgeError, StoreError};
use crate::types::injection::FrameTarget;

/// Grant a request needs.
pub fn required_grant(request: &BridgeRequest) -> &'static str {
    match request {
        BridgeRequest::GetValue { .. } => "GM_getValue",
        BridgeRequest::SetValue { .. } => "GM_setValue",
        BridgeRequest::DeleteValue { .. } => "GM_deleteValue",
        BridgeRequest::ListValues => "GM_listValues",
        BridgeRequest::RegisterMenuCommand { .. } => "GM_registerMenuCommand",
        BridgeRequest::UnregisterMenuCommand { .. } => "GM_unregisterMenuCommand",
        BridgeRequest::Log { .. } => "GM_log",
    }
}

pub struct GrantApi {
    scripts: Arc<dyn ScriptStoreTrait>,
    values: Arc<dyn ValueStoreTrait>,
    menus: Arc<MenuCommandRegistry>,
}

impl GrantApi {
    pub fn new(
        scripts: Arc<dyn ScriptStoreTrait>,
        values: Arc<dyn ValueStoreTrait>,
        menus: Arc<MenuCommandRegistry>,
    ) -> Self {
        Self {
            scripts,
            values,
            menus,
        }
    }
}

#[async_trait]
impl BridgeHandler for GrantApi {
    async fn handle(
        &self,
        target: FrameTarget,
        script_id: &str,
        request: BridgeRequest,
    ) -> Result<Value, BridgeError> {
        let script = self
            .scripts
            .get(script_id)
            .map_err(|e| BridgeError::Handler(e.to_string()))?;
        let grant = required_grant(&request);
        if !script.metadata.has_grant(grant) {
            return Err(BridgeError::Handler(format!(
                "script {} was not granted {}",
                script.metadata.name, grant
            )));
        }

        let store_err = |e: StoreError| BridgeError::Handler(e.to_string());
        match request {
            BridgeRequest::GetValue { key, default } => Ok(self
                .values
                .get_value(script_id, &key)
                .map_err(store_err)?
                .or(default)
                .unwrap_or(Value::Null)),
            BridgeRequest::SetValue { key, value } => {
                self.values.set_value(script_id, &key, &value).map_err(store_err)?;
                Ok(Value::Null)
            }
            BridgeRequest::DeleteValue { key } => self
                .values
                .delete_value(script_id, &key)
                .map(Value::Bool)
                .map_err(store_err),
            BridgeRequest::ListValues => self
                .values
                .list_keys(script_id)
                .map(Value::from)
                .map_err(store_err),
            BridgeRequest::RegisterMenuCommand {
                command_id,
                caption,
                access_key,
            } => {
                let id = match command_id {
                    Some(requested) => {
                        self.menus
                            .register_as(target, script_id, &requested, &caption, access_key)
                    }
                    None => self.menus.register(target, script_id, &caption, access_key),
                };
                Ok(Value::String(id))
            }
            BridgeRequest::UnregisterMenuCommand { command_id } => Ok(Value::Bool(
                self.menus.unregister(target.tab_id, script_id, &command_id),
            )),
            BridgeRequest::Log { message } => {
                info!(script = %script.metadata.name, "{message}");
                Ok(Value::Null)
            }
        }
    }
}
