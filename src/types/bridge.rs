use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::injection::FrameTarget;

/// Tag carried by every envelope so unrelated `postMessage` traffic is ignored.
pub const BRIDGE_CHANNEL: &str = "scriptbridge";

/// Envelope exchanged between the manager and page contexts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Page-originated call into a granted capability.
    Request {
        channel: String,
        id: String,
        #[serde(rename = "scriptId")]
        script_id: String,
        request: BridgeRequest,
    },
    /// Manager-originated command delivered into a page.
    Command {
        channel: String,
        id: String,
        command: PageCommand,
    },
    /// Answer to either of the above, correlated by `id`.
    Response {
        channel: String,
        id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
}

impl BridgeMessage {
    pub fn response(id: &str, result: Result<Value, String>) -> Self {
        let (result, error) = match result {
            Ok(value) => (Some(value), None),
            Err(message) => (None, Some(message)),
        };
        BridgeMessage::Response {
            channel: BRIDGE_CHANNEL.to_string(),
            id: id.to_string(),
            result,
            error,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            BridgeMessage::Request { channel, .. }
            | BridgeMessage::Command { channel, .. }
            | BridgeMessage::Response { channel, .. } => channel,
        }
    }
}

/// Capability calls a page-side script may make.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    GetValue {
        key: String,
        #[serde(default)]
        default: Option<Value>,
    },
    SetValue {
        key: String,
        value: Value,
    },
    DeleteValue {
        key: String,
    },
    ListValues,
    RegisterMenuCommand {
        /// Id minted by the page; the manager keeps it unless it is taken.
        #[serde(default, rename = "commandId")]
        command_id: Option<String>,
        caption: String,
        #[serde(default, rename = "accessKey")]
        access_key: Option<String>,
    },
    UnregisterMenuCommand {
        #[serde(rename = "commandId")]
        command_id: String,
    },
    Log {
        message: String,
    },
}

/// Commands the manager pushes into a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageCommand {
    InvokeMenuCommand {
        #[serde(rename = "commandId")]
        command_id: String,
    },
}

/// A userscript menu entry registered through `GM_registerMenuCommand`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MenuCommand {
    pub id: String,
    pub script_id: String,
    pub caption: String,
    pub access_key: Option<String>,
    pub target: FrameTarget,
}
