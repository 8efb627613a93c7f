//! Builds the executable payload for a stored script.
//!
//! The payload carries everything the script body expects to find when it
//! starts: `GM_info`, one binding per granted capability, the value
//! snapshot, named resources and the loaded `@require` sources, followed by
//! the body itself.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::bridge::BRIDGE_CHANNEL;
use crate::types::script::ScriptRecord;

/// Name reported to scripts through `GM_info.scriptHandler`.
pub const SCRIPT_HANDLER: &str = "Scriptbridge";

/// A script ready to be handed to an injection strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedScript {
    pub script_id: String,
    pub name: String,
    /// Complete JavaScript source, bindings included.
    pub code: String,
}

/// Grants with a real implementation. Anything else gets a throwing stub.
const SUPPORTED_GRANTS: &[&str] = &[
    "GM_getValue",
    "GM_setValue",
    "GM_deleteValue",
    "GM_listValues",
    "GM_getResourceText",
    "GM_getResourceURL",
    "GM_addStyle",
    "GM_log",
    "GM_registerMenuCommand",
    "GM_unregisterMenuCommand",
    "unsafeWindow",
];

const BRIDGE_RUNTIME: &str = r#"const __sbPending = new Map();
const __sbMenu = new Map();
const __sbMenuIds = new Map();
const __sbPost = (request) => {
  const id = Math.random().toString(36).slice(2) + Date.now().toString(36);
  window.postMessage({ channel: __sb.channel, kind: 'request', id, scriptId: __sb.scriptId, request }, '*');
  return id;
};
window.addEventListener('message', (event) => {
  const data = event.data;
  if (!data || data.channel !== __sb.channel) return;
  if (data.kind === 'response' && __sbPending.has(data.id)) {
    const resolve = __sbPending.get(data.id);
    __sbPending.delete(data.id);
    resolve(data);
  } else if (data.kind === 'command' && data.command && data.command.type === 'invoke_menu_command') {
    const entry = __sbMenu.get(data.command.commandId);
    if (!entry) return;
    let result = null;
    let error = null;
    try { entry(); result = true; } catch (e) { error = String(e && e.message || e); }
    window.postMessage({ channel: __sb.channel, kind: 'response', id: data.id, result, error }, '*');
  }
});"#;

/// Composes payloads for one record.
pub struct ScriptPayloadBuilder<'a> {
    record: &'a ScriptRecord,
    values: Map<String, Value>,
}

impl<'a> ScriptPayloadBuilder<'a> {
    pub fn new(record: &'a ScriptRecord) -> Self {
        Self {
            record,
            values: Map::new(),
        }
    }

    /// Stored values visible to `GM_getValue` at start-up.
    pub fn with_values(mut self, values: Map<String, Value>) -> Self {
        self.values = values;
        self
    }

    pub fn build(&self) -> PreparedScript {
        let metadata = &self.record.metadata;

        let mut prologue = String::new();
        prologue.push_str(&format!("const __sb = {};\n", js_literal(&self.context())));
        prologue.push_str(&format!("const GM_info = {};\n", js_literal(&self.info())));
        prologue.push_str(BRIDGE_RUNTIME);
        prologue.push('\n');

        let mut exported = vec!["GM_info"];
        for grant in &metadata.grant {
            match grant_binding(grant) {
                Some(binding) => prologue.push_str(binding),
                None => match unsupported_stub(grant) {
                    Some(stub) => prologue.push_str(&stub),
                    None => {
                        debug!("grant {grant} has no binding form, skipping");
                        continue;
                    }
                },
            }
            prologue.push('\n');
            exported.push(grant.as_str());
        }

        let mut code = String::new();
        if metadata.unwrap {
            // The body shares the page's global scope, so only `var`
            // declarations may appear there; the runtime stays in a closure.
            code.push_str("var __sbExports = (function () {\n");
            code.push_str(&prologue);
            let fields: Vec<String> = exported.iter().map(|name| format!("{name}: {name}")).collect();
            code.push_str(&format!("return {{ {} }};\n", fields.join(", ")));
            code.push_str("})();\n");
            for name in &exported {
                code.push_str(&format!("var {name} = __sbExports.{name};\n"));
            }
        } else {
            code.push_str("(function () {\n");
            code.push_str(&prologue);
        }

        for require in &metadata.require {
            match (&require.text_content, require.loaded) {
                (Some(text), true) => {
                    code.push_str(text);
                    code.push_str("\n;\n");
                }
                _ => code.push_str(&format!(
                    "console.warn('[{SCRIPT_HANDLER}] @require not loaded:', {});\n",
                    js_literal(&Value::String(require.url.clone()))
                )),
            }
        }

        code.push_str(&self.record.content);
        code.push('\n');

        if !metadata.unwrap {
            code.push_str("})();\n");
        }

        PreparedScript {
            script_id: self.record.id.clone(),
            name: metadata.name.clone(),
            code,
        }
    }

    fn context(&self) -> Value {
        let resources: Map<String, Value> = self
            .record
            .metadata
            .resource
            .iter()
            .map(|r| {
                (
                    r.name.clone(),
                    json!({ "text": r.res_text, "url": r.res_url.as_ref().unwrap_or(&r.url) }),
                )
            })
            .collect();
        json!({
            "channel": BRIDGE_CHANNEL,
            "scriptId": self.record.id,
            "values": self.values,
            "resources": resources,
        })
    }

    fn info(&self) -> Value {
        let m = &self.record.metadata;
        json!({
            "scriptHandler": SCRIPT_HANDLER,
            "version": env!("CARGO_PKG_VERSION"),
            "script": {
                "name": m.name,
                "version": m.version,
                "namespace": m.namespace,
                "description": m.description,
                "author": m.author,
                "matches": m.r#match,
                "includes": m.include,
                "excludes": m.exclude,
                "grant": m.grant,
                "runAt": m.run_at.as_str(),
                "resources": m.resource.iter().map(|r| json!({ "name": r.name, "url": r.url })).collect::<Vec<_>>(),
            },
        })
    }
}

fn grant_binding(grant: &str) -> Option<&'static str> {
    let binding = match grant {
        "GM_getValue" => {
            "function GM_getValue(key, defaultValue) {\n  return Object.prototype.hasOwnProperty.call(__sb.values, key) ? __sb.values[key] : defaultValue;\n}"
        }
        "GM_setValue" => {
            "function GM_setValue(key, value) {\n  __sb.values[key] = value;\n  __sbPost({ type: 'set_value', key, value });\n}"
        }
        "GM_deleteValue" => {
            "function GM_deleteValue(key) {\n  delete __sb.values[key];\n  __sbPost({ type: 'delete_value', key });\n}"
        }
        "GM_listValues" => "function GM_listValues() {\n  return Object.keys(__sb.values);\n}",
        "GM_getResourceText" => {
            "function GM_getResourceText(name) {\n  const r = __sb.resources[name];\n  return r ? r.text : null;\n}"
        }
        "GM_getResourceURL" => {
            "function GM_getResourceURL(name) {\n  const r = __sb.resources[name];\n  return r ? r.url : null;\n}"
        }
        "GM_addStyle" => {
            "function GM_addStyle(css) {\n  const style = document.createElement('style');\n  style.textContent = css;\n  (document.head || document.documentElement).appendChild(style);\n  return style;\n}"
        }
        "GM_log" => {
            "function GM_log(...args) {\n  console.log('[' + GM_info.script.name + ']', ...args);\n  __sbPost({ type: 'log', message: args.map(String).join(' ') });\n}"
        }
        "GM_registerMenuCommand" => {
            "function GM_registerMenuCommand(caption, onClick, accessKey) {
  const commandId = __sb.scriptId + ':' + Math.random().toString(36).slice(2) + Date.now().toString(36);
  __sbMenu.set(commandId, onClick);
  __sbMenuIds.set(commandId, commandId);
  const requestId = __sbPost({ type: 'register_menu_command', commandId, caption: String(caption), accessKey: accessKey || null });
  __sbPending.set(requestId, (reply) => {
    if (!reply.result || reply.result === commandId || !__sbMenuIds.has(commandId)) return;
    __sbMenu.delete(commandId);
    __sbMenu.set(reply.result, onClick);
    __sbMenuIds.set(commandId, reply.result);
  });
  return commandId;
}"
        }
        "GM_unregisterMenuCommand" => {
            "function GM_unregisterMenuCommand(commandId) {
  const registryId = __sbMenuIds.get(commandId) || String(commandId);
  __sbMenuIds.delete(commandId);
  __sbMenu.delete(registryId);
  __sbPost({ type: 'unregister_menu_command', commandId: registryId });
}"
        }
        "unsafeWindow" => "const unsafeWindow = window;",
        _ => return None,
    };
    Some(binding)
}

/// A throwing function for a grant this manager does not implement.
/// Grants that are not plain identifiers (e.g. `window.close`) get nothing.
fn unsupported_stub(grant: &str) -> Option<String> {
    if !is_identifier(grant) || SUPPORTED_GRANTS.contains(&grant) {
        return None;
    }
    Some(format!(
        "function {grant}() {{\n  throw new Error({});\n}}",
        js_literal(&Value::String(format!("{grant} is not supported by {SCRIPT_HANDLER}")))
    ))
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Serializes a value as a JavaScript literal.
pub fn js_literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// Serializes a string as a JavaScript string literal.
pub fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}
