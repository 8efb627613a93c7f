//! Injection Strategy Set for Scriptbridge.
//!
//! Eight interchangeable ways of getting a prepared script to run inside a
//! frame. Every strategy evaluates a small launcher through the host; the
//! launcher reports `{ ok, error }` once it knows whether the payload ran.
//! A strategy failure is never fatal: the orchestrator moves on to the next
//! strategy in its list.
//!
//! Launchers that leave work pending (listeners, observers, timers, workers,
//! frames) register a teardown under their attempt id. A timed-out attempt is
//! cancelled through [`cleanup_script`], after which its payload refuses to run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::platform::host::HostPlatform;
use crate::services::script_payload::{js_string, PreparedScript};
use crate::types::bridge::BRIDGE_CHANNEL;
use crate::types::errors::InjectionError;
use crate::types::injection::{ExecutionWorld, FrameTarget, InjectionOptions, StrategyKind};

/// DOM attribute tagging every node an attempt creates.
pub const ATTEMPT_ATTRIBUTE: &str = "data-scriptbridge-attempt";

/// Set on `<html>` by the payload prologue once it starts running.
const RAN_ATTRIBUTE: &str = "data-scriptbridge-ran";

/// Space-separated attempt ids on `<html>` whose payload must no longer run.
pub const CANCELLED_ATTRIBUTE: &str = "data-scriptbridge-cancelled";

/// How many cancelled attempt ids a document remembers.
const CANCELLED_HISTORY: usize = 32;

/// Registers `window[Symbol.for('scriptbridge:' + attempt)]`, which undoes
/// everything the launcher still has pending. Expects `attempt` in scope.
const TEARDOWN_PRELUDE: &str = r#"const teardownKey = Symbol.for('scriptbridge:' + attempt);
const teardowns = [];
const onTeardown = (fn) => { teardowns.push(fn); };
const release = () => {
  if (window[teardownKey] === teardown) delete window[teardownKey];
  teardowns.length = 0;
};
function teardown() {
  const pending = teardowns.splice(0);
  release();
  pending.forEach((fn) => { try { fn(); } catch (_) {} });
}
window[teardownKey] = teardown;"#;

/// Launcher error string meaning "no nonce found on the page".
const NONCE_UNAVAILABLE: &str = "nonce_unavailable";

#[async_trait]
pub trait InjectionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Runs `script` in `target`. `Err` means "try the next strategy".
    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError>;
}

#[derive(Debug, Deserialize)]
struct LaunchOutcome {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Shared launcher plumbing: bounded evaluation, outcome decoding, cleanup.
struct Launcher<H: HostPlatform> {
    host: Arc<H>,
    kind: StrategyKind,
    world: ExecutionWorld,
}

impl<H: HostPlatform> Launcher<H> {
    fn new(host: Arc<H>, kind: StrategyKind, world: ExecutionWorld) -> Self {
        Self { host, kind, world }
    }

    async fn launch(
        &self,
        target: FrameTarget,
        code: &str,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let evaluated =
            tokio::time::timeout(options.timeout, self.host.execute_script(target, self.world, code))
                .await;

        let value = match evaluated {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(InjectionError::Host(e.to_string())),
            Err(_) => {
                self.cleanup(target, &options.attempt_id).await;
                return Err(InjectionError::Timeout {
                    strategy: self.kind.to_string(),
                    timeout_ms: options.timeout.as_millis() as u64,
                });
            }
        };

        let outcome: LaunchOutcome =
            serde_json::from_value(value).map_err(|e| InjectionError::StrategyFailed {
                strategy: self.kind.to_string(),
                reason: format!("unexpected launcher result: {e}"),
            })?;

        if outcome.ok {
            return Ok(());
        }
        match outcome.error.as_deref() {
            Some(NONCE_UNAVAILABLE) => Err(InjectionError::NonceUnavailable),
            other => Err(InjectionError::StrategyFailed {
                strategy: self.kind.to_string(),
                reason: other.unwrap_or("script did not run").to_string(),
            }),
        }
    }

    /// Best effort teardown of a timed-out attempt. Runs in the launcher's
    /// own world, where its teardown function was registered.
    async fn cleanup(&self, target: FrameTarget, attempt_id: &str) {
        let code = cleanup_script(attempt_id);
        let cleanup = self.host.execute_script(target, self.world, &code);
        match tokio::time::timeout(Duration::from_secs(1), cleanup).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("cleanup after {} timeout failed in {target}: {e}", self.kind),
            Err(_) => debug!("cleanup after {} timeout did not finish in {target}", self.kind),
        }
    }
}

/// Cancels a timed-out attempt: runs its teardown, marks its payload as
/// cancelled and removes the nodes it created.
pub fn cleanup_script(attempt_id: &str) -> String {
    format!(
        r#"(() => {{
const attempt = {id};
const root = document.documentElement;
const key = Symbol.for('scriptbridge:' + attempt);
const teardown = window[key];
if (typeof teardown === 'function') {{
  try {{ teardown(); }} catch (_) {{}}
}}
delete window[key];
const cancelled = (root.getAttribute('{CANCELLED_ATTRIBUTE}') || '').split(' ').filter(Boolean);
if (!cancelled.includes(attempt)) cancelled.push(attempt);
root.setAttribute('{CANCELLED_ATTRIBUTE}', cancelled.slice(-{CANCELLED_HISTORY}).join(' '));
document.querySelectorAll('[{ATTEMPT_ATTRIBUTE}=' + JSON.stringify(attempt) + ']').forEach((n) => n.remove());
if (root.getAttribute('{RAN_ATTRIBUTE}') === attempt) root.removeAttribute('{RAN_ATTRIBUTE}');
return true;
}})()"#,
        id = js_string(attempt_id)
    )
}

/// Payload source that refuses to run once its attempt was cancelled, and
/// otherwise marks itself as executed.
fn acknowledged(script: &PreparedScript, attempt_id: &str) -> String {
    let attempt = js_string(attempt_id);
    format!(
        "if ((' ' + (document.documentElement.getAttribute('{CANCELLED_ATTRIBUTE}') || '') + ' ').indexOf(' ' + {attempt} + ' ') !== -1) throw new Error('attempt cancelled');\ndocument.documentElement.setAttribute('{RAN_ATTRIBUTE}', {attempt});\n{}",
        script.code
    )
}

/// JS prelude shared by launchers that insert `<script>` elements.
fn element_prelude(script: &PreparedScript, options: &InjectionOptions) -> String {
    format!(
        r#"const attempt = {attempt};
const code = {code};
const root = document.head || document.documentElement;
{teardown}
const ran = () => {{
  const hit = document.documentElement.getAttribute('{RAN_ATTRIBUTE}') === attempt;
  if (hit) document.documentElement.removeAttribute('{RAN_ATTRIBUTE}');
  return hit;
}};
const scriptElement = () => {{
  const s = document.createElement('script');
  s.setAttribute('{ATTEMPT_ATTRIBUTE}', attempt);
  return s;
}};"#,
        attempt = js_string(&options.attempt_id),
        code = js_string(&acknowledged(script, &options.attempt_id)),
        teardown = TEARDOWN_PRELUDE,
    )
}

/// Inline `<script>` in the page's own world.
pub struct DirectPageStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> DirectPageStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::DirectPage, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for DirectPageStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectPage
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            r#"(() => {{
{prelude}
try {{
  const s = scriptElement();
  s.textContent = code;
  root.appendChild(s);
  s.remove();
  return ran() ? {{ ok: true }} : {{ ok: false, error: 'inline script blocked' }};
}} catch (e) {{
  return {{ ok: false, error: String(e && e.message || e) }};
}} finally {{
  release();
}}
}})()"#,
            prelude = element_prelude(script, options)
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Direct evaluation in the extension-private world.
pub struct IsolatedWorldStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> IsolatedWorldStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::IsolatedWorld, ExecutionWorld::Isolated),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for IsolatedWorldStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::IsolatedWorld
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            "(() => {{\ntry {{\n{body}\n}} catch (e) {{\n  return {{ ok: false, error: String(e && e.message || e) }};\n}}\nreturn {{ ok: true }};\n}})()",
            body = script.code
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// `<script src="blob:...">`, for policies that allow blob sources but not inline code.
pub struct BlobUrlStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> BlobUrlStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::BlobUrl, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for BlobUrlStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BlobUrl
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            r#"new Promise((resolve) => {{
{prelude}
let url;
try {{
  url = URL.createObjectURL(new Blob([code], {{ type: 'text/javascript' }}));
}} catch (e) {{
  release();
  resolve({{ ok: false, error: String(e && e.message || e) }});
  return;
}}
const s = scriptElement();
const finish = (outcome) => {{ release(); URL.revokeObjectURL(url); s.remove(); resolve(outcome); }};
onTeardown(() => {{
  s.onload = null;
  s.onerror = null;
  s.remove();
  URL.revokeObjectURL(url);
}});
s.onload = () => finish(ran() ? {{ ok: true }} : {{ ok: false, error: 'blob script loaded but did not run' }});
s.onerror = () => finish({{ ok: false, error: 'blob script rejected' }});
s.src = url;
root.appendChild(s);
}})"#,
            prelude = element_prelude(script, options)
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Inserts during a live DOM mutation, with a synthetic mutation and a
/// direct-insert fallback so it always completes.
pub struct MutationTimedStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> MutationTimedStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::MutationTimed, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for MutationTimedStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MutationTimed
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            r#"new Promise((resolve) => {{
{prelude}
let done = false;
let observer = null;
let synthetic = null;
let fallback = null;
const stop = () => {{
  done = true;
  if (observer) observer.disconnect();
  clearTimeout(synthetic);
  clearTimeout(fallback);
}};
onTeardown(stop);
const insert = (via) => {{
  if (done) return;
  stop();
  release();
  try {{
    const s = scriptElement();
    s.textContent = code;
    root.appendChild(s);
    s.remove();
    resolve(ran() ? {{ ok: true }} : {{ ok: false, error: 'script did not run after ' + via }});
  }} catch (e) {{
    resolve({{ ok: false, error: String(e && e.message || e) }});
  }}
}};
try {{
  observer = new MutationObserver(() => insert('mutation'));
  observer.observe(document.documentElement, {{ childList: true, subtree: true, attributes: true }});
}} catch (_) {{
  observer = null;
}}
synthetic = setTimeout(() => {{
  const marker = document.createElement('meta');
  marker.setAttribute('{ATTEMPT_ATTRIBUTE}', attempt);
  root.appendChild(marker);
  marker.remove();
}}, {synthetic_ms});
fallback = setTimeout(() => insert('fallback'), {fallback_ms});
}})"#,
            prelude = element_prelude(script, options),
            synthetic_ms = options.within_attempt(options.mutation_synthetic_delay).as_millis(),
            fallback_ms = options.within_attempt(options.mutation_fallback).as_millis(),
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Runs the payload inside a sandboxed iframe that relays bridge requests
/// to its parent.
pub struct SandboxBridgeStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> SandboxBridgeStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::SandboxBridge, ExecutionWorld::Isolated),
        }
    }
}

const SANDBOX_DOCUMENT: &str = r#"<script>
window.addEventListener('message', (e) => {
  const d = e.data;
  if (!d || d.channel !== CHANNEL) return;
  if (d.kind === 'request' && e.source === window) { parent.postMessage(d, '*'); return; }
  if (d.kind === 'response' && e.source === parent) { window.postMessage(d, '*'); return; }
  if (d.kind !== 'sandbox_run') return;
  try {
    (new Function(d.code))();
    parent.postMessage({ channel: CHANNEL, kind: 'sandbox_ack', attempt: d.attempt, ok: true }, '*');
  } catch (err) {
    parent.postMessage({ channel: CHANNEL, kind: 'sandbox_ack', attempt: d.attempt, ok: false, error: String(err && err.message || err) }, '*');
  }
});
</script>"#;

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for SandboxBridgeStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SandboxBridge
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let document = SANDBOX_DOCUMENT.replace("CHANNEL", &js_string(BRIDGE_CHANNEL));
        let code = format!(
            r#"new Promise((resolve) => {{
const attempt = {attempt};
const channel = {channel};
{teardown}
const frame = document.createElement('iframe');
frame.setAttribute('{ATTEMPT_ATTRIBUTE}', attempt);
frame.setAttribute('sandbox', 'allow-scripts allow-same-origin');
frame.style.display = 'none';
let settled = false;
const settle = (outcome) => {{
  if (settled) return;
  settled = true;
  release();
  clearTimeout(timer);
  window.removeEventListener('message', onAck);
  if (!outcome.ok) frame.remove();
  resolve(outcome);
}};
const onAck = (e) => {{
  const d = e.data;
  if (!d || d.channel !== channel || d.kind !== 'sandbox_ack' || d.attempt !== attempt) return;
  settle(d.ok ? {{ ok: true }} : {{ ok: false, error: d.error || 'sandbox rejected script' }});
}};
window.addEventListener('message', onAck);
const timer = setTimeout(() => settle({{ ok: false, error: 'sandbox did not acknowledge' }}), {ack_ms});
onTeardown(() => {{
  settled = true;
  clearTimeout(timer);
  window.removeEventListener('message', onAck);
  frame.onload = null;
  frame.remove();
}});
frame.onload = () => {{
  try {{
    frame.contentWindow.postMessage({{ channel, kind: 'sandbox_run', attempt, code: {code} }}, '*');
  }} catch (e) {{
    settle({{ ok: false, error: String(e && e.message || e) }});
  }}
}};
frame.srcdoc = {document};
(document.body || document.documentElement).appendChild(frame);
}})"#,
            attempt = js_string(&options.attempt_id),
            channel = js_string(BRIDGE_CHANNEL),
            ack_ms = options.within_attempt(options.bridge_ack_timeout).as_millis(),
            code = js_string(&script.code),
            document = js_string(&document),
            teardown = TEARDOWN_PRELUDE,
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Dedicated worker first; an in-page `postMessage` tunnel if the worker
/// cannot be built or the script needs the DOM.
pub struct WorkerTunnelStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> WorkerTunnelStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::WorkerTunnel, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for WorkerTunnelStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WorkerTunnel
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            r#"new Promise((resolve) => {{
const attempt = {attempt};
const channel = {channel};
const code = {code};
const ackMs = {ack_ms};
{teardown}
const finish = (outcome) => {{ release(); resolve(outcome); }};
const tunnel = (workerError) => {{
  let timer = null;
  const runner = (e) => {{
    const d = e.data;
    if (!d || d.channel !== channel || d.kind !== 'tunnel_run' || d.attempt !== attempt) return;
    window.removeEventListener('message', runner);
    let error = null;
    try {{ (new Function(d.code))(); }} catch (err) {{ error = String(err && err.message || err); }}
    window.postMessage({{ channel, kind: 'tunnel_ack', attempt, error }}, '*');
  }};
  const onAck = (e) => {{
    const d = e.data;
    if (!d || d.channel !== channel || d.kind !== 'tunnel_ack' || d.attempt !== attempt) return;
    window.removeEventListener('message', onAck);
    clearTimeout(timer);
    finish(d.error ? {{ ok: false, error: 'worker: ' + workerError + '; tunnel: ' + d.error }} : {{ ok: true }});
  }};
  const detach = () => {{
    clearTimeout(timer);
    window.removeEventListener('message', runner);
    window.removeEventListener('message', onAck);
  }};
  onTeardown(detach);
  window.addEventListener('message', runner);
  window.addEventListener('message', onAck);
  timer = setTimeout(() => {{
    detach();
    finish({{ ok: false, error: 'tunnel did not acknowledge' }});
  }}, ackMs);
  window.postMessage({{ channel, kind: 'tunnel_run', attempt, code }}, '*');
}};
let url = null;
let worker = null;
try {{
  const body = code + '\n;postMessage({{ channel: ' + JSON.stringify(channel) + ', kind: "worker_done" }});';
  url = URL.createObjectURL(new Blob([body], {{ type: 'text/javascript' }}));
  worker = new Worker(url);
}} catch (e) {{
  if (url) URL.revokeObjectURL(url);
  tunnel(String(e && e.message || e));
  return;
}}
const stop = () => {{ clearTimeout(timer); URL.revokeObjectURL(url); }};
const timer = setTimeout(() => {{ stop(); worker.terminate(); tunnel('worker did not finish'); }}, ackMs);
onTeardown(() => {{
  stop();
  worker.onmessage = null;
  worker.onerror = null;
  worker.terminate();
}});
worker.onmessage = (e) => {{
  if (e.data && e.data.kind === 'worker_done') {{ stop(); finish({{ ok: true }}); }}
}};
worker.onerror = (e) => {{
  e.preventDefault();
  stop();
  worker.terminate();
  tunnel(e.message || 'worker error');
}};
}})"#,
            attempt = js_string(&options.attempt_id),
            channel = js_string(BRIDGE_CHANNEL),
            code = js_string(&script.code),
            ack_ms = options.within_attempt(options.bridge_ack_timeout).as_millis(),
            teardown = TEARDOWN_PRELUDE,
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Inline `<script>` carrying the page's own CSP nonce.
pub struct NonceStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> NonceStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::Nonce, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for NonceStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Nonce
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let known = options
            .nonce
            .as_deref()
            .map(js_string)
            .unwrap_or_else(|| "null".to_string());
        let code = format!(
            r#"(() => {{
{prelude}
const detect = () => {{
  const tagged = document.querySelector('script[nonce]');
  if (tagged) {{
    const value = tagged.nonce || tagged.getAttribute('nonce');
    if (value) return value;
  }}
  for (const meta of document.querySelectorAll('meta[http-equiv="Content-Security-Policy" i]')) {{
    const m = /'nonce-([^']+)'/.exec(meta.getAttribute('content') || '');
    if (m) return m[1];
  }}
  return null;
}};
const nonce = {known} || detect();
if (!nonce) {{
  release();
  return {{ ok: false, error: '{NONCE_UNAVAILABLE}' }};
}}
try {{
  const s = scriptElement();
  s.nonce = nonce;
  s.setAttribute('nonce', nonce);
  s.textContent = code;
  root.appendChild(s);
  s.remove();
  return ran() ? {{ ok: true }} : {{ ok: false, error: 'nonce was not accepted' }};
}} catch (e) {{
  return {{ ok: false, error: String(e && e.message || e) }};
}} finally {{
  release();
}}
}})()"#,
            prelude = element_prelude(script, options),
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Waits for a lifecycle or interaction event (or a deadline) before inserting.
pub struct EventTimedStrategy<H: HostPlatform> {
    launcher: Launcher<H>,
}

impl<H: HostPlatform> EventTimedStrategy<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self {
            launcher: Launcher::new(host, StrategyKind::EventTimed, ExecutionWorld::Main),
        }
    }
}

#[async_trait]
impl<H: HostPlatform> InjectionStrategy for EventTimedStrategy<H> {
    fn kind(&self) -> StrategyKind {
        StrategyKind::EventTimed
    }

    async fn attempt(
        &self,
        script: &PreparedScript,
        target: FrameTarget,
        options: &InjectionOptions,
    ) -> Result<(), InjectionError> {
        let code = format!(
            r#"new Promise((resolve) => {{
{prelude}
const windowEvents = ['load', 'pageshow', 'focus', 'scroll', 'pointerdown', 'keydown'];
const documentEvents = ['DOMContentLoaded', 'readystatechange', 'visibilitychange'];
let done = false;
let fallback = null;
const detach = () => {{
  done = true;
  windowEvents.forEach((name) => window.removeEventListener(name, fire, true));
  documentEvents.forEach((name) => document.removeEventListener(name, fire, true));
  clearTimeout(fallback);
}};
onTeardown(detach);
function fire(event) {{
  if (done) return;
  detach();
  release();
  const via = event ? event.type : 'deadline';
  try {{
    const s = scriptElement();
    s.textContent = code;
    root.appendChild(s);
    s.remove();
    resolve(ran() ? {{ ok: true }} : {{ ok: false, error: 'script did not run after ' + via }});
  }} catch (e) {{
    resolve({{ ok: false, error: String(e && e.message || e) }});
  }}
}}
windowEvents.forEach((name) => window.addEventListener(name, fire, true));
documentEvents.forEach((name) => document.addEventListener(name, fire, true));
fallback = setTimeout(() => fire(null), {fallback_ms});
}})"#,
            prelude = element_prelude(script, options),
            fallback_ms = options.within_attempt(options.event_fallback).as_millis(),
        );
        self.launcher.launch(target, &code, options).await
    }
}

/// Strategies addressable by kind.
#[derive(Clone, Default)]
pub struct StrategySet {
    strategies: HashMap<StrategyKind, Arc<dyn InjectionStrategy>>,
}

impl StrategySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// All eight built-in strategies bound to `host`.
    pub fn with_defaults<H: HostPlatform + 'static>(host: Arc<H>) -> Self {
        let mut set = Self::new();
        set.register(Arc::new(DirectPageStrategy::new(host.clone())));
        set.register(Arc::new(IsolatedWorldStrategy::new(host.clone())));
        set.register(Arc::new(BlobUrlStrategy::new(host.clone())));
        set.register(Arc::new(MutationTimedStrategy::new(host.clone())));
        set.register(Arc::new(SandboxBridgeStrategy::new(host.clone())));
        set.register(Arc::new(WorkerTunnelStrategy::new(host.clone())));
        set.register(Arc::new(NonceStrategy::new(host.clone())));
        set.register(Arc::new(EventTimedStrategy::new(host)));
        set
    }

    /// Adds or replaces the strategy for its kind.
    pub fn register(&mut self, strategy: Arc<dyn InjectionStrategy>) {
        self.strategies.insert(strategy.kind(), strategy);
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn InjectionStrategy>> {
        self.strategies.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
