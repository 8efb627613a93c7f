//! Page probes feeding the Security Detector.
//!
//! Each probe is independent: it returns its own signals or its own error,
//! and the detector combines whatever came back.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::platform::host::HostPlatform;
use crate::types::errors::DetectionError;
use crate::types::injection::{ExecutionWorld, FrameTarget};
use crate::types::security::SecurityHeaders;

/// Raw CSP evidence gathered from a document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CspSignals {
    /// Policy strings from `<meta http-equiv>` tags and response headers, in discovery order.
    pub policies: Vec<String>,
    /// Nonce attributes carried by the page's own script elements.
    pub script_nonces: Vec<String>,
}

#[async_trait]
pub trait PageProbe: Send + Sync {
    async fn csp(&self, target: FrameTarget) -> Result<CspSignals, DetectionError>;
    async fn security_headers(&self, target: FrameTarget) -> Result<SecurityHeaders, DetectionError>;
    async fn frameworks(&self, target: FrameTarget) -> Result<Vec<String>, DetectionError>;
    /// Names of detected countermeasures, e.g. `script_blocking`.
    async fn anti_script(&self, target: FrameTarget) -> Result<Vec<String>, DetectionError>;
}

const CSP_PROBE: &str = r#"(async () => {
  const policies = Array.from(
    document.querySelectorAll('meta[http-equiv="Content-Security-Policy" i]')
  ).map((m) => m.getAttribute('content') || '');
  try {
    const res = await fetch(location.href, { method: 'HEAD', credentials: 'include', cache: 'force-cache' });
    const header = res.headers.get('content-security-policy');
    if (header) policies.push(header);
  } catch (_) {}
  const scriptNonces = Array.from(document.querySelectorAll('script[nonce]'))
    .map((s) => s.nonce || s.getAttribute('nonce') || '')
    .filter(Boolean);
  return { policies, scriptNonces };
})()"#;

const HEADERS_PROBE: &str = r#"(async () => {
  const res = await fetch(location.href, { method: 'HEAD', credentials: 'include', cache: 'force-cache' });
  const has = (name) => res.headers.has(name);
  return {
    x_frame_options: has('x-frame-options'),
    strict_transport_security: has('strict-transport-security'),
    x_content_type_options: has('x-content-type-options'),
    referrer_policy: has('referrer-policy'),
    permissions_policy: has('permissions-policy'),
  };
})()"#;

const FRAMEWORK_PROBE: &str = r#"(() => {
  const found = [];
  const q = (sel) => document.querySelector(sel) !== null;
  if (q('[data-reactroot]') || q('#__next') || q('#root[data-reactroot]')) found.push('react');
  if (q('#__next')) found.push('next');
  if (q('[ng-version]')) found.push('angular');
  if (q('[ng-app]') || q('.ng-scope')) found.push('angularjs');
  if (q('[data-v-app]') || q('[data-server-rendered]')) found.push('vue');
  if (q('#__nuxt')) found.push('nuxt');
  if (q('[data-svelte-h]') || q('[class*="svelte-"]')) found.push('svelte');
  if (q('script[src*="jquery"]')) found.push('jquery');
  return found;
})()"#;

const ANTI_SCRIPT_PROBE: &str = r#"(() => {
  const found = [];
  const native = (fn) => {
    try { return /\[native code\]/.test(Function.prototype.toString.call(fn)); }
    catch (_) { return false; }
  };
  if (!native(Function.prototype.toString)) found.push('function_to_string_tampering');
  if (!native(window.eval)) found.push('eval_blocking');
  if (typeof MutationObserver !== 'function' || !native(MutationObserver)) {
    found.push('mutation_observer_tampering');
  }
  if (!native(document.createElement) || !native(Node.prototype.appendChild)) {
    found.push('script_blocking');
  }
  const csp = Array.from(document.querySelectorAll('meta[http-equiv="Content-Security-Policy" i]'))
    .map((m) => m.getAttribute('content') || '').join(';');
  if (window.trustedTypes && /require-trusted-types-for/.test(csp)) found.push('trusted_types');
  if (window.outerWidth - window.innerWidth > 160 && typeof window.devtools === 'object') {
    found.push('devtools_detection');
  }
  return found;
})()"#;

/// Probe implementation that evaluates detection scripts through the host.
pub struct ScriptedPageProbe<H: HostPlatform> {
    host: Arc<H>,
}

impl<H: HostPlatform> ScriptedPageProbe<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    async fn run<T: DeserializeOwned>(
        &self,
        probe: &str,
        target: FrameTarget,
        world: ExecutionWorld,
        code: &str,
    ) -> Result<T, DetectionError> {
        let value: Value = self
            .host
            .execute_script(target, world, code)
            .await
            .map_err(|e| DetectionError::ProbeFailed {
                probe: probe.to_string(),
                reason: e.to_string(),
            })?;
        serde_json::from_value(value)
            .map_err(|e| DetectionError::InvalidResponse(format!("{probe}: {e}")))
    }
}

#[async_trait]
impl<H: HostPlatform> PageProbe for ScriptedPageProbe<H> {
    async fn csp(&self, target: FrameTarget) -> Result<CspSignals, DetectionError> {
        self.run("csp", target, ExecutionWorld::Isolated, CSP_PROBE).await
    }

    async fn security_headers(&self, target: FrameTarget) -> Result<SecurityHeaders, DetectionError> {
        self.run("headers", target, ExecutionWorld::Isolated, HEADERS_PROBE).await
    }

    async fn frameworks(&self, target: FrameTarget) -> Result<Vec<String>, DetectionError> {
        self.run("frameworks", target, ExecutionWorld::Isolated, FRAMEWORK_PROBE).await
    }

    async fn anti_script(&self, target: FrameTarget) -> Result<Vec<String>, DetectionError> {
        // Overrides installed by the page are only visible from its own world.
        self.run("anti_script", target, ExecutionWorld::Main, ANTI_SCRIPT_PROBE).await
    }
}
