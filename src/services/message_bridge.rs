//! Request/response channel between the manager and page contexts.
//!
//! Messages are JSON envelopes on the `postMessage` channel, correlated by
//! id. Page-originated requests are dispatched to a [`BridgeHandler`];
//! manager-originated commands wait for the matching response or time out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::platform::host::HostPlatform;
use crate::services::script_payload::js_string;
use crate::types::bridge::{BridgeMessage, BridgeRequest, PageCommand, BRIDGE_CHANNEL};
use crate::types::errors::BridgeError;
use crate::types::injection::{ExecutionWorld, FrameTarget};

/// Serves capability calls made by page-side scripts.
#[async_trait]
pub trait BridgeHandler: Send + Sync {
    async fn handle(
        &self,
        target: FrameTarget,
        script_id: &str,
        request: BridgeRequest,
    ) -> Result<Value, BridgeError>;
}

type PendingReply = oneshot::Sender<Result<Value, String>>;

pub struct MessageBridge<H: HostPlatform> {
    host: Arc<H>,
    handler: Arc<dyn BridgeHandler>,
    pending: Mutex<HashMap<String, PendingReply>>,
    timeout: Duration,
}

impl<H: HostPlatform> MessageBridge<H> {
    pub fn new(host: Arc<H>, handler: Arc<dyn BridgeHandler>, timeout: Duration) -> Self {
        Self {
            host,
            handler,
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Sends a command into a frame and waits for the page's answer.
    pub async fn send_command(
        &self,
        target: FrameTarget,
        command: PageCommand,
    ) -> Result<Value, BridgeError> {
        let id = uuid::Uuid::new_v4().to_string();
        let message = BridgeMessage::Command {
            channel: BRIDGE_CHANNEL.to_string(),
            id: id.clone(),
            command,
        };

        // Register before delivering so a fast reply is not lost.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if let Err(e) = self.deliver(target, &message).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(BridgeError::Handler(message)),
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(BridgeError::Timeout(format!("command {id} to {target}")))
            }
        }
    }

    /// Processes one envelope relayed from a frame.
    ///
    /// Returns the response sent back for a page request, `None` for
    /// responses and foreign traffic.
    pub async fn handle_inbound(
        &self,
        target: FrameTarget,
        text: &str,
    ) -> Result<Option<BridgeMessage>, BridgeError> {
        let message: BridgeMessage =
            serde_json::from_str(text).map_err(|e| BridgeError::InvalidMessage(e.to_string()))?;
        if message.channel() != BRIDGE_CHANNEL {
            debug!("ignoring message on channel {}", message.channel());
            return Ok(None);
        }

        match message {
            BridgeMessage::Response { id, result, error, .. } => {
                let reply = match error {
                    Some(e) => Err(e),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                match self.pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(reply);
                    }
                    None => debug!("response {id} has no pending request"),
                }
                Ok(None)
            }
            BridgeMessage::Request { id, script_id, request, .. } => {
                let result = self
                    .handler
                    .handle(target, &script_id, request)
                    .await
                    .map_err(|e| e.to_string());
                let response = BridgeMessage::response(&id, result);
                if let Err(e) = self.deliver(target, &response).await {
                    debug!("response {id} not delivered to {target}: {e}");
                }
                Ok(Some(response))
            }
            BridgeMessage::Command { id, .. } => Err(BridgeError::InvalidMessage(format!(
                "command {id} cannot originate from a page"
            ))),
        }
    }

    /// Posts an envelope into the frame's window.
    async fn deliver(&self, target: FrameTarget, message: &BridgeMessage) -> Result<(), BridgeError> {
        let json = serde_json::to_string(message)
            .map_err(|e| BridgeError::InvalidMessage(e.to_string()))?;
        let code = format!(
            "(() => {{ window.postMessage(JSON.parse({}), '*'); return true; }})()",
            js_string(&json)
        );
        self.host
            .execute_script(target, ExecutionWorld::Isolated, &code)
            .await
            .map(|_| ())
            .map_err(|e| BridgeError::Host(e.to_string()))
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Fails every outstanding command with [`BridgeError::Closed`].
    pub async fn shutdown(&self) {
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            warn!("closing bridge with {} pending command(s)", pending.len());
        }
        // Dropping the senders wakes the waiters with a receive error.
        pending.clear();
    }
}
