//! Host platform capabilities consumed by the core.
//!
//! The browser (or whatever embeds the manager) implements [`HostPlatform`]
//! to evaluate code inside a frame and to enumerate a tab's frames.
//! Everything page-facing in the crate goes through this seam.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::errors::HostError;
use crate::types::injection::{ExecutionWorld, FrameInfo, FrameTarget, TabId};

#[async_trait]
pub trait HostPlatform: Send + Sync {
    /// Evaluates `code` in the given frame and world.
    ///
    /// If the code evaluates to a promise, the host resolves it and returns
    /// the settled value as JSON.
    async fn execute_script(
        &self,
        target: FrameTarget,
        world: ExecutionWorld,
        code: &str,
    ) -> Result<Value, HostError>;

    /// Lists every frame currently attached to the tab.
    async fn query_frames(&self, tab_id: TabId) -> Result<Vec<FrameInfo>, HostError>;
}

/// Host used when no browser is attached, e.g. by the RPC binary.
/// Every page operation fails with [`HostError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedHost;

#[async_trait]
impl HostPlatform for DetachedHost {
    async fn execute_script(
        &self,
        _target: FrameTarget,
        _world: ExecutionWorld,
        _code: &str,
    ) -> Result<Value, HostError> {
        Err(HostError::Unavailable("no page host attached".to_string()))
    }

    async fn query_frames(&self, _tab_id: TabId) -> Result<Vec<FrameInfo>, HostError> {
        Err(HostError::Unavailable("no page host attached".to_string()))
    }
}
