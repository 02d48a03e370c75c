//! Relay role: keep the flood going and uplink every forwarded copy.

use std::sync::Arc;
use tracing::info;

use crate::error::MeshResult;
use crate::message::{MeshMessage, Payload};
use crate::node::{spawn_uplink, MeshNode};
use crate::transport::{BroadcastMedium, Uplink};

/// A mesh node with an additional reliable path to the base station.
///
/// Rebroadcast and uplink are independent best-effort paths to the same
/// destination set; neither waits on nor retries through the other.
pub struct RelayRole {
    node: Arc<MeshNode>,
    medium: Arc<dyn BroadcastMedium>,
    uplink: Arc<dyn Uplink>,
}

impl RelayRole {
    /// Relay forwarding on `medium` and uplinking through `uplink`.
    pub fn new(node: Arc<MeshNode>, medium: Arc<dyn BroadcastMedium>, uplink: Arc<dyn Uplink>) -> Self {
        Self {
            node,
            medium,
            uplink,
        }
    }

    /// The underlying mesh node.
    pub fn node(&self) -> &Arc<MeshNode> {
        &self.node
    }

    /// Receive loop: forward accepted messages and uplink each forwarded copy.
    pub async fn run(&self) -> MeshResult<()> {
        info!(node = %self.node.id(), base = %self.uplink.destination(), "Starting relay");
        self.node
            .receive_loop(self.medium.as_ref(), Some(Arc::clone(&self.uplink)))
            .await
    }

    /// Originate a message from the relay itself, on both paths.
    pub async fn originate(&self, payload: Payload, ttl: Option<u32>) -> MeshResult<MeshMessage> {
        let message = self.node.originate(payload, ttl);
        let bytes = message.to_bytes()?;
        spawn_uplink(Arc::clone(&self.uplink), bytes, message.id.clone());
        self.node.broadcast(self.medium.as_ref(), &message).await?;
        Ok(message)
    }

    /// Announce liveness on the mesh.
    pub async fn announce(&self) -> MeshResult<MeshMessage> {
        let text = format!("node {} online", self.node.id());
        self.originate(Payload::hello(text), None).await
    }
}
