//! Mesh node state machine.
//!
//! Every received datagram ends in exactly one [`Disposition`]:
//!
//! ```text
//! Received ─┬─ Malformed            drop, log
//!           ├─ Duplicate            drop silently (loop prevention)
//!           └─ Accept ─┬─ Terminal  ttl == 0: deliver locally, never rebroadcast
//!                      └─ Forward   ttl - 1, route + self, rebroadcast (+ uplink on relays)
//! ```
//!
//! TTL bounds flood depth and the seen-cache bounds flood breadth, so a
//! logical message costs at most one rebroadcast per node within the cache
//! expiry window.

use firemesh_core::{Config, GeoPoint};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::cache::MessageCache;
use crate::error::{MeshError, MeshResult};
use crate::message::{MeshMessage, NodeId, Payload};
use crate::transport::{BroadcastMedium, Uplink};

/// Backoff after a failed receive before polling the medium again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(500);

/// Outcome of handling one inbound datagram.
#[derive(Debug)]
pub enum Disposition {
    /// Unparseable or missing `id`/`src`
    Malformed(MeshError),
    /// Id already accepted within the cache window
    Duplicate {
        /// Message id
        id: String,
    },
    /// Accepted with no hop budget left; delivered locally only
    Terminal(MeshMessage),
    /// Accepted and rebroadcast
    Forward {
        /// Copy as received
        received: MeshMessage,
        /// Copy as rebroadcast
        forwarded: MeshMessage,
    },
}

/// Behavior shared by sentry and relay nodes.
#[derive(Debug)]
pub struct MeshNode {
    id: NodeId,
    location: Option<GeoPoint>,
    default_ttl: u32,
    cache: Arc<MessageCache>,
}

impl MeshNode {
    /// Node `id` sharing `cache` with its cleanup scheduler.
    pub fn new(
        id: impl Into<NodeId>,
        location: Option<GeoPoint>,
        default_ttl: u32,
        cache: Arc<MessageCache>,
    ) -> Self {
        Self {
            id: id.into(),
            location,
            default_ttl,
            cache,
        }
    }

    /// Node identity, location and hop budget from `config`.
    pub fn from_config(config: &Config, cache: Arc<MessageCache>) -> Self {
        Self::new(
            config.node.id.clone(),
            Some(config.node.location),
            config.mesh.default_ttl,
            cache,
        )
    }

    /// This node's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Hop budget given to originated messages.
    pub fn default_ttl(&self) -> u32 {
        self.default_ttl
    }

    /// Seen-id cache used for dedup.
    pub fn cache(&self) -> &Arc<MessageCache> {
        &self.cache
    }

    /// Build a new message from this node.
    ///
    /// Origination never consults the cache, but the new id is recorded so the
    /// broadcast echo of our own message is dropped as a duplicate.
    pub fn originate(&self, payload: Payload, ttl: Option<u32>) -> MeshMessage {
        let message = MeshMessage::originate(
            self.id.clone(),
            self.location,
            ttl.unwrap_or(self.default_ttl),
            payload,
        );
        self.cache.accept(&message.id);
        message
    }

    /// Classify raw inbound bytes.
    pub fn receive(&self, bytes: &[u8]) -> Disposition {
        match MeshMessage::parse(bytes) {
            Ok(message) => self.decide(message),
            Err(e) => Disposition::Malformed(e),
        }
    }

    /// Classify an already-decoded message.
    pub fn decide(&self, message: MeshMessage) -> Disposition {
        if !self.cache.accept(&message.id) {
            return Disposition::Duplicate { id: message.id };
        }
        match message.forwarded_by(&self.id) {
            Some(forwarded) => Disposition::Forward {
                received: message,
                forwarded,
            },
            None => Disposition::Terminal(message),
        }
    }

    /// Handle one datagram end to end: classify, log, and for `Forward`
    /// rebroadcast on `medium` and hand a copy to `uplink` when present.
    ///
    /// The uplink attempt runs on its own task so a slow or dead base station
    /// never delays the rebroadcast.
    pub async fn handle_datagram(
        &self,
        medium: &dyn BroadcastMedium,
        uplink: Option<&Arc<dyn Uplink>>,
        bytes: &[u8],
        from: SocketAddr,
    ) -> Disposition {
        let disposition = self.receive(bytes);

        match &disposition {
            Disposition::Malformed(e) => {
                warn!(node = %self.id, %from, error = %e, "Dropping malformed datagram");
            }
            Disposition::Duplicate { id } => {
                trace!(node = %self.id, msg_id = %id, %from, "Duplicate, ignoring");
            }
            Disposition::Terminal(message) => {
                info!(
                    node = %self.id,
                    msg_id = %message.id,
                    src = %message.src,
                    kind = message.payload_kind(),
                    route = ?message.route,
                    "Received with TTL=0, not rebroadcasting"
                );
            }
            Disposition::Forward { received, forwarded } => {
                info!(
                    node = %self.id,
                    msg_id = %received.id,
                    src = %received.src,
                    %from,
                    kind = received.payload_kind(),
                    route = ?received.route,
                    "Received"
                );
                self.forward(medium, uplink, forwarded).await;
            }
        }

        disposition
    }

    async fn forward(
        &self,
        medium: &dyn BroadcastMedium,
        uplink: Option<&Arc<dyn Uplink>>,
        forwarded: &MeshMessage,
    ) {
        let bytes = match forwarded.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(node = %self.id, msg_id = %forwarded.id, error = %e, "Cannot encode forwarded copy");
                return;
            }
        };

        if let Some(uplink) = uplink {
            spawn_uplink(Arc::clone(uplink), bytes.clone(), forwarded.id.clone());
        }

        info!(
            node = %self.id,
            msg_id = %forwarded.id,
            ttl = forwarded.ttl,
            route = ?forwarded.route,
            "Rebroadcasting"
        );
        if let Err(e) = medium.broadcast_send(&bytes).await {
            warn!(node = %self.id, msg_id = %forwarded.id, error = %e, "Rebroadcast failed");
        }
    }

    /// Broadcast a message this node originated.
    pub async fn broadcast(&self, medium: &dyn BroadcastMedium, message: &MeshMessage) -> MeshResult<()> {
        let bytes = message.to_bytes()?;
        info!(
            node = %self.id,
            msg_id = %message.id,
            ttl = message.ttl,
            kind = message.payload_kind(),
            "Sending new message"
        );
        medium.broadcast_send(&bytes).await
    }

    /// Blocking receive loop. Returns only when the medium is gone.
    pub async fn receive_loop(
        &self,
        medium: &dyn BroadcastMedium,
        uplink: Option<Arc<dyn Uplink>>,
    ) -> MeshResult<()> {
        info!(node = %self.id, uplink = uplink.is_some(), "Listening on broadcast medium");
        loop {
            match medium.broadcast_receive().await {
                Ok((bytes, from)) => {
                    self.handle_datagram(medium, uplink.as_ref(), &bytes, from).await;
                }
                Err(MeshError::ChannelClosed(what)) => {
                    return Err(MeshError::ChannelClosed(what));
                }
                Err(e) => {
                    warn!(node = %self.id, error = %e, "Receive failed");
                    tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                }
            }
        }
    }
}

/// Fire one uplink attempt on its own task. Failure is logged, never retried.
pub(crate) fn spawn_uplink(uplink: Arc<dyn Uplink>, bytes: Vec<u8>, msg_id: String) {
    tokio::spawn(async move {
        match uplink.uplink_send(&bytes).await {
            Ok(()) => debug!(%msg_id, destination = %uplink.destination(), "Uplinked to base"),
            Err(e) => warn!(%msg_id, destination = %uplink.destination(), error = %e, "Uplink failed"),
        }
    });
}
