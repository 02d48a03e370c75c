//! Mesh transport primitives.
//!
//! Two independent paths leave a node:
//!
//! - **Broadcast medium**: connectionless, unordered, unreliable delivery to
//!   every node on the local segment. One datagram is one message.
//! - **Uplink**: a short-lived reliable connection to the base station carrying
//!   exactly one message, terminated by the sender closing the connection.
//!
//! Both are trait seams so the node logic can run over real sockets or an
//! in-process segment.

mod memory;
mod tcp;
mod udp;

pub use memory::{LoopbackEndpoint, LoopbackSegment, RecordingUplink};
pub use tcp::TcpUplink;
pub use udp::UdpBroadcast;

use async_trait::async_trait;
use std::net::SocketAddr;

use crate::error::MeshResult;

/// Shared broadcast medium.
#[async_trait]
pub trait BroadcastMedium: Send + Sync {
    /// Send one datagram to every node in range.
    async fn broadcast_send(&self, bytes: &[u8]) -> MeshResult<()>;

    /// Block until a datagram arrives. Returns the bytes and the sender address.
    async fn broadcast_receive(&self) -> MeshResult<(Vec<u8>, SocketAddr)>;
}

/// Reliable point-to-point path toward the base station.
#[async_trait]
pub trait Uplink: Send + Sync {
    /// Deliver one message. Failure is reported to the caller and never retried here.
    async fn uplink_send(&self, bytes: &[u8]) -> MeshResult<()>;

    /// Human-readable destination for logs.
    fn destination(&self) -> String;
}
