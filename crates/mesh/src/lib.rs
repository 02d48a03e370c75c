//! Firemesh Mesh - flood-routing protocol for the wildfire sensor mesh
//!
//! Battery-powered nodes share one broadcast medium with no infrastructure
//! and no coordinator. Alerts flood outward from sentries; relays forward them
//! and additionally uplink each forwarded copy to the base station.
//!
//! # Core Components
//!
//! - **MeshMessage**: wire format, identity and route accumulation
//! - **MessageCache**: seen-id set that stops re-forwarding of flood copies
//! - **MeshNode**: accept / drop / forward state machine shared by all roles
//! - **SentryRole** / **RelayRole**: alert origination and base uplink
//! - **CleanupScheduler**: supervised eviction of expired cache entries
//! - **Transport**: UDP broadcast, TCP uplink, and an in-process segment
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use firemesh_mesh::{MeshNode, MessageCache, Payload, UdpBroadcast};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let medium = UdpBroadcast::bind(
//!     "0.0.0.0:5006".parse()?,
//!     "10.0.0.255:5006".parse()?,
//!     4096,
//! )?;
//! let node = MeshNode::new("Relay_001", None, 8, Arc::new(MessageCache::new()));
//!
//! let hello = node.originate(Payload::hello("node Relay_001 online"), None);
//! node.broadcast(&medium, &hello).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod cleanup;
pub mod error;
pub mod message;
pub mod node;
pub mod relay;
pub mod sentry;
pub mod transport;

// Re-export main types
pub use cache::MessageCache;
pub use cleanup::CleanupScheduler;
pub use error::{MeshError, MeshResult};
pub use message::{AlertPayload, HelloPayload, MeshMessage, NodeId, Payload, SensorReading};
pub use node::{Disposition, MeshNode};
pub use relay::RelayRole;
pub use sentry::{
    FileSensorSource, HeuristicRiskModel, Indicator, LogIndicator, RiskModel, SensorSource,
    SentryRole, SentrySettings,
};
pub use transport::{
    BroadcastMedium, LoopbackEndpoint, LoopbackSegment, RecordingUplink, TcpUplink, UdpBroadcast,
    Uplink,
};
