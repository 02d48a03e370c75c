//! In-process broadcast segment for simulations and tests.
//!
//! A [`LoopbackSegment`] stands in for one radio broadcast domain: every
//! datagram sent by an endpoint is delivered to every endpoint joined to the
//! segment, the sender included, as with a real interface broadcast.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{BroadcastMedium, Uplink};
use crate::error::{MeshError, MeshResult};

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Debug, Default)]
struct SegmentInner {
    members: Mutex<Vec<(SocketAddr, mpsc::UnboundedSender<Datagram>)>>,
    sends: AtomicUsize,
}

/// Shared broadcast domain.
#[derive(Debug, Clone, Default)]
pub struct LoopbackSegment {
    inner: Arc<SegmentInner>,
}

impl LoopbackSegment {
    /// Create a segment with no endpoints.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a new endpoint. Addresses are assigned sequentially on 10.0.0.0/24.
    pub fn join(&self) -> LoopbackEndpoint {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut members = self
            .inner
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let host = (members.len() + 1) as u8;
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, host), 5006));
        members.push((addr, tx));

        LoopbackEndpoint {
            addr,
            segment: self.clone(),
            inbox: AsyncMutex::new(rx),
        }
    }

    /// Total datagrams sent on this segment by all endpoints.
    pub fn send_count(&self) -> usize {
        self.inner.sends.load(Ordering::SeqCst)
    }

    fn deliver(&self, from: SocketAddr, bytes: &[u8]) {
        self.inner.sends.fetch_add(1, Ordering::SeqCst);
        let members = self
            .inner
            .members
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for (_, tx) in members.iter() {
            // Endpoints that have gone away simply miss the datagram.
            let _ = tx.send((bytes.to_vec(), from));
        }
    }
}

/// One node's attachment to a [`LoopbackSegment`].
#[derive(Debug)]
pub struct LoopbackEndpoint {
    addr: SocketAddr,
    segment: LoopbackSegment,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<Datagram>>,
}

impl LoopbackEndpoint {
    /// Address this endpoint sends from.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Non-blocking receive used by step-wise simulations.
    pub fn try_receive(&self) -> Option<Datagram> {
        self.inbox.try_lock().ok()?.try_recv().ok()
    }
}

#[async_trait]
impl BroadcastMedium for LoopbackEndpoint {
    async fn broadcast_send(&self, bytes: &[u8]) -> MeshResult<()> {
        self.segment.deliver(self.addr, bytes);
        Ok(())
    }

    async fn broadcast_receive(&self) -> MeshResult<(Vec<u8>, SocketAddr)> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| MeshError::ChannelClosed(format!("segment endpoint {}", self.addr)))
    }
}

/// Uplink that records every message instead of connecting anywhere.
#[derive(Debug, Clone, Default)]
pub struct RecordingUplink {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: bool,
}

impl RecordingUplink {
    /// Uplink that accepts every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// An uplink whose every attempt fails, for failure-isolation tests.
    pub fn unreachable() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Every message delivered so far, oldest first.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Uplink for RecordingUplink {
    async fn uplink_send(&self, bytes: &[u8]) -> MeshResult<()> {
        if self.fail {
            return Err(MeshError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "base station unreachable",
            )));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
        Ok(())
    }

    fn destination(&self) -> String {
        "recording".to_string()
    }
}
