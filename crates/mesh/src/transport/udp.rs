//! UDP broadcast medium.

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::info;

use super::BroadcastMedium;
use crate::error::MeshResult;

/// UDP socket bound on the mesh port with `SO_BROADCAST` and `SO_REUSEADDR`.
#[derive(Debug)]
pub struct UdpBroadcast {
    socket: UdpSocket,
    target: SocketAddr,
    max_datagram: usize,
}

impl UdpBroadcast {
    /// Bind `bind_addr` and send every datagram to `target` (the interface
    /// broadcast address). A bind failure is fatal for the node.
    pub fn bind(bind_addr: SocketAddr, target: SocketAddr, max_datagram: usize) -> MeshResult<Self> {
        let socket = Socket::new(
            Domain::for_address(bind_addr),
            Type::DGRAM,
            Some(Protocol::UDP),
        )?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        info!(%bind_addr, %target, "Broadcast socket bound");

        Ok(Self {
            socket,
            target,
            max_datagram,
        })
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> MeshResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl BroadcastMedium for UdpBroadcast {
    async fn broadcast_send(&self, bytes: &[u8]) -> MeshResult<()> {
        self.socket.send_to(bytes, self.target).await?;
        Ok(())
    }

    async fn broadcast_receive(&self) -> MeshResult<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; self.max_datagram];
        let (len, from) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        Ok((buf, from))
    }
}
