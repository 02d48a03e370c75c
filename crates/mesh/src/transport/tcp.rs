//! TCP uplink toward the base station.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::Uplink;
use crate::error::{MeshError, MeshResult};

/// One connection per message: connect, write, close.
#[derive(Debug, Clone)]
pub struct TcpUplink {
    destination: SocketAddr,
    timeout: Duration,
}

impl TcpUplink {
    /// Uplink to `destination`, bounding connect and send by `timeout`.
    pub fn new(destination: SocketAddr, timeout: Duration) -> Self {
        Self {
            destination,
            timeout,
        }
    }

    async fn deliver(&self, bytes: &[u8]) -> MeshResult<()> {
        let mut stream = TcpStream::connect(self.destination).await?;
        stream.write_all(bytes).await?;
        stream.write_all(b"\n").await?;
        stream.shutdown().await?;
        Ok(())
    }
}

#[async_trait]
impl Uplink for TcpUplink {
    async fn uplink_send(&self, bytes: &[u8]) -> MeshResult<()> {
        match timeout(self.timeout, self.deliver(bytes)).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(destination = %self.destination, len = bytes.len(), "Uplink delivered");
                }
                result
            }
            Err(_) => Err(MeshError::UplinkTimeout {
                destination: self.destination.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    fn destination(&self) -> String {
        self.destination.to_string()
    }
}
