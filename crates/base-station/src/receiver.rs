//! Base station uplink receiver.
//!
//! Relays open one short-lived TCP connection per forwarded message. The
//! receiver reads each connection to EOF, and for alerts:
//!
//! 1. consults the per-source [`CooldownTable`] and, if due, starts local
//!    annunciation without waiting for it;
//! 2. builds and submits the incident, whatever the cooldown said.
//!
//! Copies of one alert arriving over different relay paths are not
//! deduplicated here; the backend is idempotent on the incident id.

use chrono::{DateTime, Utc};
use firemesh_core::Config;
use firemesh_mesh::MeshMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::annunciator::{spawn_annunciation, AlertNotice, Annunciator};
use crate::backend::{IncidentBackend, SubmitOutcome};
use crate::cooldown::CooldownTable;
use crate::error::{BaseError, BaseResult};
use crate::incident::IncidentTransformer;

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ReceiverSettings {
    pub receive_timeout: Duration,
    pub max_message_bytes: usize,
}

impl ReceiverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            receive_timeout: config.receive_timeout(),
            max_message_bytes: config.base.max_message_bytes,
        }
    }
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_secs(5),
            max_message_bytes: 65536,
        }
    }
}

/// What happened to one uplinked message.
#[derive(Debug)]
pub enum ReceiptOutcome {
    /// Not an alert; logged only
    Ignored { kind: String },
    /// Alert handled; `annunciated` is false while the source is cooling down
    Alert {
        annunciated: bool,
        recorded: BaseResult<SubmitOutcome>,
    },
}

pub struct BaseStationReceiver {
    settings: ReceiverSettings,
    cooldown: CooldownTable,
    transformer: IncidentTransformer,
    backend: Arc<dyn IncidentBackend>,
    annunciator: Arc<dyn Annunciator>,
}

impl BaseStationReceiver {
    pub fn new(
        settings: ReceiverSettings,
        cooldown: CooldownTable,
        transformer: IncidentTransformer,
        backend: Arc<dyn IncidentBackend>,
        annunciator: Arc<dyn Annunciator>,
    ) -> Self {
        Self {
            settings,
            cooldown,
            transformer,
            backend,
            annunciator,
        }
    }

    pub fn from_config(
        config: &Config,
        backend: Arc<dyn IncidentBackend>,
        annunciator: Arc<dyn Annunciator>,
    ) -> Self {
        Self::new(
            ReceiverSettings::from_config(config),
            CooldownTable::new(config.alert_cooldown()),
            IncidentTransformer::new(config.base.node_id.clone(), config.base.region_code.clone()),
            backend,
            annunciator,
        )
    }

    pub fn cooldown(&self) -> &CooldownTable {
        &self.cooldown
    }

    /// Accept loop. Each connection is handled on its own task, so a slow
    /// sender or backend never holds up the next relay.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> BaseResult<()> {
        let addr = listener.local_addr()?;
        info!(
            base = %self.transformer.base_node_id(),
            %addr,
            backend = self.backend.name(),
            "Base station listening for uplinks"
        );
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let receiver = Arc::clone(&self);
                    tokio::spawn(async move {
                        receiver.handle_connection(stream, peer).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept uplink connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Accept one connection and return the message it carried.
    pub async fn accept_uplink(&self, listener: &TcpListener) -> BaseResult<(MeshMessage, SocketAddr)> {
        let (mut stream, peer) = listener.accept().await?;
        let message = self.read_message(&mut stream).await?;
        Ok((message, peer))
    }

    async fn handle_connection(&self, mut stream: TcpStream, peer: SocketAddr) {
        let message = match self.read_message(&mut stream).await {
            Ok(message) => message,
            Err(e) => {
                warn!(%peer, error = %e, "Dropping uplink");
                return;
            }
        };
        info!(
            %peer,
            msg_id = %message.id,
            src = %message.src,
            kind = message.payload_kind(),
            route = ?message.route,
            "Uplink received"
        );
        self.process(&message).await;
    }

    /// Read one message: everything up to EOF, bounded in time and size.
    pub async fn read_message(&self, stream: &mut TcpStream) -> BaseResult<MeshMessage> {
        let limit = self.settings.max_message_bytes;
        let mut buf = Vec::new();
        let read = tokio::time::timeout(
            self.settings.receive_timeout,
            (&mut *stream).take(limit as u64 + 1).read_to_end(&mut buf),
        )
        .await
        .map_err(|_| BaseError::ReceiveTimeout(self.settings.receive_timeout.as_millis() as u64))?;
        read?;

        if buf.len() > limit {
            return Err(BaseError::Oversized(limit));
        }
        if buf.iter().all(u8::is_ascii_whitespace) {
            return Err(BaseError::EmptyConnection);
        }
        Ok(MeshMessage::parse(&buf)?)
    }

    /// Handle a received message now.
    pub async fn process(&self, message: &MeshMessage) -> ReceiptOutcome {
        self.process_at(message, Utc::now()).await
    }

    /// Handle a message received at `received_at`.
    pub async fn process_at(&self, message: &MeshMessage, received_at: DateTime<Utc>) -> ReceiptOutcome {
        if message.payload_kind() != "alert" {
            debug!(msg_id = %message.id, kind = message.payload_kind(), "Not an alert, ignoring");
            return ReceiptOutcome::Ignored {
                kind: message.payload_kind().to_string(),
            };
        }

        let annunciated = self.cooldown.should_alert(&message.src);
        if annunciated {
            spawn_annunciation(
                Arc::clone(&self.annunciator),
                AlertNotice {
                    msg_id: message.id.clone(),
                    src: message.src.clone(),
                    risk: message.alert().and_then(|alert| alert.risk),
                    received_at,
                },
            );
        } else {
            info!(msg_id = %message.id, src = %message.src, "Source in cooldown, not annunciating");
        }

        let recorded = self.record(message, received_at).await;
        match &recorded {
            Ok(outcome) => info!(msg_id = %message.id, ?outcome, backend = self.backend.name(), "Incident recorded"),
            Err(e) => warn!(msg_id = %message.id, error = %e, backend = self.backend.name(), "Incident not recorded"),
        }

        ReceiptOutcome::Alert {
            annunciated,
            recorded,
        }
    }

    async fn record(&self, message: &MeshMessage, received_at: DateTime<Utc>) -> BaseResult<SubmitOutcome> {
        let incident = self.transformer.transform(message, received_at)?;
        Ok(self.backend.submit(&incident).await?)
    }
}
