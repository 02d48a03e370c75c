//! Incident backends.
//!
//! A backend is the durable home of incidents. Every backend must treat
//! ingestion as idempotent on `incidentId`, since the base station may receive
//! several physical copies of one alert over different relay paths.

mod http;
mod store;

pub use http::HttpIncidentBackend;
pub use store::{SqliteIncidentStore, StoredIncident};

use async_trait::async_trait;
use firemesh_core::{BackendKind, Config};
use std::sync::Arc;
use tracing::info;

use crate::error::BackendError;
use crate::incident::Incident;

/// What the backend did with a submitted incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New incident recorded
    Created,
    /// An incident with this id already exists; nothing changed
    AlreadyRecorded,
    /// Logged only, nothing persisted
    Logged,
}

#[async_trait]
pub trait IncidentBackend: Send + Sync {
    async fn submit(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError>;

    /// Short name for log lines.
    fn name(&self) -> &'static str;
}

/// Backend for deployments without a gateway or store: logs the incident.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyBackend;

#[async_trait]
impl IncidentBackend for LogOnlyBackend {
    async fn submit(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError> {
        let document = serde_json::to_string(incident)?;
        info!(incident_id = %incident.incident_id, %document, "Incident (not persisted)");
        Ok(SubmitOutcome::Logged)
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Backend selected by `[backend] kind`. Nothing is opened or connected yet.
pub fn from_config(config: &Config) -> Arc<dyn IncidentBackend> {
    match config.backend.kind {
        BackendKind::Http => Arc::new(HttpIncidentBackend::new(
            config.backend.endpoint.clone(),
            config.backend_timeout(),
        )),
        BackendKind::Sqlite => Arc::new(SqliteIncidentStore::new(&config.backend.sqlite_path)),
        BackendKind::None => Arc::new(LogOnlyBackend),
    }
}
