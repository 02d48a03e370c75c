//! HTTP incident-ingestion gateway backend.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{IncidentBackend, SubmitOutcome};
use crate::error::BackendError;
use crate::incident::Incident;

/// POSTs each incident as JSON to the gateway.
///
/// `201 Created` and `409 Conflict` (already ingested) are both successes;
/// any other status is a rejection.
#[derive(Debug)]
pub struct HttpIncidentBackend {
    endpoint: String,
    timeout: Duration,
    client: OnceCell<Client>,
}

impl HttpIncidentBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            client: OnceCell::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn client(&self) -> Result<&Client, BackendError> {
        self.client
            .get_or_try_init(|| async {
                Client::builder()
                    .timeout(self.timeout)
                    .connect_timeout(self.timeout)
                    .build()
                    .map_err(|e| BackendError::Unavailable(format!("HTTP client: {}", e)))
            })
            .await
    }
}

#[async_trait]
impl IncidentBackend for HttpIncidentBackend {
    async fn submit(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError> {
        let response = self
            .client()
            .await?
            .post(&self.endpoint)
            .json(incident)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("{}: {}", self.endpoint, e)))?;

        let status = response.status();
        debug!(incident_id = %incident.incident_id, %status, "Gateway response");
        match status {
            StatusCode::CREATED => Ok(SubmitOutcome::Created),
            StatusCode::CONFLICT => Ok(SubmitOutcome::AlreadyRecorded),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(BackendError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
