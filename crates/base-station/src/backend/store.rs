//! SQLite incident document store.
//!
//! Each incident is kept as its full JSON document, with the fields that
//! queries filter on mirrored into columns. The database is opened on first
//! use; a failed open is retried on the next call.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::info;

use super::{IncidentBackend, SubmitOutcome};
use crate::error::BackendError;
use crate::incident::{Incident, IncidentStatus, ProcessingStatus};

/// An incident as stored, with audit timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredIncident {
    pub incident: Incident,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SqliteIncidentStore {
    path: PathBuf,
    db: OnceCell<Mutex<Connection>>,
}

impl SqliteIncidentStore {
    /// Store backed by the database file at `path`, or an in-memory
    /// database for `":memory:"`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<MutexGuard<'_, Connection>, BackendError> {
        let db = self
            .db
            .get_or_try_init(|| async { open(&self.path).map(Mutex::new) })
            .await?;
        Ok(db.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Insert unless an incident with the same id already exists.
    pub async fn insert(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError> {
        let document = serde_json::to_string(incident)?;
        let now = timestamp(Utc::now());
        let db = self.connection().await?;

        let inserted = db.execute(
            "INSERT OR IGNORE INTO incidents
                (incident_id, status, processing_status, severity, origin_node_id, document, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                incident.incident_id,
                incident.status.as_str(),
                incident.base_receipt.processing_status.as_str(),
                incident.severity,
                incident.source.origin_node_id,
                document,
                now,
            ],
        )?;

        if inserted == 0 {
            Ok(SubmitOutcome::AlreadyRecorded)
        } else {
            Ok(SubmitOutcome::Created)
        }
    }

    pub async fn get(&self, incident_id: &str) -> Result<Option<StoredIncident>, BackendError> {
        let db = self.connection().await?;
        let row = db
            .query_row(
                "SELECT document, created_at, updated_at FROM incidents WHERE incident_id = ?1",
                [incident_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(document, created_at, updated_at)| to_stored(&document, &created_at, &updated_at))
            .transpose()
    }

    /// Every incident that is not archived, newest first.
    pub async fn active(&self) -> Result<Vec<StoredIncident>, BackendError> {
        let db = self.connection().await?;
        let mut stmt = db.prepare(
            "SELECT document, created_at, updated_at FROM incidents
             WHERE status != 'archived'
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.iter()
            .map(|(document, created_at, updated_at)| to_stored(document, created_at, updated_at))
            .collect()
    }

    pub async fn update_status(
        &self,
        incident_id: &str,
        status: IncidentStatus,
    ) -> Result<(), BackendError> {
        self.modify(incident_id, |incident| incident.status = status)
            .await
    }

    pub async fn update_processing_status(
        &self,
        incident_id: &str,
        processing_status: ProcessingStatus,
    ) -> Result<(), BackendError> {
        self.modify(incident_id, |incident| {
            incident.base_receipt.processing_status = processing_status
        })
        .await
    }

    async fn modify<F>(&self, incident_id: &str, change: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut Incident),
    {
        let db = self.connection().await?;
        let document: String = db
            .query_row(
                "SELECT document FROM incidents WHERE incident_id = ?1",
                [incident_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| BackendError::NotFound(incident_id.to_string()))?;

        let mut incident: Incident = serde_json::from_str(&document)?;
        change(&mut incident);

        db.execute(
            "UPDATE incidents
             SET status = ?2, processing_status = ?3, document = ?4, updated_at = ?5
             WHERE incident_id = ?1",
            params![
                incident_id,
                incident.status.as_str(),
                incident.base_receipt.processing_status.as_str(),
                serde_json::to_string(&incident)?,
                timestamp(Utc::now()),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl IncidentBackend for SqliteIncidentStore {
    async fn submit(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError> {
        self.insert(incident).await
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn open(path: &Path) -> Result<Connection, BackendError> {
    let db = Connection::open(path)?;

    db.execute(
        "CREATE TABLE IF NOT EXISTS incidents (
            incident_id TEXT NOT NULL,
            status TEXT NOT NULL,
            processing_status TEXT NOT NULL,
            severity INTEGER NOT NULL,
            origin_node_id TEXT NOT NULL,
            document TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    db.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_id ON incidents(incident_id)",
        [],
    )?;

    db.execute(
        "CREATE INDEX IF NOT EXISTS idx_incidents_status ON incidents(status)",
        [],
    )?;

    info!(path = %path.display(), "Opened incident store");
    Ok(db)
}

// Fixed width so that text ordering matches time ordering.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_stored(document: &str, created_at: &str, updated_at: &str) -> Result<StoredIncident, BackendError> {
    Ok(StoredIncident {
        incident: serde_json::from_str(document)?,
        created_at: parse_timestamp(created_at)?,
        updated_at: parse_timestamp(updated_at)?,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, BackendError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| BackendError::Corrupt(format!("timestamp {:?}: {}", raw, e)))
}
