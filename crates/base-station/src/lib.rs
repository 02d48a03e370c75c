//! Firemesh Base - base station for the wildfire sensor mesh
//!
//! Relays uplink every alert copy they forward over a reliable TCP channel.
//! The base station turns those alerts into incident records and raises a
//! local alarm, at most once per source per cooldown window.
//!
//! # Core Components
//!
//! - **BaseStationReceiver**: accept loop, per-source cooldown, dispatch
//! - **CooldownTable**: per-source annunciation rate limit
//! - **IncidentTransformer**: alert message to incident document
//! - **IncidentBackend**: HTTP gateway, SQLite store, or log-only
//! - **Annunciator**: fire-and-forget local alarm

pub mod annunciator;
pub mod backend;
pub mod cooldown;
pub mod error;
pub mod incident;
pub mod receiver;

// Re-export main types
pub use annunciator::{AlertNotice, Annunciator, LogAnnunciator, TerminalAnnunciator};
pub use backend::{
    HttpIncidentBackend, IncidentBackend, LogOnlyBackend, SqliteIncidentStore, StoredIncident,
    SubmitOutcome,
};
pub use cooldown::CooldownTable;
pub use error::{BackendError, BaseError, BaseResult, TransformError};
pub use incident::{Incident, IncidentStatus, IncidentTransformer, ProcessingStatus, TraversalHop};
pub use receiver::{BaseStationReceiver, ReceiptOutcome, ReceiverSettings};
