//! Incident records and the mesh-message to incident mapping.
//!
//! [`IncidentTransformer::transform`] is pure: no I/O, and the only failure is
//! a message that cannot describe an incident.

use chrono::{DateTime, Utc};
use firemesh_mesh::{AlertPayload, MeshMessage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::TransformError;

/// Severity used when an alert carries no usable risk score.
pub const FALLBACK_SEVERITY: u8 = 8;

/// Incident document submitted to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    /// Mesh message id; backends treat ingestion as idempotent on it
    pub incident_id: String,
    #[serde(rename = "type")]
    pub kind: IncidentKind,
    /// 1 (lowest) to 10
    pub severity: u8,
    pub status: IncidentStatus,
    pub source: IncidentSource,
    pub location: IncidentLocation,
    pub traversal_path: Vec<TraversalHop>,
    pub base_receipt: BaseReceipt,
    pub payload: IncidentPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentKind {
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Open,
    Acknowledged,
    Resolved,
    Archived,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentSource {
    pub origin_node_id: String,
    pub detection_method: DetectionMethod,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Sensor,
}

/// GeoJSON point plus the deployment region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentLocation {
    #[serde(rename = "type")]
    pub geometry: String,
    /// `[lon, lat]`
    pub coordinates: [f64; 2],
    pub region_code: String,
}

/// One entry of the route the alert took, origin at index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalHop {
    pub hop_index: u32,
    pub node_id: String,
    pub node_type: NodeType,
    pub transport: HopTransport,
    pub integrity: HopIntegrity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Edge,
    Relay,
    Base,
}

impl NodeType {
    /// Infer the node type from the deployment naming convention.
    pub fn infer(node_id: &str) -> Self {
        if node_id.contains("Sentry") || node_id.contains("Sensor") {
            NodeType::Edge
        } else if node_id.contains("Relay") {
            NodeType::Relay
        } else if node_id.contains("Base") {
            NodeType::Base
        } else {
            NodeType::Relay
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopTransport {
    pub protocol: String,
    pub encrypted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopIntegrity {
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseReceipt {
    pub base_node_id: String,
    pub received_at: DateTime<Utc>,
    pub processing_status: ProcessingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Pending,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentPayload {
    pub summary: String,
    pub raw: Value,
}

/// Map a risk score to severity: `clamp(trunc(r * 10), 1, 10)`.
///
/// Scores that are absent, non-finite or outside [0, 1] get
/// [`FALLBACK_SEVERITY`].
pub fn severity_from_risk(risk: Option<f64>) -> u8 {
    match risk {
        Some(r) if (0.0..=1.0).contains(&r) => ((r * 10.0) as i64).clamp(1, 10) as u8,
        _ => FALLBACK_SEVERITY,
    }
}

/// Builds incidents on behalf of one base station.
#[derive(Debug, Clone)]
pub struct IncidentTransformer {
    base_node_id: String,
    region_code: String,
}

impl IncidentTransformer {
    pub fn new(base_node_id: impl Into<String>, region_code: impl Into<String>) -> Self {
        Self {
            base_node_id: base_node_id.into(),
            region_code: region_code.into(),
        }
    }

    pub fn base_node_id(&self) -> &str {
        &self.base_node_id
    }

    /// Build the incident for an uplinked alert received at `received_at`.
    pub fn transform(
        &self,
        message: &MeshMessage,
        received_at: DateTime<Utc>,
    ) -> Result<Incident, TransformError> {
        let alert = match message.alert() {
            Some(alert) => alert,
            None if message.payload_kind() == "alert" => return Err(TransformError::MalformedAlert),
            None => return Err(TransformError::NotAnAlert(message.payload_kind().to_string())),
        };
        if message.src.is_empty() {
            return Err(TransformError::MissingField("src"));
        }
        let location = message
            .src_location
            .ok_or(TransformError::MissingField("src_location"))?;

        let traversal_path = message
            .route
            .iter()
            .enumerate()
            .map(|(index, node_id)| TraversalHop {
                hop_index: index as u32,
                node_id: node_id.clone(),
                node_type: NodeType::infer(node_id),
                transport: HopTransport {
                    protocol: "radio".to_string(),
                    encrypted: false,
                },
                integrity: HopIntegrity { verified: true },
            })
            .collect();

        Ok(Incident {
            incident_id: message.id.clone(),
            kind: IncidentKind::Fire,
            severity: severity_from_risk(alert.risk),
            status: IncidentStatus::Open,
            source: IncidentSource {
                origin_node_id: message.src.clone(),
                detection_method: DetectionMethod::Sensor,
                detected_at: received_at,
            },
            location: IncidentLocation {
                geometry: "Point".to_string(),
                coordinates: [location.lon, location.lat],
                region_code: self.region_code.clone(),
            },
            traversal_path,
            base_receipt: BaseReceipt {
                base_node_id: self.base_node_id.clone(),
                received_at,
                processing_status: ProcessingStatus::Completed,
            },
            payload: IncidentPayload {
                summary: summarize(alert),
                raw: json!({
                    "sensor_data": raw_sensor_data(alert),
                    "message_id": message.id,
                    "timestamp": message.ts,
                }),
            },
        })
    }
}

fn summarize(alert: &AlertPayload) -> String {
    format!(
        "Fire risk detected - Temp: {}°C, Humidity: {}%",
        wire_reading(&alert.sensor_data, "temperature"),
        wire_reading(&alert.sensor_data, "humidity")
    )
}

/// A sensor channel rendered as it was sent; `N/A` when absent.
fn wire_reading(sensor_data: &Value, channel: &str) -> String {
    match sensor_data.get(channel) {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn raw_sensor_data(alert: &AlertPayload) -> Value {
    match &alert.sensor_data {
        Value::Null => Value::Object(Map::new()),
        sensor_data => sensor_data.clone(),
    }
}
