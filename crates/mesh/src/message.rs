//! Mesh message model and wire codec.
//!
//! One message is one UTF-8 JSON object. `id` and `src` are required; every
//! other key is optional. Top-level keys this node does not understand are
//! carried through forwarding untouched.

use firemesh_core::time::unix_seconds;
use firemesh_core::GeoPoint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{MeshError, MeshResult};

/// Node identifier as it appears in `src` and `route`.
pub type NodeId = String;

/// The unit of protocol exchange.
///
/// All physical copies of a flooded message share one `id`; every accept and
/// dedup decision keys on it, never on content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshMessage {
    /// Assigned once by the originating node
    pub id: String,
    /// Originating node
    pub src: NodeId,
    /// Static location of the originating node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_location: Option<GeoPoint>,
    /// Remaining hop budget
    #[serde(default, deserialize_with = "deserialize_ttl")]
    pub ttl: u32,
    /// Origination time in Unix seconds (diagnostic only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<f64>,
    /// Nodes traversed so far, origin first
    #[serde(default)]
    pub route: Vec<NodeId>,
    /// Message content; absent on bare control messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
    /// Unrecognized top-level keys, preserved across forwarding
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MeshMessage {
    /// Build a fresh origination: new random id, `route = [src]`, `ts = now`.
    pub fn originate(
        src: impl Into<NodeId>,
        src_location: Option<GeoPoint>,
        ttl: u32,
        payload: Payload,
    ) -> Self {
        let src = src.into();
        Self {
            id: Uuid::new_v4().to_string(),
            route: vec![src.clone()],
            src,
            src_location,
            ttl,
            ts: Some(unix_seconds()),
            payload: Some(payload),
            extra: Map::new(),
        }
    }

    /// Decode one wire message, rejecting anything without a usable `id`/`src`.
    pub fn parse(bytes: &[u8]) -> MeshResult<Self> {
        let message: MeshMessage =
            serde_json::from_slice(bytes).map_err(|e| MeshError::Malformed(e.to_string()))?;
        if message.id.is_empty() {
            return Err(MeshError::Malformed("empty message id".to_string()));
        }
        Ok(message)
    }

    /// Encode for the wire.
    pub fn to_bytes(&self) -> MeshResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The copy this node rebroadcasts: ttl reduced by one and `node_id`
    /// appended to a new route. `None` once the hop budget is spent.
    pub fn forwarded_by(&self, node_id: &str) -> Option<MeshMessage> {
        if self.ttl == 0 {
            return None;
        }
        let mut route = Vec::with_capacity(self.route.len() + 1);
        route.extend(self.route.iter().cloned());
        route.push(node_id.to_string());

        Some(MeshMessage {
            ttl: self.ttl - 1,
            route,
            ..self.clone()
        })
    }

    /// The alert payload, if this message carries one.
    pub fn alert(&self) -> Option<&AlertPayload> {
        match &self.payload {
            Some(Payload::Alert(alert)) => Some(alert),
            _ => None,
        }
    }

    /// Payload discriminant, or `"none"` when the message carries no payload.
    pub fn payload_kind(&self) -> &str {
        self.payload.as_ref().map(Payload::kind).unwrap_or("none")
    }
}

fn deserialize_ttl<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    // Negative budgets are exhausted budgets.
    let raw = Option::<i64>::deserialize(deserializer)?.unwrap_or(0);
    Ok(raw.clamp(0, u32::MAX as i64) as u32)
}

/// Message payload, decoded through its `type` discriminant.
///
/// Unknown discriminants (or known ones that fail to decode) are kept verbatim
/// as [`Payload::Unrecognized`] so they still flood.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Liveness announcement
    Hello(HelloPayload),
    /// Risk alert from a sentry
    Alert(AlertPayload),
    /// Any other payload, raw
    Unrecognized(Value),
}

impl Payload {
    /// Liveness announcement with text `msg`.
    pub fn hello(msg: impl Into<String>) -> Self {
        Payload::Hello(HelloPayload {
            msg: msg.into(),
            extra: Map::new(),
        })
    }

    /// The `type` discriminant as sent.
    pub fn kind(&self) -> &str {
        match self {
            Payload::Hello(_) => "hello",
            Payload::Alert(_) => "alert",
            Payload::Unrecognized(value) => value
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TaggedPayloadRef<'a> {
    Hello(&'a HelloPayload),
    Alert(&'a AlertPayload),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TaggedPayload {
    Hello(HelloPayload),
    Alert(AlertPayload),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Hello(hello) => TaggedPayloadRef::Hello(hello).serialize(serializer),
            Payload::Alert(alert) => TaggedPayloadRef::Alert(alert).serialize(serializer),
            Payload::Unrecognized(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let known = matches!(
            value.get("type").and_then(Value::as_str),
            Some("hello") | Some("alert")
        );
        if known {
            if let Ok(tagged) = serde_json::from_value::<TaggedPayload>(value.clone()) {
                return Ok(match tagged {
                    TaggedPayload::Hello(hello) => Payload::Hello(hello),
                    TaggedPayload::Alert(alert) => Payload::Alert(alert),
                });
            }
        }
        Ok(Payload::Unrecognized(value))
    }
}

/// Liveness announcement sent at node startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Free-text announcement
    #[serde(default)]
    pub msg: String,
    /// Unrecognized payload keys, preserved across forwarding
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Alert raised by a sentry whose risk model crossed its threshold.
///
/// Decoding never fails on a body shape: a non-numeric risk decodes as
/// absent, `sensor_data` is kept exactly as sent, and a `metadata` that is
/// not an object decodes as empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    /// Risk score in [0, 1]; non-numeric values decode as absent
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub risk: Option<f64>,
    /// Sensor sample as sent on the wire, unknown channels included
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub sensor_data: Value,
    /// Free-form sentry metadata
    #[serde(default, deserialize_with = "deserialize_lenient_object")]
    pub metadata: Map<String, Value>,
    /// Unrecognized payload keys, preserved across forwarding
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AlertPayload {
    /// Alert with no metadata carrying `sensor_data` as the reading.
    pub fn new(risk: f64, sensor_data: SensorReading) -> Self {
        Self {
            risk: Some(risk),
            sensor_data: serde_json::to_value(&sensor_data).unwrap_or_default(),
            metadata: Map::new(),
            extra: Map::new(),
        }
    }

    /// Typed view of `sensor_data`; channels that are missing or not
    /// numeric are `None`.
    pub fn reading(&self) -> SensorReading {
        serde_json::from_value(self.sensor_data.clone()).unwrap_or_default()
    }
}

impl From<AlertPayload> for Payload {
    fn from(alert: AlertPayload) -> Self {
        Payload::Alert(alert)
    }
}

/// One sentry sensor sample. Missing channels are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Degrees Celsius
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub temperature: Option<f64>,
    /// Relative humidity percent; the sentry reports -1 when the sensor fails
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub humidity: Option<f64>,
    /// Air quality index
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub air_quality: Option<f64>,
    /// Light level
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_f64",
        skip_serializing_if = "Option::is_none"
    )]
    pub light: Option<f64>,
}

fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_f64())
}

fn deserialize_lenient_object<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}
