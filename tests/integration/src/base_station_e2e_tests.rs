//! Base Station End-to-End - sentry to relay to base over real sockets
//!
//! Sentries and relays share an in-process broadcast segment; relays uplink
//! to a base station listening on loopback TCP.
//!
//! # Test Scenarios
//!
//! 1. **Reference alert**: one sentry, one relay, recorded incident content
//! 2. **Two relay paths**: duplicate uplinks, idempotent SQLite store, one alarm
//! 3. **HTTP gateway**: incidents posted to a mock ingestion endpoint
//! 4. **Dead base station**: the flood continues without the uplink

use crate::test_utils::{
    field_reading, init_test_logging, vancouver, wait_until, CountingAnnunciator, FixedRisk,
    FixedSensor, RecordingBackend,
};
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use firemesh_base::{
    BaseStationReceiver, CooldownTable, HttpIncidentBackend, IncidentBackend,
    IncidentTransformer, ProcessingStatus, ReceiverSettings, SqliteIncidentStore,
};
use firemesh_base::incident::NodeType;
use firemesh_mesh::{
    Indicator, LoopbackSegment, MeshNode, MessageCache, RelayRole, SentryRole, SentrySettings,
    TcpUplink,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct NoIndicator;

impl Indicator for NoIndicator {
    fn pulse(&self, _duration: Duration) {}
}

fn sentry(segment: &LoopbackSegment, risk: f64) -> SentryRole {
    SentryRole::new(
        Arc::new(MeshNode::new("Sentry1", Some(vancouver()), 8, Arc::new(MessageCache::new()))),
        Arc::new(segment.join()),
        Arc::new(FixedSensor(field_reading())),
        Arc::new(FixedRisk(risk)),
        Arc::new(NoIndicator),
        SentrySettings {
            poll_interval: Duration::from_secs(5),
            risk_threshold: 0.5,
            indicator_duration: Duration::from_millis(1),
        },
    )
}

fn spawn_relay(segment: &LoopbackSegment, id: &str, base: SocketAddr) -> JoinHandle<()> {
    let relay = RelayRole::new(
        Arc::new(MeshNode::new(id, None, 8, Arc::new(MessageCache::new()))),
        Arc::new(segment.join()),
        Arc::new(TcpUplink::new(base, Duration::from_secs(2))),
    );
    tokio::spawn(async move {
        let _ = relay.run().await;
    })
}

async fn spawn_base(
    backend: Arc<dyn IncidentBackend>,
    annunciator: Arc<CountingAnnunciator>,
) -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let receiver = Arc::new(BaseStationReceiver::new(
        ReceiverSettings::default(),
        CooldownTable::new(Duration::from_secs(60)),
        IncidentTransformer::new("Base_001", "BC-VAN"),
        backend,
        annunciator,
    ));
    let handle = tokio::spawn(async move {
        let _ = receiver.run(listener).await;
    });
    (addr, handle)
}

#[tokio::test]
async fn test_reference_alert_end_to_end() {
    init_test_logging();
    let backend = Arc::new(RecordingBackend::default());
    let annunciator = Arc::new(CountingAnnunciator::default());
    let (base_addr, base) = spawn_base(backend.clone(), annunciator.clone()).await;

    let segment = LoopbackSegment::new();
    let sentry = sentry(&segment, 0.85);
    let relay = spawn_relay(&segment, "Relay1", base_addr);

    let message = sentry.poll_once().await.unwrap().expect("risk above threshold");
    assert_eq!(message.ttl, 8);
    assert_eq!(message.route, vec!["Sentry1"]);

    assert!(wait_until(|| backend.incidents().len() == 1).await);
    assert!(wait_until(|| annunciator.count() == 1).await);
    relay.abort();
    base.abort();

    let incident = &backend.incidents()[0];
    assert_eq!(incident.incident_id, message.id);
    assert_eq!(incident.severity, 8);
    assert_eq!(incident.source.origin_node_id, "Sentry1");
    assert_eq!(incident.location.coordinates, [-123.1207, 49.2827]);
    assert_eq!(incident.base_receipt.processing_status, ProcessingStatus::Completed);
    assert_eq!(
        incident.payload.summary,
        "Fire risk detected - Temp: 42.5°C, Humidity: 15.2%"
    );

    let path: Vec<(u32, &str)> = incident
        .traversal_path
        .iter()
        .map(|hop| (hop.hop_index, hop.node_id.as_str()))
        .collect();
    assert_eq!(path, vec![(0, "Sentry1"), (1, "Relay1")]);
    assert_eq!(incident.traversal_path[0].node_type, NodeType::Edge);
    assert_eq!(incident.traversal_path[1].node_type, NodeType::Relay);
}

#[tokio::test]
async fn test_two_relay_paths_record_once_and_alarm_once() {
    let store = Arc::new(SqliteIncidentStore::new(":memory:"));
    let annunciator = Arc::new(CountingAnnunciator::default());
    let (base_addr, base) = spawn_base(store.clone(), annunciator.clone()).await;

    let segment = LoopbackSegment::new();
    let sentry = sentry(&segment, 0.92);
    let relay_a = spawn_relay(&segment, "Relay1", base_addr);
    let relay_b = spawn_relay(&segment, "Relay2", base_addr);

    let message = sentry.poll_once().await.unwrap().unwrap();

    // each relay forwards once and uplinks its copy; the relays also hear
    // each other's rebroadcast but drop it as a duplicate
    assert!(wait_until(|| segment.send_count() == 3).await);
    assert!(wait_until(|| annunciator.count() == 1).await);
    // give the second uplink time to land as a duplicate
    tokio::time::sleep(Duration::from_millis(200)).await;
    relay_a.abort();
    relay_b.abort();
    base.abort();

    let active = store.active().await.unwrap();
    assert_eq!(active.len(), 1);
    let stored = store.get(&message.id).await.unwrap().unwrap();
    assert_eq!(stored.incident.severity, 9);
    assert_eq!(stored.incident.traversal_path.len(), 2);
    assert_eq!(annunciator.count(), 1);
}

#[tokio::test]
async fn test_repeated_alerts_recorded_through_cooldown() {
    let backend = Arc::new(RecordingBackend::default());
    let annunciator = Arc::new(CountingAnnunciator::default());
    let (base_addr, base) = spawn_base(backend.clone(), annunciator.clone()).await;

    let segment = LoopbackSegment::new();
    let sentry = sentry(&segment, 0.7);
    let relay = spawn_relay(&segment, "Relay1", base_addr);

    for _ in 0..3 {
        sentry.poll_once().await.unwrap().unwrap();
    }

    assert!(wait_until(|| backend.incidents().len() == 3).await);
    assert!(wait_until(|| annunciator.count() == 1).await);
    relay.abort();
    base.abort();

    // three distinct alerts from one source: all recorded, one alarm
    assert_eq!(annunciator.count(), 1);
    let incidents = backend.incidents();
    assert!(incidents.iter().all(|i| i.severity == 7));
    assert_ne!(incidents[0].incident_id, incidents[1].incident_id);
}

type Ingested = Arc<Mutex<Vec<Value>>>;

async fn ingest(State(ingested): State<Ingested>, Json(doc): Json<Value>) -> StatusCode {
    let mut ingested = ingested.lock().unwrap();
    let duplicate = ingested.iter().any(|d| d["incidentId"] == doc["incidentId"]);
    if duplicate {
        return StatusCode::CONFLICT;
    }
    ingested.push(doc);
    StatusCode::CREATED
}

#[tokio::test]
async fn test_alert_reaches_http_gateway() {
    let ingested = Ingested::default();
    let app = Router::new()
        .route("/incidents", post(ingest))
        .with_state(ingested.clone());
    let gateway = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway_addr = gateway.local_addr().unwrap();
    let gateway_task = tokio::spawn(async move {
        axum::serve(gateway, app).await.unwrap();
    });

    let backend = Arc::new(HttpIncidentBackend::new(
        format!("http://{}/incidents", gateway_addr),
        Duration::from_secs(5),
    ));
    let (base_addr, base) = spawn_base(backend, Arc::new(CountingAnnunciator::default())).await;

    let segment = LoopbackSegment::new();
    let sentry = sentry(&segment, 0.85);
    let relay = spawn_relay(&segment, "Relay1", base_addr);
    let message = sentry.poll_once().await.unwrap().unwrap();

    assert!(wait_until(|| ingested.lock().unwrap().len() == 1).await);
    relay.abort();
    base.abort();
    gateway_task.abort();

    let doc = ingested.lock().unwrap()[0].clone();
    assert_eq!(doc["incidentId"], message.id.as_str());
    assert_eq!(doc["type"], "fire");
    assert_eq!(doc["severity"], 8);
    assert_eq!(doc["status"], "open");
    assert_eq!(doc["location"]["regionCode"], "BC-VAN");
    assert_eq!(doc["traversalPath"][1]["nodeId"], "Relay1");
    assert_eq!(doc["baseReceipt"]["baseNodeId"], "Base_001");
}

#[tokio::test]
async fn test_flood_continues_when_base_is_down() {
    // nothing listens here once the probe listener is dropped
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_base = probe.local_addr().unwrap();
    drop(probe);

    let segment = LoopbackSegment::new();
    let sentry = sentry(&segment, 0.85);
    let relay_a = spawn_relay(&segment, "Relay1", dead_base);
    let relay_b = spawn_relay(&segment, "Relay2", dead_base);

    sentry.poll_once().await.unwrap().unwrap();

    assert!(wait_until(|| segment.send_count() == 3).await);
    relay_a.abort();
    relay_b.abort();
}
