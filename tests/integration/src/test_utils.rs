//! Test utilities for multi-node firemesh scenarios

use async_trait::async_trait;
use firemesh_base::{AlertNotice, Annunciator, BackendError, Incident, IncidentBackend, SubmitOutcome};
use firemesh_core::GeoPoint;
use firemesh_mesh::{
    BroadcastMedium, Disposition, LoopbackEndpoint, LoopbackSegment, MeshMessage, MeshNode,
    MeshResult, MessageCache, Payload, RiskModel, SensorReading, SensorSource,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound on delivery rounds before a simulation is declared divergent
const MAX_ROUNDS: usize = 10_000;

/// Install a test-friendly subscriber once; later calls are no-ops
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Deployment coordinates used by the field scenarios
pub fn vancouver() -> GeoPoint {
    GeoPoint {
        lat: 49.2827,
        lon: -123.1207,
    }
}

/// The reading from the reference field alert
pub fn field_reading() -> SensorReading {
    SensorReading {
        temperature: Some(42.5),
        humidity: Some(15.2),
        air_quality: Some(180.0),
        light: Some(450.0),
    }
}

/// Poll `check` until it holds or five seconds pass
pub async fn wait_until<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..500 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// A radio attached to one or more broadcast segments.
///
/// A node at the junction of two segments hears both and its sends reach
/// both, which is how multi-hop paths are built from single-hop segments.
pub struct SimRadio {
    ports: Vec<LoopbackEndpoint>,
}

impl SimRadio {
    pub fn new(ports: Vec<LoopbackEndpoint>) -> Self {
        Self { ports }
    }

    pub fn try_receive(&self) -> Option<(Vec<u8>, SocketAddr)> {
        self.ports.iter().find_map(LoopbackEndpoint::try_receive)
    }
}

#[async_trait]
impl BroadcastMedium for SimRadio {
    async fn broadcast_send(&self, bytes: &[u8]) -> MeshResult<()> {
        for port in &self.ports {
            port.broadcast_send(bytes).await?;
        }
        Ok(())
    }

    async fn broadcast_receive(&self) -> MeshResult<(Vec<u8>, SocketAddr)> {
        loop {
            if let Some(datagram) = self.try_receive() {
                return Ok(datagram);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

/// What one node did with one datagram
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Copy as rebroadcast by this node
    Forwarded(MeshMessage),
    /// Copy as received with no hop budget left
    Terminal(MeshMessage),
    Duplicate,
    Malformed,
}

pub struct SimNode {
    pub node: MeshNode,
    pub radio: SimRadio,
    pub observations: Vec<Observation>,
}

impl SimNode {
    pub fn forwards(&self) -> usize {
        self.observations
            .iter()
            .filter(|o| matches!(o, Observation::Forwarded(_)))
            .count()
    }

    pub fn terminals(&self) -> Vec<&MeshMessage> {
        self.observations
            .iter()
            .filter_map(|o| match o {
                Observation::Terminal(message) => Some(message),
                _ => None,
            })
            .collect()
    }
}

/// Step-wise flood simulation over in-process broadcast segments.
///
/// Each round drains every pending datagram across all nodes, shuffles the
/// deliveries, and lets each node handle its share. Rounds repeat until the
/// mesh is quiet.
pub struct MeshSim {
    pub nodes: Vec<SimNode>,
}

impl MeshSim {
    /// Every node on one shared segment.
    pub fn full_mesh(ids: &[&str], default_ttl: u32) -> Self {
        let segment = LoopbackSegment::new();
        let nodes = ids
            .iter()
            .map(|id| sim_node(id, default_ttl, vec![segment.join()]))
            .collect();
        Self { nodes }
    }

    /// Nodes in a line; each hears only its immediate neighbours.
    pub fn chain(ids: &[&str], default_ttl: u32) -> Self {
        let links: Vec<LoopbackSegment> = (1..ids.len()).map(|_| LoopbackSegment::new()).collect();
        let nodes = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let mut ports = Vec::new();
                if i > 0 {
                    ports.push(links[i - 1].join());
                }
                if i < links.len() {
                    ports.push(links[i].join());
                }
                sim_node(id, default_ttl, ports)
            })
            .collect();
        Self { nodes }
    }

    pub fn node(&self, id: &str) -> &SimNode {
        self.nodes
            .iter()
            .find(|n| n.node.id() == id)
            .unwrap_or_else(|| panic!("no node {}", id))
    }

    /// Originate from node `id` and broadcast it.
    pub async fn originate(&self, id: &str, payload: Payload, ttl: Option<u32>) -> MeshMessage {
        let sim = self.node(id);
        let message = sim.node.originate(payload, ttl);
        sim.node.broadcast(&sim.radio, &message).await.unwrap();
        message
    }

    /// Deliver until nothing is pending. Returns the number of deliveries.
    pub async fn run_to_quiescence<R: Rng>(&mut self, rng: &mut R) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_ROUNDS {
            let mut pending = Vec::new();
            for (index, sim) in self.nodes.iter().enumerate() {
                while let Some((bytes, from)) = sim.radio.try_receive() {
                    pending.push((index, bytes, from));
                }
            }
            if pending.is_empty() {
                return delivered;
            }
            pending.shuffle(rng);

            for (index, bytes, from) in pending {
                let sim = &self.nodes[index];
                let disposition = sim
                    .node
                    .handle_datagram(&sim.radio, None, &bytes, from)
                    .await;
                let observation = match disposition {
                    Disposition::Forward { forwarded, .. } => Observation::Forwarded(forwarded),
                    Disposition::Terminal(message) => Observation::Terminal(message),
                    Disposition::Duplicate { .. } => Observation::Duplicate,
                    Disposition::Malformed(_) => Observation::Malformed,
                };
                self.nodes[index].observations.push(observation);
                delivered += 1;
            }
        }
        panic!("flood did not settle within {} rounds", MAX_ROUNDS);
    }

    pub fn total_forwards(&self) -> usize {
        self.nodes.iter().map(SimNode::forwards).sum()
    }
}

fn sim_node(id: &str, default_ttl: u32, ports: Vec<LoopbackEndpoint>) -> SimNode {
    SimNode {
        node: MeshNode::new(id, Some(vancouver()), default_ttl, Arc::new(MessageCache::new())),
        radio: SimRadio::new(ports),
        observations: Vec::new(),
    }
}

/// Sensor that always returns the same reading
pub struct FixedSensor(pub SensorReading);

#[async_trait]
impl SensorSource for FixedSensor {
    async fn read(&self) -> MeshResult<SensorReading> {
        Ok(self.0.clone())
    }
}

/// Risk model with a fixed answer
pub struct FixedRisk(pub f64);

impl RiskModel for FixedRisk {
    fn predict(&self, _reading: &SensorReading) -> f64 {
        self.0
    }
}

/// Backend that keeps every submitted incident in memory
#[derive(Default)]
pub struct RecordingBackend {
    incidents: Mutex<Vec<Incident>>,
}

impl RecordingBackend {
    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().unwrap().clone()
    }
}

#[async_trait]
impl IncidentBackend for RecordingBackend {
    async fn submit(&self, incident: &Incident) -> Result<SubmitOutcome, BackendError> {
        self.incidents.lock().unwrap().push(incident.clone());
        Ok(SubmitOutcome::Created)
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

/// Annunciator that counts how often it fired
#[derive(Default)]
pub struct CountingAnnunciator {
    fired: AtomicUsize,
}

impl CountingAnnunciator {
    pub fn count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }
}

impl Annunciator for CountingAnnunciator {
    fn annunciate(&self, _notice: &AlertNotice) -> io::Result<()> {
        self.fired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
