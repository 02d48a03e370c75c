//! Sentry role: sample sensors, score risk, originate alerts.
//!
//! Sensor acquisition, the risk model and the local LED are external
//! collaborators behind [`SensorSource`], [`RiskModel`] and [`Indicator`].
//! A sentry also takes part in the flood: it runs the normal receive loop,
//! without an uplink.

use async_trait::async_trait;
use firemesh_core::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{MeshError, MeshResult};
use crate::message::{AlertPayload, MeshMessage, Payload, SensorReading};
use crate::node::MeshNode;
use crate::transport::BroadcastMedium;

/// Source of sensor readings.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Latest available reading.
    async fn read(&self) -> MeshResult<SensorReading>;
}

/// Opaque mapping from a reading to a risk score in [0, 1].
pub trait RiskModel: Send + Sync {
    /// Risk score for `reading`.
    fn predict(&self, reading: &SensorReading) -> f64;
}

/// Local visual indication on the sentry itself. May block for `duration`.
pub trait Indicator: Send + Sync {
    /// Light the indicator for `duration`.
    fn pulse(&self, duration: Duration);
}

/// Reads the latest sample from a JSON file kept current by the acquisition
/// process on the same device.
#[derive(Debug, Clone)]
pub struct FileSensorSource {
    path: PathBuf,
}

impl FileSensorSource {
    /// Read samples from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SensorSource for FileSensorSource {
    async fn read(&self) -> MeshResult<SensorReading> {
        let raw = tokio::fs::read(&self.path).await.map_err(|e| {
            MeshError::Sensor(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_slice(&raw)
            .map_err(|e| MeshError::Sensor(format!("bad reading in {}: {}", self.path.display(), e)))
    }
}

/// Temperature/humidity heuristic used until a trained model is deployed.
///
/// `t/100 * (1 - h/100)`, or `t/100` when humidity is unavailable
/// (missing or negative), clamped to [0, 1].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicRiskModel;

impl RiskModel for HeuristicRiskModel {
    fn predict(&self, reading: &SensorReading) -> f64 {
        let temperature = reading.temperature.unwrap_or(0.0);
        let risk = match reading.humidity {
            Some(h) if h >= 0.0 => temperature / 100.0 * (1.0 - h / 100.0),
            _ => temperature / 100.0,
        };
        risk.clamp(0.0, 1.0)
    }
}

/// Indicator that only logs, for nodes without an LED.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogIndicator;

impl Indicator for LogIndicator {
    fn pulse(&self, duration: Duration) {
        info!(duration_ms = duration.as_millis() as u64, "Alert indicator on");
    }
}

/// Sentry loop settings.
#[derive(Debug, Clone)]
pub struct SentrySettings {
    /// Time between sensor reads
    pub poll_interval: Duration,
    /// Alert when risk reaches this score
    pub risk_threshold: f64,
    /// How long the indicator stays on after an alert
    pub indicator_duration: Duration,
}

impl SentrySettings {
    /// Settings from the `sentry` config section.
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            risk_threshold: config.sentry.risk_threshold,
            indicator_duration: Duration::from_secs(config.sentry.indicator_secs),
        }
    }
}

/// A mesh node that originates alerts.
pub struct SentryRole {
    node: Arc<MeshNode>,
    medium: Arc<dyn BroadcastMedium>,
    sensor: Arc<dyn SensorSource>,
    model: Arc<dyn RiskModel>,
    indicator: Arc<dyn Indicator>,
    settings: SentrySettings,
}

impl SentryRole {
    /// Sentry polling `sensor` and broadcasting alerts on `medium`.
    pub fn new(
        node: Arc<MeshNode>,
        medium: Arc<dyn BroadcastMedium>,
        sensor: Arc<dyn SensorSource>,
        model: Arc<dyn RiskModel>,
        indicator: Arc<dyn Indicator>,
        settings: SentrySettings,
    ) -> Self {
        Self {
            node,
            medium,
            sensor,
            model,
            indicator,
            settings,
        }
    }

    /// The underlying mesh node.
    pub fn node(&self) -> &Arc<MeshNode> {
        &self.node
    }

    /// Create and broadcast a new message. `ttl` defaults to the configured
    /// maximum hop count.
    pub async fn originate(&self, payload: Payload, ttl: Option<u32>) -> MeshResult<MeshMessage> {
        let message = self.node.originate(payload, ttl);
        self.node.broadcast(self.medium.as_ref(), &message).await?;
        Ok(message)
    }

    /// One sensor cycle. Returns the alert sent, if the risk crossed the threshold.
    pub async fn poll_once(&self) -> MeshResult<Option<MeshMessage>> {
        let reading = self.sensor.read().await?;
        let risk = self.model.predict(&reading);
        debug!(node = %self.node.id(), ?reading, risk, "Sensor cycle");

        if risk < self.settings.risk_threshold {
            return Ok(None);
        }

        info!(
            node = %self.node.id(),
            risk,
            threshold = self.settings.risk_threshold,
            "Risk above threshold, sending alert"
        );
        let message = self
            .originate(AlertPayload::new(risk, reading).into(), None)
            .await?;

        let indicator = Arc::clone(&self.indicator);
        let duration = self.settings.indicator_duration;
        tokio::task::spawn_blocking(move || indicator.pulse(duration));

        Ok(Some(message))
    }

    /// Sensor loop. A failed cycle is logged and the next one runs on schedule.
    pub async fn sensor_loop(&self) {
        info!(node = %self.node.id(), interval_secs = self.settings.poll_interval.as_secs(), "Starting sentry sensor loop");
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!(node = %self.node.id(), error = %e, "Sensor cycle failed");
            }
        }
    }

    /// Run the flood receive loop and the sensor loop until the medium closes.
    pub async fn run(&self) -> MeshResult<()> {
        tokio::select! {
            result = self.node.receive_loop(self.medium.as_ref(), None) => result,
            _ = self.sensor_loop() => Ok(()),
        }
    }
}
