//! Configuration management for firemesh nodes.
//!
//! One TOML file per node. Every section has defaults taken from the field
//! deployment, so a minimal file only needs `[node] id` and `role`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Static position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Which behavior the node binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Sentry,
    Relay,
    Base,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub node: NodeConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub uplink: UplinkConfig,
    #[serde(default)]
    pub mesh: MeshConfig,
    #[serde(default)]
    pub sentry: SentryConfig,
    #[serde(default)]
    pub base: BaseConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    pub role: NodeRole,
    #[serde(default = "default_location")]
    pub location: GeoPoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_broadcast_port")]
    pub port: u16,
    /// Interface broadcast address; must match the mesh interface setup.
    #[serde(default = "default_broadcast_address")]
    pub address: String,
    #[serde(default = "default_max_datagram")]
    pub max_datagram_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UplinkConfig {
    #[serde(default = "default_uplink_destination")]
    pub destination: String,
    /// Interface index for IPv6 link-local destinations (0 = none).
    #[serde(default)]
    pub scope_id: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,
    #[serde(default = "default_seen_expiry")]
    pub seen_expiry_secs: u64,
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,
    #[serde(default = "default_sensor_path")]
    pub sensor_path: String,
    #[serde(default = "default_indicator_secs")]
    pub indicator_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    #[serde(default = "default_base_node_id")]
    pub node_id: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout_secs: u64,
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    #[serde(default = "default_alert_cooldown")]
    pub alert_cooldown_secs: u64,
    #[serde(default = "default_region_code")]
    pub region_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// HTTP incident-ingestion gateway
    Http,
    /// Local SQLite document store
    Sqlite,
    /// Log incidents only
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default = "default_backend_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_location() -> GeoPoint {
    GeoPoint {
        lat: 49.2827,
        lon: -123.1207,
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_broadcast_port() -> u16 {
    5006
}

fn default_broadcast_address() -> String {
    "10.0.0.255".to_string()
}

fn default_max_datagram() -> usize {
    4096
}

fn default_uplink_destination() -> String {
    "[::1]:6000".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_ttl() -> u32 {
    8
}

fn default_seen_expiry() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    5
}

fn default_risk_threshold() -> f64 {
    0.5
}

fn default_sensor_path() -> String {
    "sensor.json".to_string()
}

fn default_indicator_secs() -> u64 {
    2
}

fn default_base_node_id() -> String {
    "Base_001".to_string()
}

fn default_listen_addr() -> String {
    "[::]:6000".to_string()
}

fn default_receive_timeout() -> u64 {
    5
}

fn default_max_message_bytes() -> usize {
    65536
}

fn default_alert_cooldown() -> u64 {
    60
}

fn default_region_code() -> String {
    "BC-VAN".to_string()
}

fn default_backend_kind() -> BackendKind {
    BackendKind::None
}

fn default_backend_endpoint() -> String {
    "http://127.0.0.1:8090/incidents".to_string()
}

fn default_sqlite_path() -> String {
    "incidents.db".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_broadcast_port(),
            address: default_broadcast_address(),
            max_datagram_bytes: default_max_datagram(),
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            destination: default_uplink_destination(),
            scope_id: 0,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
            seen_expiry_secs: default_seen_expiry(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            risk_threshold: default_risk_threshold(),
            sensor_path: default_sensor_path(),
            indicator_secs: default_indicator_secs(),
        }
    }
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            node_id: default_base_node_id(),
            listen_addr: default_listen_addr(),
            receive_timeout_secs: default_receive_timeout(),
            max_message_bytes: default_max_message_bytes(),
            alert_cooldown_secs: default_alert_cooldown(),
            region_code: default_region_code(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            endpoint: default_backend_endpoint(),
            timeout_ms: default_timeout_ms(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load and validate a node configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration with defaults for every section.
    pub fn for_node(id: impl Into<String>, role: NodeRole) -> Self {
        Self {
            node: NodeConfig {
                id: id.into(),
                role,
                location: default_location(),
            },
            broadcast: BroadcastConfig::default(),
            uplink: UplinkConfig::default(),
            mesh: MeshConfig::default(),
            sentry: SentryConfig::default(),
            base: BaseConfig::default(),
            backend: BackendConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "node.id must not be empty".to_string(),
            ));
        }
        if self.mesh.default_ttl == 0 {
            return Err(ConfigError::ValidationError(
                "mesh.default_ttl must be at least 1".to_string(),
            ));
        }
        if self.mesh.seen_expiry_secs == 0 || self.mesh.cleanup_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "mesh expiry and cleanup interval must be positive".to_string(),
            ));
        }
        if self.mesh.cleanup_interval_secs >= self.mesh.seen_expiry_secs {
            return Err(ConfigError::ValidationError(format!(
                "mesh.cleanup_interval_secs ({}) must be shorter than mesh.seen_expiry_secs ({})",
                self.mesh.cleanup_interval_secs, self.mesh.seen_expiry_secs
            )));
        }
        if !(0.0..=1.0).contains(&self.sentry.risk_threshold) {
            return Err(ConfigError::ValidationError(format!(
                "sentry.risk_threshold {} outside [0, 1]",
                self.sentry.risk_threshold
            )));
        }
        if self.base.max_message_bytes == 0 || self.broadcast.max_datagram_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "message size limits must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Uplink destination with the configured IPv6 scope applied.
    pub fn uplink_destination(&self) -> Result<SocketAddr, ConfigError> {
        let mut addr: SocketAddr = self.uplink.destination.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "uplink.destination {:?}: {}",
                self.uplink.destination, e
            ))
        })?;
        if let SocketAddr::V6(ref mut v6) = addr {
            if self.uplink.scope_id != 0 {
                v6.set_scope_id(self.uplink.scope_id);
            }
        }
        Ok(addr)
    }

    /// Address the broadcast socket binds to.
    pub fn broadcast_bind(&self) -> Result<SocketAddr, ConfigError> {
        parse_host_port(&self.broadcast.bind_addr, self.broadcast.port, "broadcast.bind_addr")
    }

    /// Destination of every broadcast datagram.
    pub fn broadcast_target(&self) -> Result<SocketAddr, ConfigError> {
        parse_host_port(&self.broadcast.address, self.broadcast.port, "broadcast.address")
    }

    pub fn base_listen(&self) -> Result<SocketAddr, ConfigError> {
        self.base.listen_addr.parse().map_err(|e| {
            ConfigError::ValidationError(format!(
                "base.listen_addr {:?}: {}",
                self.base.listen_addr, e
            ))
        })
    }

    pub fn seen_expiry(&self) -> Duration {
        Duration::from_secs(self.mesh.seen_expiry_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.mesh.cleanup_interval_secs)
    }

    pub fn uplink_timeout(&self) -> Duration {
        Duration::from_millis(self.uplink.timeout_ms)
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.base.alert_cooldown_secs)
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_secs(self.base.receive_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sentry.poll_interval_secs)
    }
}

fn parse_host_port(host: &str, port: u16, key: &str) -> Result<SocketAddr, ConfigError> {
    let ip: std::net::IpAddr = host
        .parse()
        .map_err(|e| ConfigError::ValidationError(format!("{} {:?}: {}", key, host, e)))?;
    Ok(SocketAddr::new(ip, port))
}
