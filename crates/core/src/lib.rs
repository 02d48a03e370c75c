//! Core functionality shared by every firemesh node.
//!
//! Provides node configuration, logging bootstrap and the small set of
//! helpers the mesh and base-station crates have in common.

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::{
    BackendConfig, BackendKind, BaseConfig, BroadcastConfig, Config, GeoPoint, LoggingConfig,
    MeshConfig, NodeConfig, NodeRole, SentryConfig, UplinkConfig,
};
pub use error::ConfigError;
