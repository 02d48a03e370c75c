//! Structured logging infrastructure for firemesh nodes.
//!
//! This module provides centralized logging initialization with support
//! for structured JSON output and environment-based configuration.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the logging system with human-readable output.
///
/// `RUST_LOG` takes precedence over `default_level` when it is set.
///
/// # Example
/// ```no_run
/// use firemesh_core::logging;
///
/// logging::init("info");
/// tracing::info!("Node started");
/// ```
pub fn init(default_level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize the logging system with JSON output for log collectors.
///
/// # Example
/// ```no_run
/// use firemesh_core::logging;
///
/// logging::init_json("debug");
/// tracing::info!(role = "relay", "Node started");
/// ```
pub fn init_json(default_level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(default_level))
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .init();
}

/// Initialize logging from the `[logging]` section of a node config.
pub fn init_from_config(config: &LoggingConfig) {
    if config.json {
        init_json(&config.level);
    } else {
        init(&config.level);
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
