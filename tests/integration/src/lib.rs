//! Integration tests for the firemesh workspace
//!
//! This test suite validates:
//! - Flood termination: bounded forwarding in fully connected meshes
//! - TTL decay and route accumulation along multi-hop paths
//! - Sentry to relay to base station delivery over real TCP uplinks
//! - Base station behavior with multiple relay paths and both backends

pub mod test_utils;

#[cfg(test)]
mod flood_simulation_tests;

#[cfg(test)]
mod base_station_e2e_tests;
