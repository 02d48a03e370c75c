//! Flood Simulation - loop freedom and hop budget
//!
//! # Test Scenarios
//!
//! 1. **Full mesh**: every node hears every other; shuffled delivery orders
//! 2. **Chain**: TTL decay and route accumulation hop by hop
//! 3. **Noise**: malformed datagrams on the segment
//!
//! # Expected Outcomes
//!
//! - Each node forwards a logical message at most once
//! - A copy received with ttl 0 is delivered but never rebroadcast
//! - Routes list the origin first and every forwarding node in order

use crate::test_utils::{field_reading, init_test_logging, MeshSim, Observation};
use firemesh_mesh::{AlertPayload, BroadcastMedium, Payload};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn alert() -> Payload {
    AlertPayload::new(0.85, field_reading()).into()
}

const RELAYS: [&str; 6] = ["Relay0", "Relay1", "Relay2", "Relay3", "Relay4", "Relay5"];

#[tokio::test]
async fn test_full_mesh_forwards_once_per_node() {
    init_test_logging();

    for seed in 0..16 {
        let mut sim = MeshSim::full_mesh(&RELAYS, 8);
        let mut rng = StdRng::seed_from_u64(seed);

        let message = sim.originate("Relay0", alert(), None).await;
        let delivered = sim.run_to_quiescence(&mut rng).await;

        let n = RELAYS.len();
        assert!(sim.total_forwards() <= n, "seed {}", seed);
        // the originator drops its own echo, everyone else forwards once
        assert_eq!(sim.node("Relay0").forwards(), 0, "seed {}", seed);
        for id in &RELAYS[1..] {
            assert_eq!(sim.node(id).forwards(), 1, "seed {} node {}", seed, id);
        }
        // origination plus n-1 rebroadcasts, each heard by all n nodes
        assert_eq!(delivered, n * n, "seed {}", seed);

        for sim_node in &sim.nodes {
            for observation in &sim_node.observations {
                if let Observation::Forwarded(copy) = observation {
                    assert_eq!(copy.id, message.id);
                    assert_eq!(copy.route.first().map(String::as_str), Some("Relay0"));
                    assert_eq!(copy.route.last().map(String::as_str), Some(sim_node.node.id()));
                    assert_eq!(copy.ttl as usize, 8 - (copy.route.len() - 1));
                }
            }
        }
    }
}

#[tokio::test]
async fn test_full_mesh_with_ttl_at_node_count() {
    let mut sim = MeshSim::full_mesh(&RELAYS, RELAYS.len() as u32);
    let mut rng = StdRng::seed_from_u64(7);

    sim.originate("Relay3", alert(), None).await;
    sim.run_to_quiescence(&mut rng).await;

    assert!(sim.total_forwards() <= RELAYS.len());
    assert!(sim.nodes.iter().all(|n| n.terminals().is_empty()));
}

#[tokio::test]
async fn test_concurrent_originations_flood_independently() {
    let mut sim = MeshSim::full_mesh(&RELAYS, 8);
    let mut rng = StdRng::seed_from_u64(42);

    let a = sim.originate("Relay0", alert(), None).await;
    let b = sim.originate("Relay5", Payload::hello("node Relay5 online"), None).await;
    assert_ne!(a.id, b.id);
    sim.run_to_quiescence(&mut rng).await;

    // two logical messages, each forwarded by the five non-originators
    assert_eq!(sim.total_forwards(), 2 * (RELAYS.len() - 1));
    for sim_node in &sim.nodes {
        assert!(sim_node.forwards() <= 2);
    }
}

#[tokio::test]
async fn test_ttl_decays_along_chain() {
    init_test_logging();
    let ids = ["Sentry1", "RelayA", "RelayB", "RelayC", "RelayD"];
    let mut sim = MeshSim::chain(&ids, 8);
    let mut rng = StdRng::seed_from_u64(1);

    let message = sim.originate("Sentry1", alert(), Some(2)).await;
    sim.run_to_quiescence(&mut rng).await;

    let forwarded_by = |id: &str| -> Vec<(u32, Vec<String>)> {
        sim.node(id)
            .observations
            .iter()
            .filter_map(|o| match o {
                Observation::Forwarded(copy) => Some((copy.ttl, copy.route.clone())),
                _ => None,
            })
            .collect()
    };

    assert_eq!(
        forwarded_by("RelayA"),
        vec![(1, vec!["Sentry1".to_string(), "RelayA".to_string()])]
    );
    assert_eq!(
        forwarded_by("RelayB"),
        vec![(0, vec!["Sentry1".to_string(), "RelayA".to_string(), "RelayB".to_string()])]
    );

    // RelayC gets the ttl-0 copy: delivered, not rebroadcast
    let terminals = sim.node("RelayC").terminals();
    assert_eq!(terminals.len(), 1);
    assert_eq!(terminals[0].id, message.id);
    assert_eq!(terminals[0].ttl, 0);
    assert_eq!(terminals[0].route, vec!["Sentry1", "RelayA", "RelayB"]);
    assert_eq!(sim.node("RelayC").forwards(), 0);

    assert!(sim.node("RelayD").observations.is_empty());
    assert_eq!(sim.total_forwards(), 2);
}

#[tokio::test]
async fn test_chain_route_records_every_hop() {
    let ids = ["Sentry1", "Relay1", "Relay2", "Relay3"];
    let mut sim = MeshSim::chain(&ids, 8);
    let mut rng = StdRng::seed_from_u64(3);

    sim.originate("Sentry1", alert(), None).await;
    sim.run_to_quiescence(&mut rng).await;

    match sim.node("Relay3").observations.first() {
        Some(Observation::Forwarded(copy)) => {
            assert_eq!(copy.route, ids.to_vec());
            assert_eq!(copy.ttl, 5);
        }
        other => panic!("expected Relay3 to forward, got {:?}", other),
    }
    assert_eq!(sim.total_forwards(), 3);
}

#[tokio::test]
async fn test_malformed_datagrams_are_dropped() {
    let mut sim = MeshSim::full_mesh(&RELAYS[..3], 8);
    let mut rng = StdRng::seed_from_u64(9);

    sim.nodes[0].radio.broadcast_send(b"not json").await.unwrap();
    sim.nodes[1]
        .radio
        .broadcast_send(br#"{"src":"Relay1","ttl":3}"#)
        .await
        .unwrap();
    sim.run_to_quiescence(&mut rng).await;

    assert_eq!(sim.total_forwards(), 0);
    for sim_node in &sim.nodes {
        assert_eq!(sim_node.observations, vec![Observation::Malformed; 2]);
    }
}
