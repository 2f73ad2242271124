//! Route computation properties
//!
//! Cross-checks the Dijkstra implementation against an exhaustive search
//! over simple paths, and replays the diamond scenarios through
//! [`ResourceGraph::snapshot`] built from live hosts.

use std::collections::BTreeMap;

use async_trait::async_trait;
use proptest::prelude::*;
use qnet_core::{Connection, NodeId, ResourceHost};
use qnet_routing::{ResourceGraph, ResourceLedger, RouteComputer, RoutingError};

// ============================================================================
// Helpers
// ============================================================================

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

/// Static host backed by a ledger
struct StaticHost {
    id: NodeId,
    connections: Vec<Connection>,
    ledger: ResourceLedger,
}

impl StaticHost {
    fn new(name: &str, peers: &[&str]) -> Self {
        let node = id(name);
        let ledger = ResourceLedger::new(node.clone());
        let mut connections = Vec::new();
        for peer in peers {
            connections.push(Connection::classical(id(peer)));
            connections.push(Connection::quantum(id(peer)));
            ledger.open(&id(peer));
        }
        Self {
            id: node,
            connections,
            ledger,
        }
    }
}

#[async_trait]
impl ResourceHost for StaticHost {
    fn id(&self) -> &NodeId {
        &self.id
    }

    fn is_idle(&self) -> bool {
        true
    }

    fn connections(&self) -> Vec<Connection> {
        self.connections.clone()
    }

    fn resource_count(&self, peer: &NodeId) -> u32 {
        self.ledger.count(peer)
    }

    async fn generate_resource(&self, peer: &NodeId, _await_ack: bool) -> bool {
        self.ledger.open(peer).try_increment()
    }
}

fn diamond_hosts() -> BTreeMap<&'static str, StaticHost> {
    [
        ("A", StaticHost::new("A", &["node_1", "node_2"])),
        ("node_1", StaticHost::new("node_1", &["A", "B"])),
        ("node_2", StaticHost::new("node_2", &["A", "B"])),
        ("B", StaticHost::new("B", &["node_1", "node_2"])),
    ]
    .into_iter()
    .collect()
}

/// Minimum weight over every simple path, by exhaustive DFS
fn brute_force(graph: &ResourceGraph, from: &NodeId, to: &NodeId) -> Option<f64> {
    fn walk(
        graph: &ResourceGraph,
        at: &NodeId,
        to: &NodeId,
        visited: &mut Vec<NodeId>,
        cost: f64,
        best: &mut Option<f64>,
    ) {
        if at == to {
            *best = Some(best.map_or(cost, |b| b.min(cost)));
            return;
        }
        for edge in graph.edges_from(at) {
            if visited.contains(&edge.to) {
                continue;
            }
            visited.push(edge.to.clone());
            walk(graph, &edge.to, to, visited, cost + edge.weight, best);
            visited.pop();
        }
    }

    let mut best = None;
    let mut visited = vec![from.clone()];
    walk(graph, from, to, &mut visited, 0.0, &mut best);
    best
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_scenario_empty_pools_is_deterministic() {
    let hosts = diamond_hosts();
    let graph = ResourceGraph::snapshot(hosts.values());
    assert_eq!(graph.edge_count(), 8);

    let computer = RouteComputer::new(&graph);
    let route = computer.shortest_path(&id("A"), &id("B")).unwrap();
    assert_eq!(route.hop_count(), 2);
    assert_eq!(graph.path_weight(route.hops()), Some(2000.0));
    assert_eq!(
        graph.path_weight(&[id("A"), id("node_2"), id("B")]),
        Some(2000.0)
    );

    for _ in 0..20 {
        let rebuilt = ResourceGraph::snapshot(hosts.values());
        assert_eq!(
            RouteComputer::new(&rebuilt)
                .shortest_path(&id("A"), &id("B"))
                .unwrap(),
            route
        );
    }
}

#[test]
fn test_scenario_stocked_link_wins() {
    let hosts = diamond_hosts();
    hosts["node_1"].ledger.open(&id("B")).set_count(2).unwrap();

    let graph = ResourceGraph::snapshot(hosts.values());
    let route = RouteComputer::new(&graph)
        .shortest_path(&id("A"), &id("B"))
        .unwrap();

    assert_eq!(route.hops(), &[id("A"), id("node_1"), id("B")]);
    assert_eq!(graph.path_weight(route.hops()), Some(1000.5));
    assert_eq!(
        graph.path_weight(&[id("A"), id("node_2"), id("B")]),
        Some(2000.0)
    );
}

#[test]
fn test_snapshot_ignores_later_changes() {
    let hosts = diamond_hosts();
    let graph = ResourceGraph::snapshot(hosts.values());

    hosts["node_2"].ledger.open(&id("B")).set_count(4).unwrap();
    hosts["A"].ledger.open(&id("node_2")).set_count(4).unwrap();

    assert_eq!(graph.edge(&id("node_2"), &id("B")).unwrap().resources, 0);
    let route = RouteComputer::new(&graph)
        .shortest_path(&id("A"), &id("B"))
        .unwrap();
    assert_eq!(route.hops()[1], id("node_1"));
}

#[test]
fn test_isolated_node_no_route() {
    let mut hosts = diamond_hosts();
    hosts.insert("Dean", StaticHost::new("Dean", &[]));

    let graph = ResourceGraph::snapshot(hosts.values());
    let result = RouteComputer::new(&graph).shortest_path(&id("A"), &id("Dean"));
    assert!(matches!(result, Err(RoutingError::NoRouteFound { .. })));
}

// ============================================================================
// Properties
// ============================================================================

fn arb_graph() -> impl Strategy<Value = ResourceGraph> {
    proptest::collection::vec((0usize..6, 0usize..6, 0u32..5), 0..20).prop_map(|edges| {
        let mut graph = ResourceGraph::new();
        for n in 0..6 {
            graph.add_node(id(&format!("n{n}")));
        }
        for (a, b, count) in edges {
            if a != b {
                graph.add_edge(id(&format!("n{a}")), id(&format!("n{b}")), count);
            }
        }
        graph
    })
}

proptest! {
    #[test]
    fn prop_dijkstra_matches_brute_force(graph in arb_graph(), s in 0usize..6, d in 0usize..6) {
        prop_assume!(s != d);
        let source = id(&format!("n{s}"));
        let dest = id(&format!("n{d}"));

        let expected = brute_force(&graph, &source, &dest);
        match RouteComputer::new(&graph).shortest_path(&source, &dest) {
            Ok(route) => {
                let weight = graph.path_weight(route.hops());
                prop_assert!(weight.is_some());
                let expected = expected.unwrap();
                prop_assert!((weight.unwrap() - expected).abs() < 1e-9);
                prop_assert_eq!(route.source(), &source);
                prop_assert_eq!(route.destination(), &dest);
            }
            Err(e) => {
                prop_assert!(e.is_no_route());
                prop_assert!(expected.is_none());
            }
        }
    }

    #[test]
    fn prop_route_is_stable(graph in arb_graph(), s in 0usize..6, d in 0usize..6) {
        prop_assume!(s != d);
        let source = id(&format!("n{s}"));
        let dest = id(&format!("n{d}"));
        let computer = RouteComputer::new(&graph);

        let first = computer.shortest_path(&source, &dest).ok();
        let second = computer.shortest_path(&source, &dest).ok();
        prop_assert_eq!(first, second);
    }
}
