//! Weighted resource graph
//!
//! A [`ResourceGraph`] is rebuilt from scratch for every route computation.
//! Pool counts are read once while the snapshot is taken and never again,
//! so a computation always sees one consistent view.

use std::collections::BTreeMap;

use qnet_core::{NodeId, ResourceHost};
use tracing::trace;

/// Weight of an edge whose pool is empty
pub const EMPTY_POOL_WEIGHT: f64 = 1000.0;

/// Edge weight for a pool holding `count` resources
///
/// Always strictly positive.
pub fn edge_weight(count: u32) -> f64 {
    if count == 0 {
        EMPTY_POOL_WEIGHT
    } else {
        1.0 / f64::from(count)
    }
}

/// A directed edge of the snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub weight: f64,
    /// Pool count the weight was derived from
    pub resources: u32,
}

/// Directed weighted graph over quantum links
///
/// Adjacency lists are kept sorted by target id so iteration order, and
/// therefore tie-breaking in route computation, is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    adjacency: BTreeMap<NodeId, Vec<WeightedEdge>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from every host's quantum links
    pub fn snapshot<'a, H>(hosts: impl IntoIterator<Item = &'a H>) -> Self
    where
        H: ResourceHost + ?Sized + 'a,
    {
        let mut graph = Self::new();
        for host in hosts {
            graph.add_node(host.id().clone());
            for peer in host.quantum_peers() {
                let count = host.resource_count(&peer);
                graph.add_edge(host.id().clone(), peer, count);
            }
        }
        trace!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Resource graph snapshot"
        );
        graph
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.adjacency.entry(id).or_default();
    }

    /// Insert or replace the edge `from -> to` for a pool of `resources`
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, resources: u32) {
        self.add_node(to.clone());
        let edges = self.adjacency.entry(from.clone()).or_default();
        let edge = WeightedEdge {
            weight: edge_weight(resources),
            from,
            to,
            resources,
        };
        match edges.binary_search_by(|e| e.to.cmp(&edge.to)) {
            Ok(pos) => edges[pos] = edge,
            Err(pos) => edges.insert(pos, edge),
        }
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.adjacency.contains_key(id)
    }

    /// Node ids in sorted order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.adjacency.keys()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Outgoing edges of `id`, sorted by target
    pub fn edges_from(&self, id: &NodeId) -> &[WeightedEdge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge(&self, from: &NodeId, to: &NodeId) -> Option<&WeightedEdge> {
        self.edges_from(from).iter().find(|e| &e.to == to)
    }

    /// Total weight of a path, or `None` if some hop has no edge
    pub fn path_weight(&self, path: &[NodeId]) -> Option<f64> {
        path.windows(2)
            .map(|hop| self.edge(&hop[0], &hop[1]).map(|e| e.weight))
            .sum()
    }
}
