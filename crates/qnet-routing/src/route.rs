//! Route computation
//!
//! [`RouteComputer`] runs Dijkstra over a [`ResourceGraph`] snapshot. All
//! weights are positive so the first time a node is settled its distance is
//! final. Nodes are indexed in sorted id order and a distance is replaced
//! only on a strictly lower cost, which makes the choice among equal-weight
//! paths stable for a fixed snapshot.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};

use qnet_core::{NoRouteReason, NodeId, RoutingError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RoutingResult;
use crate::graph::ResourceGraph;

/// When a transfer's route is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePolicy {
    /// Compute once at the source and reuse for every hop
    #[default]
    WholeRoute,
    /// Recompute from the current hop before forwarding each segment
    HopByHop,
}

impl RoutePolicy {
    pub fn from_recompute_flag(recompute_per_hop: bool) -> Self {
        if recompute_per_hop {
            RoutePolicy::HopByHop
        } else {
            RoutePolicy::WholeRoute
        }
    }

    pub fn recompute_per_hop(&self) -> bool {
        matches!(self, RoutePolicy::HopByHop)
    }
}

impl std::fmt::Display for RoutePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutePolicy::WholeRoute => write!(f, "whole-route"),
            RoutePolicy::HopByHop => write!(f, "hop-by-hop"),
        }
    }
}

/// Ordered node ids from source to destination inclusive
///
/// Always holds at least two distinct endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route(Vec<NodeId>);

impl Route {
    /// Wrap a hop list; `None` if it has fewer than two nodes or starts
    /// where it ends
    pub fn new(hops: Vec<NodeId>) -> Option<Self> {
        match (hops.first(), hops.last()) {
            (Some(first), Some(last)) if hops.len() >= 2 && first != last => Some(Self(hops)),
            _ => None,
        }
    }

    pub fn source(&self) -> &NodeId {
        &self.0[0]
    }

    pub fn destination(&self) -> &NodeId {
        &self.0[self.0.len() - 1]
    }

    pub fn hops(&self) -> &[NodeId] {
        &self.0
    }

    /// Number of links traversed
    pub fn hop_count(&self) -> usize {
        self.0.len() - 1
    }

    /// Consecutive `(from, to)` pairs
    pub fn segments(&self) -> impl Iterator<Item = (&NodeId, &NodeId)> {
        self.0.windows(2).map(|w| (&w[0], &w[1]))
    }

    /// Node following `current`, if `current` is on the route
    pub fn next_after(&self, current: &NodeId) -> Option<&NodeId> {
        let pos = self.0.iter().position(|n| n == current)?;
        self.0.get(pos + 1)
    }

    pub fn into_hops(self) -> Vec<NodeId> {
        self.0
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.0.iter().map(NodeId::as_str).collect();
        write!(f, "{}", names.join(" -> "))
    }
}

/// Total order over path costs
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cost(f64);

impl Eq for Cost {}

impl PartialOrd for Cost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cost {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Shortest-path search over one snapshot
pub struct RouteComputer<'g> {
    graph: &'g ResourceGraph,
}

impl<'g> RouteComputer<'g> {
    pub fn new(graph: &'g ResourceGraph) -> Self {
        Self { graph }
    }

    /// Minimum-total-weight route from `source` to `destination`
    ///
    /// Returns [`RoutingError::NoRouteFound`] when the endpoints are equal,
    /// unknown, or not connected.
    pub fn shortest_path(&self, source: &NodeId, destination: &NodeId) -> RoutingResult<Route> {
        let no_route = |reason: NoRouteReason| {
            debug!(%source, %destination, %reason, "No route");
            RoutingError::NoRouteFound {
                origin: source.clone(),
                destination: destination.clone(),
                reason,
            }
        };

        if source == destination {
            return Err(no_route(NoRouteReason::SameEndpoints));
        }

        let index: BTreeMap<&NodeId, usize> =
            self.graph.nodes().enumerate().map(|(i, n)| (n, i)).collect();
        let ids: Vec<&NodeId> = self.graph.nodes().collect();

        let (Some(&start), Some(&goal)) = (index.get(source), index.get(destination)) else {
            return Err(no_route(NoRouteReason::UnknownNode));
        };

        let mut dist: Vec<Option<f64>> = vec![None; ids.len()];
        let mut prev: Vec<Option<usize>> = vec![None; ids.len()];
        let mut settled = vec![false; ids.len()];
        let mut heap = BinaryHeap::new();

        dist[start] = Some(0.0);
        heap.push(Reverse((Cost(0.0), start)));

        while let Some(Reverse((Cost(cost), node))) = heap.pop() {
            if settled[node] {
                continue;
            }
            settled[node] = true;
            if node == goal {
                break;
            }

            for edge in self.graph.edges_from(ids[node]) {
                let Some(&next) = index.get(&edge.to) else {
                    continue;
                };
                if settled[next] {
                    continue;
                }
                let candidate = cost + edge.weight;
                if dist[next].is_none_or(|d| candidate < d) {
                    dist[next] = Some(candidate);
                    prev[next] = Some(node);
                    heap.push(Reverse((Cost(candidate), next)));
                }
            }
        }

        if !settled[goal] {
            return Err(no_route(NoRouteReason::Disconnected));
        }

        let mut hops = vec![ids[goal].clone()];
        let mut cursor = goal;
        while let Some(p) = prev[cursor] {
            hops.push(ids[p].clone());
            cursor = p;
        }
        hops.reverse();

        let route = Route::new(hops).ok_or_else(|| no_route(NoRouteReason::Disconnected))?;
        debug!(
            %route,
            weight = dist[goal].unwrap_or_default(),
            "Route computed"
        );
        Ok(route)
    }

    /// First hop of the current shortest path from `current`
    pub fn next_hop(&self, current: &NodeId, destination: &NodeId) -> RoutingResult<NodeId> {
        let route = self.shortest_path(current, destination)?;
        Ok(route.hops()[1].clone())
    }
}
