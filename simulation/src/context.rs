//! Network context
//!
//! [`NetworkContext`] is the explicit registry of one simulation: its
//! switchboard, its nodes and its configuration. Several contexts can live
//! in one process without sharing anything.

use std::sync::Arc;

use dashmap::DashMap;
use qnet_core::{LinkKind, NodeId, Switchboard};
use qnet_handshake::{Role, SharedSecret};
use qnet_routing::{
    ReplenishStats, ResourceGraph, Route, RouteComputer, RoutePolicy, RoutingResult,
};
use tracing::{info, instrument, warn};

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::node::Node;

/// Registry and configuration of one simulated network
pub struct NetworkContext {
    config: SimConfig,
    switchboard: Switchboard,
    nodes: DashMap<NodeId, Arc<Node>>,
}

impl NetworkContext {
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            switchboard: Switchboard::new(config.channel.clone()),
            config,
            nodes: DashMap::new(),
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Register a node with its own endpoint
    pub fn add_node(&self, id: NodeId) -> SimResult<Arc<Node>> {
        let endpoint = self.switchboard.register(id.clone())?;
        let node = Arc::new(Node::new(endpoint, self.config.replenish.cap));
        self.nodes.insert(id, node.clone());
        Ok(node)
    }

    pub fn node(&self, id: &NodeId) -> SimResult<Arc<Node>> {
        self.nodes
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SimError::UnknownNode(id.clone()))
    }

    /// All node ids in sorted order
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    /// All nodes in id order
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.node_ids()
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|entry| entry.value().clone()))
            .collect()
    }

    /// Classical and quantum links between `a` and `b`, on both ends
    pub fn connect(&self, a: &NodeId, b: &NodeId) -> SimResult<()> {
        self.link(a, b, LinkKind::Classical)?;
        self.link(a, b, LinkKind::Quantum)
    }

    /// One link of `kind` between `a` and `b`, on both ends
    pub fn link(&self, a: &NodeId, b: &NodeId, kind: LinkKind) -> SimResult<()> {
        let node_a = self.node(a)?;
        let node_b = self.node(b)?;
        node_a.add_link(b.clone(), kind);
        node_b.add_link(a.clone(), kind);
        Ok(())
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Snapshot of every node's quantum-link pools
    pub fn resource_graph(&self) -> ResourceGraph {
        let nodes = self.nodes();
        ResourceGraph::snapshot(nodes.iter().map(|node| node.as_ref()))
    }

    /// Minimum-weight route over a fresh snapshot
    ///
    /// Under [`RoutePolicy::HopByHop`] this is only the route as seen from
    /// the source; transfers recompute it before every hop.
    #[instrument(skip(self), fields(%policy))]
    pub fn compute_route(
        &self,
        source: &NodeId,
        destination: &NodeId,
        policy: RoutePolicy,
    ) -> RoutingResult<Route> {
        let graph = self.resource_graph();
        match RouteComputer::new(&graph).shortest_path(source, destination) {
            Ok(route) => {
                info!(
                    %route,
                    weight = graph.path_weight(route.hops()).unwrap_or(f64::INFINITY),
                    "Route computed"
                );
                Ok(route)
            }
            Err(e) => {
                warn!(error = %e, "No route");
                Err(e)
            }
        }
    }

    // ========================================================================
    // Handshake
    // ========================================================================

    /// Run a handshake between two nodes, both sides concurrently
    ///
    /// Returns the initiator's and the responder's secrets.
    pub async fn handshake(
        &self,
        initiator: &NodeId,
        responder: &NodeId,
    ) -> SimResult<(SharedSecret, SharedSecret)> {
        let init_node = self.node(initiator)?;
        let resp_node = self.node(responder)?;
        let config = &self.config.handshake;

        // The initiator is polled first and opens its session before the key arrives
        let (init_secret, resp_secret) = tokio::join!(
            init_node.run_handshake(Role::Initiator, responder, config),
            resp_node.run_handshake(Role::Responder, initiator, config),
        );
        Ok((init_secret?, resp_secret?))
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start every node's replenisher
    pub async fn start_replenishers(&self) -> SimResult<()> {
        for node in self.nodes() {
            node.start(self.config.replenish.clone()).await?;
        }
        Ok(())
    }

    /// Stop every replenisher, keeping endpoints open
    pub async fn stop_replenishers(&self) -> ReplenishStats {
        let mut stats = ReplenishStats::default();
        for node in self.nodes() {
            stats += node.stop().await;
        }
        stats
    }

    /// Stop every node and close the switchboard
    pub async fn shutdown(&self) -> ReplenishStats {
        self.switchboard.shutdown_all();
        let mut stats = ReplenishStats::default();
        for node in self.nodes() {
            stats += node.shutdown().await;
        }
        info!(nodes = self.nodes.len(), generated = stats.generated, "Network shut down");
        stats
    }
}

impl std::fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkContext")
            .field("nodes", &self.node_ids())
            .field("policy", &self.config.policy)
            .finish()
    }
}
