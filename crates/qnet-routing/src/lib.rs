//! # qnet routing
//!
//! Resource-aware routing for hybrid quantum/classical networks.
//!
//! Every quantum link carries a pool of shared resources (entangled pairs).
//! Pools are topped up in the background while a node is idle, and routes
//! are computed over a weighted snapshot of all pools so that well-stocked
//! links are preferred.
//!
//! ## Core Components
//!
//! - [`ResourcePool`]: Cap-checked atomic counter for one link
//! - [`ResourceLedger`]: All pools owned by one node
//! - [`Replenisher`]: Idle-triggered periodic task filling pools up to the cap
//! - [`ResourceGraph`]: Directed weighted snapshot built from every node's pools
//! - [`RouteComputer`]: Deterministic Dijkstra over a snapshot
//!
//! ## Edge Weights
//!
//! An edge `(u, v)` weighs `1 / count` where `count` is `u`'s pool on the
//! link to `v`, or `1000` when the pool is empty.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_routing::{ResourceGraph, RouteComputer, RoutePolicy};
//!
//! let graph = ResourceGraph::snapshot(hosts.iter().map(|h| h.as_ref()));
//! let route = RouteComputer::new(&graph).shortest_path(&a, &b)?;
//! assert_eq!(route.source(), &a);
//! ```

pub mod error;
pub mod graph;
pub mod pool;
pub mod replenish;
pub mod route;

// Re-export main types
pub use error::{RoutingError, RoutingResult};
pub use graph::{EMPTY_POOL_WEIGHT, ResourceGraph, WeightedEdge, edge_weight};
pub use pool::{RESOURCE_CAP, ResourceLedger, ResourcePool};
pub use replenish::{MIN_POLL_INTERVAL, ReplenishConfig, ReplenishStats, Replenisher};
pub use route::{Route, RouteComputer, RoutePolicy};

// Re-export core routing types for convenience
pub use qnet_core::{NoRouteReason, ResourceError};
