//! # qnet simulation
//!
//! Hybrid quantum/classical network simulation: nodes exchange classical
//! messages, data qubits and EPR halves over lossy delayed links, keep a
//! pool of shared entanglement per quantum link, route over the cheapest
//! path through those pools and agree on keys with a Kyber768 handshake.
//!
//! ## Architecture
//!
//! - **Config** (`config.rs`): [`SimConfig`] for every layer, JSON loadable
//! - **Node** (`node.rs`): endpoint, links, resource ledger, replenisher
//! - **Context** (`context.rs`): [`NetworkContext`], the registry of one network
//! - **Topology** (`topology.rs`): diamond, line, pair, ring and edge lists
//! - **Transfer** (`transfer.rs`): hop-by-hop or whole-route forwarding
//! - **Scenarios** (`scenarios.rs`): the demo runs behind the `qnet` binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_simulation::*;
//!
//! let context = topology::diamond()?.build(SimConfig::default())?;
//! let a = NodeId::new("A")?;
//! let b = NodeId::new("B")?;
//!
//! context.node(&NodeId::new("node_1")?)?.seed_resources(&b, 2)?;
//! let route = context.compute_route(&a, &b, RoutePolicy::WholeRoute)?;
//! assert_eq!(route.to_string(), "A -> node_1 -> B");
//!
//! let report = context
//!     .transfer(&a, &b, Bytes::from_static(&[1]), RoutePolicy::HopByHop)
//!     .await?;
//! assert!(report.delivered());
//! context.shutdown().await;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod node;
pub mod scenarios;
pub mod topology;
pub mod transfer;

pub use config::{DEFAULT_HOP_LIMIT, SimConfig};
pub use context::NetworkContext;
pub use error::{SimError, SimResult};
pub use node::{BusyGuard, EprOutcome, Node};
pub use topology::{LinkSpec, Topology};
pub use transfer::{EprReport, HopRecord, TransferReport};

pub use bytes::Bytes;
pub use qnet_core::{ChannelConfig, LinkKind, NodeId, ResourceHost};
pub use qnet_routing::{ReplenishConfig, ReplenishStats, Route, RoutePolicy};
