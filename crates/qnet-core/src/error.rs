//! Error types for qnet

use thiserror::Error;

use crate::identity::NodeId;
use crate::message::Lane;

/// Top-level error type for qnet
#[derive(Debug, Error)]
pub enum QnetError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Errors related to node identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Node id must not be empty")]
    Empty,

    #[error("Invalid node id: {0}")]
    InvalidFormat(String),
}

/// Errors raised by the message-passing primitive
///
/// Timeouts are not errors: a missing acknowledgment is reported through
/// [`SendReceipt::ack_received`](crate::SendReceipt) and an expired receive
/// returns `None`.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Unknown peer: {0}")]
    UnknownPeer(NodeId),

    #[error("No {lane} link to peer {peer}")]
    NotConnected { peer: NodeId, lane: Lane },

    #[error("Endpoint {0} is shut down")]
    Closed(NodeId),

    #[error("Endpoint already registered: {0}")]
    AlreadyRegistered(NodeId),

    #[error("Frame codec error: {0}")]
    Codec(String),
}

/// Why no route could be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoRouteReason {
    /// Source and destination are the same node
    SameEndpoints,
    /// Source or destination is not part of the resource graph
    UnknownNode,
    /// No chain of quantum links connects the two nodes
    Disconnected,
}

impl std::fmt::Display for NoRouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoRouteReason::SameEndpoints => write!(f, "source equals destination"),
            NoRouteReason::UnknownNode => write!(f, "unknown node"),
            NoRouteReason::Disconnected => write!(f, "nodes are disconnected"),
        }
    }
}

/// Errors related to routing
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("No route from {origin} to {destination}: {reason}")]
    NoRouteFound {
        origin: NodeId,
        destination: NodeId,
        reason: NoRouteReason,
    },

    #[error("Route hop {from} -> {to} is not a live link")]
    BrokenLink { from: NodeId, to: NodeId },

    #[error("Hop limit of {0} exceeded while forwarding")]
    HopLimitExceeded(usize),
}

impl RoutingError {
    /// Whether this is the expected "no route" outcome rather than a fault
    pub fn is_no_route(&self) -> bool {
        matches!(self, RoutingError::NoRouteFound { .. })
    }
}

/// Errors related to shared-resource pools
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Invariant violation: a pool would exceed its cap.
    ///
    /// This indicates a logic error; the offending task should stop.
    #[error("Resource pool {owner}->{peer} would exceed cap {cap} (requested {requested})")]
    CapExceeded {
        owner: NodeId,
        peer: NodeId,
        cap: u32,
        requested: u32,
    },

    #[error("Link {owner}->{peer} is not a quantum link")]
    NotQuantumLink { owner: NodeId, peer: NodeId },
}

/// Result type alias for qnet operations
pub type QnetResult<T> = Result<T, QnetError>;

/// Result type alias for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;
