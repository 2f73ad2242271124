//! Error types for the simulation layer

use qnet_core::{ChannelError, IdentityError, NodeId, ResourceError, RoutingError};
use qnet_handshake::HandshakeError;
use thiserror::Error;

/// Errors that can occur while building or running a simulation
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Includes the expected "no route" outcome; see [`SimError::is_no_route`]
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Invalid node id: {0}")]
    Identity(#[from] IdentityError),

    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("Node {0} already started")]
    AlreadyStarted(NodeId),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    pub fn is_no_route(&self) -> bool {
        matches!(self, SimError::Routing(e) if e.is_no_route())
    }
}

/// Result type for simulation operations
pub type SimResult<T> = Result<T, SimError>;
