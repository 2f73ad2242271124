//! # qnet core
//!
//! Core types, traits and the message-passing primitive shared by every
//! layer of the qnet hybrid quantum/classical network simulator.
//!
//! Routing, resource replenishment and the post-quantum handshake all talk
//! to other nodes exclusively through a [`ChannelEndpoint`]: asynchronous
//! point-to-point messages with optional acknowledgment and bounded waits.
//!
//! ## Key Types
//!
//! - [`NodeId`]: Unique string identity of a node
//! - [`Connection`] / [`LinkKind`]: Neighbour links (classical or quantum)
//! - [`Message`]: Opaque byte payload tagged with a [`MessageKind`] and [`Lane`]
//! - [`Switchboard`]: In-memory fabric connecting all endpoints of one simulation
//! - [`ChannelEndpoint`]: Per-node send/receive handle
//!
//! ## Key Traits
//!
//! - [`ResourceHost`]: What the routing layer needs to know about a node

pub mod channel;
pub mod error;
pub mod identity;
pub mod link;
pub mod message;
pub mod switchboard;
pub mod traits;

// Re-export main types
pub use channel::*;
pub use error::*;
pub use identity::*;
pub use link::*;
pub use message::*;
pub use switchboard::*;
pub use traits::*;
