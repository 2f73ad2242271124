//! Core traits for qnet
//!
//! ## Key Traits
//!
//! - [`ResourceHost`]: The view of a node that resource replenishment and
//!   graph building need, independent of how the node is simulated

use async_trait::async_trait;

use crate::identity::NodeId;
use crate::link::Connection;

/// A node that owns shared-resource pools on its quantum links
///
/// The replenisher drives [`generate_resource`](ResourceHost::generate_resource)
/// while the node is idle, and the graph builder reads
/// [`resource_count`](ResourceHost::resource_count) for every quantum link.
#[async_trait]
pub trait ResourceHost: Send + Sync {
    /// Identity of this node
    fn id(&self) -> &NodeId;

    /// True when no protocol task is actively running on this node
    fn is_idle(&self) -> bool;

    /// All neighbours with the kind of link to each
    fn connections(&self) -> Vec<Connection>;

    /// Current pool count on the quantum link to `peer` (0 if there is none)
    fn resource_count(&self, peer: &NodeId) -> u32;

    /// Try to create one shared resource with `peer`
    ///
    /// Returns true only when the resource was confirmed and the local pool
    /// was incremented.
    async fn generate_resource(&self, peer: &NodeId, await_ack: bool) -> bool;

    /// Neighbours reached over quantum links
    fn quantum_peers(&self) -> Vec<NodeId> {
        self.connections()
            .into_iter()
            .filter(Connection::is_quantum)
            .map(|c| c.peer)
            .collect()
    }
}
