//! Node context injection for multi-node logging
//!
//! All nodes of a simulation share one process, so log lines need the
//! emitting node attached. A [`NodeContextGuard`] sets the node identity for
//! the current thread; spans created while it is active carry that identity
//! (see [`crate::layers::NodeContextLayer`]) wherever their futures later run.

use std::cell::RefCell;

use qnet_core::NodeId;
use uuid::Uuid;

/// Node context data stored in thread-local storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeContextData {
    /// The node's identity
    pub node_id: String,
    /// Unique instance ID for this node in this run
    pub instance_id: Uuid,
}

thread_local! {
    static NODE_CONTEXT: RefCell<Option<NodeContextData>> = const { RefCell::new(None) };
}

/// RAII guard for node context
///
/// Sets the node context for the current thread and restores the previous
/// context (if any) on drop.
///
/// # Example
///
/// ```ignore
/// use qnet_logging::NodeContextGuard;
///
/// let span = {
///     let _guard = NodeContextGuard::new(node.id());
///     tracing::info_span!("replenisher", node = %node.id())
/// };
/// tokio::spawn(task.instrument(span));
/// ```
pub struct NodeContextGuard {
    previous: Option<NodeContextData>,
}

impl NodeContextGuard {
    pub fn new(node: &NodeId) -> Self {
        Self::with_instance_id(node, Uuid::new_v4())
    }

    /// Create a guard with a specific instance ID
    ///
    /// Nodes keep one instance id for their lifetime, so every span they open
    /// can be grouped together.
    pub fn with_instance_id(node: &NodeId, instance_id: Uuid) -> Self {
        let previous = NODE_CONTEXT.with(|ctx| ctx.borrow().clone());

        let new_ctx = NodeContextData {
            node_id: node.to_string(),
            instance_id,
        };
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = Some(new_ctx));

        Self { previous }
    }

    /// Get the current node context (if any)
    pub fn current() -> Option<NodeContextData> {
        NODE_CONTEXT.with(|ctx| ctx.borrow().clone())
    }

    pub fn current_node_id() -> Option<String> {
        Self::current().map(|ctx| ctx.node_id)
    }

    pub fn current_instance_id() -> Option<Uuid> {
        Self::current().map(|ctx| ctx.instance_id)
    }
}

impl Drop for NodeContextGuard {
    fn drop(&mut self) {
        NODE_CONTEXT.with(|ctx| *ctx.borrow_mut() = self.previous.take());
    }
}

/// Run a block with the node context set
///
/// # Example
///
/// ```ignore
/// with_node_context!(node.id(), {
///     tracing::info!("Route computed");
/// });
/// ```
#[macro_export]
macro_rules! with_node_context {
    ($node:expr, $body:block) => {{
        let _guard = $crate::context::NodeContextGuard::new($node);
        $body
    }};
}
