//! Routing error types
//!
//! Re-exports the core routing errors so callers of this crate need not
//! depend on `qnet-core` directly.

pub use qnet_core::RoutingError;

/// Result type for routing operations
pub type RoutingResult<T> = Result<T, RoutingError>;
