//! Node identity
//!
//! Nodes are named by free-form strings ("Alice", "node_1", "A"), exactly as
//! the topology bootstrap layer declares them.

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Unique identifier of a node in the simulated network
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id, rejecting empty or whitespace-bearing names
    pub fn new(id: impl Into<String>) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::Empty);
        }
        if id.chars().any(char::is_whitespace) {
            return Err(IdentityError::InvalidFormat(id));
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a list of ids from names, skipping invalid ones
    pub fn many<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<Self> {
        names.into_iter().filter_map(|n| Self::new(n).ok()).collect()
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for NodeId {
    type Error = IdentityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
