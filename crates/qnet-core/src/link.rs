//! Links between neighbouring nodes

use serde::{Deserialize, Serialize};

use crate::identity::NodeId;
use crate::message::Lane;

/// Kind of a point-to-point link
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Carries classical messages only
    Classical,
    /// Carries qubits and EPR halves; every quantum link holds a resource pool
    Quantum,
}

impl LinkKind {
    /// Whether traffic on `lane` may travel over this kind of link
    pub fn carries(&self, lane: Lane) -> bool {
        match (self, lane) {
            (LinkKind::Classical, Lane::Classical) => true,
            (LinkKind::Quantum, Lane::Qubit | Lane::Epr) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkKind::Classical => write!(f, "classical"),
            LinkKind::Quantum => write!(f, "quantum"),
        }
    }
}

/// A neighbour together with the kind of link to it
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub peer: NodeId,
    pub kind: LinkKind,
}

impl Connection {
    pub fn classical(peer: NodeId) -> Self {
        Self {
            peer,
            kind: LinkKind::Classical,
        }
    }

    pub fn quantum(peer: NodeId) -> Self {
        Self {
            peer,
            kind: LinkKind::Quantum,
        }
    }

    pub fn is_quantum(&self) -> bool {
        self.kind == LinkKind::Quantum
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_compatibility() {
        assert!(LinkKind::Classical.carries(Lane::Classical));
        assert!(!LinkKind::Classical.carries(Lane::Epr));
        assert!(LinkKind::Quantum.carries(Lane::Qubit));
        assert!(LinkKind::Quantum.carries(Lane::Epr));
        assert!(!LinkKind::Quantum.carries(Lane::Classical));
    }

    #[test]
    fn test_connection_constructors() {
        let peer = NodeId::new("B").unwrap();
        assert!(Connection::quantum(peer.clone()).is_quantum());
        assert!(!Connection::classical(peer).is_quantum());
    }
}
