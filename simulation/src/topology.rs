//! Network topologies
//!
//! A [`Topology`] is a plain description of nodes and links. Building it
//! into a [`NetworkContext`] registers every node and adds the links on
//! both ends. Provides the classic demo layouts:
//! - Diamond: A to B over node_1 or node_2
//! - Line: a chain of named nodes
//! - Pair: two directly linked nodes
//! - Ring: `n` nodes in a cycle

use std::collections::{BTreeMap, BTreeSet};

use qnet_core::{LinkKind, NodeId};

use crate::config::SimConfig;
use crate::context::NetworkContext;
use crate::error::SimResult;

/// How two nodes are joined
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LinkSpec {
    /// Both a classical and a quantum link
    Full,
    /// A single link of one kind
    Only(LinkKind),
}

impl LinkSpec {
    fn kinds(&self) -> Vec<LinkKind> {
        match self {
            LinkSpec::Full => vec![LinkKind::Classical, LinkKind::Quantum],
            LinkSpec::Only(kind) => vec![*kind],
        }
    }
}

/// Node and link description of a network
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    nodes: BTreeSet<NodeId>,
    /// Undirected links keyed by the (smaller, larger) id pair
    links: BTreeMap<(NodeId, NodeId), LinkSpec>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: NodeId) {
        self.nodes.insert(id);
    }

    /// Join `a` and `b` with classical and quantum links
    pub fn connect(&mut self, a: NodeId, b: NodeId) {
        self.link(a, b, LinkSpec::Full);
    }

    /// Join `a` and `b` with `spec`, replacing any earlier link; self-loops are ignored
    pub fn link(&mut self, a: NodeId, b: NodeId, spec: LinkSpec) {
        if a == b {
            return;
        }
        self.nodes.insert(a.clone());
        self.nodes.insert(b.clone());
        let key = if a < b { (a, b) } else { (b, a) };
        self.links.insert(key, spec);
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn neighbors(&self, id: &NodeId) -> BTreeSet<NodeId> {
        self.links
            .keys()
            .filter_map(|(a, b)| {
                if a == id {
                    Some(b.clone())
                } else if b == id {
                    Some(a.clone())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn are_connected(&self, a: &NodeId, b: &NodeId) -> bool {
        let key = if a < b {
            (a.clone(), b.clone())
        } else {
            (b.clone(), a.clone())
        };
        self.links.contains_key(&key)
    }

    /// Register every node and link in a new context
    pub fn build(&self, config: SimConfig) -> SimResult<NetworkContext> {
        let context = NetworkContext::new(config)?;
        for id in &self.nodes {
            context.add_node(id.clone())?;
        }
        for ((a, b), spec) in &self.links {
            for kind in spec.kinds() {
                context.link(a, b, kind)?;
            }
        }
        Ok(context)
    }

    /// Simple ASCII rendering
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Network Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Links: {}\n\n", self.link_count()));

        for id in &self.nodes {
            let neighbors: Vec<String> = self
                .neighbors(id)
                .iter()
                .map(|n| {
                    let key = if id < n {
                        (id.clone(), n.clone())
                    } else {
                        (n.clone(), id.clone())
                    };
                    match self.links.get(&key) {
                        Some(LinkSpec::Only(LinkKind::Classical)) => format!("{n} (c)"),
                        Some(LinkSpec::Only(LinkKind::Quantum)) => format!("{n} (q)"),
                        _ => n.to_string(),
                    }
                })
                .collect();
            output.push_str(&format!("  {} -> [{}]\n", id, neighbors.join(", ")));
        }
        output
    }
}

/// Diamond: A–node_1, A–node_2, node_1–B, node_2–B
pub fn diamond() -> SimResult<Topology> {
    from_edges(&[("A", "node_1"), ("A", "node_2"), ("node_1", "B"), ("node_2", "B")])
}

/// Chain of nodes in the given order
pub fn line(names: &[&str]) -> SimResult<Topology> {
    let ids = names
        .iter()
        .map(|name| NodeId::new(*name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut topology = Topology::new();
    for id in &ids {
        topology.add_node(id.clone());
    }
    for pair in ids.windows(2) {
        topology.connect(pair[0].clone(), pair[1].clone());
    }
    Ok(topology)
}

/// Two directly linked nodes
pub fn pair(a: &str, b: &str) -> SimResult<Topology> {
    line(&[a, b])
}

/// `count` nodes `node_0 .. node_{count-1}` in a cycle
pub fn ring(count: usize) -> SimResult<Topology> {
    let names: Vec<String> = (0..count).map(|i| format!("node_{i}")).collect();
    let mut topology = Topology::new();
    for i in 0..count {
        let a = NodeId::new(names[i].as_str())?;
        topology.add_node(a.clone());
        if count > 1 {
            let b = NodeId::new(names[(i + 1) % count].as_str())?;
            topology.connect(a, b);
        }
    }
    Ok(topology)
}

/// Full links from an edge list
pub fn from_edges(edges: &[(&str, &str)]) -> SimResult<Topology> {
    let mut topology = Topology::new();
    for (a, b) in edges {
        topology.connect(NodeId::new(*a)?, NodeId::new(*b)?);
    }
    Ok(topology)
}
