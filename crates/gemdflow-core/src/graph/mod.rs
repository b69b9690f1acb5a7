//! # Provenance Graph
//!
//! A directed graph keyed by entity uid. Edges encode ownership
//! (ingredient -> process -> material <- measurement, run -> spec ->
//! template).
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.

pub mod builder;

pub use builder::{BuiltGraph, GraphBuilder, GraphBuilderOptions, GraphDiagnostics, GraphDump, GraphScope, Layout};

use crate::primitives::MAX_TRAVERSAL_DEPTH;
use crate::types::{EntityType, NodeKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

// =============================================================================
// NODES
// =============================================================================

/// One graph node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub uid: String,
    /// `None` for separate attribute-value nodes.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    pub kind: NodeKind,
    pub label: String,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl GraphNode {
    #[must_use]
    pub fn entity(uid: impl Into<String>, entity_type: EntityType, label: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            entity_type: Some(entity_type),
            kind: entity_type.node_kind(),
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    /// A node standing for one attribute value.
    #[must_use]
    pub fn attribute(uid: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            entity_type: None,
            kind: NodeKind::Attribute,
            label: label.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn color(&self) -> &'static str {
        self.kind.color()
    }
}

// =============================================================================
// GRAPH
// =============================================================================

/// Directed graph over uids.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: BTreeMap<String, GraphNode>,
    /// Adjacency list: from -> {to}
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl Graph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. An existing node with the same uid keeps its fields and
    /// gains the new node's properties.
    pub fn insert_node(&mut self, node: GraphNode) {
        match self.nodes.get_mut(&node.uid) {
            Some(existing) => existing.properties.extend(node.properties),
            None => {
                self.nodes.insert(node.uid.clone(), node);
            }
        }
    }

    /// Insert an edge. Edges to or from unknown nodes are ignored.
    pub fn insert_edge(&mut self, from: &str, to: &str) -> bool {
        if !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return false;
        }
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string())
    }

    #[must_use]
    pub fn node(&self, uid: &str) -> Option<&GraphNode> {
        self.nodes.get(uid)
    }

    pub fn node_mut(&mut self, uid: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(uid)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    /// All edges as `(from, to)`, in order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.edges
            .iter()
            .flat_map(|(from, targets)| targets.iter().map(move |to| (from.as_str(), to.as_str())))
    }

    #[must_use]
    pub fn contains_node(&self, uid: &str) -> bool {
        self.nodes.contains_key(uid)
    }

    #[must_use]
    pub fn contains_edge(&self, from: &str, to: &str) -> bool {
        self.edges.get(from).is_some_and(|t| t.contains(to))
    }

    /// Outgoing neighbours, in order.
    #[must_use]
    pub fn neighbors(&self, uid: &str) -> Vec<&str> {
        self.edges
            .get(uid)
            .map(|t| t.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    /// Nodes with neither incoming nor outgoing edges.
    #[must_use]
    pub fn isolated_nodes(&self) -> Vec<&str> {
        let mut touched: BTreeSet<&str> = BTreeSet::new();
        for (from, to) in self.edges() {
            touched.insert(from);
            touched.insert(to);
        }
        self.nodes
            .keys()
            .map(String::as_str)
            .filter(|uid| !touched.contains(uid))
            .collect()
    }

    /// Elementary cycles, at most `limit` of them.
    ///
    /// Each cycle is reported once, starting from its smallest uid.
    #[must_use]
    pub fn simple_cycles(&self, limit: usize) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        for start in self.nodes.keys() {
            if cycles.len() >= limit {
                break;
            }
            let mut path = vec![start.as_str()];
            let mut on_path = BTreeSet::from([start.as_str()]);
            self.cycles_from(start, start, &mut path, &mut on_path, &mut cycles, limit);
        }
        cycles
    }

    fn cycles_from<'a>(
        &'a self,
        start: &'a str,
        current: &'a str,
        path: &mut Vec<&'a str>,
        on_path: &mut BTreeSet<&'a str>,
        cycles: &mut Vec<Vec<String>>,
        limit: usize,
    ) {
        for next in self.neighbors(current) {
            if cycles.len() >= limit {
                return;
            }
            if next == start {
                cycles.push(path.iter().map(|s| (*s).to_string()).collect());
            } else if next > start && !on_path.contains(next) {
                path.push(next);
                on_path.insert(next);
                self.cycles_from(start, next, path, on_path, cycles, limit);
                on_path.remove(next);
                path.pop();
            }
        }
    }

    /// The sub-graph within `depth` hops of `uid`, following edges in
    /// either direction. Depth is capped at `MAX_TRAVERSAL_DEPTH`.
    #[must_use]
    pub fn track(&self, uid: &str, depth: usize) -> Option<Graph> {
        if !self.contains_node(uid) {
            return None;
        }
        let depth = depth.min(MAX_TRAVERSAL_DEPTH);

        let mut incoming: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (from, to) in self.edges() {
            incoming.entry(to).or_default().push(from);
        }

        let mut visited: BTreeSet<&str> = BTreeSet::from([uid]);
        let mut queue = VecDeque::from([(uid, 0usize)]);
        while let Some((current, current_depth)) = queue.pop_front() {
            if current_depth >= depth {
                continue;
            }
            let forward = self.neighbors(current);
            let backward = incoming.get(current).cloned().unwrap_or_default();
            for next in forward.into_iter().chain(backward) {
                if visited.insert(next) {
                    queue.push_back((next, current_depth.saturating_add(1)));
                }
            }
        }

        let mut sub = Graph::new();
        for uid in &visited {
            if let Some(node) = self.nodes.get(*uid) {
                sub.insert_node(node.clone());
            }
        }
        for (from, to) in self.edges() {
            if visited.contains(from) && visited.contains(to) {
                sub.insert_edge(from, to);
            }
        }
        Some(sub)
    }
}

// =============================================================================
// TESTS
// =============================================================================
