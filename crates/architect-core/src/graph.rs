//! Graph Store (spec.md §4.3): in-memory mapping of semantic ID → node and
//! composite key → edge, versioned, backed by `petgraph::StableDiGraph`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::{Edge, EdgeKind, Node, NodeAttributes};
use crate::ontology::Ontology;
use crate::semantic_id;

/// Fields of a node that may be changed after creation. The semantic id and
/// kind are immutable (spec.md §4.3 `updateNode`).
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub attributes: Option<NodeAttributes>,
}

/// The graph store. Owns nodes and edges exclusively; views borrow
/// read-only projections (spec.md §5).
#[derive(Debug, Clone)]
pub struct Graph {
    inner: StableDiGraph<Node, Edge>,
    node_index: HashMap<String, NodeIndex>,
    edge_index: HashMap<String, EdgeIndex>,
    pub workspace_id: String,
    pub system_id: String,
    version: u64,
    last_saved_version: u64,
    last_modified: DateTime<Utc>,
    dirty_nodes: HashSet<String>,
    dirty_edges: HashSet<String>,
}

/// Cheap serializable summary used by persistence and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub version: u64,
}

impl Graph {
    pub fn new(workspace_id: impl Into<String>, system_id: impl Into<String>) -> Self {
        Graph {
            inner: StableDiGraph::new(),
            node_index: HashMap::new(),
            edge_index: HashMap::new(),
            workspace_id: workspace_id.into(),
            system_id: system_id.into(),
            version: 0,
            last_saved_version: 0,
            last_modified: Utc::now(),
            dirty_nodes: HashSet::new(),
            dirty_edges: HashSet::new(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_saved_version(&self) -> u64 {
        self.last_saved_version
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            version: self.version,
        }
    }

    fn touch(&mut self, dirty_node: Option<&str>, dirty_edge: Option<&str>) {
        self.version += 1;
        self.last_modified = Utc::now();
        if let Some(id) = dirty_node {
            self.dirty_nodes.insert(id.to_string());
        }
        if let Some(key) = dirty_edge {
            self.dirty_edges.insert(key.to_string());
        }
    }

    /// Mark the current version as persisted and clear the dirty sets
    /// (called by the persistence collaborator after a successful save).
    pub fn mark_saved(&mut self) {
        self.last_saved_version = self.version;
        self.dirty_nodes.clear();
        self.dirty_edges.clear();
    }

    pub fn dirty_nodes(&self) -> impl Iterator<Item = &Node> {
        self.dirty_nodes.iter().filter_map(move |id| self.node(id))
    }

    pub fn dirty_edges(&self) -> impl Iterator<Item = &Edge> {
        self.dirty_edges
            .iter()
            .filter_map(move |key| self.edge_index.get(key))
            .filter_map(move |idx| self.inner.edge_weight(*idx))
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Add a node. Fails with `DuplicateId` if present, or if the id's
    /// abbreviation disagrees with `node.kind` (spec.md invariant 1).
    pub fn add_node(&mut self, node: Node) -> Result<(), EngineError> {
        if self.node_index.contains_key(&node.id) {
            return Err(EngineError::DuplicateId { id: node.id.clone() });
        }
        let extracted = semantic_id::extract(&node.id)?;
        if extracted.kind != node.kind {
            return Err(EngineError::MalformedSemanticId {
                id: node.id.clone(),
                reason: format!("id implies kind `{}` but node.kind is `{}`", extracted.kind, node.kind),
            });
        }
        if extracted.name != node.name {
            return Err(EngineError::MalformedSemanticId {
                id: node.id.clone(),
                reason: format!("id prefix `{}` does not match node name `{}`", extracted.name, node.name),
            });
        }
        let id = node.id.clone();
        let idx = self.inner.add_node(node);
        self.node_index.insert(id.clone(), idx);
        self.touch(Some(&id), None);
        Ok(())
    }

    /// Remove a node, cascading to every incident edge.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let idx = self.node_index.remove(id)?;
        let incident: Vec<String> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.inner.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().composite_key())
            .collect();
        for key in incident {
            self.edge_index.remove(&key);
        }
        let node = self.inner.remove_node(idx);
        self.touch(Some(id), None);
        node
    }

    /// Replace named fields on an existing node. The semantic id and kind
    /// are immutable.
    pub fn update_node(&mut self, id: &str, update: NodeUpdate) -> Result<(), EngineError> {
        let idx = *self.node_index.get(id).ok_or_else(|| EngineError::MalformedSemanticId {
            id: id.to_string(),
            reason: "node does not exist".to_string(),
        })?;
        let node = self.inner.node_weight_mut(idx).expect("index tracked in node_index");
        if let Some(name) = update.name {
            node.name = name;
        }
        if let Some(description) = update.description {
            node.description = description;
        }
        if let Some(attributes) = update.attributes {
            node.attributes = attributes;
        }
        node.updated_at = Utc::now();
        self.touch(Some(id), None);
        Ok(())
    }

    /// Add an edge. Fails with `DuplicateEdge`, `DanglingEdge`,
    /// `InvalidConnection`, or `CircularCompose`.
    pub fn add_edge(&mut self, edge: Edge, ontology: &Ontology) -> Result<(), EngineError> {
        let key = edge.composite_key();
        if self.edge_index.contains_key(&key) {
            return Err(EngineError::DuplicateEdge {
                source_id: edge.source.clone(),
                kind: edge.kind.wire_name().to_string(),
                target: edge.target.clone(),
            });
        }
        let source_idx = *self.node_index.get(&edge.source).ok_or_else(|| EngineError::DanglingEdge {
            source_id: edge.source.clone(),
            kind: edge.kind.wire_name().to_string(),
            target: edge.target.clone(),
        })?;
        let target_idx = *self.node_index.get(&edge.target).ok_or_else(|| EngineError::DanglingEdge {
            source_id: edge.source.clone(),
            kind: edge.kind.wire_name().to_string(),
            target: edge.target.clone(),
        })?;

        let source_kind = self.inner[source_idx].kind;
        let target_kind = self.inner[target_idx].kind;
        if !ontology.valid_connection(source_kind, edge.kind, target_kind) {
            return Err(EngineError::InvalidConnection {
                kind: edge.kind.wire_name().to_string(),
                source_kind: source_kind.to_string(),
                target_kind: target_kind.to_string(),
            });
        }

        if edge.kind == EdgeKind::Compose && self.would_create_compose_cycle(&edge.source, &edge.target) {
            return Err(EngineError::CircularCompose {
                source_id: edge.source.clone(),
                target: edge.target.clone(),
            });
        }

        let idx = self.inner.add_edge(source_idx, target_idx, edge);
        self.edge_index.insert(key.clone(), idx);
        self.touch(None, Some(&key));
        Ok(())
    }

    /// No-op if the edge is absent; returns whether anything was removed.
    pub fn remove_edge(&mut self, source: &str, kind: EdgeKind, target: &str) -> bool {
        let key = crate::model::composite_key(source, kind, target);
        match self.edge_index.remove(&key) {
            Some(idx) => {
                self.inner.remove_edge(idx);
                self.touch(None, Some(&key));
                true
            }
            None => false,
        }
    }

    /// True if adding a compose edge `source -> target` would create a
    /// cycle in the compose-only subgraph, i.e. `target` can already reach
    /// `source` by following compose edges forward.
    fn would_create_compose_cycle(&self, source: &str, target: &str) -> bool {
        if source == target {
            return true;
        }
        let Some(&target_idx) = self.node_index.get(target) else {
            return false;
        };
        let Some(&source_idx) = self.node_index.get(source) else {
            return false;
        };
        let mut stack = vec![target_idx];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == source_idx {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge_ref in self.inner.edges_directed(current, Direction::Outgoing) {
                if edge_ref.weight().kind == EdgeKind::Compose {
                    stack.push(edge_ref.target());
                }
            }
        }
        false
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn edge(&self, source: &str, kind: EdgeKind, target: &str) -> Option<&Edge> {
        let key = crate::model::composite_key(source, kind, target);
        self.edge_index.get(&key).and_then(|&idx| self.inner.edge_weight(idx))
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// All nodes in stable insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner.node_indices().filter_map(move |idx| self.inner.node_weight(idx))
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.inner.edge_indices().filter_map(move |idx| self.inner.edge_weight(idx))
    }

    pub fn edges_from(&self, source: &str) -> impl Iterator<Item = &Edge> {
        let idx = self.node_index.get(source).copied();
        idx.into_iter()
            .flat_map(move |idx| self.inner.edges_directed(idx, Direction::Outgoing))
            .map(|edge_ref| edge_ref.weight())
    }

    pub fn edges_to(&self, target: &str) -> impl Iterator<Item = &Edge> {
        let idx = self.node_index.get(target).copied();
        idx.into_iter()
            .flat_map(move |idx| self.inner.edges_directed(idx, Direction::Incoming))
            .map(|edge_ref| edge_ref.weight())
    }

    pub fn incident_edges(&self, id: &str) -> impl Iterator<Item = &Edge> {
        self.edges_from(id).chain(self.edges_to(id))
    }

    pub fn nodes_of_kind(&self, kind: crate::model::NodeKind) -> impl Iterator<Item = &Node> {
        self.all_nodes().filter(move |n| n.kind == kind)
    }

    /// Direct children of `id` following any edge kind in `nesting_kinds`.
    pub fn children(&self, id: &str, nesting_kinds: &[EdgeKind]) -> Vec<String> {
        self.edges_from(id).filter(|e| nesting_kinds.contains(&e.kind)).map(|e| e.target.clone()).collect()
    }

    /// Direct parents of `id` following any edge kind in `nesting_kinds`.
    pub fn parents(&self, id: &str, nesting_kinds: &[EdgeKind]) -> Vec<String> {
        self.edges_to(id).filter(|e| nesting_kinds.contains(&e.kind)).map(|e| e.source.clone()).collect()
    }

    /// Nodes with no incoming edge of any kind in `nesting_kinds`.
    pub fn roots(&self, nesting_kinds: &[EdgeKind]) -> Vec<String> {
        self.all_nodes()
            .filter(|n| self.parents(&n.id, nesting_kinds).is_empty())
            .map(|n| n.id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DEFAULT_ONTOLOGY_JSON;
    use crate::model::NodeKind;

    fn ontology() -> Ontology {
        Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap()
    }

    fn node(id: &str, kind: NodeKind, name: &str) -> Node {
        Node::new(id.to_string(), kind, name.to_string(), "desc".to_string(), "ws".to_string(), "sys".to_string())
    }

    #[test]
    fn add_node_rejects_kind_mismatch() {
        let mut g = Graph::new("ws", "sys");
        let bad = node("Thing.UC.001", NodeKind::Func, "Thing");
        assert!(g.add_node(bad).is_err());
    }

    #[test]
    fn add_node_rejects_duplicate() {
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("Thing.UC.001", NodeKind::Uc, "Thing")).unwrap();
        assert!(g.add_node(node("Thing.UC.001", NodeKind::Uc, "Thing")).is_err());
    }

    #[test]
    fn remove_node_cascades_edges() {
        let ont = ontology();
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("App.SY.001", NodeKind::Sys, "App")).unwrap();
        g.add_node(node("Order.UC.001", NodeKind::Uc, "Order")).unwrap();
        g.add_edge(Edge::new("App.SY.001".into(), EdgeKind::Compose, "Order.UC.001".into(), "ws".into(), "sys".into()), &ont)
            .unwrap();
        g.remove_node("App.SY.001");
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn add_edge_rejects_dangling_and_duplicate() {
        let ont = ontology();
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("App.SY.001", NodeKind::Sys, "App")).unwrap();
        let e = Edge::new("App.SY.001".into(), EdgeKind::Compose, "Missing.UC.001".into(), "ws".into(), "sys".into());
        assert!(matches!(g.add_edge(e, &ont), Err(EngineError::DanglingEdge { .. })));

        g.add_node(node("Order.UC.001", NodeKind::Uc, "Order")).unwrap();
        let e = Edge::new("App.SY.001".into(), EdgeKind::Compose, "Order.UC.001".into(), "ws".into(), "sys".into());
        g.add_edge(e.clone(), &ont).unwrap();
        assert!(matches!(g.add_edge(e, &ont), Err(EngineError::DuplicateEdge { .. })));
    }

    #[test]
    fn add_edge_rejects_circular_compose() {
        let ont = ontology();
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("A.MD.001", NodeKind::Mod, "A")).unwrap();
        g.add_node(node("B.MD.002", NodeKind::Mod, "B")).unwrap();
        g.add_edge(Edge::new("A.MD.001".into(), EdgeKind::Compose, "B.MD.002".into(), "ws".into(), "sys".into()), &ont).unwrap();
        let back = Edge::new("B.MD.002".into(), EdgeKind::Compose, "A.MD.001".into(), "ws".into(), "sys".into());
        assert!(matches!(g.add_edge(back, &ont), Err(EngineError::CircularCompose { .. })));
    }

    #[test]
    fn version_increments_per_mutation() {
        let ont = ontology();
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("App.SY.001", NodeKind::Sys, "App")).unwrap();
        g.add_node(node("Order.UC.001", NodeKind::Uc, "Order")).unwrap();
        g.add_edge(Edge::new("App.SY.001".into(), EdgeKind::Compose, "Order.UC.001".into(), "ws".into(), "sys".into()), &ont)
            .unwrap();
        assert_eq!(g.version(), 3);
    }

    #[test]
    fn roots_have_no_incoming_nesting_edge() {
        let ont = ontology();
        let mut g = Graph::new("ws", "sys");
        g.add_node(node("App.SY.001", NodeKind::Sys, "App")).unwrap();
        g.add_node(node("Order.UC.001", NodeKind::Uc, "Order")).unwrap();
        g.add_edge(Edge::new("App.SY.001".into(), EdgeKind::Compose, "Order.UC.001".into(), "ws".into(), "sys".into()), &ont)
            .unwrap();
        let roots = g.roots(&EdgeKind::NESTING);
        assert_eq!(roots, vec!["App.SY.001".to_string()]);
    }
}
