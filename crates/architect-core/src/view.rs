//! View Filter and Port Extractor (spec.md §4.6): project a graph into a
//! subset for layout, further subset that for rendering, resolve the
//! spec-view multi-occurrence rule, and derive ports from io edges.

use std::collections::{HashSet, VecDeque};

use serde_json::Value;

use crate::graph::Graph;
use crate::model::{EdgeKind, NodeKind, Port, PortDirection, PortSide};

/// `{includeNodeKinds, includeEdgeKinds, layoutAlgorithm, parameters}`.
#[derive(Debug, Clone)]
pub struct ViewSpec {
    pub include_node_kinds: HashSet<NodeKind>,
    pub include_edge_kinds: HashSet<EdgeKind>,
    pub layout_algorithm: String,
    pub parameters: Value,
}

/// `{showNodes, hideNodes, showEdges, hideEdges}`. `show*` wins over
/// `hide*` when both name the same id.
#[derive(Debug, Clone, Default)]
pub struct RenderLayer {
    pub show_nodes: HashSet<String>,
    pub hide_nodes: HashSet<String>,
    pub show_edges: HashSet<String>,
    pub hide_edges: HashSet<String>,
}

/// The layout-filter stage's output: retained node ids and edge composite
/// keys, in graph insertion order.
#[derive(Debug, Clone, Default)]
pub struct LayoutFiltered {
    pub node_ids: Vec<String>,
    pub edge_keys: Vec<String>,
}

/// Retain nodes of an included kind (FLOW nodes are always retained so
/// ports can still be derived even when hidden at render time) and edges
/// of an included kind whose endpoints are both retained.
pub fn layout_filter(graph: &Graph, spec: &ViewSpec) -> LayoutFiltered {
    let mut node_ids = Vec::new();
    let mut retained: HashSet<&str> = HashSet::new();
    for node in graph.all_nodes() {
        if node.kind == NodeKind::Flow || spec.include_node_kinds.contains(&node.kind) {
            node_ids.push(node.id.clone());
            retained.insert(&node.id);
        }
    }

    let edge_keys = graph
        .all_edges()
        .filter(|e| spec.include_edge_kinds.contains(&e.kind) && retained.contains(e.source.as_str()) && retained.contains(e.target.as_str()))
        .map(|e| e.composite_key())
        .collect();

    LayoutFiltered { node_ids, edge_keys }
}

/// The render-filter stage's output: visible box nodes (FLOW is never a
/// box — it becomes a port label instead) and visible edges.
#[derive(Debug, Clone, Default)]
pub struct RenderFiltered {
    pub visible_node_ids: Vec<String>,
    pub visible_edge_keys: Vec<String>,
}

pub fn render_filter(graph: &Graph, filtered: &LayoutFiltered, layer: &RenderLayer) -> RenderFiltered {
    let visible_node_ids = filtered
        .node_ids
        .iter()
        .filter(|id| {
            let is_flow = graph.node(id).map(|n| n.kind == NodeKind::Flow).unwrap_or(false);
            if is_flow && !layer.show_nodes.contains(*id) {
                return false;
            }
            layer.show_nodes.contains(*id) || !layer.hide_nodes.contains(*id)
        })
        .cloned()
        .collect();

    let visible_edge_keys =
        filtered.edge_keys.iter().filter(|key| layer.show_edges.contains(*key) || !layer.hide_edges.contains(*key)).cloned().collect();

    RenderFiltered { visible_node_ids, visible_edge_keys }
}

/// Whether a spec-view occurrence of a node is the first (expanded) one or
/// a back-reference to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occurrence {
    Primary,
    Reference { primary_parent: Option<String> },
}

/// One position a node occupies in the spec-view multi-occurrence tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecViewOccurrence {
    pub id: String,
    pub parent: Option<String>,
    pub depth: usize,
    pub occurrence: Occurrence,
}

/// BFS from `roots` following `nesting_kinds`; the first visit to a node is
/// its primary occurrence, every later visit (via a different nesting
/// parent) is a reference back to it. Already-visited ancestors on the
/// current path are skipped rather than revisited, so circular nesting
/// terminates without error.
pub fn spec_view_occurrences(graph: &Graph, roots: &[String], nesting_kinds: &[EdgeKind], max_depth: Option<usize>) -> Vec<SpecViewOccurrence> {
    let mut primary_of: std::collections::HashMap<String, Option<String>> = std::collections::HashMap::new();
    let mut out = Vec::new();
    let mut queue: VecDeque<(String, Option<String>, usize, HashSet<String>)> = VecDeque::new();

    for root in roots {
        queue.push_back((root.clone(), None, 0, HashSet::new()));
    }

    while let Some((id, parent, depth, mut ancestors)) = queue.pop_front() {
        if let Some(limit) = max_depth {
            if depth > limit {
                continue;
            }
        }
        if ancestors.contains(&id) {
            continue; // circular nesting chain: stop this branch silently
        }

        let occurrence = if let std::collections::hash_map::Entry::Vacant(e) = primary_of.entry(id.clone()) {
            e.insert(parent.clone());
            Occurrence::Primary
        } else {
            Occurrence::Reference { primary_parent: primary_of.get(&id).cloned().flatten() }
        };

        let is_primary = occurrence == Occurrence::Primary;
        out.push(SpecViewOccurrence { id: id.clone(), parent: parent.clone(), depth, occurrence });

        if is_primary {
            ancestors.insert(id.clone());
            for child in graph.children(&id, nesting_kinds) {
                queue.push_back((child, Some(id.clone()), depth + 1, ancestors.clone()));
            }
        }
    }

    out
}

/// Derive input/output ports for FUNC/ACTOR nodes by walking every io edge
/// exactly once, in graph insertion order (so multiple ports preserve the
/// order of FLOW names for a stable layout).
pub fn extract_ports(graph: &Graph) -> Vec<Port> {
    let mut ports = Vec::new();
    for edge in graph.all_edges() {
        if edge.kind != EdgeKind::Io {
            continue;
        }
        let Some(source) = graph.node(&edge.source) else { continue };
        let Some(target) = graph.node(&edge.target) else { continue };

        if source.kind == NodeKind::Flow {
            ports.push(Port { owner: target.id.clone(), direction: PortDirection::Input, label: source.name.clone(), side: PortSide::Left });
        } else if target.kind == NodeKind::Flow {
            ports.push(Port { owner: source.id.clone(), direction: PortDirection::Output, label: target.name.clone(), side: PortSide::Right });
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};
    use crate::ontology::Ontology;

    fn demo() -> Graph {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        let doc = diff::parse(DEMO_GRAPH_DIFF);
        diff::apply_to_graph(&mut graph, &ontology, &doc).unwrap();
        graph
    }

    #[test]
    fn layout_filter_always_retains_flow_nodes() {
        let graph = demo();
        let spec = ViewSpec {
            include_node_kinds: [NodeKind::Func].into_iter().collect(),
            include_edge_kinds: [EdgeKind::Io].into_iter().collect(),
            layout_algorithm: "tree".to_string(),
            parameters: Value::Null,
        };
        let filtered = layout_filter(&graph, &spec);
        assert!(filtered.node_ids.iter().any(|id| graph.node(id).unwrap().kind == NodeKind::Flow));
    }

    #[test]
    fn render_filter_never_shows_flow_as_a_box_unless_explicit() {
        let graph = demo();
        let spec = ViewSpec {
            include_node_kinds: NodeKind::ALL.into_iter().collect(),
            include_edge_kinds: EdgeKind::ALL.into_iter().collect(),
            layout_algorithm: "tree".to_string(),
            parameters: Value::Null,
        };
        let filtered = layout_filter(&graph, &spec);
        let rendered = render_filter(&graph, &filtered, &RenderLayer::default());
        assert!(!rendered.visible_node_ids.iter().any(|id| graph.node(id).unwrap().kind == NodeKind::Flow));
    }

    #[test]
    fn spec_view_second_occurrence_is_a_reference() {
        let graph = demo();
        let roots = graph.roots(&EdgeKind::NESTING);
        let occurrences = spec_view_occurrences(&graph, &roots, &EdgeKind::NESTING, None);
        let validate_cart_hits: Vec<_> = occurrences.iter().filter(|o| o.id == "ValidateCart.FN.001").collect();
        assert_eq!(validate_cart_hits.len(), 2);
        assert_eq!(validate_cart_hits[0].occurrence, Occurrence::Primary);
        assert!(matches!(validate_cart_hits[1].occurrence, Occurrence::Reference { .. }));
    }

    #[test]
    fn extract_ports_assigns_input_and_output() {
        let graph = demo();
        let ports = extract_ports(&graph);
        assert!(ports.iter().any(|p| p.owner == "ValidateCart.FN.001" && p.direction == PortDirection::Input));
        assert!(ports.iter().any(|p| p.owner == "ValidateCart.FN.001" && p.direction == PortDirection::Output));
    }
}
