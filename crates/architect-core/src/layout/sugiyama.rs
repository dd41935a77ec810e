//! Sugiyama layered layout (spec.md §4.7): longest-path layering, single-
//! pass barycenter crossing minimization, optional per-node layer pins.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::EngineError;
use crate::graph::Graph;
use crate::model::EdgeKind;

use super::{check_budget, compute_bounds, LayoutResult, Position};

#[derive(Debug, Clone, Default)]
pub struct SugiyamaParams {
    pub layer_gap: f64,
    pub node_gap: f64,
    /// Pin specific nodes to a fixed layer index, overriding longest-path.
    pub pinned_layers: HashMap<String, usize>,
}

impl SugiyamaParams {
    pub fn new() -> Self {
        SugiyamaParams { layer_gap: 1.0, node_gap: 1.0, pinned_layers: HashMap::new() }
    }
}

pub fn layout(graph: &Graph, node_ids: &[String], edge_kinds: &[EdgeKind], params: &SugiyamaParams) -> Result<LayoutResult, EngineError> {
    let started = Instant::now();
    let node_set: HashSet<&str> = node_ids.iter().map(|s| s.as_str()).collect();

    let mut layer: HashMap<String, usize> = node_ids.iter().map(|id| (id.clone(), 0)).collect();
    for (id, &pinned) in &params.pinned_layers {
        if node_set.contains(id.as_str()) {
            layer.insert(id.clone(), pinned);
        }
    }

    // Longest-path layering via bounded relaxation; a cap at node_ids.len()
    // rounds keeps graphs with edge-kind cycles from looping forever.
    for _ in 0..node_ids.len().max(1) {
        let mut changed = false;
        for edge in graph.all_edges() {
            if !edge_kinds.contains(&edge.kind) {
                continue;
            }
            if !node_set.contains(edge.source.as_str()) || !node_set.contains(edge.target.as_str()) {
                continue;
            }
            if params.pinned_layers.contains_key(&edge.target) {
                continue;
            }
            let src_layer = *layer.get(&edge.source).unwrap_or(&0);
            let dst_layer = *layer.get(&edge.target).unwrap_or(&0);
            if dst_layer < src_layer + 1 {
                layer.insert(edge.target.clone(), src_layer + 1);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let max_layer = layer.values().copied().max().unwrap_or(0);
    let mut layers: Vec<Vec<String>> = vec![Vec::new(); max_layer + 1];
    for id in node_ids {
        layers[layer[id]].push(id.clone());
    }

    let mut order_index: HashMap<String, f64> = HashMap::new();
    for (i, id) in layers[0].iter().enumerate() {
        order_index.insert(id.clone(), i as f64);
    }
    for l in 1..layers.len() {
        let mut scored: Vec<(String, f64)> = layers[l]
            .iter()
            .map(|id| {
                let neighbors: Vec<f64> =
                    graph.edges_to(id).filter(|e| edge_kinds.contains(&e.kind)).filter_map(|e| order_index.get(&e.source).copied()).collect();
                let score = if neighbors.is_empty() { f64::MAX } else { neighbors.iter().sum::<f64>() / neighbors.len() as f64 };
                (id.clone(), score)
            })
            .collect();
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        layers[l] = scored.into_iter().map(|(id, _)| id).collect();
        order_index.clear();
        for (i, id) in layers[l].iter().enumerate() {
            order_index.insert(id.clone(), i as f64);
        }
    }

    let mut positions = HashMap::new();
    for (l, ids) in layers.iter().enumerate() {
        for (i, id) in ids.iter().enumerate() {
            positions.insert(id.clone(), Position { x: i as f64 * params.node_gap, y: l as f64 * params.layer_gap });
        }
    }

    check_budget(started, positions.len(), "sugiyama")?;
    let bounds = compute_bounds(&positions);
    Ok(LayoutResult { positions, bounds, algorithm_name: "sugiyama".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};
    use crate::ontology::Ontology;

    #[test]
    fn layers_respect_longest_path() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        let node_ids: Vec<String> = graph.all_nodes().map(|n| n.id.clone()).collect();
        let result = layout(&graph, &node_ids, &[EdgeKind::Compose], &SugiyamaParams::new()).unwrap();
        let sys_y = result.positions["OrderSystem.SY.001"].y;
        let uc_y = result.positions["PlaceOrder.UC.001"].y;
        assert!(uc_y > sys_y);
    }

    #[test]
    fn pinned_layer_overrides_longest_path() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        let node_ids: Vec<String> = graph.all_nodes().map(|n| n.id.clone()).collect();
        let mut params = SugiyamaParams::new();
        params.pinned_layers.insert("OrderModule.MD.001".to_string(), 0);
        let result = layout(&graph, &node_ids, &[EdgeKind::Compose], &params).unwrap();
        assert_eq!(result.positions["OrderModule.MD.001"].y, 0.0);
    }
}
