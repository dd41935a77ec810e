//! Radial layout (spec.md §4.7): UC-centered by default, concentric rings
//! by BFS distance through whatever edges connect parents/actors/reqs.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use crate::error::EngineError;
use crate::graph::Graph;
use crate::model::NodeKind;

use super::{check_budget, compute_bounds, LayoutResult, Position};

#[derive(Debug, Clone, Default)]
pub struct RadialParams {
    pub center: Option<String>,
    pub ring_gap: f64,
}

impl RadialParams {
    pub fn new() -> Self {
        RadialParams { center: None, ring_gap: 1.0 }
    }
}

pub fn layout(graph: &Graph, node_ids: &[String], params: &RadialParams) -> Result<LayoutResult, EngineError> {
    let started = Instant::now();
    let node_set: HashSet<&str> = node_ids.iter().map(|s| s.as_str()).collect();

    let center = params
        .center
        .clone()
        .filter(|c| node_set.contains(c.as_str()))
        .or_else(|| node_ids.iter().find(|id| graph.node(id).map(|n| n.kind == NodeKind::Uc).unwrap_or(false)).cloned())
        .or_else(|| node_ids.first().cloned());

    let Some(center) = center else {
        return Ok(LayoutResult { positions: HashMap::new(), bounds: Default::default(), algorithm_name: "radial".to_string() });
    };

    let mut ring: HashMap<String, usize> = HashMap::new();
    ring.insert(center.clone(), 0);
    let mut queue = VecDeque::new();
    queue.push_back(center.clone());
    while let Some(id) = queue.pop_front() {
        let d = ring[&id];
        let neighbors: Vec<String> = graph.incident_edges(&id).map(|e| if e.source == id { e.target.clone() } else { e.source.clone() }).collect();
        for neighbor in neighbors {
            if node_set.contains(neighbor.as_str()) && !ring.contains_key(&neighbor) {
                ring.insert(neighbor.clone(), d + 1);
                queue.push_back(neighbor);
            }
        }
    }

    let unreached_ring = ring.values().copied().max().unwrap_or(0) + 1;
    let mut by_ring: HashMap<usize, Vec<String>> = HashMap::new();
    for id in node_ids {
        let r = *ring.get(id).unwrap_or(&unreached_ring);
        by_ring.entry(r).or_default().push(id.clone());
    }

    let mut positions = HashMap::new();
    positions.insert(center, Position { x: 0.0, y: 0.0 });
    for (r, ids) in &by_ring {
        if *r == 0 {
            continue;
        }
        let n = ids.len().max(1);
        let radius = *r as f64 * params.ring_gap;
        for (i, id) in ids.iter().enumerate() {
            let angle = 2.0 * std::f64::consts::PI * (i as f64) / (n as f64);
            positions.insert(id.clone(), Position { x: radius * angle.cos(), y: radius * angle.sin() });
        }
    }

    check_budget(started, positions.len(), "radial")?;
    let bounds = compute_bounds(&positions);
    Ok(LayoutResult { positions, bounds, algorithm_name: "radial".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};
    use crate::ontology::Ontology;

    #[test]
    fn defaults_to_uc_center() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        let node_ids: Vec<String> = graph.all_nodes().map(|n| n.id.clone()).collect();
        let result = layout(&graph, &node_ids, &RadialParams::new()).unwrap();
        assert_eq!(result.positions["PlaceOrder.UC.001"], Position { x: 0.0, y: 0.0 });
    }

    #[test]
    fn farther_nodes_get_a_larger_radius() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        let node_ids: Vec<String> = graph.all_nodes().map(|n| n.id.clone()).collect();
        let result = layout(&graph, &node_ids, &RadialParams::new()).unwrap();
        let radius = |id: &str| {
            let p = result.positions[id];
            (p.x * p.x + p.y * p.y).sqrt()
        };
        assert!(radius("PlaceOrderChain.FC.001") < radius("ValidateCart.FN.001") + 1e-9);
    }
}
