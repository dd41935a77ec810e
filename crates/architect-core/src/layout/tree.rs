//! Reingold–Tilford tree layout (spec.md §4.7): two-pass, parents centered
//! over children, equal sibling spacing, forests placed side by side.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::EngineError;
use crate::graph::Graph;
use crate::model::EdgeKind;

use super::{check_budget, compute_bounds, LayoutResult, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    TopDown,
    LeftRight,
    BottomUp,
    RightLeft,
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub orientation: Orientation,
    pub sibling_gap: f64,
    pub level_gap: f64,
    pub forest_gap: f64,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams { orientation: Orientation::TopDown, sibling_gap: 1.0, level_gap: 1.0, forest_gap: 2.0 }
    }
}

/// Lay out the forest rooted at `roots`, following `nesting_kinds` as the
/// parent-child relation.
pub fn layout(graph: &Graph, roots: &[String], nesting_kinds: &[EdgeKind], params: &TreeParams) -> Result<LayoutResult, EngineError> {
    let started = Instant::now();
    let mut positions: HashMap<String, Position> = HashMap::new();
    let mut next_leaf = 0.0f64;

    for (i, root) in roots.iter().enumerate() {
        if i > 0 {
            next_leaf += params.forest_gap;
        }
        let mut ancestors = HashSet::new();
        assign(graph, root, 0, nesting_kinds, params, &mut next_leaf, &mut positions, &mut ancestors);
    }

    check_budget(started, positions.len(), "reingold-tilford")?;

    let reoriented: HashMap<String, Position> = positions
        .into_iter()
        .map(|(id, p)| {
            let oriented = match params.orientation {
                Orientation::TopDown => p,
                Orientation::BottomUp => Position { x: p.x, y: -p.y },
                Orientation::LeftRight => Position { x: p.y, y: p.x },
                Orientation::RightLeft => Position { x: -p.y, y: p.x },
            };
            (id, oriented)
        })
        .collect();

    let bounds = compute_bounds(&reoriented);
    Ok(LayoutResult { positions: reoriented, bounds, algorithm_name: "reingold-tilford".to_string() })
}

/// Post-order assignment: leaves get the next slot along the sibling axis;
/// internal nodes center over the mean of their children. Returns this
/// node's assigned x so the caller (its parent) can average over it.
/// `ancestors` tracks the current root-to-node path; a nesting cycle (valid
/// per the graph's invariants — only compose-only cycles are rejected)
/// revisits an ancestor, which is treated as a leaf instead of recursed into.
#[allow(clippy::too_many_arguments)]
fn assign(
    graph: &Graph,
    id: &str,
    depth: usize,
    nesting_kinds: &[EdgeKind],
    params: &TreeParams,
    next_leaf: &mut f64,
    positions: &mut HashMap<String, Position>,
    ancestors: &mut HashSet<String>,
) -> f64 {
    let children = if ancestors.contains(id) { Vec::new() } else { graph.children(id, nesting_kinds) };
    let x = if children.is_empty() {
        let x = *next_leaf;
        *next_leaf += params.sibling_gap;
        x
    } else {
        ancestors.insert(id.to_string());
        let xs: Vec<f64> = children.iter().map(|c| assign(graph, c, depth + 1, nesting_kinds, params, next_leaf, positions, ancestors)).collect();
        ancestors.remove(id);
        xs.iter().sum::<f64>() / xs.len() as f64
    };
    positions.insert(id.to_string(), Position { x, y: depth as f64 * params.level_gap });
    x
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};
    use crate::ontology::Ontology;

    #[test]
    fn centers_parent_over_children() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();

        let roots = graph.roots(&EdgeKind::NESTING);
        let result = layout(&graph, &roots, &EdgeKind::NESTING, &TreeParams::default()).unwrap();

        let children = graph.children(&roots[0], &EdgeKind::NESTING);
        let parent_x = result.positions[&roots[0]].x;
        let child_mean: f64 = children.iter().map(|c| result.positions[c].x).sum::<f64>() / children.len() as f64;
        assert!((parent_x - child_mean).abs() < 1e-9);
    }

    #[test]
    fn forest_places_roots_side_by_side() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        graph.add_node(crate::model::Node::new("Lonely.MD.999".into(), crate::model::NodeKind::Mod, "Lonely".into(), "".into(), "ws".into(), "sys".into())).unwrap();

        let roots = graph.roots(&EdgeKind::NESTING);
        assert!(roots.len() >= 2);
        let result = layout(&graph, &roots, &EdgeKind::NESTING, &TreeParams::default()).unwrap();
        let xs: Vec<f64> = roots.iter().map(|r| result.positions[r].x).collect();
        assert_ne!(xs[0], xs[1]);
    }

    #[test]
    fn a_nesting_cycle_terminates_instead_of_overflowing_the_stack() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        graph.add_node(crate::model::Node::new("App.SY.001".into(), crate::model::NodeKind::Sys, "App".into(), "".into(), "ws".into(), "sys".into())).unwrap();
        graph.add_node(crate::model::Node::new("OrderModule.MD.001".into(), crate::model::NodeKind::Mod, "OrderModule".into(), "".into(), "ws".into(), "sys".into())).unwrap();
        graph.add_node(crate::model::Node::new("F.FN.001".into(), crate::model::NodeKind::Func, "F".into(), "".into(), "ws".into(), "sys".into())).unwrap();
        graph.add_edge(crate::model::Edge::new("App.SY.001".into(), EdgeKind::Compose, "OrderModule.MD.001".into(), "ws".into(), "sys".into()), &ontology).unwrap();
        graph.add_edge(crate::model::Edge::new("OrderModule.MD.001".into(), EdgeKind::Compose, "F.FN.001".into(), "ws".into(), "sys".into()), &ontology).unwrap();
        graph.add_edge(crate::model::Edge::new("F.FN.001".into(), EdgeKind::Allocate, "OrderModule.MD.001".into(), "ws".into(), "sys".into()), &ontology).unwrap();

        let roots = vec!["App.SY.001".to_string()];
        let result = layout(&graph, &roots, &EdgeKind::NESTING, &TreeParams::default()).unwrap();
        assert!(result.positions.contains_key("App.SY.001"));
        assert!(result.positions.contains_key("OrderModule.MD.001"));
        assert!(result.positions.contains_key("F.FN.001"));
    }
}
