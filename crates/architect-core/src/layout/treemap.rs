//! Squarified treemap layout (spec.md §4.7): pack each container's
//! children to a target aspect ratio near the golden ratio.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::error::EngineError;
use crate::graph::Graph;
use crate::model::EdgeKind;

use super::{check_budget, compute_bounds, LayoutResult, Position};

#[derive(Debug, Clone, Copy)]
pub struct TreemapParams {
    pub width: f64,
    pub height: f64,
    pub target_aspect: f64,
}

impl Default for TreemapParams {
    fn default() -> Self {
        TreemapParams { width: 100.0, height: 100.0, target_aspect: 1.618 }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

fn worst_ratio(row: &[f64], length: f64) -> f64 {
    let sum: f64 = row.iter().sum();
    if sum == 0.0 || length == 0.0 {
        return f64::MAX;
    }
    let max = row.iter().cloned().fold(f64::MIN, f64::max);
    let min = row.iter().cloned().fold(f64::MAX, f64::min);
    let s2 = sum * sum;
    let l2 = length * length;
    ((l2 * max) / s2).max(s2 / (l2 * min))
}

fn layout_row(row: &[f64], rect: Rect) -> (Vec<Rect>, Rect) {
    let row_sum: f64 = row.iter().sum();
    if rect.w >= rect.h {
        let strip_w = if rect.h > 0.0 { row_sum / rect.h } else { 0.0 };
        let mut y = rect.y;
        let mut rects = Vec::with_capacity(row.len());
        for &a in row {
            let h = if strip_w > 0.0 { a / strip_w } else { 0.0 };
            rects.push(Rect { x: rect.x, y, w: strip_w, h });
            y += h;
        }
        (rects, Rect { x: rect.x + strip_w, y: rect.y, w: (rect.w - strip_w).max(0.0), h: rect.h })
    } else {
        let strip_h = if rect.w > 0.0 { row_sum / rect.w } else { 0.0 };
        let mut x = rect.x;
        let mut rects = Vec::with_capacity(row.len());
        for &a in row {
            let w = if strip_h > 0.0 { a / strip_h } else { 0.0 };
            rects.push(Rect { x, y: rect.y, w, h: strip_h });
            x += w;
        }
        (rects, Rect { x: rect.x, y: rect.y + strip_h, w: rect.w, h: (rect.h - strip_h).max(0.0) })
    }
}

/// Classic squarify: grow a row while it improves the worst aspect ratio,
/// otherwise flush it and start a new one in the remaining rectangle.
fn squarify(areas: &[f64], rect: Rect) -> Vec<Rect> {
    let mut result = Vec::with_capacity(areas.len());
    let mut remaining = rect;
    let mut row: Vec<f64> = Vec::new();
    let mut i = 0;
    while i < areas.len() {
        let length = remaining.w.min(remaining.h);
        let mut trial = row.clone();
        trial.push(areas[i]);
        if row.is_empty() || worst_ratio(&row, length) >= worst_ratio(&trial, length) {
            row = trial;
            i += 1;
        } else {
            let (rects, rem) = layout_row(&row, remaining);
            result.extend(rects);
            remaining = rem;
            row.clear();
        }
    }
    if !row.is_empty() {
        let (rects, _rem) = layout_row(&row, remaining);
        result.extend(rects);
    }
    result
}

/// `ancestors` tracks the current root-to-container path; a nesting cycle
/// (valid per the graph's invariants — only compose-only cycles are
/// rejected) revisits an ancestor, which is treated as a leaf container
/// instead of recursed into.
fn recurse(graph: &Graph, container: &str, nesting_kinds: &[EdgeKind], rect: Rect, positions: &mut HashMap<String, Position>, ancestors: &mut HashSet<String>) {
    if ancestors.contains(container) {
        return;
    }
    let children = graph.children(container, nesting_kinds);
    if children.is_empty() {
        return;
    }
    ancestors.insert(container.to_string());
    let area = (rect.w * rect.h).max(1.0);
    let share = area / children.len() as f64;
    let areas: Vec<f64> = vec![share; children.len()];
    let rects = squarify(&areas, rect);
    for (child, r) in children.iter().zip(rects.iter()) {
        positions.insert(child.clone(), Position { x: r.x + r.w / 2.0, y: r.y + r.h / 2.0 });
        recurse(graph, child, nesting_kinds, *r, positions, ancestors);
    }
    ancestors.remove(container);
}

/// Lay out the container tree rooted at `root`. Children share equal area
/// within their parent; nested containers recurse into their allotted rect.
pub fn layout(graph: &Graph, root: &str, nesting_kinds: &[EdgeKind], params: &TreemapParams) -> Result<LayoutResult, EngineError> {
    let started = Instant::now();
    let mut positions = HashMap::new();
    let root_rect = Rect { x: 0.0, y: 0.0, w: params.width, h: params.height };
    positions.insert(root.to_string(), Position { x: root_rect.w / 2.0, y: root_rect.h / 2.0 });
    recurse(graph, root, nesting_kinds, root_rect, &mut positions, &mut HashSet::new());

    check_budget(started, positions.len(), "treemap")?;
    let bounds = compute_bounds(&positions);
    Ok(LayoutResult { positions, bounds, algorithm_name: "treemap".to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};
    use crate::ontology::Ontology;

    #[test]
    fn children_stay_within_parent_bounds() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_DIFF)).unwrap();
        let result = layout(&graph, "OrderSystem.SY.001", &EdgeKind::NESTING, &TreemapParams::default()).unwrap();
        for (id, pos) in &result.positions {
            if id == "OrderSystem.SY.001" {
                continue;
            }
            assert!(pos.x >= 0.0 && pos.x <= 100.0, "{id} x out of bounds: {}", pos.x);
            assert!(pos.y >= 0.0 && pos.y <= 100.0, "{id} y out of bounds: {}", pos.y);
        }
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

        let result = layout(&graph, "App.SY.001", &EdgeKind::NESTING, &TreemapParams::default()).unwrap();
        assert!(result.positions.contains_key("App.SY.001"));
        assert!(result.positions.contains_key("OrderModule.MD.001"));
        assert!(result.positions.contains_key("F.FN.001"));
    }
}
