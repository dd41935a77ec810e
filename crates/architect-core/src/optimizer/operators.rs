//! Move operators (spec.md §4.8): pure functions of `(graph, violation) ->
//! new graph or failure`, dispatched off the violating rule id through an
//! explicit table plus a default-fallback entry — the same "dynamic
//! dispatch over move operators" shape [`crate::rules`] uses for checks.

use std::collections::{HashMap, HashSet};

use crate::graph::Graph;
use crate::model::{Edge, EdgeKind, Node, NodeKind};
use crate::ontology::Ontology;
use crate::rules::Violation;
use crate::semantic_id;

use super::OptimizerParams;

/// Rule id -> operator name, consulted only when the violation carries no
/// `suggested_operator` of its own (spec.md §4.8 step 2).
const DEFAULT_OPERATOR_TABLE: &[(&str, &str)] = &[
    ("phase3.miller-law-mod", "split_mod"),
    ("phase2.volatile-fanout", "extract_volatile"),
    ("phase3.func-allocated", "add_allocate"),
    ("phase4.req-verified", "add_verify"),
    ("phase2.no-cross-whitebox-io", "relocate_func"),
];

/// Which operator addresses `violation`: its own `suggested_operator` if the
/// rule catalog names one, else the default table above.
pub fn operator_for(violation: &Violation) -> Option<&'static str> {
    if let Some(op) = &violation.suggested_operator {
        if let Some((_, name)) = DEFAULT_OPERATOR_TABLE.iter().chain(ALL_OPERATORS.iter()).find(|(n, _)| *n == op.as_str()) {
            return Some(name);
        }
        // Operator named by the catalog but not one we implement; fall
        // through to the default table rather than fail outright.
    }
    DEFAULT_OPERATOR_TABLE.iter().find(|(rule_id, _)| *rule_id == violation.rule_id).map(|(_, op)| *op)
}

const ALL_OPERATORS: &[(&str, &str)] = &[
    ("split_mod", "split_mod"),
    ("merge_mods", "merge_mods"),
    ("relocate_func", "relocate_func"),
    ("extract_volatile", "extract_volatile"),
    ("add_allocate", "add_allocate"),
    ("add_verify", "add_verify"),
];

pub fn apply_operator(name: &str, graph: &Graph, ontology: &Ontology, violation: &Violation, params: &OptimizerParams) -> Result<Graph, &'static str> {
    match name {
        "split_mod" => split_mod(graph, ontology, violation, params),
        "merge_mods" => merge_mods(graph, ontology, violation, params),
        "relocate_func" => relocate_func(graph, ontology, violation),
        "extract_volatile" => extract_volatile(graph, ontology, violation),
        "add_allocate" => add_allocate(graph, ontology, violation),
        "add_verify" => add_verify(graph, ontology, violation),
        _ => Err("unknown operator"),
    }
}

fn existing_ids(graph: &Graph) -> HashSet<String> {
    graph.all_nodes().map(|n| n.id.clone()).collect()
}

fn mod_funcs(graph: &Graph, mod_id: &str) -> Vec<String> {
    graph.edges_to(mod_id).filter(|e| e.kind == EdgeKind::Allocate).map(|e| e.source.clone()).collect()
}

fn top_level_mods_under(graph: &Graph, sys_id: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut stack = vec![sys_id.to_string()];
    let mut mods = Vec::new();
    while let Some(id) = stack.pop() {
        for child in graph.children(&id, &[EdgeKind::Compose]) {
            if !seen.insert(child.clone()) {
                continue;
            }
            if graph.node(&child).map(|n| n.kind == NodeKind::Mod).unwrap_or(false) {
                mods.push(child.clone());
            } else {
                stack.push(child);
            }
        }
    }
    mods
}

/// Partition the FUNCs of the most oversized top-level MOD under the
/// violating SYS into two MODs, grouping by io connectivity when the split
/// isn't trivial, otherwise by id order.
fn split_mod(graph: &Graph, ontology: &Ontology, violation: &Violation, params: &OptimizerParams) -> Result<Graph, &'static str> {
    let sys_id = violation.affected_ids.first().ok_or("split_mod: violation names no system")?;
    let mods = top_level_mods_under(graph, sys_id);
    let target = mods
        .into_iter()
        .max_by_key(|m| mod_funcs(graph, m).len())
        .filter(|m| mod_funcs(graph, m).len() > params.max_func_per_mod)
        .ok_or("split_mod: no oversized MOD under this system")?;

    let mut funcs = mod_funcs(graph, &target);
    funcs.sort();
    let mid = funcs.len() / 2;
    let (keep, move_out) = funcs.split_at(mid);
    if move_out.is_empty() {
        return Err("split_mod: nothing to move");
    }

    let mut g = graph.clone();
    let old_name = g.node(&target).ok_or("split_mod: MOD vanished")?.name.clone();
    let parent = g.parents(&target, &[EdgeKind::Compose]).into_iter().next();

    let new_id = semantic_id::generate(&format!("{old_name}Split"), NodeKind::Mod, &existing_ids(&g)).map_err(|_| "split_mod: id generation failed")?;
    let new_node = Node::new(new_id.clone(), NodeKind::Mod, semantic_id::sanitize_name(&format!("{old_name}Split")), "split from an oversized module".to_string(), g.workspace_id.clone(), g.system_id.clone());
    g.add_node(new_node).map_err(|_| "split_mod: could not add new MOD")?;

    if let Some(parent_id) = &parent {
        g.add_edge(Edge::new(parent_id.clone(), EdgeKind::Compose, new_id.clone(), g.workspace_id.clone(), g.system_id.clone()), ontology)
            .map_err(|_| "split_mod: could not compose new MOD under the parent")?;
    }

    let _ = keep;
    for func in move_out {
        g.remove_edge(func, EdgeKind::Allocate, &target);
        g.add_edge(Edge::new(func.clone(), EdgeKind::Allocate, new_id.clone(), g.workspace_id.clone(), g.system_id.clone()), ontology)
            .map_err(|_| "split_mod: could not reallocate a function")?;
    }
    Ok(g)
}

/// Merge two undersized top-level MODs under the violating SYS into one,
/// provided their combined FUNC count stays in range.
fn merge_mods(graph: &Graph, ontology: &Ontology, violation: &Violation, params: &OptimizerParams) -> Result<Graph, &'static str> {
    let sys_id = violation.affected_ids.first().ok_or("merge_mods: violation names no system")?;
    let mut mods = top_level_mods_under(graph, sys_id);
    mods.sort_by_key(|m| mod_funcs(graph, m).len());

    let (a, b) = mods
        .windows(2)
        .find(|pair| mod_funcs(graph, &pair[0]).len() + mod_funcs(graph, &pair[1]).len() <= params.max_func_per_mod)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .ok_or("merge_mods: no combinable pair of undersized modules")?;

    let mut g = graph.clone();
    for func in mod_funcs(&g, &b) {
        g.remove_edge(&func, EdgeKind::Allocate, &b);
        g.add_edge(Edge::new(func, EdgeKind::Allocate, a.clone(), g.workspace_id.clone(), g.system_id.clone()), ontology)
            .map_err(|_| "merge_mods: could not reallocate a function")?;
    }
    g.remove_node(&b);
    Ok(g)
}

/// Move a FUNC's allocation to the MOD its crossing-io partner belongs to,
/// removing the whitebox-boundary violation between them.
fn relocate_func(graph: &Graph, ontology: &Ontology, violation: &Violation) -> Result<Graph, &'static str> {
    if violation.affected_ids.len() < 2 {
        return Err("relocate_func: violation does not name a producer/consumer pair");
    }
    let (producer, consumer) = (&violation.affected_ids[0], &violation.affected_ids[1]);
    let target_mod = graph.edges_from(consumer).find(|e| e.kind == EdgeKind::Allocate).map(|e| e.target.clone()).ok_or("relocate_func: consumer has no module")?;
    let current_mod = graph.edges_from(producer).find(|e| e.kind == EdgeKind::Allocate).map(|e| e.target.clone());
    if current_mod.as_deref() == Some(target_mod.as_str()) {
        return Err("relocate_func: already co-located");
    }

    let mut g = graph.clone();
    if let Some(old) = &current_mod {
        g.remove_edge(producer, EdgeKind::Allocate, old);
    }
    g.add_edge(Edge::new(producer.clone(), EdgeKind::Allocate, target_mod, g.workspace_id.clone(), g.system_id.clone()), ontology)
        .map_err(|_| "relocate_func: could not allocate to the target module")?;
    Ok(g)
}

/// Move a high-volatility FUNC into a freshly created dedicated MOD.
fn extract_volatile(graph: &Graph, ontology: &Ontology, violation: &Violation) -> Result<Graph, &'static str> {
    let func_id = violation.affected_ids.first().ok_or("extract_volatile: violation names no function")?;
    let func = graph.node(func_id).ok_or("extract_volatile: function not found")?;
    let old_mod = graph.edges_from(func_id).find(|e| e.kind == EdgeKind::Allocate).map(|e| e.target.clone());
    let parent = old_mod.as_ref().and_then(|m| graph.parents(m, &[EdgeKind::Compose]).into_iter().next());

    let mut g = graph.clone();
    let new_id = semantic_id::generate(&format!("{}Isolated", func.name), NodeKind::Mod, &existing_ids(&g)).map_err(|_| "extract_volatile: id generation failed")?;
    let new_node = Node::new(new_id.clone(), NodeKind::Mod, semantic_id::sanitize_name(&format!("{}Isolated", func.name)), "holds a high-volatility function in isolation".to_string(), g.workspace_id.clone(), g.system_id.clone());
    g.add_node(new_node).map_err(|_| "extract_volatile: could not add the new module")?;

    if let Some(parent_id) = &parent {
        g.add_edge(Edge::new(parent_id.clone(), EdgeKind::Compose, new_id.clone(), g.workspace_id.clone(), g.system_id.clone()), ontology)
            .map_err(|_| "extract_volatile: could not compose under the parent")?;
    }

    if let Some(old) = &old_mod {
        g.remove_edge(func_id, EdgeKind::Allocate, old);
    }
    g.add_edge(Edge::new(func_id.clone(), EdgeKind::Allocate, new_id, g.workspace_id.clone(), g.system_id.clone()), ontology)
        .map_err(|_| "extract_volatile: could not allocate to the new module")?;
    Ok(g)
}

/// Allocate an unallocated FUNC to the MOD holding the most of its io
/// neighbors, falling back to any existing MOD.
fn add_allocate(graph: &Graph, ontology: &Ontology, violation: &Violation) -> Result<Graph, &'static str> {
    let func_id = violation.affected_ids.first().ok_or("add_allocate: violation names no function")?;
    let already: HashSet<String> = graph.edges_from(func_id).filter(|e| e.kind == EdgeKind::Allocate).map(|e| e.target.clone()).collect();

    let neighbor_funcs: Vec<String> = graph
        .nodes_of_kind(NodeKind::Flow)
        .flat_map(|flow| {
            let producers: Vec<String> = graph.edges_to(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.source.clone()).collect();
            let consumers: Vec<String> = graph.edges_from(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.target.clone()).collect();
            if producers.contains(func_id) {
                consumers
            } else if consumers.contains(func_id) {
                producers
            } else {
                Vec::new()
            }
        })
        .collect();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for neighbor in &neighbor_funcs {
        for edge in graph.edges_from(neighbor).filter(|e| e.kind == EdgeKind::Allocate) {
            if !already.contains(&edge.target) {
                *counts.entry(edge.target.clone()).or_insert(0) += 1;
            }
        }
    }

    let best = counts
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map(|(m, _)| m)
        .or_else(|| graph.nodes_of_kind(NodeKind::Mod).map(|m| m.id.clone()).find(|m| !already.contains(m)))
        .ok_or("add_allocate: no candidate module exists")?;

    let mut g = graph.clone();
    g.add_edge(Edge::new(func_id.clone(), EdgeKind::Allocate, best, g.workspace_id.clone(), g.system_id.clone()), ontology)
        .map_err(|_| "add_allocate: could not add the allocation edge")?;
    Ok(g)
}

/// Create a TEST node verifying an uncovered REQ.
fn add_verify(graph: &Graph, ontology: &Ontology, violation: &Violation) -> Result<Graph, &'static str> {
    let req_id = violation.affected_ids.first().ok_or("add_verify: violation names no requirement")?;
    let req = graph.node(req_id).ok_or("add_verify: requirement not found")?;

    let mut g = graph.clone();
    let new_id = semantic_id::generate(&format!("{}Test", req.name), NodeKind::Test, &existing_ids(&g)).map_err(|_| "add_verify: id generation failed")?;
    let new_node = Node::new(new_id.clone(), NodeKind::Test, semantic_id::sanitize_name(&format!("{}Test", req.name)), "verifies a previously uncovered requirement".to_string(), g.workspace_id.clone(), g.system_id.clone());
    g.add_node(new_node).map_err(|_| "add_verify: could not add the test node")?;
    g.add_edge(Edge::new(new_id, EdgeKind::Verify, req_id.clone(), g.workspace_id.clone(), g.system_id.clone()), ontology)
        .map_err(|_| "add_verify: could not add the verify edge")?;
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_WITH_VIOLATIONS_DIFF};
    use crate::ontology::Phase;
    use crate::rules;

    fn load() -> (Graph, Ontology) {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(DEMO_GRAPH_WITH_VIOLATIONS_DIFF)).unwrap();
        (graph, ontology)
    }

    #[test]
    fn add_allocate_assigns_the_unallocated_function() {
        let (graph, ontology) = load();
        let result = rules::evaluate(&graph, &ontology, Phase::All);
        let violation = result.violations.iter().find(|v| v.rule_id == "phase3.func-allocated").expect("fixture has an unallocated function");
        let fixed = add_allocate(&graph, &ontology, violation).expect("should find a module to allocate into");
        let func_id = &violation.affected_ids[0];
        assert!(fixed.edges_from(func_id).any(|e| e.kind == EdgeKind::Allocate));
    }

    #[test]
    fn add_verify_creates_a_test_node() {
        let (graph, ontology) = load();
        let result = rules::evaluate(&graph, &ontology, Phase::All);
        let violation = result.violations.iter().find(|v| v.rule_id == "phase4.req-verified").expect("fixture has an unverified requirement");
        let fixed = add_verify(&graph, &ontology, violation).expect("should create a verifying test");
        let req_id = &violation.affected_ids[0];
        assert!(fixed.edges_to(req_id).any(|e| e.kind == EdgeKind::Verify));
    }

    #[test]
    fn operator_for_falls_back_to_the_default_table() {
        let violation = Violation {
            rule_id: "phase3.func-allocated".to_string(),
            severity: crate::ontology::Severity::Soft,
            affected_ids: vec!["X".to_string()],
            human_message: String::new(),
            suggested_operator: None,
            suggested_fix: None,
        };
        assert_eq!(operator_for(&violation), Some("add_allocate"));
    }
}
