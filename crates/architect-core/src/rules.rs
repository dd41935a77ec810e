//! Rule Evaluator (spec.md §4.5): integrity, naming, and per-phase
//! conformance checks, folded into a scalar reward in `[0, 1]`.
//!
//! Design note ("polymorphism over rule kinds"): rather than a trait object
//! per rule, each check is a plain function tagged with the `RuleCategory`
//! it belongs to, collected into one dispatch table `CHECKS` that
//! `evaluate` walks once per call.

use crate::graph::Graph;
use crate::model::{EdgeKind, NodeKind};
use crate::ontology::{Ontology, Phase, Severity};

/// Which family a check belongs to — informational, used by callers that
/// want to group violations by concern rather than by phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Integrity,
    NodeLocal,
    EdgeLocal,
    GraphGlobal,
}

/// A single non-conformance (spec.md §4.5). Not an error: a report.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub rule_id: String,
    pub severity: Severity,
    pub affected_ids: Vec<String>,
    pub human_message: String,
    pub suggested_operator: Option<String>,
    pub suggested_fix: Option<String>,
}

struct RawViolation {
    rule_id: &'static str,
    affected_ids: Vec<String>,
    message: String,
    suggested_fix: Option<String>,
}

impl RawViolation {
    fn new(rule_id: &'static str, affected_ids: Vec<String>, message: impl Into<String>) -> Self {
        RawViolation { rule_id, affected_ids, message: message.into(), suggested_fix: None }
    }

    fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub violations: Vec<Violation>,
    pub error_count: usize,
    pub warning_count: usize,
    pub reward_score: f64,
}

impl EvaluationResult {
    /// A graph is gate-ready for the phase this result was computed against
    /// when it has zero errors (spec.md §4.5).
    pub fn is_gate_ready(&self) -> bool {
        self.error_count == 0
    }
}

type CheckFn = fn(&Graph, &Ontology) -> Vec<RawViolation>;

const CHECKS: &[(RuleCategory, Phase, CheckFn)] = &[
    (RuleCategory::Integrity, Phase::All, check_dangling_edges),
    (RuleCategory::Integrity, Phase::All, check_invalid_connections),
    (RuleCategory::Integrity, Phase::All, check_circular_compose),
    (RuleCategory::NodeLocal, Phase::All, check_naming_pascal_case),
    (RuleCategory::NodeLocal, Phase::All, check_naming_length),
    (RuleCategory::NodeLocal, Phase::Phase1Requirements, check_req_valid_id),
    (RuleCategory::EdgeLocal, Phase::Phase1Requirements, check_uc_satisfies_req),
    (RuleCategory::GraphGlobal, Phase::Phase2Logical, check_miller_law_func),
    (RuleCategory::EdgeLocal, Phase::Phase2Logical, check_func_satisfies_req),
    (RuleCategory::EdgeLocal, Phase::Phase2Logical, check_func_io),
    (RuleCategory::EdgeLocal, Phase::Phase2Logical, check_flow_io_both_ends),
    (RuleCategory::GraphGlobal, Phase::Phase2Logical, check_actor_boundary),
    (RuleCategory::GraphGlobal, Phase::Phase2Logical, check_no_cross_whitebox_io),
    (RuleCategory::NodeLocal, Phase::Phase2Logical, check_volatile_fanout),
    (RuleCategory::GraphGlobal, Phase::Phase3Physical, check_miller_law_mod),
    (RuleCategory::EdgeLocal, Phase::Phase3Physical, check_func_allocated),
    (RuleCategory::EdgeLocal, Phase::Phase4Verification, check_req_verified),
    (RuleCategory::GraphGlobal, Phase::Phase4Verification, check_no_orphans),
];

/// Evaluate `graph` against every check whose phase matches `filter`.
pub fn evaluate(graph: &Graph, ontology: &Ontology, filter: Phase) -> EvaluationResult {
    let mut violations = Vec::new();
    for (_, phase, check) in CHECKS {
        if !phase.matches(filter) {
            continue;
        }
        for raw in check(graph, ontology) {
            violations.push(classify(ontology, raw));
        }
    }

    let error_count = violations.iter().filter(|v| v.severity == Severity::Hard).count();
    let warning_count = violations.iter().filter(|v| v.severity == Severity::Soft).count();

    let node_count = graph.node_count().max(1) as f64;
    let mut penalty_sum = 0.0;
    let mut forced_zero = false;
    for v in &violations {
        let rule = ontology.rule(&v.rule_id);
        let fatal = rule.map(|r| r.fatal).unwrap_or(v.severity == Severity::Hard);
        if fatal {
            forced_zero = true;
        }
        penalty_sum += match v.severity {
            Severity::Hard => 1.0,
            Severity::Soft => rule.map(|r| r.weight).unwrap_or(0.1),
        };
    }

    let reward_score = if forced_zero { 0.0 } else { (1.0 - penalty_sum / node_count).max(0.0) };

    EvaluationResult { violations, error_count, warning_count, reward_score }
}

fn classify(ontology: &Ontology, raw: RawViolation) -> Violation {
    let rule = ontology.rule(raw.rule_id);
    let severity = rule.map(|r| r.severity).unwrap_or(if raw.rule_id.starts_with("integrity.") { Severity::Hard } else { Severity::Soft });
    let suggested_operator = rule.and_then(|r| r.suggested_operator.clone());
    Violation {
        rule_id: raw.rule_id.to_string(),
        severity,
        affected_ids: raw.affected_ids,
        human_message: raw.message,
        suggested_operator,
        suggested_fix: raw.suggested_fix,
    }
}

// ── Integrity ─────────────────────────────────────────────────
// Graph::add_edge already rejects these at insertion time; these checks
// exist so a graph assembled by other means (deserialized, hand-built in
// tests) is still caught before scoring.

fn check_dangling_edges(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .all_edges()
        .filter(|e| graph.node(&e.source).is_none() || graph.node(&e.target).is_none())
        .map(|e| {
            RawViolation::new(
                "integrity.dangling-edge",
                vec![e.source.clone(), e.target.clone()],
                format!("edge `{}` references a missing endpoint", e.composite_key()),
            )
        })
        .collect()
}

fn check_invalid_connections(graph: &Graph, ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .all_edges()
        .filter_map(|e| {
            let source = graph.node(&e.source)?;
            let target = graph.node(&e.target)?;
            if ontology.valid_connection(source.kind, e.kind, target.kind) {
                None
            } else {
                Some(RawViolation::new(
                    "integrity.invalid-connection",
                    vec![e.source.clone(), e.target.clone()],
                    format!("`{}` cannot connect `{}` to `{}`", e.kind, source.kind, target.kind),
                ))
            }
        })
        .collect()
}

fn check_circular_compose(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    let mut visiting = std::collections::HashSet::new();
    let mut done = std::collections::HashSet::new();
    let mut found = Vec::new();
    for node in graph.all_nodes() {
        if done.contains(&node.id) {
            continue;
        }
        let mut stack = vec![node.id.clone()];
        let mut path = Vec::new();
        while let Some(id) = stack.pop() {
            if id.is_empty() {
                path.pop();
                continue;
            }
            if visiting.contains(&id) {
                found.push(RawViolation::new("integrity.circular-compose", path.clone(), format!("compose cycle through `{id}`")));
                continue;
            }
            if done.contains(&id) {
                continue;
            }
            visiting.insert(id.clone());
            path.push(id.clone());
            stack.push(String::new());
            for child in graph.children(&id, &[EdgeKind::Compose]) {
                stack.push(child);
            }
            done.insert(id.clone());
            visiting.remove(&id);
        }
    }
    found
}

// ── Naming ────────────────────────────────────────────────────

fn is_pascal_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric())
}

fn check_naming_pascal_case(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .all_nodes()
        .filter(|n| !is_pascal_case(&n.name))
        .map(|n| RawViolation::new("naming.pascal-case", vec![n.id.clone()], format!("`{}` is not PascalCase", n.name)).with_fix("rename to PascalCase"))
        .collect()
}

fn check_naming_length(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .all_nodes()
        .filter(|n| n.name.chars().count() > 25)
        .map(|n| RawViolation::new("naming.max-length", vec![n.id.clone()], format!("`{}` exceeds 25 characters", n.name)))
        .collect()
}

// ── Phase 1 ───────────────────────────────────────────────────

fn check_req_valid_id(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Req)
        .filter(|n| crate::semantic_id::extract(&n.id).is_err())
        .map(|n| RawViolation::new("phase1.req-valid-id", vec![n.id.clone()], "REQ has a malformed semantic id".to_string()))
        .collect()
}

fn check_uc_satisfies_req(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Uc)
        .filter(|n| !graph.edges_from(&n.id).any(|e| e.kind == EdgeKind::Satisfy))
        .map(|n| {
            RawViolation::new("phase1.uc-satisfies-req", vec![n.id.clone()], format!("`{}` has no satisfy edge to a requirement", n.name))
                .with_fix("add a satisfy edge to the requirement it fulfills")
        })
        .collect()
}

// ── Phase 2 ───────────────────────────────────────────────────

/// "Top-level" FUNC: composed directly by a MOD or FCHAIN that is itself
/// not nested inside another FUNC — i.e. not a FUNC-within-FUNC.
fn top_level_funcs(graph: &Graph) -> Vec<String> {
    graph
        .nodes_of_kind(NodeKind::Func)
        .filter(|n| !graph.parents(&n.id, &[EdgeKind::Compose]).iter().any(|p| graph.node(p).map(|pn| pn.kind == NodeKind::Func).unwrap_or(false)))
        .map(|n| n.id.clone())
        .collect()
}

fn check_miller_law_func(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    for sys in graph.nodes_of_kind(NodeKind::Sys) {
        let descendants = descendants_of(graph, &sys.id);
        let count = top_level_funcs(graph).iter().filter(|id| descendants.contains(*id)).count();
        if !(5..=9).contains(&count) {
            return vec![RawViolation::new(
                "phase2.miller-law-func",
                vec![sys.id.clone()],
                format!("`{}` has {} top-level FUNC nodes, outside the 5-9 range", sys.name, count),
            )];
        }
    }
    Vec::new()
}

fn descendants_of(graph: &Graph, root: &str) -> std::collections::HashSet<String> {
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![root.to_string()];
    while let Some(id) = stack.pop() {
        for child in graph.children(&id, &crate::model::EdgeKind::NESTING) {
            if seen.insert(child.clone()) {
                stack.push(child);
            }
        }
    }
    seen
}

fn check_func_satisfies_req(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Func)
        .filter(|n| !graph.edges_from(&n.id).any(|e| e.kind == EdgeKind::Satisfy))
        .map(|n| {
            RawViolation::new("phase2.func-satisfies-req", vec![n.id.clone()], format!("`{}` has no satisfy edge to a requirement", n.name))
                .with_fix("add a satisfy edge to the requirement it fulfills")
        })
        .collect()
}

fn check_func_io(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Func)
        .filter_map(|n| {
            let has_input = graph.edges_to(&n.id).any(|e| e.kind == EdgeKind::Io);
            let has_output = graph.edges_from(&n.id).any(|e| e.kind == EdgeKind::Io);
            if has_input && has_output {
                None
            } else {
                Some(
                    RawViolation::new(
                        "phase2.func-io",
                        vec![n.id.clone()],
                        format!("`{}` is missing {}", n.name, if !has_input { "an input flow" } else { "an output flow" }),
                    )
                    .with_fix("add_allocate or connect missing io edges"),
                )
            }
        })
        .collect()
}

fn check_flow_io_both_ends(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Flow)
        .filter_map(|n| {
            let has_in = graph.edges_to(&n.id).any(|e| e.kind == EdgeKind::Io);
            let has_out = graph.edges_from(&n.id).any(|e| e.kind == EdgeKind::Io);
            if has_in && has_out {
                None
            } else {
                Some(RawViolation::new("phase2.flow-io-both-ends", vec![n.id.clone()], format!("`{}` does not connect two endpoints", n.name)))
            }
        })
        .collect()
}

fn check_actor_boundary(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    // The ontology has no FUNC<->ACTOR edge; actors only ever touch a FLOW.
    // An entry path is ACTOR -io-> FLOW -io-> FUNC, an exit path is the reverse.
    let mut out = Vec::new();
    for chain in graph.nodes_of_kind(NodeKind::FChain) {
        let funcs = descendants_of(graph, &chain.id);
        let has_into = funcs.iter().any(|f| {
            graph.edges_to(f).filter(|e| e.kind == EdgeKind::Io).any(|e| {
                graph.node(&e.source).map(|s| s.kind == NodeKind::Flow).unwrap_or(false)
                    && graph
                        .edges_to(&e.source)
                        .any(|fe| fe.kind == EdgeKind::Io && graph.node(&fe.source).map(|s| s.kind == NodeKind::Actor).unwrap_or(false))
            })
        });
        let has_out_of = funcs.iter().any(|f| {
            graph.edges_from(f).filter(|e| e.kind == EdgeKind::Io).any(|e| {
                graph.node(&e.target).map(|t| t.kind == NodeKind::Flow).unwrap_or(false)
                    && graph
                        .edges_from(&e.target)
                        .any(|fe| fe.kind == EdgeKind::Io && graph.node(&fe.target).map(|t| t.kind == NodeKind::Actor).unwrap_or(false))
            })
        });
        if !has_into || !has_out_of {
            out.push(RawViolation::new(
                "phase2.actor-boundary",
                vec![chain.id.clone()],
                format!("`{}` lacks a complete ACTOR<->FLOW boundary path", chain.name),
            ));
        }
    }
    out
}

fn check_no_cross_whitebox_io(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    let mut out = Vec::new();
    for flow in graph.nodes_of_kind(NodeKind::Flow) {
        let producers: Vec<&str> = graph.edges_to(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.source.as_str()).collect();
        let consumers: Vec<&str> = graph.edges_from(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.target.as_str()).collect();
        for producer in &producers {
            for consumer in &consumers {
                let producer_parent = graph.parents(producer, &[EdgeKind::Compose]);
                let consumer_parent = graph.parents(consumer, &[EdgeKind::Compose]);
                if !producer_parent.is_empty() && !consumer_parent.is_empty() && producer_parent != consumer_parent {
                    out.push(RawViolation::new(
                        "phase2.no-cross-whitebox-io",
                        vec![producer.to_string(), consumer.to_string()],
                        format!("`{producer}` and `{consumer}` exchange `{}` across whitebox boundaries", flow.name),
                    ));
                }
            }
        }
    }
    out
}

fn check_volatile_fanout(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Func)
        .filter(|n| n.attributes.volatility.unwrap_or(0.0) >= 0.7)
        .filter_map(|n| {
            let dependents: std::collections::HashSet<&str> = graph.incident_edges(&n.id).filter(|e| e.kind == EdgeKind::Io).map(|e| if e.source == n.id { e.target.as_str() } else { e.source.as_str() }).collect();
            if dependents.len() > 2 {
                Some(RawViolation::new(
                    "phase2.volatile-fanout",
                    vec![n.id.clone()],
                    format!("volatile `{}` has {} dependents, more than two", n.name, dependents.len()),
                ).with_fix("extract_volatile to isolate the unstable function"))
            } else {
                None
            }
        })
        .collect()
}

// ── Phase 3 ───────────────────────────────────────────────────

fn top_level_mods(graph: &Graph) -> Vec<String> {
    graph
        .nodes_of_kind(NodeKind::Mod)
        .filter(|n| !graph.parents(&n.id, &[EdgeKind::Compose]).iter().any(|p| graph.node(p).map(|pn| pn.kind == NodeKind::Mod).unwrap_or(false)))
        .map(|n| n.id.clone())
        .collect()
}

fn check_miller_law_mod(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    for sys in graph.nodes_of_kind(NodeKind::Sys) {
        let descendants = descendants_of(graph, &sys.id);
        let count = top_level_mods(graph).iter().filter(|id| descendants.contains(*id)).count();
        if !(5..=9).contains(&count) {
            return vec![RawViolation::new(
                "phase3.miller-law-mod",
                vec![sys.id.clone()],
                format!("`{}` has {} top-level MOD nodes, outside the 5-9 range", sys.name, count),
            )];
        }
    }
    Vec::new()
}

fn check_func_allocated(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Func)
        .filter_map(|n| {
            let count = graph.edges_from(&n.id).filter(|e| e.kind == EdgeKind::Allocate).count();
            if count == 1 {
                None
            } else {
                Some(
                    RawViolation::new(
                        "phase3.func-allocated",
                        vec![n.id.clone()],
                        format!("`{}` is allocated to {} modules, expected exactly one", n.name, count),
                    )
                    .with_fix("add_allocate to assign this function to one module"),
                )
            }
        })
        .collect()
}

// ── Phase 4 ───────────────────────────────────────────────────

fn check_req_verified(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .nodes_of_kind(NodeKind::Req)
        .filter(|n| !graph.edges_to(&n.id).any(|e| e.kind == EdgeKind::Verify))
        .map(|n| {
            RawViolation::new("phase4.req-verified", vec![n.id.clone()], format!("`{}` has no verifying test", n.name))
                .with_fix("add a TEST node with a verify edge to this requirement")
        })
        .collect()
}

fn check_no_orphans(graph: &Graph, _ontology: &Ontology) -> Vec<RawViolation> {
    graph
        .all_nodes()
        .filter(|n| graph.incident_edges(&n.id).next().is_none())
        .map(|n| RawViolation::new("phase4.no-orphans", vec![n.id.clone()], format!("`{}` has no edges at all", n.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF, DEMO_GRAPH_WITH_VIOLATIONS_DIFF};

    fn load(diff_text: &str) -> (Graph, Ontology) {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        let doc = crate::diff::parse(diff_text);
        crate::diff::apply_to_graph(&mut graph, &ontology, &doc).unwrap();
        (graph, ontology)
    }

    #[test]
    fn demo_graph_has_no_hard_errors() {
        let (graph, ontology) = load(DEMO_GRAPH_DIFF);
        let result = evaluate(&graph, &ontology, Phase::All);
        assert_eq!(result.error_count, 0, "{:?}", result.violations);
    }

    #[test]
    fn violations_graph_flags_unallocated_and_unverified() {
        let (graph, ontology) = load(DEMO_GRAPH_WITH_VIOLATIONS_DIFF);
        let result = evaluate(&graph, &ontology, Phase::All);
        assert!(result.violations.iter().any(|v| v.rule_id == "phase3.func-allocated"));
        assert!(result.violations.iter().any(|v| v.rule_id == "phase4.req-verified"));
        assert!(result.reward_score < 1.0);
    }

    #[test]
    fn reward_is_one_for_an_empty_graph() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let graph = Graph::new("ws", "sys");
        let result = evaluate(&graph, &ontology, Phase::All);
        assert_eq!(result.reward_score, 1.0);
    }

    #[test]
    fn gate_ready_tracks_error_count() {
        let (graph, ontology) = load(DEMO_GRAPH_DIFF);
        let result = evaluate(&graph, &ontology, Phase::Phase1Requirements);
        assert!(result.is_gate_ready());
    }

    #[test]
    fn a_complete_actor_boundary_does_not_violate() {
        let (graph, ontology) = load(DEMO_GRAPH_DIFF);
        let result = evaluate(&graph, &ontology, Phase::All);
        assert!(
            !result.violations.iter().any(|v| v.rule_id == "phase2.actor-boundary"),
            "{:?}",
            result.violations
        );
    }
}
