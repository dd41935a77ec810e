//! Multi-Objective Optimizer (spec.md §4.8): score architecture variants
//! across five objectives, keep a diversity-preserving Pareto front, and
//! search for improvements with move operators picked off a rule-id table
//! (design note "dynamic dispatch over move operators", same
//! static-table-over-trait-objects idiom as [`crate::rules`]).

pub mod operators;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::graph::Graph;
use crate::model::{EdgeKind, NodeKind};
use crate::ontology::{Ontology, Phase};
use crate::rules::{self, Violation};

/// Weights for the scalar score's components. Renormalized at scoring time
/// so the caller doesn't have to keep them summing to 1 (spec.md §4.8).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub conformance: f64,
    pub cohesion: f64,
    pub coupling: f64,
    pub volatility_isolation: f64,
    pub traceability: f64,
    /// The optional sixth objective; omit to score on the first five only.
    pub connectivity: Option<f64>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            conformance: 1.0,
            cohesion: 1.0,
            coupling: 1.0,
            volatility_isolation: 1.0,
            traceability: 1.0,
            connectivity: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizerParams {
    pub weights: ScoreWeights,
    pub min_func_per_mod: usize,
    pub max_func_per_mod: usize,
    pub max_fan_out: usize,
    pub volatility_threshold: f64,
    pub pareto_capacity: usize,
    pub max_iterations: u64,
    pub time_budget_ms: u64,
    pub seed: u64,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        OptimizerParams {
            weights: ScoreWeights::default(),
            min_func_per_mod: 5,
            max_func_per_mod: 9,
            max_fan_out: 5,
            volatility_threshold: 0.7,
            pareto_capacity: 5,
            max_iterations: 100,
            time_budget_ms: 30_000,
            seed: 0,
        }
    }
}

/// The five (or six) score components, each in `[0, 1]`, higher is better.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub conformance: f64,
    pub cohesion: f64,
    pub coupling: f64,
    pub volatility_isolation: f64,
    pub traceability: f64,
    pub connectivity: Option<f64>,
}

impl ScoreComponents {
    /// The vector used for Pareto dominance and crowding distance — a fixed
    /// order so every variant compares component-for-component.
    fn as_vec(&self) -> Vec<f64> {
        let mut v = vec![self.conformance, self.cohesion, self.coupling, self.volatility_isolation, self.traceability];
        if let Some(c) = self.connectivity {
            v.push(c);
        }
        v
    }

    pub fn weighted_mean(&self, weights: &ScoreWeights) -> f64 {
        let mut total_weight = weights.conformance + weights.cohesion + weights.coupling + weights.volatility_isolation + weights.traceability;
        let mut total = self.conformance * weights.conformance
            + self.cohesion * weights.cohesion
            + self.coupling * weights.coupling
            + self.volatility_isolation * weights.volatility_isolation
            + self.traceability * weights.traceability;
        if let (Some(c), Some(w)) = (self.connectivity, weights.connectivity) {
            total += c * w;
            total_weight += w;
        }
        if total_weight <= 0.0 {
            return 0.0;
        }
        total / total_weight
    }
}

/// An independent copy of a graph plus its derived score — the unit the
/// optimizer mutates and compares (spec.md §4.8 "architecture variant").
#[derive(Debug, Clone)]
pub struct Variant {
    pub graph: Graph,
    pub scores: ScoreComponents,
    pub weighted_score: f64,
}

impl Variant {
    pub fn new(graph: Graph, ontology: &Ontology, params: &OptimizerParams) -> Self {
        let scores = score(&graph, ontology, params);
        let weighted_score = scores.weighted_mean(&params.weights);
        Variant { graph, scores, weighted_score }
    }

    fn dominates(&self, other: &Variant) -> bool {
        dominates(&self.scores.as_vec(), &other.scores.as_vec())
    }
}

fn dominates(a: &[f64], b: &[f64]) -> bool {
    a.iter().zip(b).all(|(x, y)| x >= y) && a.iter().zip(b).any(|(x, y)| x > y)
}

/// Score a graph across the five mandatory objectives plus the optional
/// sixth, per spec.md §4.8's component list.
pub fn score(graph: &Graph, ontology: &Ontology, params: &OptimizerParams) -> ScoreComponents {
    let conformance = rules::evaluate(graph, ontology, Phase::All).reward_score;
    let cohesion = cohesion_score(graph, params);
    let coupling = coupling_score(graph, params);
    let volatility_isolation = volatility_isolation_score(graph, params);
    let traceability = traceability_score(graph);
    let connectivity = params.weights.connectivity.map(|_| connectivity_score(graph));

    ScoreComponents { conformance, cohesion, coupling, volatility_isolation, traceability, connectivity }
}

fn mods_with_funcs(graph: &Graph) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = graph.nodes_of_kind(NodeKind::Mod).map(|m| (m.id.clone(), Vec::new())).collect();
    for func in graph.nodes_of_kind(NodeKind::Func) {
        for edge in graph.edges_from(&func.id).filter(|e| e.kind == EdgeKind::Allocate) {
            out.entry(edge.target.clone()).or_default().push(func.id.clone());
        }
    }
    out
}

/// Miller-law deviation per MOD: penalty grows linearly outside
/// `[min_func_per_mod, max_func_per_mod]`, oversize penalized 1.5x undersize.
fn cohesion_score(graph: &Graph, params: &OptimizerParams) -> f64 {
    let mods = mods_with_funcs(graph);
    if mods.is_empty() {
        return 1.0;
    }
    let mut penalty = 0.0;
    for funcs in mods.values() {
        let n = funcs.len();
        if n > params.max_func_per_mod {
            penalty += (n - params.max_func_per_mod) as f64 * 1.5;
        } else if n < params.min_func_per_mod {
            penalty += (params.min_func_per_mod - n) as f64;
        }
    }
    (1.0 - penalty / mods.len() as f64).max(0.0)
}

/// Count of io edges whose two endpoints' allocated MODs differ, per MOD,
/// penalized linearly past `max_fan_out`.
fn coupling_score(graph: &Graph, params: &OptimizerParams) -> f64 {
    let mods = mods_with_funcs(graph);
    if mods.is_empty() {
        return 1.0;
    }
    let func_mod: HashMap<&str, &str> = mods.iter().flat_map(|(m, funcs)| funcs.iter().map(move |f| (f.as_str(), m.as_str()))).collect();

    let mut fan_out: HashMap<&str, usize> = HashMap::new();
    for flow in graph.nodes_of_kind(NodeKind::Flow) {
        let producers: Vec<&str> = graph.edges_to(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.source.as_str()).collect();
        let consumers: Vec<&str> = graph.edges_from(&flow.id).filter(|e| e.kind == EdgeKind::Io).map(|e| e.target.as_str()).collect();
        for producer in &producers {
            for consumer in &consumers {
                if let (Some(pm), Some(cm)) = (func_mod.get(producer), func_mod.get(consumer)) {
                    if pm != cm {
                        *fan_out.entry(pm).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    let mut penalty = 0.0;
    for mod_id in mods.keys() {
        let count = fan_out.get(mod_id.as_str()).copied().unwrap_or(0);
        if count > params.max_fan_out {
            penalty += (count - params.max_fan_out) as f64;
        }
    }
    (1.0 - penalty / mods.len() as f64).max(0.0)
}

/// Penalize MODs that mix a high-volatility FUNC with a low-volatility one.
fn volatility_isolation_score(graph: &Graph, params: &OptimizerParams) -> f64 {
    let mods = mods_with_funcs(graph);
    if mods.is_empty() {
        return 1.0;
    }
    let mut mixed = 0;
    for funcs in mods.values() {
        let has_high = funcs.iter().any(|f| graph.node(f).and_then(|n| n.attributes.volatility).unwrap_or(0.0) >= params.volatility_threshold);
        let has_low = funcs.iter().any(|f| graph.node(f).and_then(|n| n.attributes.volatility).unwrap_or(0.0) < params.volatility_threshold);
        if has_high && has_low {
            mixed += 1;
        }
    }
    (1.0 - mixed as f64 / mods.len() as f64).max(0.0)
}

/// Weighted mean of REQ coverage (satisfied by a FUNC or UC) and test
/// coverage (verified by a TEST).
fn traceability_score(graph: &Graph) -> f64 {
    let reqs: Vec<_> = graph.nodes_of_kind(NodeKind::Req).collect();
    if reqs.is_empty() {
        return 1.0;
    }
    let satisfied = reqs.iter().filter(|r| graph.edges_to(&r.id).any(|e| e.kind == EdgeKind::Satisfy)).count();
    let verified = reqs.iter().filter(|r| graph.edges_to(&r.id).any(|e| e.kind == EdgeKind::Verify)).count();
    0.5 * (satisfied as f64 / reqs.len() as f64) + 0.5 * (verified as f64 / reqs.len() as f64)
}

fn connectivity_score(graph: &Graph) -> f64 {
    let funcs: Vec<_> = graph.nodes_of_kind(NodeKind::Func).collect();
    if funcs.is_empty() {
        return 1.0;
    }
    let connected = funcs.iter().filter(|f| graph.incident_edges(&f.id).any(|e| e.kind == EdgeKind::Io)).count();
    connected as f64 / funcs.len() as f64
}

/// A bounded, diversity-preserving set of non-dominated variants (spec.md
/// §4.8). Capacity overflow evicts the smallest-crowding-distance member.
#[derive(Debug, Default)]
pub struct ParetoFront {
    capacity: usize,
    variants: Vec<Variant>,
}

impl ParetoFront {
    pub fn new(capacity: usize) -> Self {
        ParetoFront { capacity: capacity.max(1), variants: Vec::new() }
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Insert `candidate` if nothing on the front dominates it. Returns
    /// whether it was kept.
    pub fn try_insert(&mut self, candidate: Variant) -> bool {
        if self.variants.iter().any(|v| v.dominates(&candidate)) {
            return false;
        }
        self.variants.retain(|v| !candidate.dominates(v));
        self.variants.push(candidate);
        if self.variants.len() > self.capacity {
            self.evict_least_diverse();
        }
        true
    }

    fn evict_least_diverse(&mut self) {
        let distances = crowding_distances(&self.variants);
        let (worst_idx, _) = distances.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).unwrap()).expect("non-empty front");
        self.variants.remove(worst_idx);
    }
}

/// Sum over components of the range-normalized nearest-neighbor gap;
/// boundary points (smallest/largest on any component) get infinity so they
/// always survive eviction (spec.md §4.8).
fn crowding_distances(variants: &[Variant]) -> Vec<f64> {
    let n = variants.len();
    let mut distances = vec![0.0f64; n];
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }
    let dims = variants[0].scores.as_vec().len();
    for dim in 0..dims {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| variants[a].scores.as_vec()[dim].partial_cmp(&variants[b].scores.as_vec()[dim]).unwrap());
        let lo = variants[order[0]].scores.as_vec()[dim];
        let hi = variants[order[n - 1]].scores.as_vec()[dim];
        let range = (hi - lo).max(1e-9);
        distances[order[0]] = f64::INFINITY;
        distances[order[n - 1]] = f64::INFINITY;
        for w in 1..n - 1 {
            let prev = variants[order[w - 1]].scores.as_vec()[dim];
            let next = variants[order[w + 1]].scores.as_vec()[dim];
            if distances[order[w]].is_finite() {
                distances[order[w]] += (next - prev) / range;
            }
        }
    }
    distances
}

/// Per-operator acceptance/rejection counters and score history, rendered
/// by the reference CLI (spec.md §4.8a) without the optimizer knowing how.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchStats {
    pub operator_usage: HashMap<String, u32>,
    pub accepted: u32,
    pub rejected: u32,
    pub score_history: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best: Variant,
    pub pareto_front: Vec<Variant>,
    pub stats: SearchStats,
    pub iterations_run: u64,
    pub cancelled: Option<EngineError>,
}

/// Violation-guided local search (spec.md §4.8): repeatedly detect
/// violations, map each to a move operator, accept strict weighted-score
/// improvements or Pareto-non-dominated candidates, and stop on no
/// improving move, iteration cap, wall-clock budget, or cancellation.
/// Deterministic under `params.seed`.
pub fn optimize(graph: &Graph, ontology: &Ontology, params: &OptimizerParams, cancel_flag: &AtomicBool) -> OptimizationResult {
    let started = Instant::now();
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut current = Variant::new(graph.clone(), ontology, params);
    let mut front = ParetoFront::new(params.pareto_capacity);
    front.try_insert(current.clone_for_front());
    let mut stats = SearchStats::default();
    stats.score_history.push(current.weighted_score);

    let mut iterations_run = 0u64;
    let mut cancelled = None;

    for _ in 0..params.max_iterations {
        if cancel_flag.load(Ordering::Relaxed) {
            cancelled = Some(EngineError::OptimizerCancelled { iterations: iterations_run });
            break;
        }
        if started.elapsed().as_millis() as u64 > params.time_budget_ms {
            cancelled = Some(EngineError::OptimizerCancelled { iterations: iterations_run });
            break;
        }

        let evaluation = rules::evaluate(&current.graph, ontology, Phase::All);
        if evaluation.violations.is_empty() {
            break;
        }

        let mut best_candidate: Option<(Variant, String)> = None;
        for violation in pick_violations(&evaluation.violations, &mut rng) {
            let Some(op_name) = operators::operator_for(violation) else { continue };
            let Ok(candidate_graph) = operators::apply_operator(op_name, &current.graph, ontology, violation, params) else {
                continue;
            };
            let candidate = Variant::new(candidate_graph, ontology, params);
            if best_candidate.as_ref().map(|(b, _)| candidate.weighted_score > b.weighted_score).unwrap_or(true) {
                best_candidate = Some((candidate, op_name.to_string()));
            }
        }

        iterations_run += 1;

        let Some((candidate, op_name)) = best_candidate else {
            break;
        };

        let improves = candidate.weighted_score > current.weighted_score;
        let non_dominated = front.try_insert(candidate.clone_for_front());
        *stats.operator_usage.entry(op_name).or_insert(0) += 1;

        if improves || non_dominated {
            current = candidate;
            stats.accepted += 1;
        } else {
            stats.rejected += 1;
        }
        stats.score_history.push(current.weighted_score);

        if !improves && !non_dominated {
            break;
        }
    }

    let pareto_front = front.variants().to_vec();
    OptimizationResult { best: current, pareto_front, stats, iterations_run, cancelled }
}

/// Violations are visited in a seed-stable shuffled order so the "best
/// candidate wins" tie-break is deterministic but not always favoring the
/// first rule in the catalog.
fn pick_violations<'a>(violations: &'a [Violation], rng: &mut StdRng) -> Vec<&'a Violation> {
    use rand::seq::SliceRandom;
    let mut refs: Vec<&Violation> = violations.iter().collect();
    refs.shuffle(rng);
    refs
}

impl Variant {
    fn clone_for_front(&self) -> Variant {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF, DEMO_GRAPH_WITH_VIOLATIONS_DIFF};

    fn load(diff_text: &str) -> (Graph, Ontology) {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let mut graph = Graph::new("ws", "sys");
        diff::apply_to_graph(&mut graph, &ontology, &diff::parse(diff_text)).unwrap();
        (graph, ontology)
    }

    #[test]
    fn empty_graph_scores_one_on_every_component() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        let graph = Graph::new("ws", "sys");
        let params = OptimizerParams::default();
        let scores = score(&graph, &ontology, &params);
        assert_eq!(scores.conformance, 1.0);
        assert_eq!(scores.cohesion, 1.0);
        assert_eq!(scores.coupling, 1.0);
        assert_eq!(scores.traceability, 1.0);
    }

    #[test]
    fn pareto_front_never_keeps_a_dominated_variant() {
        let (graph, ontology) = load(DEMO_GRAPH_DIFF);
        let params = OptimizerParams::default();
        let mut front = ParetoFront::new(5);
        let weak = Variant::new(graph.clone(), &ontology, &params);
        let mut strong_scores = weak.scores;
        strong_scores.conformance = (strong_scores.conformance + 0.1).min(1.0);
        let strong = Variant { graph: graph.clone(), scores: strong_scores, weighted_score: strong_scores.weighted_mean(&params.weights) };

        front.try_insert(weak.clone_for_front());
        front.try_insert(strong.clone_for_front());
        assert_eq!(front.variants().len(), 1);
        assert_eq!(front.variants()[0].scores.conformance, strong_scores.conformance);
    }

    #[test]
    fn search_improves_or_holds_weighted_score() {
        let (graph, ontology) = load(DEMO_GRAPH_WITH_VIOLATIONS_DIFF);
        let params = OptimizerParams { max_iterations: 10, ..OptimizerParams::default() };
        let cancel = AtomicBool::new(false);
        let initial = Variant::new(graph.clone(), &ontology, &params).weighted_score;
        let result = optimize(&graph, &ontology, &params, &cancel);
        assert!(result.best.weighted_score >= initial - 1e-9);
        assert!(result.stats.score_history.first().copied().unwrap() <= result.stats.score_history.last().copied().unwrap() + 1e-9);
    }

    #[test]
    fn cooperative_cancellation_stops_the_search() {
        let (graph, ontology) = load(DEMO_GRAPH_WITH_VIOLATIONS_DIFF);
        let params = OptimizerParams::default();
        let cancel = AtomicBool::new(true);
        let result = optimize(&graph, &ontology, &params, &cancel);
        assert!(result.cancelled.is_some());
        assert_eq!(result.iterations_run, 0);
    }
}
