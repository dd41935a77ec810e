//! Reference CLI command implementations (spec.md §6 / SPEC_FULL.md A4).

use std::sync::atomic::AtomicBool;

use anyhow::Context;
use architect_core::{diff, fixtures, optimizer, Graph, Ontology, Phase, Violation};

pub fn list_fixtures() {
    println!("available fixtures:");
    for name in fixtures::FIXTURE_NAMES {
        println!("  {name}");
    }
}

pub fn run(fixture_name: &str, params: architect_core::OptimizerParams) -> anyhow::Result<()> {
    let ontology = Ontology::load(fixtures::DEFAULT_ONTOLOGY_JSON).context("loading the default ontology")?;

    let diff_text = fixtures::fixture_diff(fixture_name)
        .ok_or_else(|| anyhow::anyhow!("unknown fixture `{fixture_name}` (pass --list to see available names)"))?;

    let mut graph = Graph::new("cli", fixture_name);
    let doc = diff::parse(diff_text);
    for warning in &doc.warnings {
        tracing::warn!("{}: {} ({})", warning.line, warning.message, warning.text);
    }
    diff::apply_to_graph(&mut graph, &ontology, &doc).context("applying the fixture diff")?;

    tracing::info!("loaded `{fixture_name}`: {} nodes, {} edges", graph.node_count(), graph.edge_count());

    let initial = architect_core::evaluate(&graph, &ontology, Phase::All);
    println!("initial score: {:.3}", initial.reward_score);
    print_violations(&initial.violations);

    let cancel = AtomicBool::new(false);
    let result = optimizer::optimize(&graph, &ontology, &params, &cancel);

    println!();
    println!("search progress:");
    for (i, score) in result.stats.score_history.iter().enumerate() {
        println!("  iteration {i}: weighted score {score:.3}");
    }

    let final_eval = architect_core::evaluate(&result.best.graph, &ontology, Phase::All);
    println!();
    println!("final score: {:.3}", final_eval.reward_score);
    println!("final weighted score: {:.3}", result.best.weighted_score);

    println!();
    println!("operator usage:");
    if result.stats.operator_usage.is_empty() {
        println!("  (no operators applied)");
    } else {
        let mut ops: Vec<(&String, &u32)> = result.stats.operator_usage.iter().collect();
        ops.sort_by_key(|(name, _)| name.clone());
        for (op, count) in ops {
            println!("  {op}: {count}");
        }
    }
    println!("accepted: {}, rejected: {}", result.stats.accepted, result.stats.rejected);

    println!();
    println!("final violations:");
    print_violations(&final_eval.violations);

    if let Some(reason) = &result.cancelled {
        tracing::warn!("search stopped early: {reason}");
    }

    Ok(())
}

fn print_violations(violations: &[Violation]) {
    if violations.is_empty() {
        println!("  (none)");
        return;
    }
    for v in violations {
        let suggestion = v.suggested_fix.as_deref().unwrap_or("(no suggestion)");
        println!("  [{:?}] {}: {} ({})", v.severity, v.rule_id, v.human_message, suggestion);
    }
}
