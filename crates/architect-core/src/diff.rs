//! Compact-Diff Codec (spec.md §4.4): the line-oriented "Format E" wire
//! format. A tolerant parser turns text into node/edge operations; a
//! deterministic serializer turns a resolved node/edge set back into the
//! canonical text.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::graph::{Graph, NodeUpdate};
use crate::model::{AttributeValue, Edge, EdgeKind, Node, NodeAttributes};
use crate::ontology::Ontology;
use crate::semantic_id;

/// One line that failed to parse cleanly. The parser never aborts on these
/// — it counts them and keeps going (spec.md §4.4 "Parser contract").
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    pub line: usize,
    pub text: String,
    pub message: String,
}

/// `<base_snapshot>SystemID@version</base_snapshot>`.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseSnapshot {
    pub system_id: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOp {
    Add { id: String, description: String, attributes: NodeAttributes },
    Remove { id: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeOp {
    Add { source: String, kind: EdgeKind, target: String },
    Remove { source: String, kind: EdgeKind, target: String },
}

/// The result of parsing one document, diff or full-graph alike.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDocument {
    pub view_context: Option<String>,
    pub base_snapshot: Option<BaseSnapshot>,
    pub node_ops: Vec<NodeOp>,
    pub edge_ops: Vec<EdgeOp>,
    pub warnings: Vec<ParseWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    ViewContext,
    Nodes,
    Edges,
}

fn normalize_header(raw: &str) -> Option<&'static str> {
    let stripped = raw.trim().trim_start_matches('#').trim().trim_start_matches('[').trim_end_matches(']').trim();
    let lowered = stripped.to_ascii_lowercase().replace(['_', ' '], "-");
    match lowered.as_str() {
        "nodes" => Some("nodes"),
        "edges" => Some("edges"),
        "view-context" => Some("view-context"),
        _ => None,
    }
}

fn arrow_to_kind(word: &str) -> Option<EdgeKind> {
    match word {
        "cp" | "compose" => Some(EdgeKind::Compose),
        "io" => Some(EdgeKind::Io),
        "sat" | "satisfy" => Some(EdgeKind::Satisfy),
        "ver" | "verify" => Some(EdgeKind::Verify),
        "alc" | "allocate" => Some(EdgeKind::Allocate),
        "rel" | "relation" => Some(EdgeKind::Relation),
        _ => None,
    }
}

fn short_arrow(kind: EdgeKind) -> &'static str {
    match kind {
        EdgeKind::Compose => "cp",
        EdgeKind::Io => "io",
        EdgeKind::Satisfy => "sat",
        EdgeKind::Verify => "ver",
        EdgeKind::Allocate => "alc",
        EdgeKind::Relation => "rel",
    }
}

/// Forbidden per spec.md §4.4: names may not be decorated with `~`/`*`
/// prefixes or a `_v<digits>` suffix — kind and name are derived from the
/// id alone.
fn has_invented_decoration(id: &str) -> bool {
    let name_part = id.split('.').next().unwrap_or(id);
    if name_part.starts_with('~') || name_part.starts_with('*') {
        return true;
    }
    if let Some(idx) = name_part.rfind("_v") {
        let suffix = &name_part[idx + 2..];
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    false
}

fn parse_attribute_value(raw: &str) -> AttributeValue {
    match raw.parse::<f64>() {
        Ok(n) => AttributeValue::Number(n),
        Err(_) => AttributeValue::Text(raw.to_string()),
    }
}

fn parse_attributes(raw: &str) -> NodeAttributes {
    let mut attrs = NodeAttributes::default();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        if let Some((key, value)) = pair.split_once(':') {
            attrs.set(key.trim(), parse_attribute_value(value.trim()));
        }
    }
    attrs
}

fn parse_node_line(line: &str, line_no: usize, warnings: &mut Vec<ParseWarning>) -> Option<NodeOp> {
    let (prefix, rest) = split_prefix(line);
    let rest = rest.trim();
    let Some((id_part, tail)) = rest.split_once('|') else {
        warnings.push(ParseWarning {
            line: line_no,
            text: line.to_string(),
            message: "node line missing `|description` separator".to_string(),
        });
        return None;
    };
    let id = id_part.trim().to_string();
    if id.is_empty() || has_invented_decoration(&id) {
        warnings.push(ParseWarning {
            line: line_no,
            text: line.to_string(),
            message: format!("semantic id `{id}` is empty or carries a forbidden decoration"),
        });
        return None;
    }
    if semantic_id::extract(&id).is_err() {
        warnings.push(ParseWarning {
            line: line_no,
            text: line.to_string(),
            message: format!("semantic id `{id}` does not match `Name.TypeAbbr.Counter`"),
        });
        return None;
    }

    if prefix == Some('-') {
        return Some(NodeOp::Remove { id });
    }

    let (description, attrs_raw) = match (tail.rfind('['), tail.rfind(']')) {
        (Some(open), Some(close)) if close > open => (tail[..open].trim().to_string(), Some(&tail[open + 1..close])),
        _ => (tail.trim().to_string(), None),
    };
    let attributes = attrs_raw.map(parse_attributes).unwrap_or_default();
    Some(NodeOp::Add { id, description, attributes })
}

fn split_prefix(line: &str) -> (Option<char>, &str) {
    match line.chars().next() {
        Some(c @ ('+' | '-')) => (Some(c), &line[1..]),
        _ => (None, line),
    }
}

fn parse_edge_line(line: &str, line_no: usize, warnings: &mut Vec<ParseWarning>) -> Vec<EdgeOp> {
    let (prefix, rest) = split_prefix(line);
    let rest = rest.trim();
    let Some(src_end) = rest.find(char::is_whitespace) else {
        warnings.push(ParseWarning { line: line_no, text: line.to_string(), message: "edge line missing arrow".to_string() });
        return Vec::new();
    };
    let source = rest[..src_end].trim().to_string();
    let remainder = rest[src_end..].trim_start();
    let Some(arrow_end) = remainder.find(char::is_whitespace) else {
        warnings.push(ParseWarning { line: line_no, text: line.to_string(), message: "edge line missing targets".to_string() });
        return Vec::new();
    };
    let arrow_token = &remainder[..arrow_end];
    let targets_str = remainder[arrow_end..].trim_start();

    let Some(word) = arrow_token.strip_prefix('-').and_then(|s| s.strip_suffix("->")) else {
        warnings.push(ParseWarning { line: line_no, text: line.to_string(), message: format!("malformed arrow `{arrow_token}`") });
        return Vec::new();
    };
    let Some(kind) = arrow_to_kind(word) else {
        warnings.push(ParseWarning { line: line_no, text: line.to_string(), message: format!("unknown edge kind `{word}`") });
        return Vec::new();
    };

    if has_invented_decoration(&source) {
        warnings.push(ParseWarning {
            line: line_no,
            text: line.to_string(),
            message: format!("source id `{source}` carries a forbidden decoration"),
        });
        return Vec::new();
    }

    let mut ops = Vec::new();
    for target in targets_str.split(',') {
        let target = target.trim().to_string();
        if target.is_empty() {
            continue;
        }
        if has_invented_decoration(&target) {
            warnings.push(ParseWarning {
                line: line_no,
                text: line.to_string(),
                message: format!("target id `{target}` carries a forbidden decoration"),
            });
            continue;
        }
        ops.push(match prefix {
            Some('-') => EdgeOp::Remove { source: source.clone(), kind, target },
            _ => EdgeOp::Add { source: source.clone(), kind, target },
        });
    }
    ops
}

/// Parse a Format E document: a bare full-graph dump or a
/// `<operations>...</operations>`-wrapped diff, both accepted identically
/// apart from the envelope tags themselves.
pub fn parse(text: &str) -> ParsedDocument {
    let mut doc = ParsedDocument::default();
    let mut section = Section::None;
    let mut nodes_section_seen = false;
    let mut edges_section_seen = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(inner) = line.strip_prefix("<base_snapshot>").and_then(|s| s.strip_suffix("</base_snapshot>")) {
            if let Some((sys, ver)) = inner.split_once('@') {
                if let Ok(version) = ver.parse::<u64>() {
                    doc.base_snapshot = Some(BaseSnapshot { system_id: sys.to_string(), version });
                }
            }
            continue;
        }
        if let Some(inner) = line.strip_prefix("<view_context>").and_then(|s| s.strip_suffix("</view_context>")) {
            doc.view_context = Some(inner.trim().to_string());
            continue;
        }
        if line == "<operations>" || line == "</operations>" {
            continue;
        }

        if line.starts_with("##") || (line.starts_with('[') && line.ends_with(']')) {
            if let Some(name) = normalize_header(line) {
                section = match name {
                    "nodes" => {
                        nodes_section_seen = true;
                        Section::Nodes
                    }
                    "edges" => {
                        edges_section_seen = true;
                        Section::Edges
                    }
                    "view-context" => Section::ViewContext,
                    _ => Section::None,
                };
                continue;
            }
        }

        if line.starts_with('#') {
            continue; // bare comment line, not a section header
        }

        match section {
            Section::None => {
                doc.warnings.push(ParseWarning {
                    line: line_no,
                    text: raw_line.to_string(),
                    message: "content line outside any section".to_string(),
                });
            }
            Section::ViewContext => {
                if let Some(name) = line.strip_prefix("Type:") {
                    doc.view_context = Some(name.trim().to_string());
                }
            }
            Section::Nodes => {
                if let Some(op) = parse_node_line(line, line_no, &mut doc.warnings) {
                    doc.node_ops.push(op);
                }
            }
            Section::Edges => {
                doc.edge_ops.extend(parse_edge_line(line, line_no, &mut doc.warnings));
            }
        }
    }

    if nodes_section_seen && doc.node_ops.is_empty() {
        let msg = "`## Nodes` section produced zero operations";
        tracing::warn!(msg);
        doc.warnings.push(ParseWarning { line: 0, text: String::new(), message: msg.to_string() });
    }
    if edges_section_seen && doc.edge_ops.is_empty() {
        let msg = "`## Edges` section produced zero operations";
        tracing::warn!(msg);
        doc.warnings.push(ParseWarning { line: 0, text: String::new(), message: msg.to_string() });
    }

    doc
}

impl ParsedDocument {
    /// Resolve this document's ops into the flat node/edge set they denote:
    /// later ops win over earlier ones with the same identity, and removes
    /// delete. `workspace_id`/`system_id` stamp freshly-created nodes/edges.
    pub fn resolve(&self, workspace_id: &str, system_id: &str) -> Result<(Vec<Node>, Vec<Edge>), EngineError> {
        let mut node_order = Vec::new();
        let mut nodes: HashMap<String, Node> = HashMap::new();
        for op in &self.node_ops {
            match op {
                NodeOp::Add { id, description, attributes } => {
                    let extracted = semantic_id::extract(id)?;
                    let mut node = nodes.remove(id).unwrap_or_else(|| {
                        Node::new(id.clone(), extracted.kind, extracted.name.clone(), String::new(), workspace_id.to_string(), system_id.to_string())
                    });
                    node.description = description.clone();
                    node.attributes = attributes.clone();
                    if !node_order.contains(id) {
                        node_order.push(id.clone());
                    }
                    nodes.insert(id.clone(), node);
                }
                NodeOp::Remove { id } => {
                    nodes.remove(id);
                }
            }
        }

        let mut edge_map: HashMap<String, Edge> = HashMap::new();
        for op in &self.edge_ops {
            match op {
                EdgeOp::Add { source, kind, target } => {
                    let edge = Edge::new(source.clone(), *kind, target.clone(), workspace_id.to_string(), system_id.to_string());
                    edge_map.insert(edge.composite_key(), edge);
                }
                EdgeOp::Remove { source, kind, target } => {
                    edge_map.remove(&crate::model::composite_key(source, *kind, target));
                }
            }
        }

        let nodes = node_order.into_iter().filter_map(|id| nodes.remove(&id)).collect();
        let edges = edge_map.into_values().collect();
        Ok((nodes, edges))
    }
}

/// Canonical serialization of a resolved node/edge set: node order as
/// given (insertion order, stable); edges grouped by `(source, kind)` with
/// fanned-out targets, sorted for determinism.
pub fn serialize(nodes: &[Node], edges: &[Edge]) -> String {
    let mut out = String::new();
    out.push_str("## Nodes\n");
    for node in nodes {
        out.push_str(&node.id);
        out.push('|');
        out.push_str(&node.description);
        let entries = node.attributes.entries();
        if !entries.is_empty() {
            out.push_str(" [");
            let rendered: Vec<String> = entries.iter().map(|(k, v)| format!("{k}:{v}")).collect();
            out.push_str(&rendered.join(","));
            out.push(']');
        }
        out.push('\n');
    }

    out.push_str("\n## Edges\n");
    let mut grouped: Vec<(&str, EdgeKind, Vec<&str>)> = Vec::new();
    let mut sorted_edges: Vec<&Edge> = edges.iter().collect();
    sorted_edges.sort_by(|a, b| (a.source.as_str(), a.kind as u8, a.target.as_str()).cmp(&(b.source.as_str(), b.kind as u8, b.target.as_str())));
    for edge in &sorted_edges {
        match grouped.last_mut() {
            Some((src, kind, targets)) if *src == edge.source && *kind == edge.kind => {
                targets.push(&edge.target);
            }
            _ => grouped.push((&edge.source, edge.kind, vec![&edge.target])),
        }
    }
    for (src, kind, targets) in grouped {
        out.push_str(src);
        out.push_str(" -");
        out.push_str(short_arrow(kind));
        out.push_str("-> ");
        out.push_str(&targets.join(", "));
        out.push('\n');
    }
    out
}

/// Tally of what a live `apply_to_graph` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub nodes_removed: usize,
    pub edges_added: usize,
    pub edges_removed: usize,
    pub new_version: u64,
}

/// Apply a parsed document to a live graph, whole-batch atomic: on the
/// first failing operation nothing is committed (spec.md §4.3).
pub fn apply_to_graph(graph: &mut Graph, ontology: &Ontology, doc: &ParsedDocument) -> Result<DiffSummary, EngineError> {
    let mut working = graph.clone();
    let mut summary = DiffSummary::default();

    for op in &doc.node_ops {
        match op {
            NodeOp::Add { id, description, attributes } => {
                if working.has_node(id) {
                    working.update_node(
                        id,
                        NodeUpdate { name: None, description: Some(description.clone()), attributes: Some(attributes.clone()) },
                    )?;
                    summary.nodes_updated += 1;
                } else {
                    let extracted = semantic_id::extract(id)?;
                    let mut node = Node::new(
                        id.clone(),
                        extracted.kind,
                        extracted.name,
                        description.clone(),
                        working.workspace_id.clone(),
                        working.system_id.clone(),
                    );
                    node.attributes = attributes.clone();
                    working.add_node(node)?;
                    summary.nodes_added += 1;
                }
            }
            NodeOp::Remove { id } => {
                if working.remove_node(id).is_some() {
                    summary.nodes_removed += 1;
                }
            }
        }
    }

    for op in &doc.edge_ops {
        match op {
            EdgeOp::Add { source, kind, target } => {
                let edge = Edge::new(source.clone(), *kind, target.clone(), working.workspace_id.clone(), working.system_id.clone());
                working.add_edge(edge, ontology)?;
                summary.edges_added += 1;
            }
            EdgeOp::Remove { source, kind, target } => {
                if working.remove_edge(source, *kind, target) {
                    summary.edges_removed += 1;
                }
            }
        }
    }

    summary.new_version = working.version();
    *graph = working;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{DEFAULT_ONTOLOGY_JSON, DEMO_GRAPH_DIFF};

    fn ontology() -> Ontology {
        Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap()
    }

    #[test]
    fn parses_demo_graph_without_warnings() {
        let doc = parse(DEMO_GRAPH_DIFF);
        assert!(doc.warnings.is_empty(), "unexpected warnings: {:?}", doc.warnings);
        assert_eq!(doc.node_ops.len(), 12);
        assert!(doc.edge_ops.len() >= 12);
    }

    #[test]
    fn fans_out_one_to_n_edge_lines() {
        let doc = parse("## Edges\nA.MD.001 -cp-> B.MD.002, C.MD.003\n");
        assert_eq!(doc.edge_ops.len(), 2);
    }

    #[test]
    fn tolerates_missing_plus_prefix() {
        let doc = parse("## Nodes\nThing.UC.001|A thing\n");
        assert_eq!(doc.node_ops, vec![NodeOp::Add { id: "Thing.UC.001".into(), description: "A thing".into(), attributes: NodeAttributes::default() }]);
    }

    #[test]
    fn rejects_invented_name_decoration() {
        let doc = parse("## Nodes\n+~Thing.UC.001|A thing\n");
        assert!(doc.node_ops.is_empty());
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn warns_on_empty_nonempty_section() {
        let doc = parse("## Nodes\n# just a comment, no real lines\n");
        assert!(doc.warnings.iter().any(|w| w.message.contains("zero operations")));
    }

    #[test]
    fn apply_is_whole_batch_atomic() {
        let ont = ontology();
        let mut graph = Graph::new("ws", "sys");
        let doc = parse("## Nodes\n+A.MD.001|desc\n+B.MD.002|desc\n\n## Edges\nA.MD.001 -cp-> B.MD.002\nA.MD.001 -cp-> Missing.MD.003\n");
        let before_version = graph.version();
        assert!(apply_to_graph(&mut graph, &ont, &doc).is_err());
        assert_eq!(graph.version(), before_version);
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn apply_commits_on_success() {
        let ont = ontology();
        let mut graph = Graph::new("ws", "sys");
        let doc = parse(DEMO_GRAPH_DIFF);
        let summary = apply_to_graph(&mut graph, &ont, &doc).unwrap();
        assert_eq!(summary.nodes_added, 12);
        assert_eq!(graph.node_count(), 12);
    }

    #[test]
    fn round_trip_is_idempotent() {
        let doc = parse(DEMO_GRAPH_DIFF);
        let (nodes, edges) = doc.resolve("ws", "sys").unwrap();
        let once = serialize(&nodes, &edges);
        let doc2 = parse(&once);
        let (nodes2, edges2) = doc2.resolve("ws", "sys").unwrap();
        let twice = serialize(&nodes2, &edges2);
        assert_eq!(once, twice);
    }
}
