//! Ontology Registry (spec.md §4.1): loads the one configuration document
//! describing node/edge kinds, the nesting-edge set, the valid-connection
//! table, and the rule catalog.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::model::{EdgeKind, NodeKind};

/// One endpoint of a valid-connection entry: either a specific kind or the
/// `ANY` wildcard (spec.md §4.1, used by `relation`'s permissive rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnEndpoint {
    Any,
    Kind(NodeKind),
}

impl ConnEndpoint {
    fn matches(self, kind: NodeKind) -> bool {
        match self {
            ConnEndpoint::Any => true,
            ConnEndpoint::Kind(k) => k == kind,
        }
    }

    fn parse(raw: &str) -> Result<ConnEndpoint, EngineError> {
        if raw.eq_ignore_ascii_case("any") {
            return Ok(ConnEndpoint::Any);
        }
        kind_from_full_name(raw)
            .map(ConnEndpoint::Kind)
            .ok_or_else(|| EngineError::ConfigInvalid {
                reason: format!("unknown node kind `{raw}` in validConnections"),
            })
    }
}

fn kind_from_full_name(name: &str) -> Option<NodeKind> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "SYS" => Some(NodeKind::Sys),
        "UC" => Some(NodeKind::Uc),
        "ACTOR" => Some(NodeKind::Actor),
        "FCHAIN" => Some(NodeKind::FChain),
        "FUNC" => Some(NodeKind::Func),
        "FLOW" => Some(NodeKind::Flow),
        "REQ" => Some(NodeKind::Req),
        "TEST" => Some(NodeKind::Test),
        "MOD" => Some(NodeKind::Mod),
        "SCHEMA" => Some(NodeKind::Schema),
        _ => None,
    }
}

fn kind_full_name(kind: NodeKind) -> &'static str {
    match kind {
        NodeKind::Sys => "SYS",
        NodeKind::Uc => "UC",
        NodeKind::Actor => "ACTOR",
        NodeKind::FChain => "FCHAIN",
        NodeKind::Func => "FUNC",
        NodeKind::Flow => "FLOW",
        NodeKind::Req => "REQ",
        NodeKind::Test => "TEST",
        NodeKind::Mod => "MOD",
        NodeKind::Schema => "SCHEMA",
    }
}

fn edge_from_full_name(name: &str) -> Option<EdgeKind> {
    EdgeKind::from_wire_name(&name.to_ascii_lowercase())
}

/// Severity class a rule belongs to (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Hard,
    Soft,
}

/// Which validation phase a rule applies to (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Phase1Requirements,
    Phase2Logical,
    Phase3Physical,
    Phase4Verification,
    All,
}

impl Phase {
    pub fn matches(self, filter: Phase) -> bool {
        filter == Phase::All || self == filter
    }
}

/// One entry in the rule catalog, as loaded from the ontology document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDef {
    pub id: String,
    pub phase: Phase,
    pub severity: Severity,
    pub weight: f64,
    pub description: String,
    #[serde(default)]
    pub parameters: Option<Value>,
    /// Rule catalogs may mark a violation as forcing reward to zero
    /// regardless of accumulated penalty (spec.md §4.5 "fatal").
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub suggested_operator: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNodeType {
    kind: String,
    abbreviation: String,
}

#[derive(Debug, Deserialize)]
struct RawConnection {
    source: String,
    target: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEdgeType {
    kind: String,
    #[serde(default)]
    is_nesting: bool,
    #[serde(default)]
    valid_connections: Vec<RawConnection>,
    #[serde(default)]
    visual_style: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    node_types: Vec<RawNodeType>,
    edge_types: Vec<RawEdgeType>,
    nesting_edge_types: Vec<String>,
    #[serde(default)]
    zoom_levels: Vec<String>,
    semantic_id_format: String,
    #[serde(default)]
    validation_rules: Vec<RuleDef>,
    #[serde(default)]
    decision_trees: Value,
}

/// The loaded, immutable ontology. Safe to share by reference across any
/// number of concurrent callers once loaded (spec.md §5).
#[derive(Debug, Clone)]
pub struct Ontology {
    valid_connections: HashMap<EdgeKind, Vec<(ConnEndpoint, ConnEndpoint)>>,
    nesting_edges: HashSet<EdgeKind>,
    semantic_id_format: Regex,
    rules: Vec<RuleDef>,
    decision_trees: Value,
}

impl Ontology {
    /// Parse and cross-check a JSON ontology document.
    pub fn load(json: &str) -> Result<Ontology, EngineError> {
        let raw: RawDocument = serde_json::from_str(json).map_err(|e| EngineError::ConfigInvalid {
            reason: format!("could not parse ontology document: {e}"),
        })?;

        // Every fixed kind must appear with its canonical abbreviation.
        let mut seen_kinds = HashSet::new();
        for nt in &raw.node_types {
            let kind = kind_from_full_name(&nt.kind).ok_or_else(|| EngineError::ConfigInvalid {
                reason: format!("unknown node kind `{}`", nt.kind),
            })?;
            if nt.abbreviation != kind.abbreviation() {
                return Err(EngineError::ConfigInvalid {
                    reason: format!(
                        "node kind `{}` declares abbreviation `{}`, expected `{}`",
                        nt.kind,
                        nt.abbreviation,
                        kind.abbreviation()
                    ),
                });
            }
            seen_kinds.insert(kind);
        }
        for kind in NodeKind::ALL {
            if !seen_kinds.contains(&kind) {
                return Err(EngineError::ConfigInvalid {
                    reason: format!("ontology document is missing node kind `{}`", kind_full_name(kind)),
                });
            }
        }

        let mut valid_connections: HashMap<EdgeKind, Vec<(ConnEndpoint, ConnEndpoint)>> = HashMap::new();
        let mut declared_nesting = HashSet::new();
        let mut seen_edges = HashSet::new();
        for et in &raw.edge_types {
            let kind = edge_from_full_name(&et.kind).ok_or_else(|| EngineError::ConfigInvalid {
                reason: format!("unknown edge kind `{}`", et.kind),
            })?;
            seen_edges.insert(kind);
            if et.is_nesting {
                declared_nesting.insert(kind);
            }
            let mut pairs = Vec::with_capacity(et.valid_connections.len());
            for conn in &et.valid_connections {
                pairs.push((ConnEndpoint::parse(&conn.source)?, ConnEndpoint::parse(&conn.target)?));
            }
            valid_connections.insert(kind, pairs);
        }
        for kind in EdgeKind::ALL {
            if !seen_edges.contains(&kind) {
                return Err(EngineError::ConfigInvalid {
                    reason: format!("ontology document is missing edge kind `{}`", kind.wire_name()),
                });
            }
        }

        // The nesting-edge set is fixed by the data model (spec.md §3); the
        // document must agree, both via the explicit list and the per-edge
        // `isNesting` flags.
        let mut explicit_nesting = HashSet::new();
        for name in &raw.nesting_edge_types {
            let kind = edge_from_full_name(name).ok_or_else(|| EngineError::ConfigInvalid {
                reason: format!("unknown edge kind `{name}` in nestingEdgeTypes"),
            })?;
            explicit_nesting.insert(kind);
        }
        let fixed_nesting: HashSet<EdgeKind> = EdgeKind::NESTING.into_iter().collect();
        if explicit_nesting != fixed_nesting || declared_nesting != fixed_nesting {
            return Err(EngineError::ConfigInvalid {
                reason: "nestingEdgeTypes must equal {compose, satisfy, allocate}".to_string(),
            });
        }

        let semantic_id_format = Regex::new(&raw.semantic_id_format).map_err(|e| EngineError::ConfigInvalid {
            reason: format!("invalid semanticIdFormat regex: {e}"),
        })?;

        for rule in &raw.validation_rules {
            if rule.weight < 0.0 {
                return Err(EngineError::ConfigInvalid {
                    reason: format!("rule `{}` has a negative weight", rule.id),
                });
            }
        }

        Ok(Ontology {
            valid_connections,
            nesting_edges: fixed_nesting,
            semantic_id_format,
            rules: raw.validation_rules,
            decision_trees: raw.decision_trees,
        })
    }

    pub fn abbreviation_to_kind(&self, abbr: &str) -> Result<NodeKind, EngineError> {
        NodeKind::from_abbreviation(abbr).ok_or_else(|| EngineError::MalformedSemanticId {
            id: abbr.to_string(),
            reason: "unknown abbreviation".to_string(),
        })
    }

    pub fn kind_to_abbreviation(&self, kind: NodeKind) -> &'static str {
        kind.abbreviation()
    }

    pub fn is_nesting_edge(&self, kind: EdgeKind) -> bool {
        self.nesting_edges.contains(&kind)
    }

    pub fn valid_connection(&self, source: NodeKind, edge: EdgeKind, target: NodeKind) -> bool {
        self.valid_connections
            .get(&edge)
            .map(|pairs| pairs.iter().any(|(s, t)| s.matches(source) && t.matches(target)))
            .unwrap_or(false)
    }

    pub fn rule_catalog(&self) -> &[RuleDef] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&RuleDef> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn semantic_id_format(&self) -> &Regex {
        &self.semantic_id_format
    }

    pub fn decision_trees(&self) -> &Value {
        &self.decision_trees
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DEFAULT_ONTOLOGY_JSON;

    #[test]
    fn loads_the_default_fixture() {
        let ontology = Ontology::load(DEFAULT_ONTOLOGY_JSON).unwrap();
        assert!(ontology.is_nesting_edge(EdgeKind::Compose));
        assert!(!ontology.is_nesting_edge(EdgeKind::Io));
        assert!(ontology.valid_connection(NodeKind::Flow, EdgeKind::Io, NodeKind::Func));
        assert!(ontology.valid_connection(NodeKind::Sys, EdgeKind::Relation, NodeKind::Mod));
    }

    #[test]
    fn rejects_missing_node_kind() {
        let doc = DEFAULT_ONTOLOGY_JSON.replace("\"SCHEMA\"", "\"REMOVED\"");
        assert!(Ontology::load(&doc).is_err());
    }

    #[test]
    fn rejects_mismatched_abbreviation() {
        let doc = DEFAULT_ONTOLOGY_JSON.replacen("\"FN\"", "\"XX\"", 1);
        assert!(Ontology::load(&doc).is_err());
    }
}
