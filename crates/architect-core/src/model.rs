//! Core data structures for the architecture graph (spec.md §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the ten fixed node kinds. The ontology document may restyle or
/// reweight these but cannot introduce new ones (spec.md Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeKind {
    Sys,
    Uc,
    Actor,
    FChain,
    Func,
    Flow,
    Req,
    Test,
    Mod,
    Schema,
}

impl NodeKind {
    /// All ten kinds, in a stable order used for deterministic iteration.
    pub const ALL: [NodeKind; 10] = [
        NodeKind::Sys,
        NodeKind::Uc,
        NodeKind::Actor,
        NodeKind::FChain,
        NodeKind::Func,
        NodeKind::Flow,
        NodeKind::Req,
        NodeKind::Test,
        NodeKind::Mod,
        NodeKind::Schema,
    ];

    /// The two-letter abbreviation used in semantic IDs.
    ///
    /// This is the default table; [`crate::ontology::Ontology`] cross-checks
    /// the loaded configuration document against it and fails with
    /// `ConfigInvalid` on disagreement rather than silently overriding it,
    /// since spec.md treats the kind set as fixed.
    pub fn abbreviation(self) -> &'static str {
        match self {
            NodeKind::Sys => "SY",
            NodeKind::Uc => "UC",
            NodeKind::Actor => "AC",
            NodeKind::FChain => "FC",
            NodeKind::Func => "FN",
            NodeKind::Flow => "FL",
            NodeKind::Req => "RQ",
            NodeKind::Test => "TS",
            NodeKind::Mod => "MD",
            NodeKind::Schema => "SC",
        }
    }

    pub fn from_abbreviation(abbr: &str) -> Option<NodeKind> {
        NodeKind::ALL.into_iter().find(|k| k.abbreviation() == abbr)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// One of the six fixed edge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    Compose,
    Io,
    Satisfy,
    Verify,
    Allocate,
    Relation,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 6] = [
        EdgeKind::Compose,
        EdgeKind::Io,
        EdgeKind::Satisfy,
        EdgeKind::Verify,
        EdgeKind::Allocate,
        EdgeKind::Relation,
    ];

    /// The three nesting edge kinds, fixed by spec.md §3.
    pub const NESTING: [EdgeKind; 3] = [EdgeKind::Compose, EdgeKind::Satisfy, EdgeKind::Allocate];

    pub fn is_nesting(self) -> bool {
        Self::NESTING.contains(&self)
    }

    /// Canonical wire name, used in the composite edge key and short arrow.
    pub fn wire_name(self) -> &'static str {
        match self {
            EdgeKind::Compose => "compose",
            EdgeKind::Io => "io",
            EdgeKind::Satisfy => "satisfy",
            EdgeKind::Verify => "verify",
            EdgeKind::Allocate => "allocate",
            EdgeKind::Relation => "relation",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<EdgeKind> {
        Self::ALL.into_iter().find(|k| k.wire_name() == name)
    }
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Zoom level attribute recognized on nodes (spec.md §4.4 attribute list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoomLevel {
    L0,
    L1,
    L2,
    L3,
    L4,
}

impl ZoomLevel {
    pub fn parse(s: &str) -> Option<ZoomLevel> {
        match s {
            "L0" => Some(ZoomLevel::L0),
            "L1" => Some(ZoomLevel::L1),
            "L2" => Some(ZoomLevel::L2),
            "L3" => Some(ZoomLevel::L3),
            "L4" => Some(ZoomLevel::L4),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ZoomLevel::L0 => "L0",
            ZoomLevel::L1 => "L1",
            ZoomLevel::L2 => "L2",
            ZoomLevel::L3 => "L3",
            ZoomLevel::L4 => "L4",
        }
    }
}

/// An untyped attribute value, used only for attribute names this engine
/// doesn't recognize by name (domain extensions beyond `volatility`,
/// `dataType`, `pattern`, `validation`, `x`, `y`, `zoom`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Typed side-table of node attributes (design note: "ad hoc attribute
/// bags"). Recognized keys get dedicated, range-checkable fields; anything
/// else round-trips through `extra` so the codec stays lossless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub zoom: Option<ZoomLevel>,
    /// FUNC volatility in [0,1] — estimated rate of change.
    pub volatility: Option<f64>,
    pub data_type: Option<String>,
    pub pattern: Option<String>,
    pub validation: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, AttributeValue>,
}

impl NodeAttributes {
    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.zoom.is_none()
            && self.volatility.is_none()
            && self.data_type.is_none()
            && self.pattern.is_none()
            && self.validation.is_none()
            && self.extra.is_empty()
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.x, self.y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        }
    }

    /// Set a `key:value` pair parsed off the wire, routing recognized keys
    /// into their typed fields.
    pub fn set(&mut self, key: &str, value: AttributeValue) {
        match key {
            "x" => self.x = as_number(&value),
            "y" => self.y = as_number(&value),
            "zoom" => {
                if let AttributeValue::Text(s) = &value {
                    self.zoom = ZoomLevel::parse(s);
                }
            }
            "volatility" => self.volatility = as_number(&value),
            "dataType" => self.data_type = as_text(&value),
            "pattern" => self.pattern = as_text(&value),
            "validation" => self.validation = as_text(&value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    /// Iterate recognized + extra attributes in deterministic wire order:
    /// x, y, zoom, volatility, dataType, pattern, validation, then extras
    /// sorted by key.
    pub fn entries(&self) -> Vec<(String, AttributeValue)> {
        let mut out = Vec::new();
        if let Some(x) = self.x {
            out.push(("x".to_string(), AttributeValue::Number(x)));
        }
        if let Some(y) = self.y {
            out.push(("y".to_string(), AttributeValue::Number(y)));
        }
        if let Some(z) = self.zoom {
            out.push(("zoom".to_string(), AttributeValue::Text(z.as_str().to_string())));
        }
        if let Some(v) = self.volatility {
            out.push(("volatility".to_string(), AttributeValue::Number(v)));
        }
        if let Some(dt) = &self.data_type {
            out.push(("dataType".to_string(), AttributeValue::Text(dt.clone())));
        }
        if let Some(p) = &self.pattern {
            out.push(("pattern".to_string(), AttributeValue::Text(p.clone())));
        }
        if let Some(v) = &self.validation {
            out.push(("validation".to_string(), AttributeValue::Text(v.clone())));
        }
        for (k, v) in &self.extra {
            out.push((k.clone(), v.clone()));
        }
        out
    }
}

fn as_number(value: &AttributeValue) -> Option<f64> {
    match value {
        AttributeValue::Number(n) => Some(*n),
        AttributeValue::Text(s) => s.parse().ok(),
    }
}

fn as_text(value: &AttributeValue) -> Option<String> {
    match value {
        AttributeValue::Text(s) => Some(s.clone()),
        AttributeValue::Number(n) => Some(n.to_string()),
    }
}

/// A node in the architecture graph. Identity is the semantic `id` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub name: String,
    pub description: String,
    pub workspace_id: String,
    pub system_id: String,
    #[serde(default)]
    pub attributes: NodeAttributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build a node, stamping creation/update timestamps. Agreement between
    /// `id`/`kind`/`name` is the caller's job — see
    /// [`crate::semantic_id::extract`] and `Graph::add_node`'s check.
    pub fn new(
        id: String,
        kind: NodeKind,
        name: String,
        description: String,
        workspace_id: String,
        system_id: String,
    ) -> Self {
        let now = Utc::now();
        Node {
            id,
            kind,
            name,
            description,
            workspace_id,
            system_id,
            attributes: NodeAttributes::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A directed edge. Edges have no semantic ID: identity is the composite
/// key `{source}-{kind}-{target}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub kind: EdgeKind,
    pub target: String,
    pub workspace_id: String,
    pub system_id: String,
    pub label: Option<String>,
}

impl Edge {
    pub fn new(source: String, kind: EdgeKind, target: String, workspace_id: String, system_id: String) -> Self {
        Edge {
            source,
            kind,
            target,
            workspace_id,
            system_id,
            label: None,
        }
    }

    /// The composite key `{source}-{kind}-{target}` that is this edge's identity.
    pub fn composite_key(&self) -> String {
        composite_key(&self.source, self.kind, &self.target)
    }
}

pub fn composite_key(source: &str, kind: EdgeKind, target: &str) -> String {
    format!("{source}-{kind}-{target}")
}

/// Which side of a FUNC/ACTOR a derived port attaches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortSide {
    Left,
    Right,
    Top,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

/// A derived (never stored) attachment point on a FUNC or ACTOR node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    pub owner: String,
    pub direction: PortDirection,
    pub label: String,
    pub side: PortSide,
}
