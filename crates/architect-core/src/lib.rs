//! Architect Core — the in-memory graph model, Format E diff codec,
//! ontology-conformance rule evaluator, view/layout pipeline, and
//! multi-objective optimizer for a systems-engineering modeling platform.

pub mod diff;
pub mod error;
pub mod fixtures;
pub mod graph;
pub mod model;
pub mod ontology;
pub mod persistence;
pub mod rules;
pub mod semantic_id;
pub mod view;

pub mod layout;
pub mod optimizer;

pub use diff::{apply_to_graph, parse, serialize, DiffSummary, ParseWarning, ParsedDocument};
pub use error::{EngineError, Result};
pub use graph::{Graph, GraphStats, NodeUpdate};
pub use model::{AttributeValue, Edge, EdgeKind, Node, NodeAttributes, NodeKind, Port, PortDirection, PortSide};
pub use ontology::{Ontology, Phase};
pub use rules::{evaluate, Violation};
pub use optimizer::{optimize, OptimizationResult, OptimizerParams, ScoreComponents, SearchStats};
