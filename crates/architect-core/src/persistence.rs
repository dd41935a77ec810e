//! External interfaces (spec.md §6): persistence and session state are
//! "consumed, not defined" by this crate. We fix their Rust shape as traits
//! and leave the database driver to whatever embeds the engine, the same
//! split the teacher draws between `canopy-core::cache` and a real store.

use crate::error::EngineError;
use crate::model::{Edge, Node};

/// Count of rows actually written by a `save_graph` call, for CLI/caller
/// reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedCounts {
    pub nodes_written: usize,
    pub edges_written: usize,
}

/// Load and save the durable graph for a `(workspace_id, system_id)` pair.
/// Implementations own whatever storage engine backs them; this crate never
/// opens a connection itself.
pub trait GraphStore {
    fn load_graph(&self, workspace_id: &str, system_id: &str) -> Result<(Vec<Node>, Vec<Edge>), EngineError>;

    fn save_graph(&self, workspace_id: &str, system_id: &str, dirty_nodes: &[Node], dirty_edges: &[Edge]) -> Result<PersistedCounts, EngineError>;
}

/// Which workspace/system/chat a user is currently looking at. Carried
/// across requests by whatever session layer sits in front of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: String,
    pub workspace_id: String,
    pub active_system_id: Option<String>,
    pub chat_id: Option<String>,
}

pub trait SessionStore {
    fn load_session(&self, user_id: &str) -> Result<Option<SessionState>, EngineError>;

    fn save_session(&self, state: &SessionState) -> Result<(), EngineError>;
}

#[cfg(test)]
pub(crate) mod test_double {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory stand-in used only by this crate's own tests. Mirrors the
    /// teacher's cache marker in spirit: no real durability, just enough to
    /// exercise the trait boundary.
    #[derive(Default)]
    pub struct NullGraphStore {
        graphs: RefCell<HashMap<(String, String), (Vec<Node>, Vec<Edge>)>>,
    }

    impl NullGraphStore {
        pub fn new() -> Self {
            NullGraphStore::default()
        }
    }

    impl GraphStore for NullGraphStore {
        fn load_graph(&self, workspace_id: &str, system_id: &str) -> Result<(Vec<Node>, Vec<Edge>), EngineError> {
            Ok(self.graphs.borrow().get(&(workspace_id.to_string(), system_id.to_string())).cloned().unwrap_or_default())
        }

        fn save_graph(&self, workspace_id: &str, system_id: &str, dirty_nodes: &[Node], dirty_edges: &[Edge]) -> Result<PersistedCounts, EngineError> {
            let key = (workspace_id.to_string(), system_id.to_string());
            let mut graphs = self.graphs.borrow_mut();
            let entry = graphs.entry(key).or_default();
            entry.0 = dirty_nodes.to_vec();
            entry.1 = dirty_edges.to_vec();
            Ok(PersistedCounts { nodes_written: dirty_nodes.len(), edges_written: dirty_edges.len() })
        }
    }

    #[derive(Default)]
    pub struct NullSessionStore {
        sessions: RefCell<HashMap<String, SessionState>>,
    }

    impl NullSessionStore {
        pub fn new() -> Self {
            NullSessionStore::default()
        }
    }

    impl SessionStore for NullSessionStore {
        fn load_session(&self, user_id: &str) -> Result<Option<SessionState>, EngineError> {
            Ok(self.sessions.borrow().get(user_id).cloned())
        }

        fn save_session(&self, state: &SessionState) -> Result<(), EngineError> {
            self.sessions.borrow_mut().insert(state.user_id.clone(), state.clone());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_double::{NullGraphStore, NullSessionStore};
    use super::*;
    use crate::model::NodeKind;

    #[test]
    fn round_trips_through_the_null_store() {
        let store = NullGraphStore::new();
        let node = Node::new("Sys.SY.001".into(), NodeKind::Sys, "Sys".into(), "".into(), "ws".into(), "sys".into());
        let counts = store.save_graph("ws", "sys", &[node.clone()], &[]).unwrap();
        assert_eq!(counts, PersistedCounts { nodes_written: 1, edges_written: 0 });
        let (nodes, edges) = store.load_graph("ws", "sys").unwrap();
        assert_eq!(nodes, vec![node]);
        assert!(edges.is_empty());
    }

    #[test]
    fn unknown_workspace_loads_empty() {
        let store = NullGraphStore::new();
        let (nodes, edges) = store.load_graph("nope", "nope").unwrap();
        assert!(nodes.is_empty() && edges.is_empty());
    }

    #[test]
    fn session_store_round_trips() {
        let store = NullSessionStore::new();
        let state = SessionState { user_id: "u1".into(), workspace_id: "ws".into(), active_system_id: Some("sys".into()), chat_id: None };
        store.save_session(&state).unwrap();
        assert_eq!(store.load_session("u1").unwrap(), Some(state));
        assert_eq!(store.load_session("u2").unwrap(), None);
    }
}
