//! Node handles.
//!
//! A node under test is an addressable entity exposing two capabilities:
//! applying a configuration mutation and answering a state query with a
//! [`Snapshot`]. The concrete mechanism behind a handle — process exec,
//! RPC, socket — is a backend detail; the engine only sees the
//! [`NodeHandle`] trait.
//!
//! `mutate` is a single request expected to apply synchronously, but its
//! *effects* (route installation, adjacency state) converge asynchronously.
//! That asymmetry is why queries are driven through the convergence poller
//! rather than checked once. `query` must be idempotent and side-effect
//! free.

pub mod exec;
pub mod scripted;

use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use exec::{ExecNode, ExecNodeSpec};
pub use scripted::ScriptedNode;

/// Errors surfaced by node backends.
///
/// The split between transient and fatal kinds drives the poller's retry
/// decision: transient failures are expected while a node converges and
/// are retried; fatal failures will never converge and abort the attempt
/// loop immediately.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    /// The node did not answer within the backend's deadline. Transient.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The transport to the node dropped mid-request. Transient.
    #[error("connection to node lost: {0}")]
    ConnectionLost(String),

    /// The node answered with output that does not parse as a snapshot.
    /// Transient: nodes mid-convergence may emit empty or partial output.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The node rejected the command. Fatal: retrying an unknown or
    /// malformed command never converges.
    #[error("command rejected: {0}")]
    CommandRejected(String),

    /// No such node. Fatal.
    #[error("node not found: {0}")]
    NotFound(String),
}

impl NodeError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NodeError::Timeout(_) | NodeError::ConnectionLost(_) | NodeError::MalformedResponse(_)
        )
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}

/// One addressable node under test.
#[async_trait]
pub trait NodeHandle: Send + Sync + std::fmt::Debug {
    /// Unique node name within the topology.
    fn name(&self) -> &str;

    /// Apply a configuration mutation. The payload is opaque to the
    /// engine; parsing belongs to the backend. Callers must never issue
    /// two concurrent mutations to the same node.
    async fn mutate(&self, config: &str) -> Result<(), NodeError>;

    /// Execute a state query and return the observed snapshot.
    async fn query(&self, command: &str) -> Result<Snapshot, NodeError>;
}

/// Shared registry of node handles, keyed by name.
///
/// Handles are borrowed references into externally managed topology state:
/// the set shares them, it does not own node lifecycle.
#[derive(Clone, Default)]
pub struct NodeSet {
    nodes: HashMap<String, Arc<dyn NodeHandle>>,
}

impl NodeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under its own name. Replaces any previous handle
    /// with the same name.
    pub fn insert(&mut self, node: Arc<dyn NodeHandle>) {
        self.nodes.insert(node.name().to_string(), node);
    }

    /// Look up a handle, surfacing the fatal `NotFound` kind for unknown
    /// names.
    pub fn get(&self, name: &str) -> Result<Arc<dyn NodeHandle>, NodeError> {
        self.nodes
            .get(name)
            .cloned()
            .ok_or_else(|| NodeError::NotFound(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in unspecified order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }
}
