//! Topology and leak-check collaborators.
//!
//! Provisioning nodes, wiring virtual links and watching for resource
//! leaks are someone else's job — the engine only consumes them through
//! the interfaces here. [`TopologyProvider::has_failure`] is consulted
//! before each scenario step so one root failure cascades into clean
//! skips instead of a pile of noisy secondary failures.

use crate::node::{NodeHandle, ScriptedNode};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors from topology provisioning.
#[derive(Debug, Clone, Error)]
pub enum TopologyError {
    #[error("node {0} already exists")]
    DuplicateNode(String),
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("topology backend failure: {0}")]
    Backend(String),
}

/// Provider of node and link lifecycle.
///
/// Lifecycle: nodes are created during topology setup, referenced by name
/// throughout a scenario, and invalidated at teardown.
#[async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn create_node(&self, name: &str) -> Result<Arc<dyn NodeHandle>, TopologyError>;

    async fn link(
        &self,
        node_a: &str,
        node_b: &str,
        iface_a: &str,
        iface_b: &str,
    ) -> Result<(), TopologyError>;

    async fn start(&self) -> Result<(), TopologyError>;

    async fn stop(&self) -> Result<(), TopologyError>;

    /// A fatal condition recorded by the backend (a node that died, a
    /// link that never came up). Consulted before each step.
    fn has_failure(&self) -> Option<String>;
}

/// One leaked resource attributed to a node.
#[derive(Debug, Clone, Serialize)]
pub struct LeakRecord {
    pub node: String,
    pub detail: String,
}

/// Terminal resource-leak report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeakReport {
    pub leaks: Vec<LeakRecord>,
}

impl LeakReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty()
    }
}

/// Hook consulted once at scenario end.
pub trait LeakCheck: Send + Sync {
    fn is_enabled(&self) -> bool;
    fn collect_report(&self) -> LeakReport;
}

/// In-memory topology for tests and local runs: hands out
/// [`ScriptedNode`]s and supports failure injection.
#[derive(Default)]
pub struct ScriptedTopology {
    nodes: Mutex<HashMap<String, Arc<ScriptedNode>>>,
    links: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<String>>,
}

impl ScriptedTopology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fatal topology condition; subsequent steps that depend on
    /// prior success will be skipped.
    pub fn inject_failure(&self, message: impl Into<String>) {
        *self.failure.lock().expect("failure lock") = Some(message.into());
    }

    /// Direct access to a scripted node, for scripting responses.
    #[must_use]
    pub fn scripted(&self, name: &str) -> Option<Arc<ScriptedNode>> {
        self.nodes.lock().expect("nodes lock").get(name).cloned()
    }
}

#[async_trait]
impl TopologyProvider for ScriptedTopology {
    async fn create_node(&self, name: &str) -> Result<Arc<dyn NodeHandle>, TopologyError> {
        let mut nodes = self.nodes.lock().expect("nodes lock");
        if nodes.contains_key(name) {
            return Err(TopologyError::DuplicateNode(name.to_string()));
        }
        let node = Arc::new(ScriptedNode::new(name));
        nodes.insert(name.to_string(), node.clone());
        Ok(node)
    }

    async fn link(
        &self,
        node_a: &str,
        node_b: &str,
        _iface_a: &str,
        _iface_b: &str,
    ) -> Result<(), TopologyError> {
        let nodes = self.nodes.lock().expect("nodes lock");
        for name in [node_a, node_b] {
            if !nodes.contains_key(name) {
                return Err(TopologyError::UnknownNode(name.to_string()));
            }
        }
        drop(nodes);
        self.links
            .lock()
            .expect("links lock")
            .push((node_a.to_string(), node_b.to_string()));
        Ok(())
    }

    async fn start(&self) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), TopologyError> {
        Ok(())
    }

    fn has_failure(&self) -> Option<String> {
        self.failure.lock().expect("failure lock").clone()
    }
}

/// No-op provider for runs where node lifecycle is managed entirely
/// outside the process (the CLI path).
#[derive(Debug, Default)]
pub struct ExternalTopology;

#[async_trait]
impl TopologyProvider for ExternalTopology {
    async fn create_node(&self, name: &str) -> Result<Arc<dyn NodeHandle>, TopologyError> {
        Err(TopologyError::Backend(format!(
            "externally managed topology cannot create node {name}"
        )))
    }

    async fn link(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), TopologyError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), TopologyError> {
        Ok(())
    }

    fn has_failure(&self) -> Option<String> {
        None
    }
}

/// Scripted leak-check hook for tests.
#[derive(Default)]
pub struct ScriptedLeakCheck {
    enabled: bool,
    leaks: Mutex<Vec<LeakRecord>>,
}

impl ScriptedLeakCheck {
    #[must_use]
    pub fn enabled() -> Self {
        Self { enabled: true, leaks: Mutex::new(Vec::new()) }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn record_leak(&self, node: impl Into<String>, detail: impl Into<String>) {
        self.leaks
            .lock()
            .expect("leaks lock")
            .push(LeakRecord { node: node.into(), detail: detail.into() });
    }
}

impl LeakCheck for ScriptedLeakCheck {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn collect_report(&self) -> LeakReport {
        LeakReport { leaks: self.leaks.lock().expect("leaks lock").clone() }
    }
}
