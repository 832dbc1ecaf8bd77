//! Process-exec node backend.
//!
//! Drives a node through an external command-line tool: the query command
//! vector gets the query string appended as its final argument and must
//! print a JSON snapshot on stdout; the mutation command vector receives
//! the configuration payload on stdin. The payloads themselves stay
//! opaque — whatever configuration language the node speaks is the tool's
//! business.

use super::{NodeError, NodeHandle};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

fn default_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

/// Serde form of an exec-backed node, as written in scenario files.
///
/// ```yaml
/// nodes:
///   - name: r1
///     query: ["vtysh", "-N", "r1", "-c"]
///     mutate: ["vtysh", "-N", "r1"]
///     timeout: 10s
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecNodeSpec {
    pub name: String,
    /// Command vector for queries; the query string is appended as the
    /// final argument.
    pub query: Vec<String>,
    /// Command vector for mutations; the payload is written to stdin.
    /// Empty means the node accepts no mutations.
    #[serde(default)]
    pub mutate: Vec<String>,
    /// Per-invocation wall-clock budget.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Node handle backed by external process execution.
#[derive(Debug)]
pub struct ExecNode {
    spec: ExecNodeSpec,
}

impl ExecNode {
    #[must_use]
    pub fn new(spec: ExecNodeSpec) -> Self {
        Self { spec }
    }

    fn spawn_error(&self, err: &std::io::Error) -> NodeError {
        if err.kind() == std::io::ErrorKind::NotFound {
            NodeError::NotFound(format!("{}: command not found", self.spec.name))
        } else {
            NodeError::ConnectionLost(err.to_string())
        }
    }
}

#[async_trait]
impl NodeHandle for ExecNode {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn mutate(&self, config: &str) -> Result<(), NodeError> {
        let Some((program, args)) = self.spec.mutate.split_first() else {
            return Err(NodeError::CommandRejected(format!(
                "node {} has no mutation command configured",
                self.spec.name
            )));
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(config.as_bytes())
                .await
                .map_err(|e| NodeError::ConnectionLost(e.to_string()))?;
            // Close stdin so the tool sees EOF and applies the config.
            drop(stdin);
        }

        let output = tokio::time::timeout(self.spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| NodeError::Timeout(self.spec.timeout))?
            .map_err(|e| NodeError::ConnectionLost(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(NodeError::CommandRejected(stderr.trim().to_string()))
        }
    }

    async fn query(&self, command: &str) -> Result<Snapshot, NodeError> {
        let Some((program, args)) = self.spec.query.split_first() else {
            return Err(NodeError::CommandRejected(format!(
                "node {} has no query command configured",
                self.spec.name
            )));
        };

        let child = Command::new(program)
            .args(args)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&e))?;

        let output = tokio::time::timeout(self.spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| NodeError::Timeout(self.spec.timeout))?
            .map_err(|e| NodeError::ConnectionLost(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NodeError::CommandRejected(stderr.trim().to_string()));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| NodeError::MalformedResponse(e.to_string()))
    }
}
