//! In-memory scripted node backend.
//!
//! Responds to queries from per-command response queues and records every
//! call, so tests can drive the poller through convergence timelines
//! ("three stale answers, then the converged one") without real node I/O.

use super::{NodeError, NodeHandle};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

type Scripted = Result<Snapshot, NodeError>;

/// A node handle whose answers are scripted ahead of time.
///
/// Each query pops the next scripted response for its command; the final
/// response is sticky and keeps being served once the queue is down to
/// one, modeling a node that has settled into a steady state. A command
/// with no script at all answers with the transient `ConnectionLost`
/// kind, like a node still booting.
#[derive(Debug)]
pub struct ScriptedNode {
    name: String,
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    mutation_error: Mutex<Option<NodeError>>,
    mutations: Mutex<Vec<String>>,
    query_calls: AtomicU64,
    mutate_calls: AtomicU64,
}

impl ScriptedNode {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(HashMap::new()),
            mutation_error: Mutex::new(None),
            mutations: Mutex::new(Vec::new()),
            query_calls: AtomicU64::new(0),
            mutate_calls: AtomicU64::new(0),
        }
    }

    /// Queue a snapshot response for a command.
    pub fn push_response(&self, command: impl Into<String>, snapshot: Snapshot) {
        self.responses
            .lock()
            .expect("scripted responses lock")
            .entry(command.into())
            .or_default()
            .push_back(Ok(snapshot));
    }

    /// Queue an error response for a command.
    pub fn push_error(&self, command: impl Into<String>, error: NodeError) {
        self.responses
            .lock()
            .expect("scripted responses lock")
            .entry(command.into())
            .or_default()
            .push_back(Err(error));
    }

    /// Make every subsequent mutation fail with the given error.
    pub fn fail_mutations(&self, error: NodeError) {
        *self.mutation_error.lock().expect("mutation error lock") = Some(error);
    }

    /// Mutation payloads received, in order.
    #[must_use]
    pub fn recorded_mutations(&self) -> Vec<String> {
        self.mutations.lock().expect("mutations lock").clone()
    }

    #[must_use]
    pub fn query_calls(&self) -> u64 {
        self.query_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn mutate_calls(&self) -> u64 {
        self.mutate_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeHandle for ScriptedNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn mutate(&self, config: &str) -> Result<(), NodeError> {
        self.mutate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.mutation_error.lock().expect("mutation error lock").clone() {
            return Err(err);
        }
        self.mutations
            .lock()
            .expect("mutations lock")
            .push(config.to_string());
        Ok(())
    }

    async fn query(&self, command: &str) -> Result<Snapshot, NodeError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().expect("scripted responses lock");
        match responses.get_mut(command) {
            Some(queue) if queue.len() > 1 => queue.pop_front().expect("non-empty queue"),
            Some(queue) if queue.len() == 1 => queue.front().cloned().expect("non-empty queue"),
            _ => Err(NodeError::ConnectionLost(format!(
                "no scripted response for command {:?}",
                command
            ))),
        }
    }
}
