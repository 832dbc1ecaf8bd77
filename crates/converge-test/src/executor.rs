//! Step execution.
//!
//! One step = apply the step's configuration mutations, then drive every
//! declared assertion through the convergence poller. Failures are
//! isolated: a bad fixture stops one assertion, a rejected mutation stops
//! one step, and neither stops the scenario.
//!
//! Concurrency within a step: assertions against *different* nodes run in
//! parallel, each with its own poll loop; assertions against the *same*
//! node run sequentially relative to each other, since query ordering on
//! a single handle is otherwise undefined. Mutations are applied one at a
//! time in declared order, which keeps mutation calls exclusive per node.

use crate::cancel::CancelToken;
use crate::fixture::{FixtureKey, FixtureStore};
use crate::node::NodeSet;
use crate::poll::{PollOutcome, poll};
use crate::report::{AssertionOutcome, AssertionStatus, ErrorKind, StepOutcome};
use crate::scenario::{Assertion, ExpectedState, Step};
use crate::topology::{LeakCheck, TopologyProvider};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;

/// Everything a run needs, passed explicitly — never looked up from
/// ambient state.
///
/// Node handles are shared references into externally managed topology
/// state; the context borrows capability, not lifecycle.
pub struct RunContext {
    pub nodes: NodeSet,
    pub topology: Arc<dyn TopologyProvider>,
    pub fixtures: Arc<dyn FixtureStore>,
    pub leak_check: Option<Arc<dyn LeakCheck>>,
}

impl RunContext {
    #[must_use]
    pub fn new(
        nodes: NodeSet,
        topology: Arc<dyn TopologyProvider>,
        fixtures: Arc<dyn FixtureStore>,
    ) -> Self {
        Self { nodes, topology, fixtures, leak_check: None }
    }

    #[must_use]
    pub fn with_leak_check(mut self, leak_check: Arc<dyn LeakCheck>) -> Self {
        self.leak_check = Some(leak_check);
        self
    }
}

/// Executes one step against a run context.
pub struct StepExecutor<'a> {
    ctx: &'a RunContext,
    cancel: &'a CancelToken,
}

impl<'a> StepExecutor<'a> {
    #[must_use]
    pub fn new(ctx: &'a RunContext, cancel: &'a CancelToken) -> Self {
        Self { ctx, cancel }
    }

    /// Run one step. `prior_failure` is the upstream fatal condition the
    /// runner recorded, if any.
    pub async fn run_step(&self, step: &Step, prior_failure: Option<&str>) -> StepOutcome {
        if step.depends_on_prior_success {
            if let Some(failure) = prior_failure {
                tracing::warn!(step = %step.name, failure, "skipping step after upstream failure");
                return StepOutcome {
                    step: step.name.clone(),
                    assertions: step
                        .assertions
                        .iter()
                        .map(|a| AssertionOutcome::skipped(&a.name, &a.node, failure))
                        .collect(),
                    mutation_error: None,
                    skipped: true,
                };
            }
        }

        for mutation in &step.mutations {
            tracing::info!(step = %step.name, node = %mutation.node, "applying configuration mutation");
            let result = match self.ctx.nodes.get(&mutation.node) {
                Ok(node) => node.mutate(&mutation.config).await,
                Err(err) => Err(err),
            };
            if let Err(err) = result {
                tracing::error!(step = %step.name, node = %mutation.node, error = %err, "mutation failed, aborting step");
                let reason = format!("mutation failed on node {}", mutation.node);
                return StepOutcome {
                    step: step.name.clone(),
                    assertions: step
                        .assertions
                        .iter()
                        .map(|a| AssertionOutcome::skipped(&a.name, &a.node, &reason))
                        .collect(),
                    mutation_error: Some(err.to_string()),
                    skipped: false,
                };
            }
        }

        // Group assertions by target node, keeping declaration order both
        // across groups and within each group.
        let mut groups: Vec<(&str, Vec<(usize, &Assertion)>)> = Vec::new();
        for (index, assertion) in step.assertions.iter().enumerate() {
            match groups.iter_mut().find(|(node, _)| *node == assertion.node.as_str()) {
                Some((_, group)) => group.push((index, assertion)),
                None => groups.push((assertion.node.as_str(), vec![(index, assertion)])),
            }
        }

        let per_group = join_all(groups.into_iter().map(|(_, group)| async move {
            let mut results = Vec::with_capacity(group.len());
            for (index, assertion) in group {
                results.push((index, self.run_assertion(&step.name, assertion).await));
            }
            results
        }))
        .await;

        let mut outcomes: Vec<Option<AssertionOutcome>> = Vec::new();
        outcomes.resize_with(step.assertions.len(), || None);
        for (index, outcome) in per_group.into_iter().flatten() {
            outcomes[index] = Some(outcome);
        }

        StepOutcome {
            step: step.name.clone(),
            assertions: outcomes
                .into_iter()
                .map(|o| o.expect("every assertion produced an outcome"))
                .collect(),
            mutation_error: None,
            skipped: false,
        }
    }

    async fn run_assertion(&self, step_name: &str, assertion: &Assertion) -> AssertionOutcome {
        let started = Instant::now();
        let errored = |kind: ErrorKind, message: String, started: Instant| AssertionOutcome {
            name: assertion.name.clone(),
            node: assertion.node.clone(),
            status: AssertionStatus::Errored { kind, message },
            attempts: 0,
            elapsed: started.elapsed(),
        };

        let expected = match &assertion.expected {
            ExpectedState::Inline(snapshot) => snapshot.clone(),
            ExpectedState::Fixture => {
                let key = FixtureKey::new(&assertion.node, step_name, &assertion.name);
                match self.ctx.fixtures.load(&key) {
                    Ok(snapshot) => snapshot,
                    Err(err) => {
                        tracing::error!(assertion = %assertion.name, error = %err, "fixture load failed");
                        return errored(ErrorKind::Fixture, err.to_string(), started);
                    }
                }
            }
        };

        let node = match self.ctx.nodes.get(&assertion.node) {
            Ok(node) => node,
            Err(err) => return errored(ErrorKind::Node, err.to_string(), started),
        };

        tracing::info!(
            node = %assertion.node,
            query = %assertion.query,
            assertion = %assertion.name,
            "comparing node state against expected snapshot"
        );

        match poll(
            || node.query(&assertion.query),
            &expected,
            assertion.mode,
            assertion.policy,
            self.cancel,
        )
        .await
        {
            Ok(result) => {
                let status = match result.outcome {
                    PollOutcome::Matched => AssertionStatus::Passed,
                    PollOutcome::Exhausted => AssertionStatus::Mismatched {
                        diff: result.diff,
                        cancelled: false,
                        last_error: result.last_error.map(|e| e.to_string()),
                    },
                    PollOutcome::Cancelled => AssertionStatus::Mismatched {
                        diff: result.diff,
                        cancelled: true,
                        last_error: result.last_error.map(|e| e.to_string()),
                    },
                };
                AssertionOutcome {
                    name: assertion.name.clone(),
                    node: assertion.node.clone(),
                    status,
                    attempts: result.attempts,
                    elapsed: result.elapsed,
                }
            }
            Err(err) => {
                tracing::error!(assertion = %assertion.name, error = %err, "fatal node error");
                errored(ErrorKind::Node, err.to_string(), started)
            }
        }
    }
}
