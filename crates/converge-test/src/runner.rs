//! Scenario execution.
//!
//! Runs a scenario's steps strictly in declared order — later steps
//! assume the cumulative effect of all prior mutations, so there is no
//! reordering and no skipping beyond the dependency rule. A single
//! assertion mismatch never aborts the run; subsequent steps still
//! execute so their diagnostics stay available, and the final report
//! fails overall instead.

use crate::cancel::CancelToken;
use crate::executor::{RunContext, StepExecutor};
use crate::report::{LeakOutcome, ScenarioReport};
use crate::scenario::Scenario;
use chrono::Utc;
use std::time::Duration;

/// Runner configuration.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Overall wall-clock budget for the run. When it expires, in-flight
    /// pollers stop at their next attempt boundary and report the
    /// cancelled marker.
    pub deadline: Option<Duration>,
}

impl RunnerConfig {
    #[must_use]
    pub fn with_deadline(deadline: Duration) -> Self {
        Self { deadline: Some(deadline) }
    }
}

/// Executes scenarios against a run context and aggregates outcomes.
pub struct ScenarioRunner {
    ctx: RunContext,
    config: RunnerConfig,
    cancel: CancelToken,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(ctx: RunContext) -> Self {
        Self::with_config(ctx, RunnerConfig::default())
    }

    #[must_use]
    pub fn with_config(ctx: RunContext, config: RunnerConfig) -> Self {
        Self { ctx, config, cancel: CancelToken::new() }
    }

    /// Token observed by every poller this runner starts. Exposed so an
    /// embedding process can abort a run from the outside (signal
    /// handler, supervisor).
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run every step and assemble the scenario report. The runner
    /// exclusively owns the outcome tree it returns.
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let session_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(scenario = %scenario.name, session = %session_id, "starting scenario run");

        let watchdog = self.config.deadline.map(|deadline| {
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!(?deadline, "run deadline expired, cancelling in-flight pollers");
                cancel.cancel();
            })
        });

        let executor = StepExecutor::new(&self.ctx, &self.cancel);
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut topology_failure: Option<String> = None;

        for step in &scenario.steps {
            // The topology is consulted before each step so a mid-run
            // fatal condition cascades into skips, not secondary noise.
            if topology_failure.is_none() {
                if let Some(failure) = self.ctx.topology.has_failure() {
                    tracing::error!(step = %step.name, failure = %failure, "topology reported fatal condition");
                    topology_failure = Some(failure);
                }
            }

            let outcome = executor.run_step(step, topology_failure.as_deref()).await;
            if outcome.has_failure() {
                tracing::warn!(step = %step.name, "step finished with failures");
            }
            steps.push(outcome);
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let leak_check = match &self.ctx.leak_check {
            Some(check) if check.is_enabled() => {
                let report = check.collect_report();
                if !report.is_clean() {
                    tracing::error!(leaks = report.leaks.len(), "leak check reported leaks");
                }
                LeakOutcome::from_report(report)
            }
            _ => LeakOutcome::Skipped,
        };

        let report = ScenarioReport {
            session_id,
            scenario: scenario.name.clone(),
            started_at,
            completed_at: Utc::now(),
            steps,
            topology_failure,
            leak_check,
        };
        tracing::info!(
            scenario = %scenario.name,
            passed = report.overall_pass(),
            assertions = report.assertion_count(),
            "scenario run complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::EmptyFixtureStore;
    use crate::node::{NodeSet, ScriptedNode};
    use crate::poll::PollPolicy;
    use crate::report::AssertionStatus;
    use crate::scenario::{Assertion, Mutation, Step};
    use crate::topology::{ScriptedLeakCheck, ScriptedTopology, TopologyProvider};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        topology: Arc<ScriptedTopology>,
        nodes: Vec<Arc<ScriptedNode>>,
        ctx: RunContext,
    }

    async fn fixture(node_names: &[&str]) -> Fixture {
        let topology = Arc::new(ScriptedTopology::new());
        let mut set = NodeSet::new();
        let mut nodes = Vec::new();
        for name in node_names {
            topology.create_node(name).await.unwrap();
            let node = topology.scripted(name).unwrap();
            set.insert(node.clone());
            nodes.push(node);
        }
        let ctx = RunContext::new(set, topology.clone(), Arc::new(EmptyFixtureStore));
        Fixture { topology, nodes, ctx }
    }

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(max_attempts, Duration::from_millis(5))
    }

    // End-to-end: one node, one checkpoint step, state already converged.
    #[tokio::test]
    async fn already_converged_scenario_passes_on_first_attempt() {
        let f = fixture(&["r1"]).await;
        f.nodes[0].push_response("status", json!({"adjacency": "up"}));

        let scenario = Scenario::new("scenario-a").with_step(
            Step::new("step1").with_assertion(
                Assertion::new("adjacency", "r1", "status", json!({"adjacency": "up"}))
                    .with_policy(fast(120)),
            ),
        );

        let report = ScenarioRunner::new(f.ctx).run(&scenario).await;
        assert!(report.overall_pass());
        assert_eq!(report.steps[0].assertions[0].attempts, 1);
    }

    // End-to-end: mutate, then converge on the fourth query.
    #[tokio::test]
    async fn convergence_within_budget_passes() {
        let f = fixture(&["r1"]).await;
        let node = &f.nodes[0];
        for _ in 0..3 {
            node.push_response("locator", json!({"enabled": true}));
        }
        node.push_response("locator", json!({"enabled": false}));

        let scenario = Scenario::new("scenario-b").with_step(
            Step::new("step1")
                .with_mutation(Mutation::new("r1", "no locator loc1"))
                .with_assertion(
                    Assertion::new("locator", "r1", "locator", json!({"enabled": false}))
                        .with_policy(fast(5)),
                ),
        );

        let report = ScenarioRunner::new(f.ctx).run(&scenario).await;
        assert!(report.overall_pass());
        let outcome = &report.steps[0].assertions[0];
        assert!(outcome.status.passed());
        assert_eq!(outcome.attempts, 4);
        assert_eq!(f.nodes[0].recorded_mutations(), vec!["no locator loc1".to_string()]);
    }

    // End-to-end: same timeline, but the budget is too small.
    #[tokio::test]
    async fn budget_exhaustion_reports_final_diff() {
        let f = fixture(&["r1"]).await;
        let node = &f.nodes[0];
        for _ in 0..3 {
            node.push_response("locator", json!({"enabled": true}));
        }
        node.push_response("locator", json!({"enabled": false}));

        let scenario = Scenario::new("scenario-c").with_step(
            Step::new("step1")
                .with_mutation(Mutation::new("r1", "no locator loc1"))
                .with_assertion(
                    Assertion::new("locator", "r1", "locator", json!({"enabled": false}))
                        .with_policy(fast(3)),
                ),
        );

        let report = ScenarioRunner::new(f.ctx).run(&scenario).await;
        assert!(!report.overall_pass());
        let outcome = &report.steps[0].assertions[0];
        assert_eq!(outcome.attempts, 3);
        match &outcome.status {
            AssertionStatus::Mismatched { diff, cancelled, .. } => {
                assert!(!cancelled);
                let rendered = diff.as_ref().unwrap().to_string();
                assert!(rendered.contains("enabled: expected false, got true"), "{rendered}");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn later_steps_still_run_after_a_mismatch() {
        let f = fixture(&["r1"]).await;
        let node = &f.nodes[0];
        node.push_response("a", json!({"ok": false}));
        node.push_response("b", json!({"ok": true}));

        let scenario = Scenario::new("keep-going")
            .with_step(Step::new("step1").with_assertion(
                Assertion::new("a", "r1", "a", json!({"ok": true})).with_policy(fast(2)),
            ))
            .with_step(Step::new("step2").with_assertion(
                Assertion::new("b", "r1", "b", json!({"ok": true})).with_policy(fast(2)),
            ));

        let report = ScenarioRunner::new(f.ctx).run(&scenario).await;
        assert!(!report.overall_pass());
        assert!(!report.steps[0].all_matched());
        // The mismatch did not stop step2 from executing and passing.
        assert!(report.steps[1].all_matched());
    }

    #[tokio::test]
    async fn topology_failure_cascades_into_skips() {
        let f = fixture(&["r1"]).await;
        f.topology.inject_failure("r1 process exited");

        let scenario = Scenario::new("skip-all")
            .with_step(Step::new("step1").with_assertion(Assertion::new(
                "adjacency",
                "r1",
                "status",
                json!({}),
            )))
            .with_step(
                Step::new("step2")
                    .with_mutation(Mutation::new("r1", "locator loc1"))
                    .with_assertion(Assertion::new("locator", "r1", "locator", json!({}))),
            );

        let report = ScenarioRunner::new(f.ctx).run(&scenario).await;
        assert!(!report.overall_pass());
        assert_eq!(report.topology_failure.as_deref(), Some("r1 process exited"));
        for step in &report.steps {
            assert!(step.skipped);
            for assertion in &step.assertions {
                assert!(matches!(assertion.status, AssertionStatus::Skipped { .. }));
            }
        }
        assert_eq!(f.nodes[0].query_calls(), 0);
        assert_eq!(f.nodes[0].mutate_calls(), 0);
    }

    #[tokio::test]
    async fn deadline_cancels_inflight_pollers_with_cancelled_marker() {
        let f = fixture(&["r1"]).await;
        f.nodes[0].push_response("status", json!({"adjacency": "down"}));

        let scenario = Scenario::new("deadline").with_step(
            Step::new("step1").with_assertion(
                Assertion::new("adjacency", "r1", "status", json!({"adjacency": "up"}))
                    .with_policy(PollPolicy::new(10_000, Duration::from_millis(10))),
            ),
        );

        let runner =
            ScenarioRunner::with_config(f.ctx, RunnerConfig::with_deadline(Duration::from_millis(50)));
        let report = runner.run(&scenario).await;

        assert!(!report.overall_pass());
        match &report.steps[0].assertions[0].status {
            AssertionStatus::Mismatched { cancelled, .. } => assert!(*cancelled),
            other => panic!("expected cancelled mismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn leak_check_outcomes() {
        // Disabled hook: skipped, does not affect the verdict.
        let f = fixture(&["r1"]).await;
        f.nodes[0].push_response("status", json!({}));
        let ctx = f.ctx.with_leak_check(Arc::new(ScriptedLeakCheck::disabled()));
        let scenario = Scenario::new("leaks").with_step(Step::new("step1").with_assertion(
            Assertion::new("status", "r1", "status", json!({})).with_policy(fast(2)),
        ));
        let report = ScenarioRunner::new(ctx).run(&scenario).await;
        assert!(matches!(report.leak_check, LeakOutcome::Skipped));
        assert!(report.overall_pass());

        // Enabled and dirty: distinct scenario-level failure.
        let f = fixture(&["r1"]).await;
        f.nodes[0].push_response("status", json!({}));
        let check = Arc::new(ScriptedLeakCheck::enabled());
        check.record_leak("r1", "srv6 sid context not freed");
        let ctx = f.ctx.with_leak_check(check);
        let report = ScenarioRunner::new(ctx).run(&scenario).await;
        assert!(matches!(report.leak_check, LeakOutcome::Leaked { .. }));
        assert!(!report.overall_pass());
        // Step outcomes are untouched by the leak verdict.
        assert!(report.steps[0].all_matched());
    }

    #[tokio::test]
    async fn empty_scenario_passes_trivially() {
        let f = fixture(&[]).await;
        let report = ScenarioRunner::new(f.ctx).run(&Scenario::new("empty")).await;
        assert!(report.overall_pass());
        assert_eq!(report.assertion_count(), 0);
    }
}
