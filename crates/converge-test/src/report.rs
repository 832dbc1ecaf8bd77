//! Outcome aggregation and reporting.
//!
//! Every failure attaches to the smallest outcome that encloses it: a bad
//! fixture to its assertion, a rejected mutation to its step, a topology
//! failure and the terminal leak check to the scenario. Independent
//! assertions keep executing after a localized failure, so the final
//! report carries the full picture rather than just the first mismatch.

use crate::snapshot::DiffTree;
use crate::topology::LeakReport;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Kind of error attached to an `Errored` assertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fatal node error (command rejected, node not found).
    Node,
    /// Expected-state fixture missing or unparsable.
    Fixture,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Node => write!(f, "node error"),
            ErrorKind::Fixture => write!(f, "fixture error"),
        }
    }
}

/// Final status of one assertion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum AssertionStatus {
    /// Observed state converged to the expectation.
    Passed,
    /// Observed state never matched within the budget. `cancelled`
    /// distinguishes a run-deadline abort from budget exhaustion;
    /// `last_error` carries the final transient error when the node never
    /// produced a snapshot at all.
    Mismatched {
        diff: Option<DiffTree>,
        cancelled: bool,
        last_error: Option<String>,
    },
    /// A fatal error stopped this assertion (never a normal mismatch).
    Errored { kind: ErrorKind, message: String },
    /// Not executed: upstream fatal condition or failed step mutation.
    Skipped { reason: String },
}

impl AssertionStatus {
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, AssertionStatus::Passed)
    }

    /// Whether this status makes the scenario fail overall.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, AssertionStatus::Mismatched { .. } | AssertionStatus::Errored { .. })
    }
}

/// Per-assertion result.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionOutcome {
    pub name: String,
    pub node: String,
    pub status: AssertionStatus,
    /// Poll attempts used (0 when the assertion never polled).
    pub attempts: u32,
    pub elapsed: Duration,
}

impl AssertionOutcome {
    #[must_use]
    pub fn skipped(name: impl Into<String>, node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            status: AssertionStatus::Skipped { reason: reason.into() },
            attempts: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Per-step aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    pub assertions: Vec<AssertionOutcome>,
    /// Mutation failure that aborted the step, if any.
    pub mutation_error: Option<String>,
    /// True when the whole step was skipped by the prior-failure rule.
    pub skipped: bool,
}

impl StepOutcome {
    /// AND over every assertion's matched state.
    #[must_use]
    pub fn all_matched(&self) -> bool {
        self.mutation_error.is_none() && self.assertions.iter().all(|a| a.status.passed())
    }

    #[must_use]
    pub fn has_failure(&self) -> bool {
        self.mutation_error.is_some() || self.assertions.iter().any(|a| a.status.is_failure())
    }
}

/// Scenario-level leak-check outcome, independent of step outcomes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum LeakOutcome {
    Skipped,
    Clean,
    Leaked { report: LeakReport },
}

impl LeakOutcome {
    #[must_use]
    pub fn from_report(report: LeakReport) -> Self {
        if report.is_clean() { LeakOutcome::Clean } else { LeakOutcome::Leaked { report } }
    }

    #[must_use]
    pub fn failed(&self) -> bool {
        matches!(self, LeakOutcome::Leaked { .. })
    }
}

/// Complete result set of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub session_id: String,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    /// First fatal topology condition observed during the run.
    pub topology_failure: Option<String>,
    pub leak_check: LeakOutcome,
}

impl ScenarioReport {
    /// False iff any assertion mismatched or errored, a mutation failed,
    /// the topology reported a fatal condition, or an enabled leak check
    /// came back dirty.
    #[must_use]
    pub fn overall_pass(&self) -> bool {
        self.topology_failure.is_none()
            && !self.leak_check.failed()
            && !self.steps.iter().any(StepOutcome::has_failure)
    }

    /// Total assertions across all steps.
    #[must_use]
    pub fn assertion_count(&self) -> usize {
        self.steps.iter().map(|s| s.assertions.len()).sum()
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.steps
            .iter()
            .flat_map(|s| &s.assertions)
            .filter(|a| a.status.passed())
            .count()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scenario Report: {}", self.scenario)?;
        writeln!(f, "================")?;
        writeln!(f, "Session: {}", self.session_id)?;
        writeln!(
            f,
            "Status: {} ({}/{} assertions passed)",
            if self.overall_pass() { "PASSED" } else { "FAILED" },
            self.passed_count(),
            self.assertion_count()
        )?;
        if let Some(ref failure) = self.topology_failure {
            writeln!(f, "Topology failure: {}", failure)?;
        }
        writeln!(f)?;

        for step in &self.steps {
            let marker = if step.skipped {
                "[SKIP]"
            } else if step.has_failure() {
                "[FAIL]"
            } else {
                "[PASS]"
            };
            writeln!(f, "{} {}", marker, step.step)?;
            if let Some(ref err) = step.mutation_error {
                writeln!(f, "    mutation failed: {}", err)?;
            }
            for assertion in &step.assertions {
                match &assertion.status {
                    AssertionStatus::Passed => writeln!(
                        f,
                        "    passed     {} @ {} ({} attempts, {:?})",
                        assertion.name, assertion.node, assertion.attempts, assertion.elapsed
                    )?,
                    AssertionStatus::Mismatched { diff, cancelled, last_error } => {
                        let cause = if *cancelled { "cancelled" } else { "timeout" };
                        writeln!(
                            f,
                            "    mismatched {} @ {} ({}, {} attempts)",
                            assertion.name, assertion.node, cause, assertion.attempts
                        )?;
                        if let Some(diff) = diff {
                            for entry in &diff.entries {
                                writeln!(f, "        {}", entry)?;
                            }
                        }
                        if let Some(err) = last_error {
                            writeln!(f, "        last error: {}", err)?;
                        }
                    }
                    AssertionStatus::Errored { kind, message } => writeln!(
                        f,
                        "    errored    {} @ {} ({}: {})",
                        assertion.name, assertion.node, kind, message
                    )?,
                    AssertionStatus::Skipped { reason } => writeln!(
                        f,
                        "    skipped    {} @ {} ({})",
                        assertion.name, assertion.node, reason
                    )?,
                }
            }
        }

        match &self.leak_check {
            LeakOutcome::Skipped => {}
            LeakOutcome::Clean => {
                writeln!(f)?;
                writeln!(f, "Leak check: clean")?;
            }
            LeakOutcome::Leaked { report } => {
                writeln!(f)?;
                writeln!(f, "Leak check: {} leak(s)", report.leaks.len())?;
                for leak in &report.leaks {
                    writeln!(f, "    {}: {}", leak.node, leak.detail)?;
                }
            }
        }

        Ok(())
    }
}
