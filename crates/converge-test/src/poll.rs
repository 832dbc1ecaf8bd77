//! Convergence polling.
//!
//! Routing protocol state and kernel data-plane programming converge on
//! their own timeline, not the test's. The poller absorbs that: it
//! repeatedly invokes a producer of observed state and compares against
//! the expectation until it matches, the attempt budget runs out, or the
//! run is cancelled.
//!
//! Waits between attempts are fixed-interval rather than exponential —
//! convergence timing in this domain is roughly uniform, and deterministic
//! spacing keeps log timelines reproducible.

use crate::cancel::CancelToken;
use crate::node::NodeError;
use crate::snapshot::{DiffTree, MatchMode, Snapshot, compare};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Per-assertion retry budget.
///
/// Budgets are a per-assertion parameter; there is no single standard
/// timeout. The default (120 attempts at 500 ms, a ceiling of roughly one
/// minute) fits steady-state convergence checks; [`PollPolicy::fast`]
/// fits local state that settles within a few intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PollPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 120,
            interval: Duration::from_millis(500),
        }
    }
}

impl PollPolicy {
    /// Small budget for local, fast-converging state.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// Upper bound on total wait time across the whole budget.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// Why the poll loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// Observed state matched the expectation.
    Matched,
    /// The attempt budget ran out without a match.
    Exhausted,
    /// The run was cancelled; the poller stopped at an attempt boundary.
    /// Distinct from [`PollOutcome::Exhausted`] so a deadline abort is
    /// never mistaken for a convergence timeout.
    Cancelled,
}

/// Result of one poll loop.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub outcome: PollOutcome,
    /// The diff of the *most recent* comparison, so a failed poll reports
    /// the closest observed state, not the first.
    pub diff: Option<DiffTree>,
    /// Last transient producer error, for polls where the node never
    /// answered at all.
    pub last_error: Option<NodeError>,
    /// Attempts actually executed (the counter starts at 1).
    pub attempts: u32,
    pub elapsed: Duration,
}

impl PollResult {
    #[must_use]
    pub fn matched(&self) -> bool {
        self.outcome == PollOutcome::Matched
    }
}

/// Poll a producer of observed state until it matches `expected`.
///
/// Transient producer errors count as non-matches and are retried — a
/// node may be unreachable mid-convergence. A fatal producer error aborts
/// immediately via `Err`: a rejected command will never converge and
/// burning the remaining budget on it only hides the failure.
///
/// A match returns on the spot without waiting out the remaining budget;
/// the already-converged case must stay fast.
pub async fn poll<F, Fut>(
    mut produce: F,
    expected: &Snapshot,
    mode: MatchMode,
    policy: PollPolicy,
    cancel: &CancelToken,
) -> Result<PollResult, NodeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Snapshot, NodeError>>,
{
    let start = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_diff: Option<DiffTree> = None;
    let mut last_error: Option<NodeError> = None;
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            return Ok(PollResult {
                outcome: PollOutcome::Cancelled,
                diff: last_diff,
                last_error,
                attempts,
                elapsed: start.elapsed(),
            });
        }
        attempts = attempt;

        match produce().await {
            Ok(observed) => match compare(expected, &observed, mode) {
                None => {
                    return Ok(PollResult {
                        outcome: PollOutcome::Matched,
                        diff: None,
                        last_error: None,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
                Some(diff) => {
                    tracing::trace!(attempt, differences = diff.len(), "state not yet converged");
                    last_diff = Some(diff);
                }
            },
            Err(err) if err.is_transient() => {
                tracing::debug!(attempt, error = %err, "transient node error, retrying");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(policy.interval) => {}
                _ = cancel.cancelled() => {
                    return Ok(PollResult {
                        outcome: PollOutcome::Cancelled,
                        diff: last_diff,
                        last_error,
                        attempts,
                        elapsed: start.elapsed(),
                    });
                }
            }
        }
    }

    Ok(PollResult {
        outcome: PollOutcome::Exhausted,
        diff: last_diff,
        last_error,
        attempts,
        elapsed: start.elapsed(),
    })
}
