//! Convergence verification for distributed routing node testnets.
//!
//! This crate verifies that a set of cooperating network nodes reaches an
//! expected, eventually-consistent operational state after a sequence of
//! configuration changes. A test is a [`Scenario`]: an ordered list of
//! steps, each applying configuration mutations and then asserting on
//! polled node state until it converges or a retry budget runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ScenarioRunner                          │
//! │   strict step order · deadline · skip-on-topology-failure    │
//! └──────────────┬───────────────────────────────────────────────┘
//!                │ per step
//! ┌──────────────▼───────────────────────────────────────────────┐
//! │                       StepExecutor                            │
//! │   mutations in order · assertions fan out per node            │
//! └───────┬──────────────────────┬───────────────────────────────┘
//!         │ mutate               │ per assertion
//! ┌───────▼────────┐   ┌─────────▼─────────┐   ┌────────────────┐
//! │  NodeHandle    │◄──┤ Convergence poll  ├──►│   Snapshot     │
//! │  (exec, ...)   │   │ bounded retries   │   │   comparator   │
//! └────────────────┘   └───────────────────┘   └────────────────┘
//! ```
//!
//! Convergence timing is inherently asynchronous and non-deterministic:
//! the poller tolerates it with bounded fixed-interval retries instead of
//! one-shot checks, and the report keeps independent assertion failures
//! isolated so one regression never hides another.
//!
//! # Usage
//!
//! ```rust,ignore
//! use converge_test::{RunContext, Scenario, ScenarioRunner};
//!
//! let ctx = RunContext::new(nodes, topology, fixtures);
//! let report = ScenarioRunner::new(ctx).run(&scenario).await;
//! if !report.overall_pass() {
//!     eprintln!("{report}");
//! }
//! ```

pub mod cancel;
pub mod executor;
pub mod fixture;
pub mod node;
pub mod poll;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod snapshot;
pub mod topology;

// Re-export key types for convenience
pub use cancel::CancelToken;
pub use executor::{RunContext, StepExecutor};
pub use fixture::{DirFixtureStore, EmptyFixtureStore, FixtureError, FixtureKey, FixtureStore};
pub use node::{ExecNode, ExecNodeSpec, NodeError, NodeHandle, NodeSet, ScriptedNode};
pub use poll::{PollOutcome, PollPolicy, PollResult, poll};
pub use report::{
    AssertionOutcome, AssertionStatus, ErrorKind, LeakOutcome, ScenarioReport, StepOutcome,
};
pub use runner::{RunnerConfig, ScenarioRunner};
pub use scenario::{Assertion, ExpectedState, Mutation, Scenario, Step};
pub use snapshot::{DiffEntry, DiffKind, DiffTree, MatchMode, Snapshot, compare};
pub use topology::{
    ExternalTopology, LeakCheck, LeakRecord, LeakReport, ScriptedLeakCheck, ScriptedTopology,
    TopologyError, TopologyProvider,
};
