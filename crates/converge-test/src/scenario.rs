//! Scenario data model.
//!
//! A scenario is an ordered sequence of steps; each step optionally
//! mutates node configuration and then verifies observable state through
//! polled assertions. Steps run strictly in declared order — later steps
//! assume the cumulative effect of all prior mutations.
//!
//! Scenarios can be built in code with the chainable constructors or
//! loaded from YAML/JSON files:
//!
//! ```yaml
//! name: srv6-locator
//! steps:
//!   - name: step1
//!     assertions:
//!       - name: adjacency
//!         node: r1
//!         query: show isis adjacency json
//!         expected:
//!           inline: { adjacency: up }
//!   - name: step2
//!     mutations:
//!       - node: r1
//!         config: |
//!           segment-routing
//!            srv6
//!             no locator loc1
//!     assertions:
//!       - name: locator
//!         node: r1
//!         query: show srv6 locator json
//!         expected: fixture
//!         policy: { max_attempts: 10 }
//! ```

use crate::poll::PollPolicy;
use crate::snapshot::{MatchMode, Snapshot};
use serde::{Deserialize, Serialize};

/// One configuration mutation, targeting one node.
///
/// The config payload is opaque bytes to the engine; only the node
/// backend interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mutation {
    pub node: String,
    pub config: String,
}

impl Mutation {
    #[must_use]
    pub fn new(node: impl Into<String>, config: impl Into<String>) -> Self {
        Self { node: node.into(), config: config.into() }
    }
}

/// Where an assertion's expected snapshot comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedState {
    /// Expected snapshot written inline in the scenario.
    Inline(Snapshot),
    /// Loaded from the fixture store under the key derived from
    /// `(step name, node, assertion name)`.
    Fixture,
}

/// One polled state check: a node, a query, and the snapshot the query
/// must eventually produce. Immutable once constructed for a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assertion {
    pub name: String,
    pub node: String,
    pub query: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub expected: ExpectedState,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default)]
    pub policy: PollPolicy,
}

impl Assertion {
    /// New assertion with the default relaxed match and steady-state
    /// retry budget.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        node: impl Into<String>,
        query: impl Into<String>,
        expected: Snapshot,
    ) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            query: query.into(),
            expected: ExpectedState::Inline(expected),
            mode: MatchMode::default(),
            policy: PollPolicy::default(),
        }
    }

    /// New assertion whose expectation is resolved from the fixture
    /// store at execution time.
    #[must_use]
    pub fn from_fixture(
        name: impl Into<String>,
        node: impl Into<String>,
        query: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            query: query.into(),
            expected: ExpectedState::Fixture,
            mode: MatchMode::default(),
            policy: PollPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn default_true() -> bool {
    true
}

/// One scenario unit: optional mutations plus the assertions verifying
/// their effect. A step with no mutations is a pure verification
/// checkpoint (step 1 of a scenario typically confirms initial
/// convergence this way).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub mutations: Vec<Mutation>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Skip this step after an upstream fatal condition instead of piling
    /// secondary failures on top of the root cause.
    #[serde(default = "default_true")]
    pub depends_on_prior_success: bool,
}

impl Step {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutations: Vec::new(),
            assertions: Vec::new(),
            depends_on_prior_success: true,
        }
    }

    #[must_use]
    pub fn with_mutation(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    #[must_use]
    pub fn independent(mut self) -> Self {
        self.depends_on_prior_success = false;
        self
    }

    /// A step without mutations only verifies state.
    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), steps: Vec::new() }
    }

    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Node names referenced by any mutation or assertion.
    #[must_use]
    pub fn referenced_nodes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .steps
            .iter()
            .flat_map(|step| {
                step.mutations
                    .iter()
                    .map(|m| m.node.as_str())
                    .chain(step.assertions.iter().map(|a| a.node.as_str()))
            })
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}
