//! Scenario runner binary.
//!
//! Thin CLI over the library: load a scenario file, build exec-backed
//! node handles from its `nodes:` section, run the scenario, and map the
//! report's overall verdict to the process exit code. Per-assertion
//! diffs go to the human-readable report on stdout; `--output` writes the
//! same report as JSON.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use converge_test::{
    DirFixtureStore, ExecNode, ExecNodeSpec, ExpectedState, ExternalTopology, NodeSet, RunContext,
    RunnerConfig, Scenario, ScenarioRunner,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "converge-test")]
#[command(about = "Convergence verification for distributed routing node testnets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and exit 0/1 on its overall verdict.
    Run {
        /// Scenario file (YAML or JSON).
        #[arg(long)]
        scenario: PathBuf,

        /// Fixture directory; defaults to the scenario file's directory.
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Overall wall-clock budget in seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,

        /// Write the report as JSON in addition to the readable log.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Parse a scenario file and check its internal references.
    Validate {
        #[arg(long)]
        scenario: PathBuf,
    },

    /// Dump the parsed scenario plan.
    Print {
        #[arg(long)]
        scenario: PathBuf,
    },
}

/// On-disk scenario document: the scenario plus the exec-node specs the
/// CLI needs to reach the nodes. Topology lifecycle stays external.
#[derive(Debug, Deserialize)]
struct ScenarioFile {
    #[serde(default)]
    nodes: Vec<ExecNodeSpec>,
    #[serde(flatten)]
    scenario: Scenario,
}

fn load_scenario_file(path: &Path) -> Result<ScenarioFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file {}", path.display()))?;
    let parsed = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    };
    Ok(parsed)
}

/// Referential checks a scenario file must pass before a run is worth
/// starting.
fn validate_scenario(file: &ScenarioFile) -> Vec<String> {
    let mut problems = Vec::new();

    let declared: Vec<&str> = file.nodes.iter().map(|n| n.name.as_str()).collect();
    for spec in &file.nodes {
        if spec.query.is_empty() {
            problems.push(format!("node {} has no query command", spec.name));
        }
    }

    for step in &file.scenario.steps {
        for mutation in &step.mutations {
            if !declared.contains(&mutation.node.as_str()) {
                problems.push(format!(
                    "step {}: mutation targets undeclared node {}",
                    step.name, mutation.node
                ));
            }
        }
        for assertion in &step.assertions {
            if !declared.contains(&assertion.node.as_str()) {
                problems.push(format!(
                    "step {}: assertion {} targets undeclared node {}",
                    step.name, assertion.name, assertion.node
                ));
            }
            if assertion.policy.max_attempts == 0 {
                problems.push(format!(
                    "step {}: assertion {} has a zero attempt budget",
                    step.name, assertion.name
                ));
            }
        }
    }

    problems
}

async fn run(
    scenario_path: PathBuf,
    fixtures: Option<PathBuf>,
    deadline_secs: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let file = load_scenario_file(&scenario_path)?;

    let problems = validate_scenario(&file);
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("invalid scenario: {problem}");
        }
        bail!("scenario {} failed validation", file.scenario.name);
    }

    let fixture_root = fixtures
        .or_else(|| scenario_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut nodes = NodeSet::new();
    for spec in file.nodes {
        nodes.insert(Arc::new(ExecNode::new(spec)));
    }

    let ctx = RunContext::new(
        nodes,
        Arc::new(ExternalTopology),
        Arc::new(DirFixtureStore::new(fixture_root)),
    );

    let config = RunnerConfig {
        deadline: deadline_secs.map(Duration::from_secs),
    };
    let runner = ScenarioRunner::with_config(ctx, config);
    let report = runner.run(&file.scenario).await;

    println!("{report}");

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }

    if report.overall_pass() {
        Ok(())
    } else {
        bail!("scenario {} failed", file.scenario.name)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { scenario, fixtures, deadline_secs, output } => {
            run(scenario, fixtures, deadline_secs, output).await
        }
        Commands::Validate { scenario } => {
            let file = load_scenario_file(&scenario)?;
            let problems = validate_scenario(&file);
            if problems.is_empty() {
                let fixture_refs = file
                    .scenario
                    .steps
                    .iter()
                    .flat_map(|s| &s.assertions)
                    .filter(|a| matches!(a.expected, ExpectedState::Fixture))
                    .count();
                println!(
                    "{}: {} step(s), {} node(s), {} fixture reference(s), ok",
                    file.scenario.name,
                    file.scenario.steps.len(),
                    file.nodes.len(),
                    fixture_refs
                );
                Ok(())
            } else {
                for problem in &problems {
                    eprintln!("invalid scenario: {problem}");
                }
                bail!("scenario {} failed validation", file.scenario.name)
            }
        }
        Commands::Print { scenario } => {
            let file = load_scenario_file(&scenario)?;
            print!("{}", serde_yaml::to_string(&file.scenario)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name: locator-disable
nodes:
  - name: r1
    query: ["vtysh", "-N", "r1", "-c"]
    mutate: ["vtysh", "-N", "r1"]
steps:
  - name: step1
    assertions:
      - name: locator
        node: r1
        query: show segment-routing srv6 locator json
        expected: fixture
  - name: step2
    mutations:
      - node: r1
        config: |
          configure terminal
           segment-routing
            srv6
             locators
              no locator loc1
    assertions:
      - name: locator
        node: r1
        query: show segment-routing srv6 locator json
        expected:
          inline: { locators: [] }
        mode: exact
        policy: { max_attempts: 10 }
"#;

    #[test]
    fn scenario_file_parses_with_nodes_section() {
        let file: ScenarioFile = serde_yaml::from_str(SCENARIO).unwrap();
        assert_eq!(file.scenario.name, "locator-disable");
        assert_eq!(file.nodes.len(), 1);
        assert_eq!(file.scenario.steps.len(), 2);
        assert!(validate_scenario(&file).is_empty());
    }

    #[test]
    fn validation_flags_undeclared_nodes_and_empty_budgets() {
        let file: ScenarioFile = serde_yaml::from_str(
            r#"
name: broken
nodes:
  - name: r1
    query: []
steps:
  - name: step1
    mutations:
      - node: r2
        config: anything
    assertions:
      - name: a
        node: r3
        query: show
        expected: { inline: {} }
        policy: { max_attempts: 0 }
"#,
        )
        .unwrap();

        let problems = validate_scenario(&file);
        assert_eq!(problems.len(), 4, "{problems:?}");
        assert!(problems.iter().any(|p| p.contains("no query command")));
        assert!(problems.iter().any(|p| p.contains("undeclared node r2")));
        assert!(problems.iter().any(|p| p.contains("undeclared node r3")));
        assert!(problems.iter().any(|p| p.contains("zero attempt budget")));
    }
}
