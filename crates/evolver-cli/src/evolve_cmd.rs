//! `evolver analyze` and `evolver evolve`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use evolver_core::client::AgentClient;
use evolver_core::evolution::{EvolutionConfig, EvolutionOrchestrator};
use evolver_core::task::{EvolutionTask, EvolveSpec, TaskRegistry, TaskStatus};

/// How often `evolve` samples the task while it runs.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What to work on, shared by `analyze` and `evolve`.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// File or directory to improve
    pub target: String,
    /// What "better" means (at least 10 characters)
    #[arg(long)]
    pub objective: String,
    /// A rule the agent must respect; repeat for several
    #[arg(long = "constraint")]
    pub constraints: Vec<String>,
    /// Directory to run the agent in
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

impl TargetArgs {
    pub fn spec(self) -> EvolveSpec {
        EvolveSpec {
            constraints: self.constraints,
            working_dir: self.cwd,
            ..EvolveSpec::new(self.target, self.objective)
        }
    }
}

/// Run the analyze command: one read-only assessment, printed as text.
pub async fn run_analyze(client: Arc<dyn AgentClient>, args: TargetArgs) -> Result<()> {
    let orchestrator =
        EvolutionOrchestrator::new(client, TaskRegistry::new(), EvolutionConfig::default());
    let response = orchestrator
        .analyze(&args.spec())
        .await
        .context("analysis failed")?;
    println!("{}", response.result);
    Ok(())
}

/// Run the evolve command: start the task, log phases as they land, then
/// print the final snapshot as JSON. Fails when the task ends `failed`.
pub async fn run_evolve(client: Arc<dyn AgentClient>, spec: EvolveSpec) -> Result<()> {
    let orchestrator =
        EvolutionOrchestrator::new(client, TaskRegistry::new(), EvolutionConfig::default());
    let handle = orchestrator.spawn(&spec).context("invalid evolution request")?;
    let task_id = handle.task_id();
    info!(task_id = %task_id, target = %spec.target_path, "evolution task started");

    let mut progress = Progress::default();
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    while !handle.is_finished() {
        ticker.tick().await;
        if let Some(task) = orchestrator.registry().get(task_id) {
            progress.report(&task);
        }
    }
    handle.wait().await.context("evolution task panicked")?;

    let task = orchestrator
        .registry()
        .get(task_id)
        .with_context(|| format!("task {task_id} vanished from the registry"))?;
    progress.report(&task);

    println!("{}", serde_json::to_string_pretty(&task)?);

    if task.status == TaskStatus::Failed {
        bail!(
            "evolution task {task_id} failed: {}",
            task.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

/// Tracks how much of a task has already been logged.
#[derive(Debug, Default)]
struct Progress {
    changes: usize,
    tests: usize,
}

impl Progress {
    /// Log records added since the previous call. Returns how many were new.
    fn report(&mut self, task: &EvolutionTask) -> usize {
        let new_changes = task.changes.get(self.changes..).unwrap_or_default();
        for change in new_changes {
            info!(
                iteration = change.iteration,
                max = task.max_iterations,
                phase = %change.phase,
                "phase complete"
            );
        }
        let new_tests = task.test_results.get(self.tests..).unwrap_or_default();
        for test in new_tests {
            info!(iteration = test.iteration, passed = test.passed, "tests run");
        }

        let fresh = new_changes.len() + new_tests.len();
        self.changes = task.changes.len();
        self.tests = task.test_results.len();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolver_core::task::{ChangeRecord, Phase, TestRecord};

    fn change(iteration: u32, phase: Phase) -> ChangeRecord {
        ChangeRecord {
            iteration,
            phase,
            narrative: String::new(),
            tools_used: vec![],
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn target_args_build_spec() {
        let args = TargetArgs {
            target: "src/".into(),
            objective: "make parsing faster".into(),
            constraints: vec!["keep API".into()],
            cwd: Some("/repo".into()),
        };
        let spec = args.spec();
        assert_eq!(spec.target_path, "src/");
        assert_eq!(spec.constraints, vec!["keep API"]);
        assert_eq!(spec.working_dir, Some(PathBuf::from("/repo")));
        assert_eq!(spec.max_iterations, EvolveSpec::DEFAULT_MAX_ITERATIONS);
        assert!(spec.test_command.is_none());
    }

    #[test]
    fn progress_reports_each_record_once() {
        let mut task = EvolutionTask::new(&EvolveSpec::new("src/", "make parsing faster"));
        let mut progress = Progress::default();
        assert_eq!(progress.report(&task), 0);

        task.changes.push(change(1, Phase::Analyze));
        task.changes.push(change(1, Phase::Implement));
        assert_eq!(progress.report(&task), 2);
        assert_eq!(progress.report(&task), 0);

        task.test_results.push(TestRecord {
            iteration: 1,
            narrative: "ok".into(),
            passed: true,
            timestamp: chrono::Utc::now(),
        });
        task.changes.push(change(1, Phase::Evaluate));
        assert_eq!(progress.report(&task), 2);
    }
}
