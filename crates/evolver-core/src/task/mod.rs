//! Evolution task records and the registry that holds them.

pub mod registry;
pub mod state;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{TokenUsage, ValidationError};

pub use registry::TaskRegistry;
pub use state::TaskStateMachine;

/// Identifier of an evolution task.
pub type TaskId = Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of an evolution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid task status: {0:?}")]
pub struct TaskStatusParseError(pub String);

/// One agent invocation within an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Analyze,
    Implement,
    Test,
    Fix,
    Evaluate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyze => "analyze",
            Self::Implement => "implement",
            Self::Test => "test",
            Self::Fix => "fix",
            Self::Evaluate => "evaluate",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Orchestrator-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("invalid state transition: {from} -> {to} for task {id}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("{phase} phase failed in iteration {iteration}: {source}")]
    Phase {
        phase: Phase,
        iteration: u32,
        #[source]
        source: crate::client::AgentError,
    },
}

// ---------------------------------------------------------------------------
// Creation spec
// ---------------------------------------------------------------------------

/// Everything needed to create an evolution task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolveSpec {
    /// File or directory the agent should improve.
    pub target_path: String,
    /// What "better" means for this task.
    pub objective: String,
    /// Rules the agent must respect while changing code.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Command the agent runs in the test phase. No test phase when `None`.
    #[serde(default)]
    pub test_command: Option<String>,
    #[serde(default = "EvolveSpec::default_max_iterations")]
    pub max_iterations: u32,
    /// Working directory for every phase query.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl EvolveSpec {
    pub const MIN_OBJECTIVE_LEN: usize = 10;
    pub const MIN_ITERATIONS: u32 = 1;
    pub const MAX_ITERATIONS: u32 = 20;
    pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

    pub fn new(target_path: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            objective: objective.into(),
            constraints: Vec::new(),
            test_command: None,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
            working_dir: None,
        }
    }

    fn default_max_iterations() -> u32 {
        Self::DEFAULT_MAX_ITERATIONS
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target_path.trim().is_empty() {
            return Err(ValidationError::EmptyTargetPath);
        }
        let objective_len = self.objective.trim().chars().count();
        if objective_len < Self::MIN_OBJECTIVE_LEN {
            return Err(ValidationError::ObjectiveTooShort {
                min: Self::MIN_OBJECTIVE_LEN,
                actual: objective_len,
            });
        }
        if !(Self::MIN_ITERATIONS..=Self::MAX_ITERATIONS).contains(&self.max_iterations) {
            return Err(ValidationError::IterationsOutOfRange {
                min: Self::MIN_ITERATIONS,
                max: Self::MAX_ITERATIONS,
                actual: self.max_iterations,
            });
        }
        Ok(())
    }

    /// Constraints rendered for a prompt, `"None"` when there are none.
    pub fn constraints_line(&self) -> String {
        if self.constraints.is_empty() {
            "None".to_string()
        } else {
            self.constraints.join(", ")
        }
    }
}

// ---------------------------------------------------------------------------
// Task record
// ---------------------------------------------------------------------------

/// Narrative output of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub iteration: u32,
    pub phase: Phase,
    pub narrative: String,
    pub tools_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Report from one test phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub iteration: u32,
    pub narrative: String,
    /// Heuristic verdict: `false` when the report mentions FAILED or ERROR.
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
}

/// An evolution task as seen by status readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionTask {
    pub id: TaskId,
    pub status: TaskStatus,
    pub target_path: String,
    pub objective: String,
    pub constraints: Vec<String>,
    pub test_command: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub max_iterations: u32,
    /// The iteration whose analyze phase most recently completed.
    pub current_iteration: u32,
    pub changes: Vec<ChangeRecord>,
    pub test_results: Vec<TestRecord>,
    /// Token usage summed over every phase so far.
    pub usage: TokenUsage,
    /// Continuation token of the latest phase.
    pub session_id: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EvolutionTask {
    /// A fresh pending task for `spec`.
    pub fn new(spec: &EvolveSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: TaskStatus::Pending,
            target_path: spec.target_path.clone(),
            objective: spec.objective.clone(),
            constraints: spec.constraints.clone(),
            test_command: spec.test_command.clone(),
            working_dir: spec.working_dir.clone(),
            max_iterations: spec.max_iterations,
            current_iteration: 0,
            changes: Vec::new(),
            test_results: Vec::new(),
            usage: TokenUsage::default(),
            session_id: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// The spec this task was created from.
    pub fn spec(&self) -> EvolveSpec {
        EvolveSpec {
            target_path: self.target_path.clone(),
            objective: self.objective.clone(),
            constraints: self.constraints.clone(),
            test_command: self.test_command.clone(),
            max_iterations: self.max_iterations,
            working_dir: self.working_dir.clone(),
        }
    }

    /// Change records of a single iteration, in order.
    pub fn changes_for(&self, iteration: u32) -> impl Iterator<Item = &ChangeRecord> {
        self.changes.iter().filter(move |c| c.iteration == iteration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_parse_agree() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
        let err = "escalated".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid task status: \"escalated\"");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn spec_validation_rules() {
        let ok = EvolveSpec::new("src/", "make parsing faster");
        assert!(ok.validate().is_ok());

        let short = EvolveSpec::new("src/", "faster");
        assert_eq!(
            short.validate(),
            Err(ValidationError::ObjectiveTooShort { min: 10, actual: 6 })
        );

        let no_target = EvolveSpec::new("  ", "make parsing faster");
        assert_eq!(no_target.validate(), Err(ValidationError::EmptyTargetPath));

        for bad in [0, 21] {
            let spec = EvolveSpec {
                max_iterations: bad,
                ..ok.clone()
            };
            assert!(matches!(
                spec.validate(),
                Err(ValidationError::IterationsOutOfRange { actual, .. }) if actual == bad
            ));
        }
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: EvolveSpec =
            serde_json::from_str(r#"{"target_path":"lib.rs","objective":"remove all unwraps"}"#)
                .unwrap();
        assert_eq!(spec.max_iterations, EvolveSpec::DEFAULT_MAX_ITERATIONS);
        assert!(spec.constraints.is_empty());
        assert!(spec.test_command.is_none());
    }

    #[test]
    fn constraints_line_defaults_to_none() {
        let mut spec = EvolveSpec::new("src/", "make parsing faster");
        assert_eq!(spec.constraints_line(), "None");
        spec.constraints = vec!["no new deps".into(), "keep API".into()];
        assert_eq!(spec.constraints_line(), "no new deps, keep API");
    }

    #[test]
    fn new_task_is_pending_and_round_trips_spec() {
        let mut spec = EvolveSpec::new("src/", "make parsing faster");
        spec.test_command = Some("cargo test".into());
        let task = EvolutionTask::new(&spec);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.current_iteration, 0);
        assert!(task.started_at.is_none());
        assert_eq!(task.spec(), spec);
    }

    #[test]
    fn task_snapshot_serializes_status_snake_case() {
        let task = EvolutionTask::new(&EvolveSpec::new("src/", "make parsing faster"));
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["current_iteration"], 0);
    }
}
