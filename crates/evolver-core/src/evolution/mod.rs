//! Evolution orchestrator: runs a task through analyze / implement / test /
//! fix / evaluate phases, iteration after iteration, until the agent
//! declares the objective met or the iteration budget runs out.
//!
//! Phases within a task are strictly sequential: each one resumes the
//! conversation of the phase before it. Distinct tasks run as independent
//! tokio tasks and share nothing but the [`TaskRegistry`].

pub mod phase;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::client::{AgentClient, AgentError, AgentRequest, AgentResponse, ValidationError};
use crate::task::{
    ChangeRecord, EvolutionTask, EvolveSpec, Phase, TaskError, TaskId, TaskRegistry,
    TaskStateMachine, TaskStatus, TestRecord,
};

use phase::SessionHandle;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct EvolutionConfig {
    /// Pause between iterations. Not applied after the last one.
    pub iteration_delay: Duration,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            iteration_delay: Duration::from_secs(1),
        }
    }
}

/// Why a task finished successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolutionOutcome {
    /// The evaluate phase emitted the completion sentinel.
    ObjectiveMet { iteration: u32 },
    /// Every iteration ran without the sentinel appearing.
    BudgetExhausted { iterations: u32 },
}

/// A running evolution task.
///
/// Holds the background unit's join handle, the hook a future cancellation
/// API would act on.
#[derive(Debug)]
pub struct EvolutionHandle {
    task_id: TaskId,
    join: JoinHandle<()>,
}

impl EvolutionHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the background unit to end.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.join.await
    }
}

/// Drives evolution tasks stored in a [`TaskRegistry`].
#[derive(Clone)]
pub struct EvolutionOrchestrator {
    client: Arc<dyn AgentClient>,
    registry: TaskRegistry,
    config: EvolutionConfig,
}

impl std::fmt::Debug for EvolutionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolutionOrchestrator")
            .field("tasks", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

impl EvolutionOrchestrator {
    pub fn new(
        client: Arc<dyn AgentClient>,
        registry: TaskRegistry,
        config: EvolutionConfig,
    ) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Create a task for `spec` and start it in the background.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn(&self, spec: &EvolveSpec) -> Result<EvolutionHandle, ValidationError> {
        let task_id = self.registry.create(spec)?;
        let orchestrator = self.clone();

        let join = tokio::spawn(async move {
            if let Err(e) = orchestrator.run(task_id).await {
                error!(task_id = %task_id, error = %e, "evolution task could not run");
            }
        });

        Ok(EvolutionHandle { task_id, join })
    }

    /// Run a pending task to a terminal state and return its final snapshot.
    ///
    /// Phase failures do not produce an `Err`: they are recorded on the
    /// task, which ends `failed`. An `Err` means the task was missing or
    /// not pending.
    pub async fn run(&self, task_id: TaskId) -> Result<EvolutionTask, TaskError> {
        let spec = self
            .registry
            .get(task_id)
            .ok_or(TaskError::NotFound(task_id))?
            .spec();

        self.registry.transition(task_id, TaskStatus::Running)?;
        info!(
            task_id = %task_id,
            target = %spec.target_path,
            max_iterations = spec.max_iterations,
            "starting evolution task"
        );

        match self.iterate(task_id, &spec).await {
            Ok(outcome) => {
                self.registry.transition(task_id, TaskStatus::Completed)?;
                info!(task_id = %task_id, outcome = ?outcome, "evolution task completed");
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "evolution task failed");
                self.registry.update(task_id, |task| {
                    task.error = Some(e.to_string());
                    TaskStateMachine::transition(task, TaskStatus::Failed)
                })??;
            }
        }

        self.registry
            .get(task_id)
            .ok_or(TaskError::NotFound(task_id))
    }

    /// Run one read-only analysis of `spec.target_path`; changes nothing.
    pub async fn analyze(&self, spec: &EvolveSpec) -> Result<AgentResponse, AgentError> {
        spec.validate()?;
        let request = phase_request(
            Phase::Analyze,
            phase::analysis_only_prompt(spec),
            &SessionHandle::fresh(),
            spec,
        );
        self.client.query(&request).await
    }

    async fn iterate(
        &self,
        task_id: TaskId,
        spec: &EvolveSpec,
    ) -> Result<EvolutionOutcome, TaskError> {
        for iteration in 1..=spec.max_iterations {
            info!(
                task_id = %task_id,
                iteration,
                max = spec.max_iterations,
                "evolution iteration"
            );

            let (analysis, session) = self
                .run_phase(
                    Phase::Analyze,
                    iteration,
                    phase::analyze_prompt(spec, iteration),
                    &SessionHandle::fresh(),
                    spec,
                )
                .await?;
            self.record_change(task_id, iteration, Phase::Analyze, &analysis)?;

            let (implementation, mut latest) = self
                .run_phase(
                    Phase::Implement,
                    iteration,
                    phase::implement_prompt(spec),
                    &session,
                    spec,
                )
                .await?;
            self.record_change(task_id, iteration, Phase::Implement, &implementation)?;

            if let Some(test_command) = spec.test_command.as_deref() {
                let (report, test_session) = self
                    .run_phase(
                        Phase::Test,
                        iteration,
                        phase::test_prompt(test_command),
                        &latest,
                        spec,
                    )
                    .await?;
                let failed = phase::tests_failed(&report.result);
                self.record_test(task_id, iteration, &report, !failed)?;
                latest = test_session;

                if failed {
                    warn!(
                        task_id = %task_id,
                        iteration,
                        "tests reported failures, running fix phase"
                    );
                    let (fix, fix_session) = self
                        .run_phase(Phase::Fix, iteration, phase::fix_prompt(), &latest, spec)
                        .await?;
                    self.record_change(task_id, iteration, Phase::Fix, &fix)?;
                    latest = fix_session;
                }
            }

            let (evaluation, _) = self
                .run_phase(
                    Phase::Evaluate,
                    iteration,
                    phase::evaluate_prompt(spec),
                    &latest,
                    spec,
                )
                .await?;
            self.record_change(task_id, iteration, Phase::Evaluate, &evaluation)?;

            if phase::objective_complete(&evaluation.result) {
                info!(task_id = %task_id, iteration, "evolution objective complete");
                return Ok(EvolutionOutcome::ObjectiveMet { iteration });
            }

            if iteration < spec.max_iterations && !self.config.iteration_delay.is_zero() {
                tokio::time::sleep(self.config.iteration_delay).await;
            }
        }

        Ok(EvolutionOutcome::BudgetExhausted {
            iterations: spec.max_iterations,
        })
    }

    async fn run_phase(
        &self,
        phase: Phase,
        iteration: u32,
        prompt: String,
        resume: &SessionHandle,
        spec: &EvolveSpec,
    ) -> Result<(AgentResponse, SessionHandle), TaskError> {
        let request = phase_request(phase, prompt, resume, spec);
        let response = self
            .client
            .query(&request)
            .await
            .map_err(|source| TaskError::Phase {
                phase,
                iteration,
                source,
            })?;
        let session = resume.advance(&response);
        Ok((response, session))
    }

    /// Append a change record. The analyze record also advances the
    /// iteration counter, in the same critical section.
    fn record_change(
        &self,
        task_id: TaskId,
        iteration: u32,
        phase: Phase,
        response: &AgentResponse,
    ) -> Result<(), TaskError> {
        self.registry.update(task_id, |task| {
            if phase == Phase::Analyze {
                task.current_iteration = iteration;
            }
            task.changes.push(ChangeRecord {
                iteration,
                phase,
                narrative: response.result.clone(),
                tools_used: response.tools_used.clone(),
                timestamp: Utc::now(),
            });
            absorb_response(task, response);
        })
    }

    fn record_test(
        &self,
        task_id: TaskId,
        iteration: u32,
        response: &AgentResponse,
        passed: bool,
    ) -> Result<(), TaskError> {
        self.registry.update(task_id, |task| {
            task.test_results.push(TestRecord {
                iteration,
                narrative: response.result.clone(),
                passed,
                timestamp: Utc::now(),
            });
            absorb_response(task, response);
        })
    }
}

fn phase_request(
    phase: Phase,
    prompt: String,
    resume: &SessionHandle,
    spec: &EvolveSpec,
) -> AgentRequest {
    AgentRequest::new(prompt)
        .resume(resume.token().map(str::to_string))
        .tools(phase.allowed_tools().iter().copied())
        .max_turns(phase.max_turns())
        .working_dir(spec.working_dir.clone())
}

fn absorb_response(task: &mut EvolutionTask, response: &AgentResponse) {
    task.usage.accumulate(&response.usage);
    if !response.session_id.is_empty() {
        task.session_id = Some(response.session_id.clone());
    }
}
