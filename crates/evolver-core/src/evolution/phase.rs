//! Per-phase agent settings, prompts, and the text heuristics that steer
//! the evolution loop.

use crate::client::AgentResponse;
use crate::task::{EvolveSpec, Phase};

/// Literal the evaluate phase is asked to emit once the objective is met.
pub const COMPLETION_SENTINEL: &str = "OBJECTIVE_COMPLETE";

impl Phase {
    /// Tools the agent may use in this phase.
    pub fn allowed_tools(self) -> &'static [&'static str] {
        match self {
            Self::Analyze => &["Read", "Glob", "Grep"],
            Self::Implement => &["Read", "Edit", "Write"],
            Self::Test => &["Bash"],
            Self::Fix => &["Read", "Edit", "Bash"],
            Self::Evaluate => &["Read"],
        }
    }

    pub fn max_turns(self) -> u32 {
        match self {
            Self::Analyze => 5,
            Self::Implement | Self::Fix => 10,
            Self::Test | Self::Evaluate => 3,
        }
    }
}

/// Conversation continuity handed from one phase to the next.
///
/// Each phase consumes the handle returned by the phase before it; there
/// is no shared "current session" to mutate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionHandle(Option<String>);

impl SessionHandle {
    /// A new conversation.
    pub fn fresh() -> Self {
        Self(None)
    }

    /// Continue from the token in `response`, if it carried one.
    pub fn from_response(response: &AgentResponse) -> Self {
        Self(Some(response.session_id.clone()).filter(|s| !s.is_empty()))
    }

    /// The handle to resume after `response`: its token, or this one when
    /// the reply carried none.
    pub fn advance(&self, response: &AgentResponse) -> Self {
        match Self::from_response(response) {
            Self(None) => self.clone(),
            next => next,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Whether a test report looks like a failure.
///
/// A case-insensitive substring match on "FAILED" or "ERROR". This reads
/// natural-language output, so a report such as "0 errors" trips it too.
pub fn tests_failed(report: &str) -> bool {
    let upper = report.to_uppercase();
    upper.contains("FAILED") || upper.contains("ERROR")
}

/// Whether an evaluation declares the objective met (case-sensitive).
pub fn objective_complete(evaluation: &str) -> bool {
    evaluation.contains(COMPLETION_SENTINEL)
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

pub fn analyze_prompt(spec: &EvolveSpec, iteration: u32) -> String {
    format!(
        "Analyze the code at '{target}' for improvements.\n\n\
         Objective: {objective}\n\
         Constraints: {constraints}\n\n\
         Iteration: {iteration}/{max}\n\n\
         1. Read the relevant code.\n\
         2. Identify concrete improvements that serve the objective.\n\
         3. Describe the changes you will make and why.",
        target = spec.target_path,
        objective = spec.objective,
        constraints = spec.constraints_line(),
        max = spec.max_iterations,
    )
}

pub fn implement_prompt(spec: &EvolveSpec) -> String {
    format!(
        "Implement the improvements from your analysis.\n\n\
         Objective: {objective}\n\n\
         Change only what serves the objective, and be precise.",
        objective = spec.objective,
    )
}

pub fn test_prompt(test_command: &str) -> String {
    format!(
        "Run the tests to check that the changes work.\n\n\
         Test command: {test_command}\n\n\
         Execute it and report the results."
    )
}

pub fn fix_prompt() -> String {
    "The tests failed. Diagnose the failures and fix them.".to_string()
}

pub fn evaluate_prompt(spec: &EvolveSpec) -> String {
    format!(
        "Evaluate the code against the objective.\n\n\
         Objective: {objective}\n\n\
         Rate progress from 1 to 10 and explain:\n\
         1. What has been achieved\n\
         2. What still needs work\n\
         3. Whether another iteration is worthwhile\n\n\
         If the objective is fully met, end your answer with \"{COMPLETION_SENTINEL}\".",
        objective = spec.objective,
    )
}

/// Prompt for a standalone, read-only analysis pass.
pub fn analysis_only_prompt(spec: &EvolveSpec) -> String {
    format!(
        "Analyze the code at '{target}'.\n\n\
         Objective: {objective}\n\
         Constraints: {constraints}\n\n\
         Provide:\n\
         1. An assessment of the current state\n\
         2. Issues and improvement opportunities\n\
         3. Recommended changes, by priority\n\
         4. Risks of those changes\n\n\
         Do NOT make any changes. Analysis only.",
        target = spec.target_path,
        objective = spec.objective,
        constraints = spec.constraints_line(),
    )
}
