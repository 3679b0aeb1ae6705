//! Argument-vector builder for the `claude` CLI.
//!
//! Everything here is a pure mapping from a request to `Vec<String>`. The
//! vector is handed to [`tokio::process::Command::args`], so prompts are
//! never re-parsed by a shell.

use super::config::ClientConfig;
use super::types::AgentRequest;

/// Which stdout format to ask the agent for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One JSON object when the agent exits.
    Json,
    /// Newline-delimited JSON events while the agent runs.
    StreamJson,
}

impl OutputMode {
    pub fn as_flag_value(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

/// Build the arguments (excluding the binary itself) for one agent run.
pub fn build_args(config: &ClientConfig, request: &AgentRequest, mode: OutputMode) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        request.prompt.clone(),
        "--output-format".to_string(),
        mode.as_flag_value().to_string(),
    ];

    if let Some(session_id) = request.session_id.as_deref().filter(|s| !s.is_empty()) {
        args.push("--resume".to_string());
        args.push(session_id.to_string());
    }

    if !request.allowed_tools.is_empty() {
        args.push("--allowedTools".to_string());
        args.push(request.allowed_tools.join(","));
    }

    if let Some(system_prompt) = request.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        args.push("--append-system-prompt".to_string());
        args.push(system_prompt.to_string());
    }

    if let Some(model) = request.model.as_ref().or(config.model.as_ref()) {
        args.push("--model".to_string());
        args.push(model.clone());
    }

    if let Some(fallback) = config.fallback_model.as_ref() {
        args.push("--fallback-model".to_string());
        args.push(fallback.clone());
    }

    if mode == OutputMode::StreamJson && config.verbose_stream {
        args.push("--verbose".to_string());
    }

    if mode == OutputMode::StreamJson && request.include_partial {
        args.push("--include-partial-messages".to_string());
    }

    args
}
