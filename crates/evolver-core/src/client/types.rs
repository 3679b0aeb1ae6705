//! Request, response and event types exchanged with the agent client.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::ValidationError;

/// A single request to the agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// The user prompt. Must be non-empty.
    pub prompt: String,
    /// Continuation token from an earlier reply; resumes that conversation.
    pub session_id: Option<String>,
    /// Tool names the agent may invoke. Empty means "agent default".
    pub allowed_tools: Vec<String>,
    /// Upper bound on agent turns for this request.
    pub max_turns: Option<u32>,
    /// Text appended to the agent's system prompt.
    pub system_prompt: Option<String>,
    /// Working directory for the agent process. `None` inherits ours.
    pub working_dir: Option<PathBuf>,
    /// Model override; falls back to the client's configured model.
    pub model: Option<String>,
    /// Streaming only: ask the agent for intermediate messages.
    pub include_partial: bool,
}

impl AgentRequest {
    /// Create a request with the given prompt and defaults for everything else.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Resume the conversation identified by `session_id`, if any.
    pub fn resume(mut self, session_id: Option<String>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Restrict the agent to the given tools.
    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Reject requests that must never reach the agent process.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        Ok(())
    }
}

/// Token accounting reported by the agent for one reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Always `input_tokens + output_tokens`, saturating at `u64::MAX`.
    pub total_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
}

impl TokenUsage {
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        cache_read_tokens: u64,
        cache_creation_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens.saturating_add(output_tokens),
            cache_read_tokens,
            cache_creation_tokens,
        }
    }

    /// Add another reply's counters to this running total.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        *self = Self::new(
            self.input_tokens.saturating_add(other.input_tokens),
            self.output_tokens.saturating_add(other.output_tokens),
            self.cache_read_tokens.saturating_add(other.cache_read_tokens),
            self.cache_creation_tokens.saturating_add(other.cache_creation_tokens),
        );
    }
}

/// The decoded result of a synchronous query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentResponse {
    /// Final result text.
    pub result: String,
    /// Continuation token to resume this conversation. May be empty.
    pub session_id: String,
    pub usage: TokenUsage,
    /// Cost reported by the agent, 0 when absent.
    pub cost_usd: f64,
    /// Wall time from spawn to process exit.
    pub duration_ms: u64,
    /// Tools the agent ran. Always empty for single-shot queries: the
    /// `json` output format does not report them.
    pub tools_used: Vec<String>,
    /// The parsed reply object, `None` when stdout was not JSON.
    pub raw: Option<serde_json::Value>,
}

/// Kind-specific payload of a [`StreamEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum StreamPayload {
    /// Assistant text, or a verbatim line that could not be decoded.
    Text(String),
    /// The agent invoked a tool.
    ToolCall {
        name: Option<String>,
        input: serde_json::Value,
    },
    /// A tool returned a value.
    ToolResult(serde_json::Value),
    Error(String),
    /// End of a response. The final event of every stream is an empty `Done`.
    Done(String),
}

/// One event from a streaming query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(flatten)]
    pub payload: StreamPayload,
    /// Continuation token, once the agent has announced it.
    pub session_id: Option<String>,
}

impl StreamEvent {
    pub fn new(payload: StreamPayload, session_id: Option<String>) -> Self {
        Self {
            payload,
            session_id,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.payload, StreamPayload::Done(_))
    }
}
