//! Claude Code protocol client.
//!
//! Runs `claude -p <prompt> --output-format json` for single-shot queries
//! and `--output-format stream-json` for streaming ones, decoding the
//! reply object or the JSONL event stream respectively.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use super::command::{OutputMode, build_args};
use super::config::ClientConfig;
use super::error::AgentError;
use super::trait_def::{AgentClient, EventStream};
use super::types::{AgentRequest, AgentResponse, StreamEvent, StreamPayload, TokenUsage};

/// Fixed deadline for the `--version` liveness probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for [Claude Code](https://docs.anthropic.com/en/docs/claude-code).
#[derive(Debug, Clone, Default)]
pub struct ClaudeCodeClient {
    config: ClientConfig,
}

impl ClaudeCodeClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Create a client with default settings and a custom binary path.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self::new(ClientConfig::with_binary(path))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn command(&self, args: &[String], working_dir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        // A dropped query future or stream must never orphan the agent.
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn(&self, cmd: &mut Command) -> Result<Child, AgentError> {
        cmd.spawn().map_err(|source| AgentError::Spawn {
            binary: self.config.binary.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Single-shot reply decoding
// ---------------------------------------------------------------------------

fn usage_from_json(usage: &Value) -> TokenUsage {
    let counter = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    TokenUsage::new(
        counter("input_tokens"),
        counter("output_tokens"),
        counter("cache_read_input_tokens"),
        counter("cache_creation_input_tokens"),
    )
}

/// Decode the reply object printed by `--output-format json`.
///
/// Returns [`AgentError::Protocol`] when stdout is not a JSON object; the
/// caller degrades that to [`degraded_reply`].
fn parse_reply(
    stdout: &str,
    request_session: Option<&str>,
    duration_ms: u64,
) -> Result<AgentResponse, AgentError> {
    let value: Value = serde_json::from_str(stdout.trim())
        .map_err(|e| AgentError::Protocol(format!("reply is not JSON: {e}")))?;
    let Some(reply) = value.as_object() else {
        return Err(AgentError::Protocol("reply is not a JSON object".to_string()));
    };

    let result = match reply.get("result") {
        Some(Value::String(text)) => text.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => other.to_string(),
    };
    let session_id = reply
        .get("session_id")
        .and_then(Value::as_str)
        .or(request_session)
        .unwrap_or_default()
        .to_string();
    let usage = reply.get("usage").map(usage_from_json).unwrap_or_default();
    let cost_usd = reply
        .get("total_cost_usd")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);

    Ok(AgentResponse {
        result,
        session_id,
        usage,
        cost_usd,
        duration_ms,
        tools_used: Vec::new(),
        raw: Some(value),
    })
}

/// Best-effort response for stdout that is not a reply object.
fn degraded_reply(stdout: &str, request_session: Option<&str>, duration_ms: u64) -> AgentResponse {
    AgentResponse {
        result: stdout.trim().to_string(),
        session_id: request_session.unwrap_or_default().to_string(),
        usage: TokenUsage::default(),
        cost_usd: 0.0,
        duration_ms,
        tools_used: Vec::new(),
        raw: None,
    }
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Stream line decoding
// ---------------------------------------------------------------------------

/// One line of `--output-format stream-json`, tagged by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireLine {
    Init {
        #[serde(default)]
        session_id: Option<String>,
    },
    Text {
        #[serde(default)]
        content: String,
    },
    ToolUse {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
    },
    Result {
        #[serde(default)]
        result: String,
    },
    Error {
        #[serde(default)]
        error: Value,
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// What a single decoded stream line means to the read loop.
#[derive(Debug, PartialEq)]
enum StreamLine {
    /// The agent announced its continuation token (if it sent one).
    Session(Option<String>),
    Event(StreamPayload),
}

fn decode_stream_line(line: &str) -> StreamLine {
    let verbatim = || StreamLine::Event(StreamPayload::Text(line.to_string()));

    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return verbatim();
    };
    if !value.is_object() {
        return verbatim();
    }
    if value.get("type").and_then(Value::as_str).is_none() {
        debug!(line, "stream-json object without a type, passing through as text");
        return verbatim();
    }

    match serde_json::from_value::<WireLine>(value) {
        Ok(WireLine::Init { session_id }) => StreamLine::Session(session_id),
        Ok(WireLine::Text { content }) => StreamLine::Event(StreamPayload::Text(content)),
        Ok(WireLine::ToolUse { name, input }) => {
            StreamLine::Event(StreamPayload::ToolCall { name, input })
        }
        Ok(WireLine::ToolResult { content }) => {
            StreamLine::Event(StreamPayload::ToolResult(content))
        }
        Ok(WireLine::Result { result }) => StreamLine::Event(StreamPayload::Done(result)),
        Ok(WireLine::Error { error, message }) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .or(error.as_str())
                .map(str::to_string)
                .or(message)
                .unwrap_or_else(|| "unknown error".to_string());
            StreamLine::Event(StreamPayload::Error(message))
        }
        Ok(WireLine::Unknown) => {
            debug!(line, "unrecognised stream-json event type, passing through as text");
            verbatim()
        }
        Err(e) => {
            warn!(line, error = %e, "malformed stream-json event, passing through as text");
            verbatim()
        }
    }
}

/// Kill the agent if it outlived its stdout.
async fn reap(child: &mut Child) {
    match child.try_wait() {
        Ok(Some(status)) => debug!(code = ?status.code(), "agent stream process exited"),
        Ok(None) => {
            debug!(pid = ?child.id(), "agent still running after stream end, killing");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "failed to kill agent stream process");
            }
        }
        Err(e) => {
            warn!(error = %e, "error checking agent stream process, killing");
            let _ = child.start_kill();
        }
    }
}

// ---------------------------------------------------------------------------
// AgentClient implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl AgentClient for ClaudeCodeClient {
    async fn query(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        request.validate()?;

        let args = build_args(&self.config, request, OutputMode::Json);
        let mut cmd = self.command(&args, request.working_dir.as_deref());
        cmd.stderr(Stdio::piped());

        info!(
            binary = %self.config.binary,
            prompt_len = request.prompt.len(),
            resume = request.session_id.is_some(),
            "executing agent query"
        );
        let started = Instant::now();
        let mut child = self.spawn(&mut cmd)?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = tokio::time::timeout(self.config.timeout, async {
            let (status, out, err) = tokio::join!(child.wait(), read_all(stdout), read_all(stderr));
            Ok::<_, std::io::Error>((status?, out?, err?))
        })
        .await;

        let (status, stdout, stderr) = match outcome {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(
                    timeout_secs = self.config.timeout.as_secs_f64(),
                    "agent query timed out, killing process"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out agent");
                }
                return Err(AgentError::Timeout {
                    after: self.config.timeout,
                });
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
            error!(code = ?status.code(), stderr = %stderr, "agent query failed");
            return Err(AgentError::Execution {
                code: status.code(),
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let request_session = request.session_id.as_deref();
        let response = parse_reply(&stdout, request_session, duration_ms).unwrap_or_else(|e| {
            warn!(error = %e, "returning raw agent output as the result");
            degraded_reply(&stdout, request_session, duration_ms)
        });

        info!(
            session_id = %response.session_id,
            duration_ms,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "agent query complete"
        );
        Ok(response)
    }

    async fn query_stream(&self, request: &AgentRequest) -> Result<EventStream, AgentError> {
        request.validate()?;

        let args = build_args(&self.config, request, OutputMode::StreamJson);
        let mut cmd = self.command(&args, request.working_dir.as_deref());
        cmd.stderr(Stdio::null());

        let mut child = self.spawn(&mut cmd)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Protocol("agent stdout was not captured".to_string()))?;
        info!(
            pid = ?child.id(),
            prompt_len = request.prompt.len(),
            "starting agent stream"
        );

        let read_timeout = self.config.timeout;
        let mut session_id = request.session_id.clone();

        // Pull-driven: each line is read only when the consumer asks for the
        // next event. Dropping the stream drops `child`, which kills it.
        let stream = async_stream::stream! {
            let mut child = child;
            let mut reader = BufReader::new(stdout);
            // Raw bytes: a line that is not UTF-8 is still a line.
            let mut buf = Vec::new();

            loop {
                buf.clear();
                let read =
                    tokio::time::timeout(read_timeout, reader.read_until(b'\n', &mut buf)).await;
                match read {
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {
                        let line = String::from_utf8_lossy(&buf);
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match decode_stream_line(trimmed) {
                            StreamLine::Session(Some(id)) => session_id = Some(id),
                            StreamLine::Session(None) => {}
                            StreamLine::Event(payload) => {
                                yield StreamEvent::new(payload, session_id.clone());
                            }
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "error reading agent stdout");
                        yield StreamEvent::new(
                            StreamPayload::Error(format!("stdout read error: {e}")),
                            session_id.clone(),
                        );
                        break;
                    }
                    Err(_elapsed) => {
                        warn!(
                            timeout_secs = read_timeout.as_secs_f64(),
                            "agent stream timed out waiting for output"
                        );
                        yield StreamEvent::new(
                            StreamPayload::Error(format!(
                                "stream timed out after {}s",
                                read_timeout.as_secs_f64()
                            )),
                            session_id.clone(),
                        );
                        break;
                    }
                }
            }

            reap(&mut child).await;
            yield StreamEvent::new(StreamPayload::Done(String::new()), session_id);
        };

        Ok(Box::pin(stream))
    }

    async fn health_check(&self) -> bool {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => true,
            Ok(Ok(output)) => {
                warn!(code = ?output.status.code(), "agent health check exited unsuccessfully");
                false
            }
            Ok(Err(e)) => {
                warn!(
                    binary = %self.config.binary,
                    error = %e,
                    "agent health check failed to spawn"
                );
                false
            }
            Err(_elapsed) => {
                warn!(binary = %self.config.binary, "agent health check timed out");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
