//! `evolver chat` and `evolver stream`: one prompt, one agent conversation.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use futures::StreamExt;

use evolver_core::client::{AgentClient, AgentRequest, AgentResponse, EventStream, StreamPayload};

/// Arguments shared by `chat` and `stream`.
#[derive(Debug, Args)]
pub struct PromptArgs {
    /// Prompt to send to the agent
    pub prompt: String,
    /// Resume the conversation with this session id
    #[arg(long)]
    pub session: Option<String>,
    /// Comma-separated tools the agent may use (e.g. Read,Grep)
    #[arg(long, value_delimiter = ',')]
    pub tools: Vec<String>,
    /// Text appended to the agent's system prompt
    #[arg(long)]
    pub system_prompt: Option<String>,
    /// Directory to run the agent in
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

impl PromptArgs {
    pub fn into_request(self) -> AgentRequest {
        let mut request = AgentRequest::new(self.prompt)
            .resume(self.session)
            .tools(self.tools)
            .working_dir(self.cwd);
        request.system_prompt = self.system_prompt;
        request
    }
}

/// Run the chat command: print the result text, or the whole response as
/// JSON with `json`.
pub async fn run_chat(client: &dyn AgentClient, args: PromptArgs, json: bool) -> Result<()> {
    let response = client
        .query(&args.into_request())
        .await
        .context("agent query failed")?;
    let mut stdout = std::io::stdout().lock();
    write_response(&mut stdout, &response, json)
}

fn write_response(out: &mut impl Write, response: &AgentResponse, json: bool) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, response)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{}", response.result)?;
        if !response.session_id.is_empty() {
            tracing::info!(session_id = %response.session_id, "resume with --session");
        }
    }
    Ok(())
}

/// Run the stream command: print one JSON object per event as it arrives.
pub async fn run_stream(client: &dyn AgentClient, args: PromptArgs, partial: bool) -> Result<()> {
    let mut request = args.into_request();
    request.include_partial = partial;

    let events = client
        .query_stream(&request)
        .await
        .context("failed to start agent stream")?;
    let mut stdout = std::io::stdout();
    let errors = write_events(&mut stdout, events).await?;
    if errors > 0 {
        tracing::warn!(errors, "agent stream reported errors");
    }
    Ok(())
}

/// Write each event as a JSON line, flushing per event. Returns the number
/// of error events seen.
async fn write_events(out: &mut impl Write, mut events: EventStream) -> Result<usize> {
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if matches!(event.payload, StreamPayload::Error(_)) {
            errors += 1;
        }
        serde_json::to_writer(&mut *out, &event)?;
        writeln!(out)?;
        out.flush()?;
    }
    Ok(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evolver_core::client::{StreamEvent, TokenUsage};

    fn response() -> AgentResponse {
        AgentResponse {
            result: "4".into(),
            session_id: "abc".into(),
            usage: TokenUsage::new(3, 1, 0, 0),
            cost_usd: 0.0,
            duration_ms: 12,
            tools_used: vec![],
            raw: None,
        }
    }

    #[test]
    fn prompt_args_map_onto_request() {
        let args = PromptArgs {
            prompt: "what is 2+2".into(),
            session: Some("abc".into()),
            tools: vec!["Read".into(), "Grep".into()],
            system_prompt: Some("be terse".into()),
            cwd: Some("/tmp".into()),
        };
        let request = args.into_request();
        assert_eq!(request.prompt, "what is 2+2");
        assert_eq!(request.session_id.as_deref(), Some("abc"));
        assert_eq!(request.allowed_tools, vec!["Read", "Grep"]);
        assert_eq!(request.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(request.working_dir, Some(PathBuf::from("/tmp")));
        assert!(!request.include_partial);
    }

    #[test]
    fn plain_output_is_result_text() {
        let mut out = Vec::new();
        write_response(&mut out, &response(), false).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "4\n");
    }

    #[test]
    fn json_output_is_whole_response() {
        let mut out = Vec::new();
        write_response(&mut out, &response(), true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["session_id"], "abc");
        assert_eq!(value["usage"]["total_tokens"], 4);
    }

    #[tokio::test]
    async fn events_are_written_one_per_line() {
        let events: EventStream = Box::pin(futures::stream::iter(vec![
            StreamEvent::new(StreamPayload::Text("hi".into()), Some("s1".into())),
            StreamEvent::new(StreamPayload::Error("boom".into()), Some("s1".into())),
            StreamEvent::new(StreamPayload::Done(String::new()), Some("s1".into())),
        ]));

        let mut out = Vec::new();
        let errors = write_events(&mut out, events).await.unwrap();

        assert_eq!(errors, 1);
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "text");
        assert_eq!(lines[1]["content"], "boom");
        assert_eq!(lines[2]["type"], "done");
    }
}
