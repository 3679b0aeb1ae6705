//! The `AgentClient` trait -- the seam between the orchestrator and the
//! agent process.
//!
//! [`super::ClaudeCodeClient`] is the production implementation. The
//! trait is object-safe so the orchestrator can hold an
//! `Arc<dyn AgentClient>` and tests can substitute a scripted client.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::error::AgentError;
use super::types::{AgentRequest, AgentResponse, StreamEvent};

/// A lazily produced sequence of stream events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Client interface for one agent runtime.
///
/// Every call owns exactly one agent process; nothing is shared across
/// invocations.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Run the agent to completion and decode its single JSON reply.
    async fn query(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError>;

    /// Start the agent in streaming mode.
    ///
    /// Validation and spawn failures are returned up front. Once the
    /// stream exists it never fails: problems arrive as error events and
    /// the last item is always an empty done event.
    async fn query_stream(&self, request: &AgentRequest) -> Result<EventStream, AgentError>;

    /// Liveness probe. Never errors; any failure reads as `false`.
    async fn health_check(&self) -> bool;
}

// Compile-time assertion: AgentClient must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn AgentClient) {}
};
