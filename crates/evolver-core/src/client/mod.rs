//! Protocol client for the `claude` coding agent.
//!
//! This module defines the [`AgentClient`] trait, the request/response
//! types that cross it, and [`ClaudeCodeClient`], which drives the real
//! `claude` binary as a subprocess.
//!
//! # Architecture
//!
//! ```text
//! caller (orchestrator, CLI)
//!     |
//!     v
//! &dyn AgentClient
//!     |
//!     |   query(request) ----------> build_args(.., Json)
//!     |        |                         |
//!     |        |                   spawn `claude -p ...`, wait <= timeout
//!     |        v                         |
//!     |   AgentResponse <------------ parse one JSON object (or raw text)
//!     |
//!     |   query_stream(request) ---> build_args(.., StreamJson)
//!     |        |
//!     |        v
//!     |   EventStream: text | tool_call | tool_result | error | done ... done("")
//!     |
//!     |   health_check() ----------> `claude --version` <= 10s
//! ```

pub mod claude_code;
pub mod command;
pub mod config;
pub mod error;
pub mod trait_def;
pub mod types;

pub use claude_code::ClaudeCodeClient;
pub use command::{OutputMode, build_args};
pub use config::ClientConfig;
pub use error::{AgentError, ValidationError};
pub use trait_def::{AgentClient, EventStream};
pub use types::{AgentRequest, AgentResponse, StreamEvent, StreamPayload, TokenUsage};
