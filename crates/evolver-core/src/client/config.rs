//! Configuration for the `claude` protocol client.

use std::time::Duration;

/// How to reach and drive the agent binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Path to the `claude` binary. Defaults to `"claude"` (found via `$PATH`).
    pub binary: String,
    /// Model used when a request does not name one.
    pub model: Option<String>,
    /// Model the agent silently retries with when the primary is at capacity.
    pub fallback_model: Option<String>,
    /// Overall deadline for a synchronous query, and per-line deadline for
    /// a streaming one.
    pub timeout: Duration,
    /// Pass `--verbose` on streaming runs. Current `claude` releases refuse
    /// `-p --output-format stream-json` without it.
    pub verbose_stream: bool,
}

impl ClientConfig {
    pub const DEFAULT_BINARY: &'static str = "claude";
    pub const DEFAULT_MODEL: &'static str = "claude-sonnet-4-20250514";
    pub const DEFAULT_FALLBACK_MODEL: &'static str = "claude-haiku-4-5-20251001";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Default config pointing at a custom binary.
    ///
    /// Useful for testing or when `claude` is installed in a non-standard
    /// location.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            binary: Self::DEFAULT_BINARY.to_string(),
            model: Some(Self::DEFAULT_MODEL.to_string()),
            fallback_model: Some(Self::DEFAULT_FALLBACK_MODEL.to_string()),
            timeout: Self::DEFAULT_TIMEOUT,
            verbose_stream: false,
        }
    }
}
