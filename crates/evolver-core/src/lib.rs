//! Core of evolver: a protocol client for the `claude` CLI and an
//! orchestrator that runs iterative code-evolution tasks on top of it.
//!
//! Nothing in this crate persists state. Callers receive structured
//! results ([`client::AgentResponse`], [`task::EvolutionTask`] snapshots)
//! and decide what to store.

pub mod client;
pub mod evolution;
pub mod task;
