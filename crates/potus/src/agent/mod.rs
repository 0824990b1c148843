//! Agent runtime: the conversation loop and its supporting pieces.
//!
//! - [`agent::Agent`] — the orchestrator. One instance per session;
//!   [`Agent::process()`](agent::Agent::process) runs one user turn and
//!   streams [`AgentEvent`]s back.
//! - [`memory::Memory`] — append-only conversation log with a
//!   per-message token index.
//! - [`executor::Executor`] — tool dispatch behind the permission gate.
//! - [`events`] — the tagged event stream a frontend renders.

pub mod agent;
pub mod events;
pub mod executor;
pub mod memory;

pub use agent::{Agent, AgentConfig, ContextOptions, MAX_TOOL_ITERATIONS};
pub use events::{AgentEvent, TokenUpdate};
pub use executor::{ConfirmFuture, ConfirmHandler, Decision, Executor};
pub use memory::{Memory, TokenSummary};
