//! Core logic including the agent loop, step memory and tool execution.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

mod agent;
mod error;
pub mod memory;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentEvent, RunOutcome};
pub use error::AgentError;
pub use model_client::{ModelClient, ModelClientResponse, RetryPolicy};
pub use tool::{Tool, ToolResult};
