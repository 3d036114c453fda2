//! Tool call supports.

mod error;
mod final_answer;
mod object;
mod registry;

use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::{Error, ErrorKind};
pub use final_answer::{
    FINAL_ANSWER_TOOL_NAME, FinalAnswerParameters, FinalAnswerTool,
};
pub use registry::Registry;

/// The result of a tool call.
pub type ToolResult = Result<String, Error>;

/// A started tool call.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult> + Send>>;

/// A tool that can be called by the model.
///
/// Implementations of this trait should be stateless. Configuration the tool
/// needs (an HTTP client, a storage location) is set during initialization
/// and copied into the future when executing.
pub trait Tool: Send + Sync + 'static {
    /// The type of input that the tool accepts.
    type Input: DeserializeOwned;

    /// Returns the name of the tool.
    fn name(&self) -> &str;

    /// Returns the description of the tool.
    fn description(&self) -> &str;

    /// Returns the parameter schema of the tool.
    fn parameter_schema(&self) -> &Value;

    /// Executes the tool with the given input.
    ///
    /// This method must return a future that is fully independent of `self`,
    /// and the future should be cancellation safe.
    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static;
}
