use std::future::ready;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;

use super::{Error, Tool, ToolResult};

/// Name of the built-in tool that ends a run.
pub const FINAL_ANSWER_TOOL_NAME: &str = "final_answer";

/// Parameters of the [`FinalAnswerTool`].
#[derive(Deserialize, JsonSchema)]
pub struct FinalAnswerParameters {
    /// The final answer to the problem.
    pub answer: String,
}

/// The tool the model calls to hand in its answer.
///
/// It is registered by the agent automatically.
pub struct FinalAnswerTool {
    parameter_schema: Value,
}

impl Default for FinalAnswerTool {
    fn default() -> Self {
        let schema = schema_for!(FinalAnswerParameters);
        Self {
            parameter_schema: schema.to_value(),
        }
    }
}

impl Tool for FinalAnswerTool {
    type Input = FinalAnswerParameters;

    fn name(&self) -> &str {
        FINAL_ANSWER_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Provides a final answer to the given problem."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let answer = input.answer.trim().to_owned();
        if answer.is_empty() {
            return ready(Err(
                Error::invalid_input().with_reason("The answer is empty")
            ));
        }
        ready(Ok(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_final_answer() {
        let tool = FinalAnswerTool::default();
        let schema = tool.parameter_schema();
        assert_eq!(schema["required"][0], "answer");

        let answer = tool
            .execute(FinalAnswerParameters {
                answer: " 3 \n".to_owned(),
            })
            .await;
        assert_eq!(answer.unwrap(), "3");

        let err = tool
            .execute(FinalAnswerParameters {
                answer: "  ".to_owned(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "The answer is empty");
    }
}
