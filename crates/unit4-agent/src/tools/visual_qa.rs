use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use unit4_agent_core::tool::{Tool, ToolResult};
use unit4_agent_core::{ModelClient, RetryPolicy};
use unit4_agent_model::{ContentPart, ModelMessage, ModelProvider, ModelRequest};

/// Parameters of [`VisualQaTool`].
#[derive(Deserialize, JsonSchema)]
pub struct VisualQaParameters {
    #[schemars(
        description = "URL of the image to analyze, no extension needed."
    )]
    image_url: String,
    #[schemars(description = "The question to ask about the image.")]
    question: String,
}

/// A tool that asks a vision model about an image.
pub struct VisualQaTool {
    model_client: ModelClient,
    parameter_schema: Value,
}

impl VisualQaTool {
    /// Creates a tool that asks `provider`, which should be configured with
    /// a vision model.
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            model_client: ModelClient::new(provider),
            parameter_schema: schema_for!(VisualQaParameters).to_value(),
        }
    }

    /// Sets how rate-limited requests are retried.
    #[inline]
    pub fn with_retry_policy(self, retry_policy: RetryPolicy) -> Self {
        Self {
            model_client: self.model_client.with_retry_policy(retry_policy),
            ..self
        }
    }
}

impl Tool for VisualQaTool {
    type Input = VisualQaParameters;

    fn name(&self) -> &str {
        "visual_qa_tool"
    }

    fn description(&self) -> &str {
        "Answers a question about an image."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: VisualQaParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let model_client = self.model_client.clone();
        let req = ModelRequest {
            messages: vec![ModelMessage::User(vec![
                ContentPart::Text(input.question),
                ContentPart::ImageUrl(input.image_url.trim().to_owned()),
            ])],
            tools: vec![],
        };
        async move {
            match model_client.send_request(req, |_| {}).await {
                Ok(resp) if !resp.transcript.trim().is_empty() => {
                    Ok(resp.transcript)
                }
                Ok(_) => {
                    Ok("Error: No content returned from the model.".to_owned())
                }
                Err(err) => {
                    warn!("visual question answering failed: {err}");
                    Ok(format!("Error: {err}"))
                }
            }
        }
    }
}
