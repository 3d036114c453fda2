use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::Deserialize;
use serde_json::Value;
use unit4_agent_core::tool::{Tool, ToolResult};

/// Parameters of [`FetchTextContentTool`].
#[derive(Deserialize, JsonSchema)]
pub struct FetchTextContentParameters {
    #[schemars(description = "The URL to fetch.")]
    url: String,
}

/// A tool that fetches the body of a URL as text.
pub struct FetchTextContentTool {
    client: Client,
    parameter_schema: Value,
}

impl FetchTextContentTool {
    /// Creates a tool that sends its requests through `client`.
    #[inline]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            parameter_schema: schema_for!(FetchTextContentParameters)
                .to_value(),
        }
    }
}

impl Tool for FetchTextContentTool {
    type Input = FetchTextContentParameters;

    fn name(&self) -> &str {
        "fetch_text_content"
    }

    fn description(&self) -> &str {
        "Fetches the text content of a web page or file from a URL."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: FetchTextContentParameters,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let client = self.client.clone();
        async move {
            match fetch_text(&client, input.url.trim()).await {
                Ok(text) => Ok(text),
                Err(err) => {
                    debug!("failed to fetch {}: {err}", input.url);
                    Ok(format!("Error fetching URL: {err}"))
                }
            }
        }
    }
}

async fn fetch_text(
    client: &Client,
    url: &str,
) -> Result<String, reqwest::Error> {
    let resp = client.get(url).send().await?.error_for_status()?;
    resp.text().await
}
