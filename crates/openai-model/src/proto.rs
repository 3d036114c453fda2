use serde::{Deserialize, Serialize};
use serde_json::Value;
use unit4_agent_model::{
    ContentPart, ModelMessage, ModelRequest, ModelTool, ToolCallRequest,
};

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Error object, both as a standalone HTTP error body and mid-stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default)]
    pub code: Option<Value>,
}

impl ApiError {
    /// Error codes are numbers on OpenRouter and strings on OpenAI.
    pub fn is_rate_limit(&self) -> bool {
        match &self.code {
            Some(Value::Number(n)) => n.as_u64() == Some(429),
            Some(Value::String(s)) => s == "rate_limit_exceeded",
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

// ------------------------
// Types sent to the server
// ------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct ToolCall {
    id: String,
    r#type: &'static str,
    function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
enum UserContent {
    Text(String),
    Parts(Vec<Part>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message {
    System {
        content: String,
    },
    User {
        content: UserContent,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

#[inline]
pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tools: req.tools.iter().map(create_tool).collect(),
        temperature: config.temperature,
        stream_options: Some(StreamOptions {
            include_usage: true,
        }),
        stream: true,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(parts) => Message::User {
            content: create_user_content(parts),
        },
        ModelMessage::Assistant {
            content,
            tool_calls,
        } => Message::Assistant {
            // Some gateways reject an empty string next to tool calls.
            content: if content.is_empty() && !tool_calls.is_empty() {
                None
            } else {
                Some(content.clone())
            },
            tool_calls: tool_calls.iter().map(create_tool_call).collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
    }
}

fn create_user_content(parts: &[ContentPart]) -> UserContent {
    if let [ContentPart::Text(text)] = parts {
        return UserContent::Text(text.clone());
    }
    UserContent::Parts(
        parts
            .iter()
            .map(|part| match part {
                ContentPart::Text(text) => Part::Text { text: text.clone() },
                ContentPart::ImageUrl(url) => Part::ImageUrl {
                    image_url: ImageUrl { url: url.clone() },
                },
            })
            .collect(),
    )
}

#[inline]
fn create_tool_call(call: &ToolCallRequest) -> ToolCall {
    ToolCall {
        id: call.id.clone(),
        r#type: "function",
        function: FunctionCall {
            name: call.name.clone(),
            arguments: call.arguments.to_string(),
        },
    }
}

#[inline]
fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use unit4_agent_model::ToolCallResult;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::user_text("Hello"),
            ],
            tools: vec![ModelTool {
                name: "wiki_tool".to_owned(),
                description: "Gets Wikipedia pages.".to_owned(),
                parameters: json!({
                    "type": "object",
                    "properties": { "query": { "type": "string" } }
                }),
            }],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();

        let value =
            serde_json::to_value(create_request(&request, &config)).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "custom",
                "messages": [
                    { "role": "system", "content": "You are a helpful assistant." },
                    { "role": "user", "content": "Hello" }
                ],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "wiki_tool",
                        "description": "Gets Wikipedia pages.",
                        "parameters": {
                            "type": "object",
                            "properties": { "query": { "type": "string" } }
                        }
                    }
                }],
                "stream_options": { "include_usage": true },
                "stream": true
            })
        );
    }

    #[test]
    fn test_multimodal_user_content() {
        let msg = create_message(&ModelMessage::User(vec![
            ContentPart::Text("What animal is this?".to_owned()),
            ContentPart::ImageUrl("https://example.com/a.png".to_owned()),
        ]));
        assert_eq!(
            serde_json::to_value(msg).unwrap(),
            json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": "What animal is this?" },
                    {
                        "type": "image_url",
                        "image_url": { "url": "https://example.com/a.png" }
                    }
                ]
            })
        );
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let assistant = create_message(&ModelMessage::Assistant {
            content: String::new(),
            tool_calls: vec![ToolCallRequest {
                id: "call_1".to_owned(),
                name: "fetch_text_content".to_owned(),
                arguments: json!({ "url": "https://example.com" }),
            }],
        });
        assert_eq!(
            serde_json::to_value(assistant).unwrap(),
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "fetch_text_content",
                        "arguments": "{\"url\":\"https://example.com\"}"
                    }
                }]
            })
        );

        let tool = create_message(&ModelMessage::Tool(ToolCallResult {
            id: "call_1".to_owned(),
            content: "<html>".to_owned(),
        }));
        assert_eq!(
            serde_json::to_value(tool).unwrap(),
            json!({ "role": "tool", "tool_call_id": "call_1", "content": "<html>" })
        );
    }

    #[test]
    fn test_error_code_forms() {
        let numeric: ErrorBody = serde_json::from_str(
            r#"{"error":{"message":"slow down","code":429}}"#,
        )
        .unwrap();
        assert!(numeric.error.is_rate_limit());

        let textual: ErrorBody = serde_json::from_str(
            r#"{"error":{"message":"slow down","code":"rate_limit_exceeded"}}"#,
        )
        .unwrap();
        assert!(textual.error.is_rate_limit());

        let other: ErrorBody =
            serde_json::from_str(r#"{"error":{"message":"bad"}}"#).unwrap();
        assert!(!other.error.is_rate_limit());
    }
}
