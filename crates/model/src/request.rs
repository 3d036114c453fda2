use serde_json::Value;

use crate::response::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelRequest {
    /// The input messages.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input, which may mix text and images.
    User(Vec<ContentPart>),
    /// An assistant turn, including the tools it asked to call.
    Assistant {
        /// The text the assistant produced, may be empty.
        content: String,
        /// Tool calls requested in this turn.
        tool_calls: Vec<ToolCallRequest>,
    },
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a user message with a single text part.
    #[inline]
    pub fn user_text<S: Into<String>>(text: S) -> Self {
        ModelMessage::User(vec![ContentPart::Text(text.into())])
    }

    /// Creates an assistant message without tool calls.
    #[inline]
    pub fn assistant_text<S: Into<String>>(text: S) -> Self {
        ModelMessage::Assistant {
            content: text.into(),
            tool_calls: vec![],
        }
    }
}

/// A part of a user message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// An image referenced by URL (either remote or a `data:` URL).
    ImageUrl(String),
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The unique identifier for the tool call request.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}
