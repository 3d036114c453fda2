use std::collections::HashMap;
use std::future::ready;

use unit4_agent_model::{ModelTool, ToolCallRequest};

use super::object::{ToolObject, ToolObjectImpl};
use super::{Error, Tool, ToolFuture, ToolResult};

/// An object that holds the toolset and dispatches requests from the model.
#[derive(Default)]
pub struct Registry {
    tools: HashMap<String, Box<dyn ToolObject>>,
}

impl Registry {
    /// Adds a tool, replacing any tool registered under the same name.
    pub fn add_tool<T: Tool>(&mut self, tool: T) {
        let name = tool.name().to_owned();
        if self
            .tools
            .insert(name.clone(), Box::new(ToolObjectImpl(tool)))
            .is_some()
        {
            warn!("tool `{name}` was registered twice, keeping the last one");
        }
    }

    /// Returns `true` if a tool with the given name is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns the definitions of all tools, sorted by name.
    pub fn definitions(&self) -> Vec<ModelTool> {
        let mut definitions: Vec<_> = self
            .tools
            .values()
            .map(|tool| ModelTool {
                name: tool.name().to_owned(),
                description: tool.description().to_owned(),
                parameters: tool.parameter_schema().clone(),
            })
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Starts a tool call.
    ///
    /// The returned future doesn't borrow from the registry. Calls to an
    /// unknown tool resolve to a [`NotFound`](super::ErrorKind::NotFound)
    /// error, so every request gets a result.
    pub fn call(&self, req: &ToolCallRequest) -> ToolFuture {
        let Some(tool) = self.tools.get(&req.name) else {
            warn!("tool not found: {}", req.name);
            let err = Error::not_found()
                .with_reason(format!("Unknown tool `{}`", req.name));
            return Box::pin(ready(ToolResult::Err(err)));
        };

        trace!("calling tool ({}) with args: {:?}", req.id, req.arguments);
        tool.execute(req.arguments.clone())
    }
}
