use std::error::Error;
use std::fmt::{self, Debug, Display};

use unit4_agent_model::ModelProviderError;

/// Errors that abort an agent run.
pub enum AgentError {
    /// The task was empty after trimming.
    EmptyTask,
    /// The model provider failed with an error that retrying cannot fix.
    Model(Box<dyn ModelProviderError>),
}

impl Debug for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::EmptyTask => f.write_str("EmptyTask"),
            AgentError::Model(err) => {
                f.debug_tuple("Model").field(&err.kind()).field(err).finish()
            }
        }
    }
}

impl Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentError::EmptyTask => write!(f, "the task is empty"),
            AgentError::Model(err) => write!(f, "model request failed: {err}"),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AgentError::EmptyTask => None,
            AgentError::Model(err) => Some(err.as_ref()),
        }
    }
}
