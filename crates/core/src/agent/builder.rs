use std::sync::Arc;

use unit4_agent_model::ModelProvider;

use super::{Agent, AgentEvent, DEFAULT_SYSTEM_PROMPT};
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{FinalAnswerTool, Registry, Tool};

const DEFAULT_MAX_STEPS: u32 = 15;

/// [`Agent`] builder.
pub struct AgentBuilder {
    model_client: ModelClient,
    registry: Registry,
    system_prompt: Option<String>,
    max_steps: u32,
    planning_interval: Option<u32>,
    retry_policy: RetryPolicy,
    on_event: Option<Arc<dyn Fn(AgentEvent) + Send + Sync>>,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    ///
    /// The `final_answer` tool is registered already.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        let mut registry = Registry::default();
        registry.add_tool(FinalAnswerTool::default());
        Self {
            model_client: ModelClient::new(provider),
            registry,
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            planning_interval: None,
            retry_policy: RetryPolicy::default(),
            on_event: None,
        }
    }

    /// Replaces the built-in system prompt.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Registers a tool.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.registry.add_tool(tool);
        self
    }

    /// Sets how many action steps the agent may take. At least one step
    /// is always taken.
    #[inline]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Plans before the first step and then every `interval` steps. `None`
    /// or `Some(0)` disables planning.
    #[inline]
    pub fn with_planning_interval(mut self, interval: Option<u32>) -> Self {
        self.planning_interval = interval.filter(|interval| *interval > 0);
        self
    }

    /// Sets how rate-limited model requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Attaches a callback that observes the progress of every run.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_event = Some(Arc::new(on_event));
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            model_client,
            registry,
            system_prompt,
            max_steps,
            planning_interval,
            retry_policy,
            on_event,
        } = self;

        Agent {
            model_client: model_client.with_retry_policy(retry_policy),
            registry,
            system_prompt: system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_owned()),
            max_steps,
            planning_interval,
            on_event,
        }
    }
}
