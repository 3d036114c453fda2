mod builder;

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::Instrument;
use unit4_agent_model::{
    ModelMessage, ModelProviderError, ModelRequest, ModelTool, TokenUsage,
    ToolCallRequest,
};

use crate::error::AgentError;
use crate::memory::{
    ActionStep, FinalAnswerStep, Memory, Observation, PlanningStep, Step,
    TaskStep,
};
use crate::model_client::{ModelClient, ModelClientResponse};
use crate::tool::{FINAL_ANSWER_TOOL_NAME, Registry};
pub use builder::AgentBuilder;

const DEFAULT_SYSTEM_PROMPT: &str = include_str!("agent/prompts/system.md");
const INITIAL_PLAN_PROMPT: &str = include_str!("agent/prompts/initial_plan.md");
const UPDATE_PLAN_PROMPT: &str = include_str!("agent/prompts/update_plan.md");
const FINAL_ANSWER_PROMPT: &str = include_str!("agent/prompts/final_answer.md");

/// Progress reported while an agent runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    /// A plan was made or updated.
    PlanningStep(String),
    /// An action step started.
    StepStarted {
        /// 1-based number of the step.
        step_number: u32,
        /// The step limit of the agent.
        max_steps: u32,
    },
    /// Received a message delta from the model.
    MessageDelta(String),
    /// The model asked to call a tool.
    ToolCall(ToolCallRequest),
    /// A tool call finished.
    Observation(Observation),
    /// The run ended with an answer.
    FinalAnswer(String),
}

/// The result of a finished run.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    /// The final answer.
    pub answer: String,
    /// Every step of the run, starting with the task.
    pub steps: Vec<Step>,
    /// `true` if the agent ran out of steps and the answer was requested
    /// without tools.
    pub reached_max_steps: bool,
    /// Token usage of the whole run.
    pub usage: TokenUsage,
}

/// An agent that solves a task by alternating model requests and tool
/// calls, optionally planning every few steps.
///
/// The agent itself doesn't hold the state of a run, so it can run
/// several tasks, one after another or concurrently.
pub struct Agent {
    model_client: ModelClient,
    registry: Registry,
    system_prompt: String,
    max_steps: u32,
    planning_interval: Option<u32>,
    on_event: Option<Arc<dyn Fn(AgentEvent) + Send + Sync>>,
}

impl Agent {
    /// The step limit of this agent.
    #[inline]
    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    /// Definitions of the registered tools, sorted by name.
    #[inline]
    pub fn tool_definitions(&self) -> Vec<ModelTool> {
        self.registry.definitions()
    }

    /// Runs a task until an answer is found or the steps run out.
    pub async fn run(&self, task: &str) -> Result<RunOutcome, AgentError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(AgentError::EmptyTask);
        }

        let span = info_span!("agent run", max_steps = self.max_steps);
        self.run_steps(task).instrument(span).await
    }

    async fn run_steps(&self, task: &str) -> Result<RunOutcome, AgentError> {
        let mut memory = Memory::default();
        memory.push(Step::Task(TaskStep {
            task: task.to_owned(),
        }));

        for step_number in 1..=self.max_steps {
            if self.should_plan(step_number) {
                let step = self.plan(task, &memory, step_number).await?;
                self.emit(AgentEvent::PlanningStep(step.plan.clone()));
                memory.push(Step::Planning(step));
            }

            self.emit(AgentEvent::StepStarted {
                step_number,
                max_steps: self.max_steps,
            });
            debug!("step {step_number} started");

            let req = ModelRequest {
                messages: memory.to_messages(Some(&self.system_prompt)),
                tools: self.registry.definitions(),
            };
            let resp = match self.send_request(req).await {
                Ok(resp) => resp,
                Err(err) => {
                    error!("step {step_number} failed: {err}");
                    return Err(AgentError::Model(err));
                }
            };

            let mut step = ActionStep {
                step_number,
                model_output: resp.transcript,
                tool_calls: resp.tool_calls,
                usage: resp.usage,
                ..Default::default()
            };

            if step.tool_calls.is_empty() {
                let text = step.model_output.trim();
                if !text.is_empty() {
                    let answer = text.to_owned();
                    memory.push(Step::Action(step));
                    return Ok(self.finish(memory, answer, false));
                }
                warn!("step {step_number}: empty response from the model");
                let error = "The model returned neither text nor a tool call.";
                step.error = Some(error.to_owned());
                memory.push(Step::Action(step));
                continue;
            }

            let answer = self.call_tools(&mut step).await;
            memory.push(Step::Action(step));
            if let Some(answer) = answer {
                return Ok(self.finish(memory, answer, false));
            }
        }

        info!(
            "reached max steps ({}), asking for a final answer",
            self.max_steps
        );
        let mut messages = memory.to_messages(Some(&self.system_prompt));
        messages.push(ModelMessage::user_text(
            FINAL_ANSWER_PROMPT.replace("{task}", task),
        ));
        let resp = self
            .send_request(ModelRequest {
                messages,
                tools: vec![],
            })
            .await
            .map_err(AgentError::Model)?;
        let answer = resp.transcript.trim().to_owned();
        memory.push(Step::FinalAnswer(FinalAnswerStep {
            answer: answer.clone(),
            usage: resp.usage,
        }));
        Ok(self.finish(memory, answer, true))
    }

    /// Runs the tool calls of `step` concurrently, and returns the answer if
    /// `final_answer` succeeded.
    async fn call_tools(&self, step: &mut ActionStep) -> Option<String> {
        // Calls after `final_answer` are never run.
        if let Some(pos) = step
            .tool_calls
            .iter()
            .position(|call| call.name == FINAL_ANSWER_TOOL_NAME)
        {
            if pos + 1 < step.tool_calls.len() {
                debug!("dropping tool calls after `{FINAL_ANSWER_TOOL_NAME}`");
                step.tool_calls.truncate(pos + 1);
            }
        }

        let futures: Vec<_> = step
            .tool_calls
            .iter()
            .map(|call| {
                self.emit(AgentEvent::ToolCall(call.clone()));
                self.registry.call(call)
            })
            .collect();
        let results = join_all(futures).await;

        let mut answer = None;
        for (call, result) in step.tool_calls.iter().zip(results) {
            let content = match result {
                Ok(output) => {
                    if call.name == FINAL_ANSWER_TOOL_NAME {
                        answer = Some(output.clone());
                    }
                    output
                }
                Err(err) => {
                    debug!("tool `{}` failed: {err}", call.name);
                    format!("Error: {}", err.reason())
                }
            };
            let observation = Observation {
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content,
            };
            self.emit(AgentEvent::Observation(observation.clone()));
            step.observations.push(observation);
        }
        answer
    }

    async fn plan(
        &self,
        task: &str,
        memory: &Memory,
        step_number: u32,
    ) -> Result<PlanningStep, AgentError> {
        let tools = self.describe_tools();
        let messages = if step_number == 1 {
            let prompt = INITIAL_PLAN_PROMPT
                .replace("{tools}", &tools)
                .replace("{task}", task);
            vec![ModelMessage::user_text(prompt)]
        } else {
            let remaining_steps = self.max_steps - step_number + 1;
            let prompt = UPDATE_PLAN_PROMPT
                .replace("{remaining_steps}", &remaining_steps.to_string())
                .replace("{tools}", &tools)
                .replace("{task}", task);
            let mut messages = memory.to_messages(Some(&self.system_prompt));
            messages.push(ModelMessage::user_text(prompt));
            messages
        };

        debug!("planning before step {step_number}");
        let resp = self
            .send_request(ModelRequest {
                messages,
                tools: vec![],
            })
            .await
            .map_err(AgentError::Model)?;
        Ok(PlanningStep {
            plan: resp.transcript.trim().to_owned(),
            usage: resp.usage,
        })
    }

    #[inline]
    fn should_plan(&self, step_number: u32) -> bool {
        self.planning_interval
            .is_some_and(|interval| (step_number - 1) % interval == 0)
    }

    fn describe_tools(&self) -> String {
        self.registry
            .definitions()
            .iter()
            .map(|tool| format!("- {}: {}", tool.name, tool.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn send_request(
        &self,
        req: ModelRequest,
    ) -> Result<ModelClientResponse, Box<dyn ModelProviderError>> {
        let on_event = self.on_event.clone();
        self.model_client
            .send_request(req, move |delta| {
                if let Some(on_event) = &on_event {
                    on_event(AgentEvent::MessageDelta(delta.to_owned()));
                }
            })
            .await
    }

    fn finish(
        &self,
        memory: Memory,
        answer: String,
        reached_max_steps: bool,
    ) -> RunOutcome {
        info!("run finished after {} steps", memory.action_steps());
        self.emit(AgentEvent::FinalAnswer(answer.clone()));
        let usage = memory.total_usage();
        RunOutcome {
            answer,
            steps: memory.into_steps(),
            reached_max_steps,
            usage,
        }
    }

    #[inline]
    fn emit(&self, event: AgentEvent) {
        if let Some(on_event) = &self.on_event {
            on_event(event);
        }
    }
}
