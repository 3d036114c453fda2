//! Steps recorded during a run and their replay as model messages.

use unit4_agent_model::{
    ModelMessage, TokenUsage, ToolCallRequest, ToolCallResult,
};

/// The task that started the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskStep {
    /// The task as given by the user.
    pub task: String,
}

/// A plan the model made without calling tools.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlanningStep {
    /// The plan text.
    pub plan: String,
    /// Token usage of the planning request.
    pub usage: TokenUsage,
}

/// The outcome of a single tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    /// Id of the tool call this observation answers.
    pub call_id: String,
    /// Name of the tool that was called.
    pub tool_name: String,
    /// Output of the tool, or `Error: <reason>` if it failed.
    pub content: String,
}

/// One request to the model with tools, and what came out of it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionStep {
    /// 1-based step number.
    pub step_number: u32,
    /// The text the model produced.
    pub model_output: String,
    /// Tool calls the model requested.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Observations, in the order of `tool_calls`.
    pub observations: Vec<Observation>,
    /// An error that happened during this step.
    pub error: Option<String>,
    /// Token usage of the action request.
    pub usage: TokenUsage,
}

/// The answer requested after running out of steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalAnswerStep {
    /// The answer text.
    pub answer: String,
    /// Token usage of the final request.
    pub usage: TokenUsage,
}

/// A recorded step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// See [`TaskStep`].
    Task(TaskStep),
    /// See [`PlanningStep`].
    Planning(PlanningStep),
    /// See [`ActionStep`].
    Action(ActionStep),
    /// See [`FinalAnswerStep`].
    FinalAnswer(FinalAnswerStep),
}

impl Step {
    /// Token usage of this step.
    pub fn usage(&self) -> TokenUsage {
        match self {
            Step::Task(_) => TokenUsage::default(),
            Step::Planning(step) => step.usage,
            Step::Action(step) => step.usage,
            Step::FinalAnswer(step) => step.usage,
        }
    }
}

/// The ordered list of steps of a run.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    steps: Vec<Step>,
}

impl Memory {
    /// Returns all steps recorded so far.
    #[inline]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    #[inline]
    pub(crate) fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    #[inline]
    pub(crate) fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Number of action steps recorded so far.
    pub fn action_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| matches!(step, Step::Action(_)))
            .count()
    }

    /// Sums the token usage of all steps.
    pub fn total_usage(&self) -> TokenUsage {
        let mut total = TokenUsage::default();
        for step in &self.steps {
            total += step.usage();
        }
        total
    }

    /// Replays the steps as the conversation sent to the model.
    pub fn to_messages(
        &self,
        system_prompt: Option<&str>,
    ) -> Vec<ModelMessage> {
        let mut messages = vec![];
        if let Some(system_prompt) = system_prompt {
            messages.push(ModelMessage::System(system_prompt.to_owned()));
        }

        for step in &self.steps {
            match step {
                Step::Task(step) => {
                    messages.push(ModelMessage::user_text(format!(
                        "New task:\n{}",
                        step.task
                    )));
                }
                Step::Planning(step) => {
                    messages.push(ModelMessage::assistant_text(format!(
                        "[PLAN]:\n{}",
                        step.plan
                    )));
                    messages.push(ModelMessage::user_text(
                        "Now proceed and carry out this plan.",
                    ));
                }
                Step::Action(step) => push_action(&mut messages, step),
                Step::FinalAnswer(_) => {}
            }
        }
        messages
    }
}

fn push_action(messages: &mut Vec<ModelMessage>, step: &ActionStep) {
    if !step.model_output.is_empty() || !step.tool_calls.is_empty() {
        messages.push(ModelMessage::Assistant {
            content: step.model_output.clone(),
            tool_calls: step.tool_calls.clone(),
        });
    }

    // Every call id must be answered, even if the step was cut short.
    for call in &step.tool_calls {
        let content = step
            .observations
            .iter()
            .find(|observation| observation.call_id == call.id)
            .map(|observation| observation.content.clone())
            .unwrap_or_else(|| {
                "Error: the tool call was not executed".to_owned()
            });
        messages.push(ModelMessage::Tool(ToolCallResult {
            id: call.id.clone(),
            content,
        }));
    }

    if let Some(error) = &step.error {
        messages.push(ModelMessage::user_text(format!(
            "Error:\n{error}\nNow let's retry: take care not to repeat \
             previous errors!"
        )));
    }
}
