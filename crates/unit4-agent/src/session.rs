use reqwest::Client;
use thiserror::Error;
use unit4_agent_core::tool::Tool;
use unit4_agent_core::{Agent, AgentBuilder, AgentError, AgentEvent, RunOutcome};
use unit4_agent_model::{ModelProvider, ModelTool};
use unit4_agent_openai_model::{OpenAIConfigBuilder, OpenAIProvider};
use unit4_agent_table::{StoreError, Table, TableStore};
use unit4_agent_wiki::WikiClient;

use crate::config::{Config, ConfigError};
use crate::tools::*;

const SYSTEM_PROMPT: &str = include_str!("system_prompt.md");
const USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors from building a [`Session`].
#[derive(Debug, Error)]
pub enum SessionError {
    /// A setting is invalid or an API key is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The table store couldn't be opened.
    #[error("failed to open the table store: {0}")]
    Store(#[from] StoreError),
    /// The HTTP client couldn't be created.
    #[error("failed to create the HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    http_client: Client,
    store: TableStore<Table>,
}

impl SessionBuilder {
    /// Creates a session builder from the config, with every tool
    /// registered. The API keys are read from the environment here.
    pub fn from_config(config: &Config) -> Result<Self, SessionError> {
        let mut model_config =
            OpenAIConfigBuilder::with_api_key(config.model_api_key()?)
                .with_model(&config.model.id)
                .with_base_url(&config.model.base_url)
                .with_header("X-Title", env!("CARGO_PKG_NAME"));
        if let Some(temperature) = config.model.temperature {
            model_config = model_config.with_temperature(temperature);
        }
        let vision_config =
            OpenAIConfigBuilder::with_api_key(config.vision_api_key()?)
                .with_model(&config.vision.model)
                .with_base_url(config.vision_base_url())
                .with_header("X-Title", env!("CARGO_PKG_NAME"));
        let speech_api_key = config.speech_api_key()?;

        let builder = Self::with_model_provider(
            OpenAIProvider::new(model_config.build()),
            config,
        )?;
        let visual_qa = VisualQaTool::with_model_provider(
            OpenAIProvider::new(vision_config.build()),
        );
        let speech = SpeechRecognitionTool::new(
            builder.http_client.clone(),
            config.speech_base_url(),
            speech_api_key,
        )
        .with_model(&config.speech.model);
        Ok(builder.with_tool(visual_qa).with_tool(speech))
    }

    /// Creates a session builder with a specified model provider.
    ///
    /// Only the tools that need no API key are registered: the Wikipedia,
    /// storage, markdown, fetch and Excel tools.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
        config: &Config,
    ) -> Result<Self, SessionError> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.http.timeout())
            .build()?;
        let storage = &config.storage;
        let store =
            TableStore::open(&storage.dir, &storage.table, storage.init)?;
        let planning_interval = Some(config.agent.planning_interval);

        let agent_builder = AgentBuilder::with_model_provider(provider)
            .with_system_prompt(SYSTEM_PROMPT)
            .with_max_steps(config.agent.max_steps)
            .with_planning_interval(planning_interval)
            .with_tool(WikiTool::new(
                WikiClient::with_client(http_client.clone()),
                store.clone(),
            ))
            .with_tool(RetrieveCsvStorageTool::new(store.clone()))
            .with_tool(ConvertTableToMarkdownTool::new())
            .with_tool(FetchTextContentTool::new(http_client.clone()))
            .with_tool(ReadExcelTool::new(http_client.clone()));

        Ok(Self {
            agent_builder,
            http_client,
            store,
        })
    }

    /// Registers another tool, replacing a tool of the same name.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Self {
        self.agent_builder = self.agent_builder.with_tool(tool);
        self
    }

    /// Attaches a callback that observes the progress of every run.
    #[inline]
    pub fn on_event(
        mut self,
        on_event: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Self {
        self.agent_builder = self.agent_builder.on_event(on_event);
        self
    }

    /// Builds a new session.
    pub fn build(self) -> Session {
        Session {
            agent: self.agent_builder.build(),
            store: self.store,
        }
    }
}

/// A fully configured agent together with the table store its tools share.
///
/// The session is basically a wrapper around [`Agent`]. Tasks can be run one
/// after another, each with a fresh memory.
pub struct Session {
    agent: Agent,
    store: TableStore<Table>,
}

impl Session {
    /// Runs the agent on `task` until it answers.
    #[inline]
    pub async fn run(&self, task: &str) -> Result<RunOutcome, AgentError> {
        self.agent.run(task).await
    }

    /// Returns the table store of the Wikipedia tool.
    #[inline]
    pub fn store(&self) -> &TableStore<Table> {
        &self.store
    }

    /// Returns the maximum number of action steps of a run.
    #[inline]
    pub fn max_steps(&self) -> u32 {
        self.agent.max_steps()
    }

    /// Returns the definitions of the tools the model can call.
    #[inline]
    pub fn tool_definitions(&self) -> Vec<ModelTool> {
        self.agent.tool_definitions()
    }
}
