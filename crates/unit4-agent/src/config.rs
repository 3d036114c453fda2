//! Settings read from a TOML file and the environment.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The file [`Config::load`] reads when no path is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "unit4-agent.toml";

const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Errors from loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file couldn't be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// The file isn't valid TOML, or has unknown or mistyped keys.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// The environment variable that should hold an API key is unset.
    #[error("environment variable {0} is not set")]
    MissingApiKey(String),
}

/// The whole configuration. Every field has a default.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The model that drives the agent.
    pub model: ModelConfig,
    /// The model behind `visual_qa_tool`.
    pub vision: VisionConfig,
    /// The endpoint behind `speech_recognition`.
    pub speech: SpeechConfig,
    /// Agent loop settings.
    pub agent: AgentConfig,
    /// Where extracted tables are stored.
    pub storage: StorageConfig,
    /// Settings of the HTTP client the tools share.
    pub http: HttpConfig,
}

/// `[model]` section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Model id on the gateway.
    pub id: String,
    /// Base URL of the OpenAI-compatible gateway.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature, the gateway default if unset.
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: "qwen/qwq-32b".to_owned(),
            base_url: OPENROUTER_BASE_URL.to_owned(),
            api_key_env: OPENROUTER_API_KEY_ENV.to_owned(),
            temperature: None,
        }
    }
}

/// `[vision]` section. Unset fields fall back to `[model]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisionConfig {
    /// Model id of the vision model.
    pub model: String,
    /// Base URL of its gateway.
    pub base_url: Option<String>,
    /// Name of the environment variable holding its API key.
    pub api_key_env: Option<String>,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: "qwen/qwen2.5-vl-32b-instruct".to_owned(),
            base_url: None,
            api_key_env: None,
        }
    }
}

/// `[speech]` section. Unset fields fall back to `[model]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpeechConfig {
    /// Base URL of a Whisper-compatible API, without
    /// `/audio/transcriptions`.
    pub base_url: Option<String>,
    /// Transcription model id.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "openai/whisper-large-v3".to_owned(),
            api_key_env: None,
        }
    }
}

/// `[agent]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// Maximum number of action steps.
    pub max_steps: u32,
    /// Plan every this many steps, `0` disables planning.
    pub planning_interval: u32,
    /// How much of a run is printed, from `0` (the answer only) to `2`
    /// (plans and model output too).
    pub verbosity: u8,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            planning_interval: 5,
            verbosity: 2,
        }
    }
}

/// `[storage]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory of the table store.
    pub dir: PathBuf,
    /// Name of the table store.
    pub table: String,
    /// Empty the store when a session starts.
    pub init: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".storage"),
            table: "wiki_tables".to_owned(),
            init: true,
        }
    }
}

/// `[http]` section.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Timeout of a single request made by a tool.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl HttpConfig {
    /// The timeout as a [`Duration`].
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    /// Loads the config from `path`, or from [`DEFAULT_CONFIG_FILE`] if it
    /// exists, or else starts from the defaults. Environment overrides are
    /// applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if default_path.is_file() => Self::from_file(default_path)?,
            None => Self::default(),
        };
        config.apply_env(|name| env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Reads a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("loading config from {}", path.display());
        let content =
            fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        content.parse()
    }

    /// Applies `UNIT4_AGENT_MODEL`, `UNIT4_AGENT_BASE_URL` and
    /// `UNIT4_AGENT_MAX_STEPS`, looked up through `var`.
    pub fn apply_env<F: Fn(&str) -> Option<String>>(&mut self, var: F) {
        if let Some(id) = var("UNIT4_AGENT_MODEL") {
            self.model.id = id;
        }
        if let Some(base_url) = var("UNIT4_AGENT_BASE_URL") {
            self.model.base_url = base_url;
        }
        if let Some(max_steps) = var("UNIT4_AGENT_MAX_STEPS") {
            match max_steps.trim().parse() {
                Ok(max_steps) => self.agent.max_steps = max_steps,
                Err(_) => warn!("ignoring UNIT4_AGENT_MAX_STEPS={max_steps}"),
            }
        }
    }

    /// Checks the values that have a valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_steps == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_steps must be at least 1".to_owned(),
            ));
        }
        if self.agent.verbosity > 2 {
            return Err(ConfigError::Invalid(
                "agent.verbosity must be 0, 1 or 2".to_owned(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http.timeout_secs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Base URL of the vision model gateway.
    pub fn vision_base_url(&self) -> &str {
        self.vision.base_url.as_deref().unwrap_or(&self.model.base_url)
    }

    /// Base URL of the transcription API.
    pub fn speech_base_url(&self) -> &str {
        self.speech.base_url.as_deref().unwrap_or(&self.model.base_url)
    }

    /// API key of the agent model.
    pub fn model_api_key(&self) -> Result<String, ConfigError> {
        read_api_key(&self.model.api_key_env)
    }

    /// API key of the vision model.
    pub fn vision_api_key(&self) -> Result<String, ConfigError> {
        let name = self.vision.api_key_env.as_ref();
        read_api_key(name.unwrap_or(&self.model.api_key_env))
    }

    /// API key of the transcription API.
    pub fn speech_api_key(&self) -> Result<String, ConfigError> {
        let name = self.speech.api_key_env.as_ref();
        read_api_key(name.unwrap_or(&self.model.api_key_env))
    }
}

fn read_api_key(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_owned()),
        _ => Err(ConfigError::MissingApiKey(name.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.agent.max_steps, 15);
        assert_eq!(config.agent.planning_interval, 5);
        assert_eq!(config.agent.verbosity, 2);
        assert_eq!(config.storage.dir, Path::new(".storage"));
        assert_eq!(config.storage.table, "wiki_tables");
        assert!(config.storage.init);
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
        assert_eq!(config.vision_base_url(), OPENROUTER_BASE_URL);
    }

    #[test]
    fn test_partial_file() {
        let config: Config = r#"
            [model]
            id = "qwen/qwen3-32b"

            [speech]
            base_url = "https://api.groq.com/openai/v1"
            api_key_env = "GROQ_API_KEY"

            [agent]
            planning_interval = 0
        "#
        .parse()
        .unwrap();
        assert_eq!(config.model.id, "qwen/qwen3-32b");
        assert_eq!(config.model.base_url, OPENROUTER_BASE_URL);
        assert_eq!(config.speech_base_url(), "https://api.groq.com/openai/v1");
        assert_eq!(config.speech.model, "openai/whisper-large-v3");
        assert_eq!(config.agent.planning_interval, 0);
        assert_eq!(config.agent.max_steps, 15);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = "[agent]\nmax_steps = 0".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = "[agent]\nverbosity = 3".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = "[agent]\nmax_step = 3".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(|name| match name {
            "UNIT4_AGENT_MODEL" => Some("openai/gpt-4o".to_owned()),
            "UNIT4_AGENT_MAX_STEPS" => Some("not a number".to_owned()),
            _ => None,
        });
        assert_eq!(config.model.id, "openai/gpt-4o");
        assert_eq!(config.agent.max_steps, 15);

        config.apply_env(|name| {
            (name == "UNIT4_AGENT_MAX_STEPS").then(|| "3".to_owned())
        });
        assert_eq!(config.agent.max_steps, 3);
    }

    #[test]
    fn test_missing_api_key() {
        let mut config = Config::default();
        config.model.api_key_env = "UNIT4_AGENT_TEST_UNSET_KEY".to_owned();
        let err = config.model_api_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment variable UNIT4_AGENT_TEST_UNSET_KEY is not set"
        );
        assert!(matches!(
            config.vision_api_key(),
            Err(ConfigError::MissingApiKey(_))
        ));
    }
}
