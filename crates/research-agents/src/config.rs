//! Provider, credential and file configuration for the research team.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (applied by the binary on top of [`AppConfig`])
//! 2. Values in the TOML file passed with `--config`
//! 3. Environment variables (`LLM_PROVIDER`, `LLM_MODEL`, `LLM_BASE_URL`, ...)
//! 4. Built-in defaults
//!
//! API keys are read from the environment only.
//!
//! ## Agent temperatures
//!
//! | Role        | Default |
//! |-------------|---------|
//! | researcher  | 0.2     |
//! | critic      | 0.1     |
//! | synthesizer | 0.2     |
//! | compressor  | 0.3     |

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use coordination::{ConfigurationError, EngineConfig};
use serde::{Deserialize, Serialize};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4-turbo";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_MODEL: &str = "claude-3-opus-20240229";
const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

const ENV_PROVIDER: &str = "LLM_PROVIDER";
const ENV_MODEL: &str = "LLM_MODEL";
const ENV_BASE_URL: &str = "LLM_BASE_URL";
const ENV_OPENAI_KEY: &str = "OPENAI_API_KEY";
const ENV_ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const ENV_TAVILY_KEY: &str = "TAVILY_API_KEY";
const ENV_TAVILY_URL: &str = "TAVILY_SEARCH_URL";

/// Text-generation backend. Both are reached through an OpenAI-compatible
/// chat completions endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Anthropic,
}

impl LlmProvider {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Anthropic => ANTHROPIC_BASE_URL,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_MODEL,
            Self::Anthropic => ANTHROPIC_MODEL,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn key_var(self) -> &'static str {
        match self {
            Self::OpenAi => ENV_OPENAI_KEY,
            Self::Anthropic => ENV_ANTHROPIC_KEY,
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(ConfigurationError::invalid(
                "provider",
                format!("unknown provider '{other}' (expected openai or anthropic)"),
            )),
        }
    }
}

/// Sampling temperature per agent role.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentTemperatures {
    pub researcher: f64,
    pub critic: f64,
    pub synthesizer: f64,
    pub compressor: f64,
}

impl Default for AgentTemperatures {
    fn default() -> Self {
        Self {
            researcher: 0.2,
            critic: 0.1,
            synthesizer: 0.2,
            compressor: 0.3,
        }
    }
}

/// `[provider]` table of the config file. Unset keys fall through to the
/// environment, then to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderFile {
    pub provider: Option<LlmProvider>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub search_url: Option<String>,
    pub temperatures: AgentTemperatures,
}

/// Whole config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub engine: EngineConfig,
    pub provider: ProviderFile,
}

impl FileConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Fully resolved provider settings, credentials included.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    pub search_url: String,
    pub search_api_key: String,
    pub temperatures: AgentTemperatures,
}

// Keys stay out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("search_url", &self.search_url)
            .field("search_api_key", &"<redacted>")
            .field("temperatures", &self.temperatures)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve from the process environment.
    pub fn resolve(file: &ProviderFile) -> Result<Self, ConfigurationError> {
        Self::resolve_with(file, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit variable lookup.
    pub fn resolve_with<F>(file: &ProviderFile, env: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let provider = match file.provider {
            Some(provider) => provider,
            None => match lookup(ENV_PROVIDER) {
                Some(name) => name.parse()?,
                None => LlmProvider::default(),
            },
        };

        let model = file
            .model
            .clone()
            .or_else(|| lookup(ENV_MODEL))
            .unwrap_or_else(|| provider.default_model().to_string());
        let base_url = file
            .base_url
            .clone()
            .or_else(|| lookup(ENV_BASE_URL))
            .unwrap_or_else(|| provider.default_base_url().to_string());
        let search_url = file
            .search_url
            .clone()
            .or_else(|| lookup(ENV_TAVILY_URL))
            .unwrap_or_else(|| TAVILY_SEARCH_URL.to_string());

        let api_key = lookup(provider.key_var())
            .ok_or(ConfigurationError::MissingCredential(provider.key_var()))?;
        let search_api_key =
            lookup(ENV_TAVILY_KEY).ok_or(ConfigurationError::MissingCredential(ENV_TAVILY_KEY))?;

        let config = Self {
            provider,
            model,
            base_url,
            api_key,
            search_url,
            search_api_key,
            temperatures: file.temperatures,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let temps = &self.temperatures;
        for (field, value) in [
            ("temperatures.researcher", temps.researcher),
            ("temperatures.critic", temps.critic),
            ("temperatures.synthesizer", temps.synthesizer),
            ("temperatures.compressor", temps.compressor),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigurationError::invalid(
                    field,
                    format!("{value} is outside [0, 2]"),
                ));
            }
        }
        if self.model.trim().is_empty() {
            return Err(ConfigurationError::invalid("model", "must not be empty"));
        }
        Ok(())
    }
}

/// Everything the binary needs before CLI overrides.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Validate the engine table and resolve the provider from the process environment.
    pub fn from_file_config(file: FileConfig) -> Result<Self, ConfigurationError> {
        Self::from_file_config_with(file, |key| std::env::var(key).ok())
    }

    pub fn from_file_config_with<F>(file: FileConfig, env: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        file.engine.validate()?;
        let provider = ProviderConfig::resolve_with(&file.provider, env)?;
        Ok(Self {
            engine: file.engine,
            provider,
        })
    }
}
