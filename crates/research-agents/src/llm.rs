//! Text generation backed by a Rig OpenAI-compatible completions client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::debug;

use coordination::{CollaboratorError, TextGenerator};

use crate::config::ProviderConfig;

pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// Build the completions client for the configured provider.
pub fn build_client(config: &ProviderConfig) -> Result<openai::CompletionsClient> {
    openai::CompletionsClient::builder()
        .api_key(&config.api_key)
        .base_url(&config.base_url)
        .build()
        .with_context(|| {
            format!("Failed to build {} client ({})", config.provider, config.base_url)
        })
}

/// Build a role agent: no tools, fixed preamble and temperature.
pub fn build_role_agent(
    client: &openai::CompletionsClient,
    model: &str,
    role: &'static str,
    preamble: &'static str,
    temperature: f64,
) -> OaiAgent {
    client
        .agent(model)
        .name(role)
        .preamble(preamble)
        .temperature(temperature)
        .build()
}

/// One role's view of the model.
pub struct RigGenerator {
    agent: OaiAgent,
    role: &'static str,
}

impl RigGenerator {
    pub fn new(agent: OaiAgent, role: &'static str) -> Self {
        Self { agent, role }
    }
}

#[async_trait]
impl TextGenerator for RigGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
        debug!(role = self.role, chars = prompt.len(), "Prompting model");
        self.agent
            .prompt(prompt)
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))
    }
}

/// Map a provider error message onto the collaborator taxonomy.
pub fn classify_provider_error(message: &str) -> CollaboratorError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        CollaboratorError::RateLimited(message.to_string())
    } else {
        CollaboratorError::Generation(message.to_string())
    }
}
