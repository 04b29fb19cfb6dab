//! Agent turns for the research team.
//!
//! Each agent wraps a [`TextGenerator`] (and the researcher a
//! [`SearchProvider`]) behind the engine's [`AgentTurn`] seam. The
//! `AgentFactory` wires production collaborators from a `ProviderConfig`.
//!
//! [`TextGenerator`]: coordination::TextGenerator
//! [`SearchProvider`]: coordination::SearchProvider
//! [`AgentTurn`]: coordination::AgentTurn

pub mod critic;
pub mod researcher;
pub mod synthesizer;

use std::sync::Arc;

use anyhow::Result;
use rig::providers::openai;
use tracing::info;

use coordination::{EngineConfig, ResearchOrchestrator, SearchProvider, TextGenerator};

use crate::config::ProviderConfig;
use crate::llm::{build_client, build_role_agent, RigGenerator};
use crate::prompts;
use crate::search::TavilySearch;

pub use critic::Critic;
pub use researcher::Researcher;
pub use synthesizer::Synthesizer;

/// Builds every agent and collaborator from one provider configuration.
pub struct AgentFactory {
    client: openai::CompletionsClient,
    config: ProviderConfig,
}

impl AgentFactory {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            config: config.clone(),
        })
    }

    fn generator(
        &self,
        role: &'static str,
        preamble: &'static str,
        temperature: f64,
    ) -> Arc<dyn TextGenerator> {
        let agent =
            build_role_agent(&self.client, &self.config.model, role, preamble, temperature);
        Arc::new(RigGenerator::new(agent, role))
    }

    pub fn build_researcher(
        &self,
        search: Arc<dyn SearchProvider>,
        max_results: usize,
    ) -> Researcher {
        let temps = &self.config.temperatures;
        Researcher::new(
            self.generator("researcher", prompts::RESEARCHER_PREAMBLE, temps.researcher),
            search,
            max_results,
        )
    }

    pub fn build_critic(&self) -> Critic {
        Critic::new(self.generator(
            "critic",
            prompts::CRITIC_PREAMBLE,
            self.config.temperatures.critic,
        ))
    }

    pub fn build_synthesizer(&self) -> Synthesizer {
        Synthesizer::new(self.generator(
            "synthesizer",
            prompts::SYNTHESIZER_PREAMBLE,
            self.config.temperatures.synthesizer,
        ))
    }

    pub fn build_compressor(&self) -> Arc<dyn TextGenerator> {
        self.generator(
            "scaledown",
            prompts::COMPRESSOR_PREAMBLE,
            self.config.temperatures.compressor,
        )
    }

    pub fn build_search(&self) -> Result<Arc<dyn SearchProvider>> {
        Ok(Arc::new(TavilySearch::from_config(&self.config)?))
    }

    /// Wire the full research team into an engine.
    pub fn build_orchestrator(&self, engine: EngineConfig) -> Result<ResearchOrchestrator> {
        let search = self.build_search()?;
        info!(
            provider = %self.config.provider,
            model = %self.config.model,
            prompt_version = prompts::PROMPT_VERSION,
            "Building research team"
        );
        let orchestrator = ResearchOrchestrator::new(
            Arc::new(self.build_researcher(search, engine.search_max_results)),
            Arc::new(self.build_critic()),
            Arc::new(self.build_synthesizer()),
            self.build_compressor(),
            engine,
        )?;
        Ok(orchestrator)
    }
}
