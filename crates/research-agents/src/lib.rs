//! Research team agents and production collaborators.
//!
//! - [`agents`]: researcher, critic and synthesizer turns plus the factory
//! - [`llm`]: Rig-backed text generation
//! - [`search`]: Tavily web search
//! - [`config`]: provider, credential and file configuration
//! - [`prompts`]: role preambles and prompt templates

pub mod agents;
pub mod config;
pub mod llm;
pub mod prompts;
pub mod search;

pub use agents::{AgentFactory, Critic, Researcher, Synthesizer};
pub use config::{
    AgentTemperatures, AppConfig, FileConfig, LlmProvider, ProviderConfig, ProviderFile,
};
