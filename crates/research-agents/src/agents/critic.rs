//! Critic: peer review of the latest findings with a numeric score.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use coordination::{
    extract_confidence, AgentId, AgentTurn, CollaboratorError, NewMessage, StateUpdate,
    TextGenerator, WorkflowState, DEFAULT_CONFIDENCE,
};

use crate::prompts;

pub struct Critic {
    generator: Arc<dyn TextGenerator>,
}

impl Critic {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// What to review: research newer than the last summary, else the
    /// compressed summary, else the latest message.
    pub fn subject(state: &WorkflowState) -> &str {
        let newest = |agent| state.messages.iter().rposition(|m| m.sender == agent);
        let summary_at = newest(AgentId::Compressor);
        if let Some(research_at) = newest(AgentId::Researcher) {
            if summary_at.map_or(true, |at| research_at > at) {
                return state.messages[research_at].content.as_str();
            }
        }
        if !state.compressed_summary.trim().is_empty() {
            return state.compressed_summary.as_str();
        }
        state
            .latest_message()
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

#[async_trait]
impl AgentTurn for Critic {
    fn id(&self) -> AgentId {
        AgentId::Critic
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CollaboratorError> {
        info!(agent = "critic", "Critiquing latest research findings");

        let prompt = prompts::critique_prompt(Self::subject(state));
        let critique = self.generator.generate(&prompt).await?;
        let score = extract_confidence(&critique, prompts::SCORE_LABEL, DEFAULT_CONFIDENCE);
        info!(agent = "critic", score, "Critique ready");

        Ok(
            StateUpdate::append(NewMessage::new(AgentId::Critic, critique).with_confidence(score))
                .with_score(AgentId::Critic, score),
        )
    }
}
