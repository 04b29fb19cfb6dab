//! Synthesizer: the final knowledge document.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use coordination::{
    AgentId, AgentTurn, CollaboratorError, NewMessage, StateUpdate, TextGenerator, WorkflowState,
};

use crate::prompts;

pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Every message as `sender: content`, blank-line separated.
    pub fn history(state: &WorkflowState) -> String {
        state
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[async_trait]
impl AgentTurn for Synthesizer {
    fn id(&self) -> AgentId {
        AgentId::Synthesizer
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CollaboratorError> {
        info!(
            agent = "synthesizer",
            messages = state.messages.len(),
            "Synthesizing final research report"
        );
        let prompt = prompts::synthesis_prompt(&Self::history(state));
        let report = self.generator.generate(&prompt).await?;
        Ok(StateUpdate::append(
            NewMessage::new(AgentId::Synthesizer, report).with_confidence(1.0),
        ))
    }
}
