//! Researcher: web search, then a sourced factual report.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use coordination::{
    extract_confidence, AgentId, AgentTurn, CollaboratorError, FailureNote, NewMessage,
    SearchProvider, SearchResult, StateUpdate, TextGenerator, WorkflowState,
};

use crate::prompts;

/// Confidence assumed when the report has no readable `Confidence:` line.
pub const RESEARCHER_FALLBACK_CONFIDENCE: f64 = 0.8;

pub struct Researcher {
    generator: Arc<dyn TextGenerator>,
    search: Arc<dyn SearchProvider>,
    max_results: usize,
}

impl Researcher {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        search: Arc<dyn SearchProvider>,
        max_results: usize,
    ) -> Self {
        Self {
            generator,
            search,
            max_results,
        }
    }
}

#[async_trait]
impl AgentTurn for Researcher {
    fn id(&self) -> AgentId {
        AgentId::Researcher
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CollaboratorError> {
        let topic = &state.research_topic;
        info!(agent = "researcher", topic = %topic, "Conducting web research");

        let mut failure = None;
        let results: Vec<SearchResult> = match self.search.search(topic, self.max_results).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "Search failed, reporting without results");
                failure = Some(FailureNote::new(AgentId::Researcher, &e));
                Vec::new()
            }
        };
        let sources: Vec<String> = results.iter().map(|r| r.url.clone()).collect();
        let results_json = serde_json::to_string(&results).map_err(|e| {
            CollaboratorError::Generation(format!("failed to encode search results: {e}"))
        })?;

        // Critique is only relevant once a round has been judged.
        let feedback = if state.research_attempts > 1 {
            state.latest_from(AgentId::Critic).map(|m| m.content.as_str())
        } else {
            None
        };

        let prompt = prompts::research_prompt(topic, &results_json, feedback);
        let report = self.generator.generate(&prompt).await?;
        let confidence = extract_confidence(
            &report,
            prompts::CONFIDENCE_LABEL,
            RESEARCHER_FALLBACK_CONFIDENCE,
        );
        info!(
            agent = "researcher",
            sources = sources.len(),
            confidence,
            "Research report ready"
        );

        let mut update = StateUpdate::append(
            NewMessage::new(AgentId::Researcher, report.clone())
                .with_confidence(confidence)
                .with_sources(sources),
        )
        .with_context(report)
        .with_score(AgentId::Researcher, confidence);
        if let Some(note) = failure {
            update = update.with_failure(note);
        }
        Ok(update)
    }
}
