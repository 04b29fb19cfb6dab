//! Research team agents wired into the engine with in-process collaborators.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordination::{
    AgentId, CollaboratorError, EngineConfig, ResearchOrchestrator, SearchProvider, SearchResult,
    Termination, TextGenerator, WorkflowStep,
};
use research_agents::{Critic, Researcher, Synthesizer};

// ── Collaborators ──

/// Replies from a script; the last reply repeats once the script runs out.
struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut replies = self.replies.lock().unwrap();
        let reply = if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        };
        reply.ok_or_else(|| CollaboratorError::Generation("script exhausted".into()))
    }
}

struct StaticSearch {
    urls: Vec<&'static str>,
}

#[async_trait]
impl SearchProvider for StaticSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        Ok(self
            .urls
            .iter()
            .take(max_results)
            .map(|url| SearchResult {
                text: format!("{query} fact from {url}"),
                url: url.to_string(),
            })
            .collect())
    }
}

struct DownSearch;

#[async_trait]
impl SearchProvider for DownSearch {
    async fn search(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError> {
        Err(CollaboratorError::Search("search backend unreachable".into()))
    }
}

struct Team {
    researcher: Arc<ScriptedGenerator>,
    critic: Arc<ScriptedGenerator>,
    synthesizer: Arc<ScriptedGenerator>,
    compressor: Arc<ScriptedGenerator>,
}

impl Team {
    fn new(critic_replies: &[&str]) -> Self {
        Self {
            researcher: ScriptedGenerator::new(&[
                "Solid state cells reach 400 Wh/kg.\nConfidence: 0.7",
            ]),
            critic: ScriptedGenerator::new(critic_replies),
            synthesizer: ScriptedGenerator::new(&["FINAL: solid state batteries report"]),
            compressor: ScriptedGenerator::new(&[
                r#"```json
{"key_findings": ["400 Wh/kg"], "data_points": [], "sources": [],
 "compressed_text": "cells reach 400 Wh/kg"}
```"#,
            ]),
        }
    }

    fn orchestrator(
        &self,
        search: Arc<dyn SearchProvider>,
        config: EngineConfig,
    ) -> ResearchOrchestrator {
        let max_results = config.search_max_results;
        ResearchOrchestrator::new(
            Arc::new(Researcher::new(self.researcher.clone(), search, max_results)),
            Arc::new(Critic::new(self.critic.clone())),
            Arc::new(Synthesizer::new(self.synthesizer.clone())),
            self.compressor.clone(),
            config,
        )
        .unwrap()
    }
}

// ── Scenarios ──

#[tokio::test]
async fn confident_critic_finishes_in_one_round() {
    let team = Team::new(&["Thorough and well sourced.\nScore: 0.9"]);
    let search = Arc::new(StaticSearch {
        urls: vec!["https://a.example", "https://b.example"],
    });
    let state = team
        .orchestrator(search, EngineConfig::default())
        .run("solid state batteries")
        .await;

    assert!(state.is_terminal());
    assert_eq!(state.iteration_count, 1);
    assert_eq!(state.termination, Some(Termination::ConfidenceReached));
    assert_eq!(state.final_report(), Some("FINAL: solid state batteries report"));
    // The report is folded into a summary, but its sources are archived.
    assert!(state.messages.iter().all(|m| m.sources.is_empty()));
    assert_eq!(state.sources(), vec!["https://a.example", "https://b.example"]);
    assert_eq!(state.score(AgentId::Critic), 0.9);
    assert_eq!(state.score(AgentId::Researcher), 0.7);
    assert!(state.turn_failures.is_empty());

    // The critic reviews the compressed summary, not the raw report.
    let critic_prompts = team.critic.prompts();
    assert_eq!(critic_prompts.len(), 1);
    assert!(critic_prompts[0].contains("cells reach 400 Wh/kg"));

    // Search results are handed to the researcher as JSON.
    let research_prompts = team.researcher.prompts();
    assert!(research_prompts[0].contains("https://a.example"));
    assert!(research_prompts[0].contains("Topic: solid state batteries"));
}

#[tokio::test]
async fn critique_feeds_the_next_research_round() {
    let team = Team::new(&[
        "Missing cost data entirely.\nScore: 0.3",
        "Now complete.\nScore: 0.85",
    ]);
    let search = Arc::new(StaticSearch {
        urls: vec!["https://a.example"],
    });
    let state = team
        .orchestrator(search, EngineConfig::default())
        .run("solid state batteries")
        .await;

    assert_eq!(state.iteration_count, 2);
    assert_eq!(state.termination, Some(Termination::ConfidenceReached));

    let research_prompts = team.researcher.prompts();
    assert_eq!(research_prompts.len(), 2);
    assert!(!research_prompts[0].contains("Missing cost data"));
    assert!(research_prompts[1].contains("Missing cost data entirely."));
}

#[tokio::test]
async fn search_outage_still_produces_a_report() {
    let team = Team::new(&["Nothing to go on.\nScore: 0.2"]);
    let config = EngineConfig::default();
    let max_iterations = config.max_iterations;
    let state = team
        .orchestrator(Arc::new(DownSearch), config)
        .run("solid state batteries")
        .await;

    assert!(state.is_terminal());
    assert_eq!(state.iteration_count, max_iterations);
    assert_eq!(state.termination, Some(Termination::BudgetExhausted));
    assert!(state.sources().is_empty());
    assert!(state.archived_sources.is_empty());
    assert!(state.final_report().is_some());

    assert_eq!(state.turn_failures.len(), max_iterations as usize);
    for (i, failure) in state.turn_failures.iter().enumerate() {
        assert_eq!(failure.step, WorkflowStep::Research);
        assert_eq!(failure.agent, AgentId::Researcher);
        assert_eq!(failure.iteration, i as u32 + 1);
        assert!(failure.error.contains("search backend unreachable"));
    }

    // Every researcher prompt carried an empty result list.
    for prompt in team.researcher.prompts() {
        assert!(prompt.contains("Search Results: []"));
    }
}

#[tokio::test]
async fn synthesis_sees_the_whole_history() {
    let team = Team::new(&["Good.\nScore: 0.95"]);
    let search = Arc::new(StaticSearch {
        urls: vec!["https://a.example"],
    });
    team.orchestrator(search, EngineConfig::default())
        .run("solid state batteries")
        .await;

    let prompts = team.synthesizer.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("scaledown: cells reach 400 Wh/kg"));
    assert!(prompts[0].contains("critic: Good."));
}
