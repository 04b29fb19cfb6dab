//! Orchestration engine — sequences agent turns, compression and consensus
//! over one [`WorkflowState`].
//!
//! ```text
//! Research → Compress → Critique → ConsensusCheck ─┬─ revise ──→ Research
//!                                                  └─ proceed ─→ Synthesize → Done
//! ```
//!
//! A run is strictly sequential: each step finishes (including its
//! collaborator call) before the next is chosen. A failed turn leaves the
//! state as it was apart from the recorded failure, and the machine still
//! advances. The consensus policy forces a proceed once the iteration budget
//! is spent, so every run reaches `Done`. Compression only runs in a round
//! whose research turn succeeded.
//!
//! Hosts either pull events one at a time through [`WorkflowRun::next_event`]
//! or call [`ResearchOrchestrator::run`] / [`ResearchOrchestrator::run_with_progress`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::collaborators::{with_timeout, AgentTurn, TextGenerator};
use crate::compression::Compressor;
use crate::config::EngineConfig;
use crate::consensus::{ConsensusPolicy, Decision, DecisionReason, Verdict};
use crate::errors::ConfigurationError;
use crate::machine::{StepMachine, TransitionRecord, WorkflowStep};
use crate::state::{StateUpdate, Termination, WorkflowState};

/// Emitted after every completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: WorkflowStep,
    /// Confidence of the last message in state, if any.
    pub latest_confidence: Option<f64>,
    /// Completed research turns so far.
    pub iteration: u32,
    /// Set on consensus checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// The step recorded at least one collaborator failure.
    pub failed: bool,
}

/// The research workflow with its collaborators.
pub struct ResearchOrchestrator {
    researcher: Arc<dyn AgentTurn>,
    critic: Arc<dyn AgentTurn>,
    synthesizer: Arc<dyn AgentTurn>,
    compressor: Compressor,
    policy: ConsensusPolicy,
    config: EngineConfig,
}

impl ResearchOrchestrator {
    /// Build an engine. Fails only if `config` is invalid.
    pub fn new(
        researcher: Arc<dyn AgentTurn>,
        critic: Arc<dyn AgentTurn>,
        synthesizer: Arc<dyn AgentTurn>,
        compression: Arc<dyn TextGenerator>,
        config: EngineConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self {
            researcher,
            critic,
            synthesizer,
            compressor: Compressor::new(compression, &config),
            policy: ConsensusPolicy::from_config(&config),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &ConsensusPolicy {
        &self.policy
    }

    /// Begin a run. Nothing happens until the first [`WorkflowRun::next_event`].
    pub fn start(&self, topic: impl Into<String>) -> WorkflowRun<'_> {
        let state = WorkflowState::new(topic);
        info!(
            topic = %state.research_topic,
            max_iterations = self.config.max_iterations,
            "Starting research run"
        );
        WorkflowRun {
            engine: self,
            state,
            machine: StepMachine::new(),
            pending: None,
            fresh_research: false,
            finished: false,
        }
    }

    /// Drive a run to completion and return the terminal state.
    pub async fn run(&self, topic: impl Into<String>) -> WorkflowState {
        let mut run = self.start(topic);
        while run.next_event().await.is_some() {}
        run.into_state()
    }

    /// Like [`run`](Self::run), forwarding every event to `progress`.
    ///
    /// A dropped receiver does not stop the run.
    pub async fn run_with_progress(
        &self,
        topic: impl Into<String>,
        progress: mpsc::UnboundedSender<ProgressEvent>,
    ) -> WorkflowState {
        let mut run = self.start(topic);
        while let Some(event) = run.next_event().await {
            if progress.send(event).is_err() {
                debug!("Progress receiver dropped, continuing run");
            }
        }
        run.into_state()
    }
}

/// One in-flight run. Yields a finite, non-restartable event sequence.
pub struct WorkflowRun<'a> {
    engine: &'a ResearchOrchestrator,
    state: WorkflowState,
    machine: StepMachine,
    /// Proceed verdict waiting for synthesis to finish.
    pending: Option<Verdict>,
    /// This round's research turn succeeded.
    fresh_research: bool,
    finished: bool,
}

impl WorkflowRun<'_> {
    /// Execute the next step and report it. `None` once the run is done.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }

        let step = self.machine.current();
        let failures_before = self.state.turn_failures.len();
        let mut decision = None;

        let next = match step {
            WorkflowStep::Research => {
                self.state.research_attempts += 1;
                self.machine.set_iteration(self.state.research_attempts);
                self.fresh_research = self.take_turn(step, self.engine.researcher.clone()).await;
                if self.fresh_research {
                    self.state.iteration_count += 1;
                }
                (WorkflowStep::Compress, None)
            }
            WorkflowStep::Compress => {
                let update = if self.fresh_research {
                    self.engine.compressor.compress(&self.state).await
                } else {
                    debug!("No new research this round, skipping compression");
                    StateUpdate::none()
                };
                self.state.merge(step, update);
                (WorkflowStep::Critique, None)
            }
            WorkflowStep::Critique => {
                self.take_turn(step, self.engine.critic.clone()).await;
                (WorkflowStep::ConsensusCheck, None)
            }
            WorkflowStep::ConsensusCheck => {
                let verdict = self.engine.policy.evaluate(&self.state);
                self.state.merge(step, StateUpdate::none());
                decision = Some(verdict.decision);
                info!(
                    decision = %verdict.decision,
                    reason = %verdict.reason,
                    aggregate = verdict.aggregate,
                    rounds = verdict.rounds,
                    "Consensus check"
                );
                match verdict.decision {
                    Decision::Revise => (WorkflowStep::Research, Some(verdict.reason)),
                    Decision::Proceed => {
                        self.pending = Some(verdict);
                        (WorkflowStep::Synthesize, Some(verdict.reason))
                    }
                }
            }
            WorkflowStep::Synthesize => {
                self.take_turn(step, self.engine.synthesizer.clone()).await;
                (WorkflowStep::Done, None)
            }
            WorkflowStep::Done => {
                self.finished = true;
                return None;
            }
        };

        let event = ProgressEvent {
            step,
            latest_confidence: self.state.latest_confidence(),
            iteration: self.state.iteration_count,
            decision,
            failed: self.state.turn_failures.len() > failures_before,
        };

        let (to, reason) = next;
        if let Err(e) = self.machine.advance(to, reason.map(DecisionReason::as_str)) {
            error!(error = %e, "Workflow graph violated, stopping run");
            self.finished = true;
            return Some(event);
        }
        if to == WorkflowStep::Done {
            self.complete();
        }

        Some(event)
    }

    /// Run one agent turn and merge its result. Returns whether it succeeded.
    async fn take_turn(&mut self, step: WorkflowStep, agent: Arc<dyn AgentTurn>) -> bool {
        let timeout = self.engine.config.collaborator_timeout();
        match with_timeout(timeout, agent.run(&self.state)).await {
            Ok(update) => {
                self.state.merge(step, update);
                true
            }
            Err(e) => {
                warn!(
                    step = %step,
                    agent = %agent.id(),
                    error = %e,
                    "Turn failed, state unchanged"
                );
                self.state.record_failure(step, agent.id(), e.to_string());
                self.state.merge(step, StateUpdate::none());
                false
            }
        }
    }

    fn complete(&mut self) {
        let termination = match self.pending.take().map(|v| v.reason) {
            Some(DecisionReason::BudgetExhausted) => Termination::BudgetExhausted,
            _ => Termination::ConfidenceReached,
        };
        self.state.termination = Some(termination);
        self.state.consensus_reached = true;
        self.state.current_node = Some(WorkflowStep::Done);
        self.finished = true;

        info!(
            topic = %self.state.research_topic,
            iterations = self.state.iteration_count,
            attempts = self.state.research_attempts,
            failures = self.state.turn_failures.len(),
            termination = %termination,
            history = %self.machine.summary(),
            "Research run finished"
        );
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    /// Step about to run next.
    pub fn current_step(&self) -> WorkflowStep {
        self.machine.current()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.machine.transitions()
    }

    pub fn summary(&self) -> String {
        self.machine.summary()
    }

    /// End the run and hand back its state.
    pub fn into_state(self) -> WorkflowState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::errors::CollaboratorError;
    use crate::state::{AgentId, NewMessage};

    // ── Stubs ──

    /// Replays scripted outcomes; repeats the last one when exhausted.
    struct ScriptedAgent {
        id: AgentId,
        script: Mutex<VecDeque<Result<f64, CollaboratorError>>>,
        last: Mutex<Option<Result<f64, CollaboratorError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedAgent {
        fn new(id: AgentId, script: Vec<Result<f64, CollaboratorError>>) -> Arc<Self> {
            Arc::new(Self {
                id,
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AgentTurn for ScriptedAgent {
        fn id(&self) -> AgentId {
            self.id
        }

        async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, CollaboratorError> {
            *self.calls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            let outcome = match next {
                Some(outcome) => {
                    *self.last.lock().unwrap() = Some(outcome.clone());
                    outcome
                }
                None => self.last.lock().unwrap().clone().unwrap_or(Ok(0.5)),
            };
            let score = outcome?;
            let content = format!("{} says {score}", self.id);
            Ok(
                StateUpdate::append(NewMessage::new(self.id, content).with_confidence(score))
                    .with_score(self.id, score),
            )
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, CollaboratorError> {
            Ok(r#"{"compressed_text": "summary"}"#.to_string())
        }
    }

    fn engine(
        researcher: Arc<ScriptedAgent>,
        critic: Arc<ScriptedAgent>,
        config: EngineConfig,
    ) -> ResearchOrchestrator {
        let synthesizer = ScriptedAgent::new(AgentId::Synthesizer, vec![Ok(1.0)]);
        ResearchOrchestrator::new(researcher, critic, synthesizer, Arc::new(EchoGenerator), config)
            .unwrap()
    }

    // ── Tests ──

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            max_iterations: 0,
            ..EngineConfig::default()
        };
        let result = ResearchOrchestrator::new(
            ScriptedAgent::new(AgentId::Researcher, vec![]),
            ScriptedAgent::new(AgentId::Critic, vec![]),
            ScriptedAgent::new(AgentId::Synthesizer, vec![]),
            Arc::new(EchoGenerator),
            config,
        );
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn confident_critic_proceeds_after_one_round() {
        let researcher = ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.7)]);
        let critic = ScriptedAgent::new(AgentId::Critic, vec![Ok(0.9)]);
        let engine = engine(researcher.clone(), critic.clone(), EngineConfig::default());

        let mut run = engine.start("X");
        let mut steps = Vec::new();
        while let Some(event) = run.next_event().await {
            steps.push(event.step);
        }
        assert_eq!(
            steps,
            vec![
                WorkflowStep::Research,
                WorkflowStep::Compress,
                WorkflowStep::Critique,
                WorkflowStep::ConsensusCheck,
                WorkflowStep::Synthesize,
            ]
        );
        assert!(run.next_event().await.is_none());

        let state = run.into_state();
        assert_eq!(state.iteration_count, 1);
        assert!(state.consensus_reached);
        assert_eq!(state.termination, Some(Termination::ConfidenceReached));
        assert_eq!(state.current_node, Some(WorkflowStep::Done));
        assert_eq!(researcher.calls(), 1);
        assert_eq!(critic.calls(), 1);
    }

    #[tokio::test]
    async fn low_confidence_runs_to_budget() {
        let researcher = ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.3)]);
        let critic = ScriptedAgent::new(AgentId::Critic, vec![Ok(0.2)]);
        let config = EngineConfig {
            max_iterations: 3,
            ..EngineConfig::default()
        };
        let engine = engine(researcher.clone(), critic, config);

        let state = engine.run("X").await;
        assert_eq!(state.iteration_count, 3);
        assert_eq!(researcher.calls(), 3);
        assert_eq!(state.termination, Some(Termination::BudgetExhausted));
        assert!(state.consensus_reached);
        assert_eq!(state.final_report(), Some("synthesizer says 1"));
    }

    #[tokio::test]
    async fn consensus_event_carries_decision() {
        let engine = engine(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.7)]),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.4), Ok(0.95)]),
            EngineConfig::default(),
        );
        let mut run = engine.start("X");
        let mut decisions = Vec::new();
        while let Some(event) = run.next_event().await {
            if event.step == WorkflowStep::ConsensusCheck {
                decisions.push(event.decision);
            } else {
                assert!(event.decision.is_none());
            }
        }
        assert_eq!(decisions, vec![Some(Decision::Revise), Some(Decision::Proceed)]);
        assert_eq!(run.state().iteration_count, 2);

        let reasons: Vec<_> = run
            .transitions()
            .iter()
            .filter_map(|t| t.reason.as_deref())
            .collect();
        assert_eq!(reasons, vec!["low_confidence", "high_confidence"]);
    }

    #[tokio::test]
    async fn failed_critic_is_identity_and_counts_as_zero() {
        let engine = engine(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.9)]),
            ScriptedAgent::new(
                AgentId::Critic,
                vec![Err(CollaboratorError::Generation("down".into()))],
            ),
            EngineConfig {
                max_iterations: 2,
                ..EngineConfig::default()
            },
        );
        let mut run = engine.start("X");
        let mut critique_failed = Vec::new();
        while let Some(event) = run.next_event().await {
            if event.step == WorkflowStep::Critique {
                critique_failed.push(event.failed);
            }
        }
        assert_eq!(critique_failed, vec![true, true]);

        let state = run.into_state();
        assert!(!state.confidence_scores.contains_key(&AgentId::Critic));
        assert_eq!(state.termination, Some(Termination::BudgetExhausted));
        assert_eq!(state.turn_failures.len(), 2);
        assert!(state.turn_failures.iter().all(|f| f.agent == AgentId::Critic));
        assert_eq!(state.turn_failures[1].iteration, 2);
    }

    #[tokio::test]
    async fn failing_researcher_still_terminates() {
        let researcher = ScriptedAgent::new(
            AgentId::Researcher,
            vec![Err(CollaboratorError::RateLimited("429".into()))],
        );
        let engine = engine(
            researcher.clone(),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.1)]),
            EngineConfig::default(),
        );
        let state = engine.run("X").await;
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.research_attempts, 5);
        assert_eq!(researcher.calls(), 5);
        assert!(state.is_terminal());
    }

    #[tokio::test]
    async fn failed_research_round_skips_compression() {
        struct CountingGenerator(Mutex<u32>);

        #[async_trait]
        impl TextGenerator for CountingGenerator {
            async fn generate(&self, _prompt: &str) -> Result<String, CollaboratorError> {
                *self.0.lock().unwrap() += 1;
                Ok(r#"{"compressed_text": "summary"}"#.to_string())
            }
        }

        let generator = Arc::new(CountingGenerator(Mutex::new(0)));
        let engine = ResearchOrchestrator::new(
            ScriptedAgent::new(
                AgentId::Researcher,
                vec![Ok(0.6), Err(CollaboratorError::Generation("down".into()))],
            ),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.3)]),
            ScriptedAgent::new(AgentId::Synthesizer, vec![Ok(1.0)]),
            generator.clone(),
            EngineConfig {
                max_iterations: 3,
                ..EngineConfig::default()
            },
        )
        .unwrap();

        let state = engine.run("X").await;
        // Only the first round had research to fold.
        assert_eq!(*generator.0.lock().unwrap(), 1);
        assert_eq!(state.iteration_count, 1);
        assert_eq!(state.research_attempts, 3);
        assert_eq!(state.compression_metadata.unwrap().messages_processed, 1);
        // Critic messages from the failed rounds are never folded.
        let critiques = state
            .messages
            .iter()
            .filter(|m| m.sender == AgentId::Critic)
            .count();
        assert_eq!(critiques, 3);
    }

    #[tokio::test]
    async fn progress_channel_receives_every_event() {
        let engine = engine(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.7)]),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.9)]),
            EngineConfig::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let state = engine.run_with_progress("X", tx).await;

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 5);
        assert_eq!(events[0].latest_confidence, Some(0.7));
        // Compression message carries confidence 1.0.
        assert_eq!(events[1].latest_confidence, Some(1.0));
        assert_eq!(events[2].latest_confidence, Some(0.9));
        assert!(state.consensus_reached);
    }

    #[tokio::test]
    async fn dropped_receiver_does_not_abort() {
        let engine = engine(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.7)]),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.9)]),
            EngineConfig::default(),
        );
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let state = engine.run_with_progress("X", tx).await;
        assert!(state.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_turn_times_out() {
        struct Hang;

        #[async_trait]
        impl AgentTurn for Hang {
            fn id(&self) -> AgentId {
                AgentId::Critic
            }

            async fn run(&self, _state: &WorkflowState) -> Result<StateUpdate, CollaboratorError> {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(StateUpdate::none())
            }
        }

        let engine = ResearchOrchestrator::new(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.7)]),
            Arc::new(Hang),
            ScriptedAgent::new(AgentId::Synthesizer, vec![Ok(1.0)]),
            Arc::new(EchoGenerator),
            EngineConfig {
                max_iterations: 1,
                collaborator_timeout_secs: Some(5),
                ..EngineConfig::default()
            },
        )
        .unwrap();
        let state = engine.run("X").await;
        assert!(state.is_terminal());
        assert_eq!(state.turn_failures.len(), 1);
        assert_eq!(state.turn_failures[0].error, "timed out after 5s");
    }

    #[tokio::test]
    async fn timestamps_monotonic_across_run() {
        let engine = engine(
            ScriptedAgent::new(AgentId::Researcher, vec![Ok(0.4)]),
            ScriptedAgent::new(AgentId::Critic, vec![Ok(0.4)]),
            EngineConfig::default(),
        );
        let state = engine.run("X").await;
        assert!(state
            .messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }
}
