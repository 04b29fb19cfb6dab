//! Workflow step machine — explicit steps and legal transition guards.
//!
//! The engine calls [`StepMachine::advance`] between turns. Each call checks
//! the edge against the transition table and appends a [`TransitionRecord`],
//! so a finished run can be replayed step by step from its log.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::errors::IllegalTransition;

/// The steps of a research run.
///
/// Every run starts at `Research` and ends at `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    /// Researcher turn: search and report.
    Research,
    /// Compression of the trailing message window.
    Compress,
    /// Critic turn: score the latest findings.
    Critique,
    /// Consensus policy decides between another round and synthesis.
    ConsensusCheck,
    /// Synthesizer turn: write the final report.
    Synthesize,
    /// Terminal.
    Done,
}

impl WorkflowStep {
    pub fn is_terminal(self) -> bool {
        self == Self::Done
    }

    /// Stable lowercase name, as reported in progress events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Compress => "compress",
            Self::Critique => "critique",
            Self::ConsensusCheck => "consensus_check",
            Self::Synthesize => "synthesize",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Legal transitions between workflow steps.
///
/// ```text
/// Research       → Compress
/// Compress       → Critique
/// Critique       → ConsensusCheck
/// ConsensusCheck → Research | Synthesize
/// Synthesize     → Done
/// ```
pub fn is_legal_transition(from: WorkflowStep, to: WorkflowStep) -> bool {
    use WorkflowStep::*;

    matches!(
        (from, to),
        (Research, Compress)
            | (Compress, Critique)
            | (Critique, ConsensusCheck)
            // revise
            | (ConsensusCheck, Research)
            // proceed (confident or forced)
            | (ConsensusCheck, Synthesize)
            | (Synthesize, Done)
    )
}

/// A single recorded step transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: WorkflowStep,
    pub to: WorkflowStep,
    /// Research round at the time of the transition.
    pub iteration: u32,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tracks the current step, enforces legal transitions, and keeps the
/// transition log.
#[derive(Debug)]
pub struct StepMachine {
    current: WorkflowStep,
    iteration: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl StepMachine {
    /// Create a machine positioned at `Research`.
    pub fn new() -> Self {
        Self {
            current: WorkflowStep::Research,
            iteration: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> WorkflowStep {
        self.current
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    /// Move to `to` if the edge exists, recording the transition.
    pub fn advance(
        &mut self,
        to: WorkflowStep,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        let record = TransitionRecord {
            from: self.current,
            to,
            iteration: self.iteration,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        };

        tracing::debug!(
            from = %self.current,
            to = %to,
            iteration = self.iteration,
            reason = reason.unwrap_or(""),
            "Step transition"
        );

        self.transitions.push(record);
        self.current = to;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// One-line history, e.g.
    /// `research → done (12ms, 6 transitions) [compress → … → done]`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} → {} ({}ms, {} transitions)",
            WorkflowStep::Research,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !self.transitions.is_empty() {
            let steps: Vec<&str> = self.transitions.iter().map(|t| t.to.as_str()).collect();
            line.push_str(&format!(" [{}]", steps.join(" → ")));
        }
        line
    }
}

impl Default for StepMachine {
    fn default() -> Self {
        Self::new()
    }
}
