//! Shared workflow record — messages, scores, and the typed partial-update
//! contract every turn returns.
//!
//! Components never mutate [`WorkflowState`] directly. They return a
//! [`StateUpdate`], and the engine merges it with [`WorkflowState::merge`].
//! Each field has a fixed merge rule:
//!
//! | Field                  | Rule                                               |
//! |------------------------|----------------------------------------------------|
//! | `messages`             | append, or replace a trailing window (compression) |
//! | `context`              | overwrite when set                                 |
//! | `compressed_summary`   | overwrite when set                                 |
//! | `confidence_scores`    | per-agent overwrite, clamped to `[0, 1]`           |
//! | `compression_metadata` | overwrite when set                                 |
//! | `compression_error`    | overwrite when set                                 |
//! | `archived_sources`     | append, skipping sources already archived          |
//! | `turn_failures`        | append                                             |
//!
//! Engine-owned fields (`iteration_count`, `research_attempts`,
//! `current_node`, `consensus_reached`, `termination`, message timestamps)
//! are not reachable from a `StateUpdate` at all.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::clamp_unit;
use crate::machine::WorkflowStep;

/// Identifier of the agent that produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Researcher,
    Critic,
    Synthesizer,
    /// Reserved sender of synthetic compression messages.
    #[serde(rename = "scaledown")]
    Compressor,
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Researcher => write!(f, "researcher"),
            Self::Critic => write!(f, "critic"),
            Self::Synthesizer => write!(f, "synthesizer"),
            Self::Compressor => write!(f, "scaledown"),
        }
    }
}

/// One agent's contribution, as stored in the workflow state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub content: String,
    /// Assigned by the engine at merge time; non-decreasing along `messages`.
    pub timestamp: DateTime<Utc>,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
    /// URLs or citations, in the order the producer reported them.
    pub sources: Vec<String>,
}

/// A message produced by a turn, before the engine stamps it.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender: AgentId,
    pub content: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

impl NewMessage {
    pub fn new(sender: AgentId, content: impl Into<String>) -> Self {
        Self {
            sender,
            content: content.into(),
            confidence: 0.0,
            sources: Vec::new(),
        }
    }

    /// Set the confidence, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.sources = sources;
        self
    }

    fn stamp(self, timestamp: DateTime<Utc>) -> Message {
        Message {
            sender: self.sender,
            content: self.content,
            timestamp,
            confidence: clamp_unit(self.confidence),
            sources: self.sources,
        }
    }
}

/// Diagnostic record of the most recent compression pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionMetadata {
    /// Character length of the concatenated window text.
    pub original_length: usize,
    /// Character length of the extracted summary.
    pub compressed_length: usize,
    /// `1 - compressed/original`, or 0 when the original is empty.
    pub ratio: f64,
    /// Number of messages in the compressed window.
    pub messages_processed: usize,
}

impl CompressionMetadata {
    pub fn new(
        original_length: usize,
        compressed_length: usize,
        messages_processed: usize,
    ) -> Self {
        let ratio = if original_length == 0 {
            0.0
        } else {
            1.0 - compressed_length as f64 / original_length as f64
        };
        Self {
            original_length,
            compressed_length,
            ratio,
            messages_processed,
        }
    }
}

/// A recovered collaborator failure, kept for the host to report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnFailure {
    pub step: WorkflowStep,
    pub agent: AgentId,
    pub error: String,
    /// Research round in progress when the failure happened.
    pub iteration: u32,
}

/// A failure note carried by a [`StateUpdate`]; the engine adds step and round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureNote {
    pub agent: AgentId,
    pub error: String,
}

impl FailureNote {
    pub fn new(agent: AgentId, error: impl fmt::Display) -> Self {
        Self {
            agent,
            error: error.to_string(),
        }
    }
}

/// How the run reached its terminal step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The consensus policy judged the confidence sufficient.
    ConfidenceReached,
    /// The iteration budget ran out (forced proceed).
    BudgetExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfidenceReached => write!(f, "confidence_reached"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Change to the message sequence requested by a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum MessagesUpdate {
    #[default]
    Unchanged,
    /// Concatenate new messages at the end.
    Append(Vec<NewMessage>),
    /// Drop every message from index `start` on and push `summary` in their place.
    ReplaceWindow { start: usize, summary: NewMessage },
}

/// Partial update returned by every turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub messages: MessagesUpdate,
    pub context: Option<String>,
    pub compressed_summary: Option<String>,
    pub confidence_scores: Vec<(AgentId, f64)>,
    pub compression_metadata: Option<CompressionMetadata>,
    pub compression_error: Option<String>,
    /// Sources of messages folded away by this update.
    pub archived_sources: Vec<String>,
    pub failures: Vec<FailureNote>,
}

impl StateUpdate {
    /// An update that changes nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// An update that only appends one message.
    pub fn append(message: NewMessage) -> Self {
        Self {
            messages: MessagesUpdate::Append(vec![message]),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_score(mut self, agent: AgentId, score: f64) -> Self {
        self.confidence_scores.push((agent, score));
        self
    }

    pub fn with_failure(mut self, note: FailureNote) -> Self {
        self.failures.push(note);
        self
    }
}

/// The single mutable record threaded through a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub research_topic: String,
    pub messages: Vec<Message>,
    /// Latest research text, for agents that do not read the message log.
    pub context: String,
    /// Output of the most recent compression pass; empty until the first one.
    pub compressed_summary: String,
    /// Most recent score per agent.
    pub confidence_scores: BTreeMap<AgentId, f64>,
    /// Completed research turns.
    pub iteration_count: u32,
    /// Research turns started, successful or not.
    pub research_attempts: u32,
    pub compression_metadata: Option<CompressionMetadata>,
    pub compression_error: Option<String>,
    /// Sources of messages that compression replaced, first occurrence order.
    #[serde(default)]
    pub archived_sources: Vec<String>,
    pub turn_failures: Vec<TurnFailure>,
    pub consensus_reached: bool,
    pub termination: Option<Termination>,
    /// Last completed step.
    pub current_node: Option<WorkflowStep>,
}

impl WorkflowState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            research_topic: topic.into(),
            messages: Vec::new(),
            context: String::new(),
            compressed_summary: String::new(),
            confidence_scores: BTreeMap::new(),
            iteration_count: 0,
            research_attempts: 0,
            compression_metadata: None,
            compression_error: None,
            archived_sources: Vec::new(),
            turn_failures: Vec::new(),
            consensus_reached: false,
            termination: None,
            current_node: None,
        }
    }

    /// Merge a turn's update and mark `step` as completed.
    pub fn merge(&mut self, step: WorkflowStep, update: StateUpdate) {
        self.merge_at(step, update, Utc::now());
    }

    /// [`merge`](Self::merge) with an explicit clock.
    pub fn merge_at(&mut self, step: WorkflowStep, update: StateUpdate, now: DateTime<Utc>) {
        let StateUpdate {
            messages,
            context,
            compressed_summary,
            confidence_scores,
            compression_metadata,
            compression_error,
            archived_sources,
            failures,
        } = update;

        match messages {
            MessagesUpdate::Unchanged => {}
            MessagesUpdate::Append(new) => {
                for message in new {
                    let ts = self.next_timestamp(now);
                    self.messages.push(message.stamp(ts));
                }
            }
            MessagesUpdate::ReplaceWindow { start, summary } => {
                let ts = self.next_timestamp(now);
                self.messages.truncate(start.min(self.messages.len()));
                self.messages.push(summary.stamp(ts));
            }
        }

        if let Some(context) = context {
            self.context = context;
        }
        if let Some(summary) = compressed_summary {
            self.compressed_summary = summary;
        }
        for (agent, score) in confidence_scores {
            self.confidence_scores.insert(agent, clamp_unit(score));
        }
        if let Some(metadata) = compression_metadata {
            self.compression_metadata = Some(metadata);
        }
        if let Some(error) = compression_error {
            self.compression_error = Some(error);
        }
        for source in archived_sources {
            if !self.archived_sources.contains(&source) {
                self.archived_sources.push(source);
            }
        }
        for note in failures {
            self.record_failure(step, note.agent, note.error);
        }

        self.current_node = Some(step);
    }

    /// Record a recovered failure against the current research round.
    pub fn record_failure(
        &mut self,
        step: WorkflowStep,
        agent: AgentId,
        error: impl Into<String>,
    ) {
        self.turn_failures.push(TurnFailure {
            step,
            agent,
            error: error.into(),
            iteration: self.research_attempts,
        });
    }

    /// Timestamps never go backwards, even if the wall clock does.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.messages.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    pub fn latest_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn latest_confidence(&self) -> Option<f64> {
        self.latest_message().map(|m| m.confidence)
    }

    /// Most recent score of `agent`; absent counts as 0.
    pub fn score(&self, agent: AgentId) -> f64 {
        self.confidence_scores.get(&agent).copied().unwrap_or(0.0)
    }

    /// Latest message sent by `agent`.
    pub fn latest_from(&self, agent: AgentId) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.sender == agent)
    }

    /// The synthesizer's document, once the run has produced one.
    pub fn final_report(&self) -> Option<&str> {
        self.latest_from(AgentId::Synthesizer)
            .map(|m| m.content.as_str())
    }

    /// Every source of the run: archived ones first, then those still attached
    /// to messages. Duplicates are dropped.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let attached = self.messages.iter().flat_map(|m| m.sources.iter());
        for source in self.archived_sources.iter().chain(attached) {
            if !seen.contains(&source.as_str()) {
                seen.push(source);
            }
        }
        seen
    }

    /// Whether the run reached its terminal step.
    pub fn is_terminal(&self) -> bool {
        self.current_node == Some(WorkflowStep::Done)
    }
}
