//! Consensus policy — decides between another research round and synthesis.
//!
//! The aggregate confidence is compared against the high threshold: strictly
//! above it proceeds, anything else revises. The low threshold only labels
//! why a revise was chosen. Once the iteration budget is spent the decision
//! is forced to proceed, so every run terminates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::state::{AgentId, WorkflowState};

/// How per-agent scores are folded into one number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// The critic's latest score; the critic adjudicates.
    #[default]
    Critic,
    /// Lowest score across the researcher and the critic.
    Minimum,
    /// Mean of the researcher's and the critic's scores.
    Mean,
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critic => write!(f, "critic"),
            Self::Minimum => write!(f, "minimum"),
            Self::Mean => write!(f, "mean"),
        }
    }
}

/// Outcome of a consensus check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Revise,
    Proceed,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revise => write!(f, "revise"),
            Self::Proceed => write!(f, "proceed"),
        }
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Aggregate above the high threshold.
    HighConfidence,
    /// Aggregate below the low threshold.
    LowConfidence,
    /// Aggregate between the thresholds (or equal to either).
    Indeterminate,
    /// Iteration budget spent; proceed regardless of confidence.
    BudgetExhausted,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HighConfidence => "high_confidence",
            Self::LowConfidence => "low_confidence",
            Self::Indeterminate => "indeterminate",
            Self::BudgetExhausted => "budget_exhausted",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decision together with the numbers that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: DecisionReason,
    pub aggregate: f64,
    /// Rounds counted against the budget.
    pub rounds: u32,
}

/// Thresholds and budget for the consensus check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsensusPolicy {
    pub high_threshold: f64,
    pub low_threshold: f64,
    pub max_iterations: u32,
    pub aggregate: Aggregate,
}

impl ConsensusPolicy {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            high_threshold: config.high_confidence_threshold,
            low_threshold: config.low_confidence_threshold,
            max_iterations: config.max_iterations,
            aggregate: config.aggregate,
        }
    }

    /// Fold the current scores. Missing agents count as 0.
    pub fn aggregate(&self, state: &WorkflowState) -> f64 {
        let critic = state.score(AgentId::Critic);
        let researcher = state.score(AgentId::Researcher);
        match self.aggregate {
            Aggregate::Critic => critic,
            Aggregate::Minimum => critic.min(researcher),
            Aggregate::Mean => (critic + researcher) / 2.0,
        }
    }

    /// Decide from scores and round count.
    ///
    /// Rounds are `max(iteration_count, research_attempts)`, so failed
    /// research turns still consume budget.
    pub fn evaluate(&self, state: &WorkflowState) -> Verdict {
        let aggregate = self.aggregate(state);
        let rounds = state.iteration_count.max(state.research_attempts);

        let (decision, reason) = if aggregate > self.high_threshold {
            (Decision::Proceed, DecisionReason::HighConfidence)
        } else if rounds >= self.max_iterations {
            (Decision::Proceed, DecisionReason::BudgetExhausted)
        } else if aggregate < self.low_threshold {
            (Decision::Revise, DecisionReason::LowConfidence)
        } else {
            (Decision::Revise, DecisionReason::Indeterminate)
        };

        Verdict {
            decision,
            reason,
            aggregate,
            rounds,
        }
    }
}

impl Default for ConsensusPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
