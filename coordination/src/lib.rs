//! Research Team Coordination Library
//!
//! The control core of the research team: a researcher, a critic and a
//! synthesizer take turns over one shared [`WorkflowState`] until the
//! consensus policy is satisfied or the iteration budget runs out.
//!
//! # Components
//!
//! - [`state`]: messages, the shared workflow record, typed partial updates
//! - [`compression`]: folds a trailing message window into one factual summary
//! - [`consensus`]: revise-or-proceed decision from confidence scores
//! - [`machine`]: step enum, transition table and audit log
//! - [`engine`]: sequences turns, merges updates, emits progress events
//! - [`collaborators`]: text-generation, search and agent-turn traits
//!
//! The library never installs a tracing subscriber and never touches the
//! network itself; hosts inject collaborators at construction.
//!
//! # Usage
//!
//! ```ignore
//! let engine = ResearchOrchestrator::new(researcher, critic, synthesizer, generator, config)?;
//! let state = engine.run("solid-state batteries").await;
//! println!("{}", state.final_report().unwrap_or("(no report)"));
//! ```

pub mod collaborators;
pub mod compression;
pub mod confidence;
pub mod config;
pub mod consensus;
pub mod engine;
pub mod errors;
pub mod machine;
pub mod state;

pub use collaborators::{with_timeout, AgentTurn, SearchProvider, SearchResult, TextGenerator};
pub use compression::{CompressedPayload, CompressionWindow, Compressor};
pub use confidence::{clamp_unit, extract_confidence, DEFAULT_CONFIDENCE};
pub use config::EngineConfig;
pub use consensus::{Aggregate, ConsensusPolicy, Decision, DecisionReason, Verdict};
pub use engine::{ProgressEvent, ResearchOrchestrator, WorkflowRun};
pub use errors::{CollaboratorError, ConfigurationError, IllegalTransition, ParseError};
pub use machine::{StepMachine, TransitionRecord, WorkflowStep};
pub use state::{
    AgentId, CompressionMetadata, FailureNote, Message, MessagesUpdate, NewMessage, StateUpdate,
    Termination, TurnFailure, WorkflowState,
};
