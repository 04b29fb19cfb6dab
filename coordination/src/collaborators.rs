//! Seams between the engine and everything that talks to the outside world.
//!
//! The engine holds these as `Arc<dyn …>` handles passed in at construction;
//! there is no process-wide client state. Tests inject scripted fakes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CollaboratorError;
use crate::state::{AgentId, StateUpdate, WorkflowState};

/// Generate a text response from a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// One web-search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub url: String,
}

/// Web search returning results in relevance order. Zero results is not an error.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, CollaboratorError>;
}

/// One agent's turn: read the state, return a partial update.
///
/// An `Err` makes the turn a no-op; the engine records the failure and moves on.
#[async_trait]
pub trait AgentTurn: Send + Sync {
    fn id(&self) -> AgentId;

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate, CollaboratorError>;
}

/// Await `call`, failing with [`CollaboratorError::Timeout`] once `limit` elapses.
pub async fn with_timeout<T, F>(limit: Option<Duration>, call: F) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match limit {
        None => call.await,
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| CollaboratorError::Timeout(limit.as_secs()))?,
    }
}
