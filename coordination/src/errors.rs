//! Error taxonomy for the research workflow.
//!
//! Only [`ConfigurationError`] is ever fatal. Collaborator and parse failures
//! are recovered at the turn boundary and recorded as diagnostics in the
//! workflow state.
//!
//! | Error                | Raised by                  | Handling                       |
//! |----------------------|----------------------------|--------------------------------|
//! | `CollaboratorError`  | generation / search calls  | turn becomes a no-op, run goes on |
//! | `ParseError`         | compression output parsing | raw response used as summary   |
//! | `ConfigurationError` | startup                    | surfaced to the host           |

use std::fmt;

use thiserror::Error;

/// Failure of an external collaborator (text generation or web search).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The text-generation provider failed (network, backend, bad response).
    #[error("generation failed: {0}")]
    Generation(String),

    /// The web-search provider failed.
    #[error("search failed: {0}")]
    Search(String),

    /// The provider rejected the call because of rate limits.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The call did not complete within the configured timeout.
    #[error("timed out after {0}s")]
    Timeout(u64),
}

impl CollaboratorError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Timeout(_))
    }
}

/// The compression response could not be read as structured output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// No JSON object was found in the response text.
    #[error("no structured payload in response")]
    NoStructuredPayload,

    /// A JSON object was found but did not deserialize.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),
}

/// Missing or invalid configuration, detected before a run starts.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A credential required by a collaborator is not set.
    #[error("missing credential: {0} is not set")]
    MissingCredential(&'static str),

    /// A configuration value is out of its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigurationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Attempted a step transition that is not an edge of the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: crate::machine::WorkflowStep,
    pub to: crate::machine::WorkflowStep,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal step transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_and_timeout_are_transient() {
        assert!(CollaboratorError::RateLimited("429".into()).is_transient());
        assert!(CollaboratorError::Timeout(30).is_transient());
        assert!(!CollaboratorError::Search("dns".into()).is_transient());
        assert!(!CollaboratorError::Generation("500".into()).is_transient());
    }

    #[test]
    fn error_messages_carry_detail() {
        let err = CollaboratorError::Search("connection refused".into());
        assert!(err.to_string().contains("connection refused"));

        let err = ConfigurationError::MissingCredential("OPENAI_API_KEY");
        assert_eq!(err.to_string(), "missing credential: OPENAI_API_KEY is not set");

        let err = ConfigurationError::invalid("max_iterations", "must be > 0");
        assert!(err.to_string().contains("max_iterations"));
    }

    #[test]
    fn parse_error_display() {
        assert_eq!(
            ParseError::NoStructuredPayload.to_string(),
            "no structured payload in response"
        );
        assert!(ParseError::InvalidJson("eof".into())
            .to_string()
            .contains("eof"));
    }
}
