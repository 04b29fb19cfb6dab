//! Engine configuration: loop bounds, thresholds, compression window.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields a
//! working configuration. Hosts layer overrides on top and call
//! [`EngineConfig::validate`] before building an engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consensus::Aggregate;
use crate::errors::ConfigurationError;

const DEFAULT_MAX_ITERATIONS: u32 = 5;
const DEFAULT_WINDOW_SIZE: usize = 3;
const DEFAULT_HIGH_THRESHOLD: f64 = 0.8;
const DEFAULT_LOW_THRESHOLD: f64 = 0.5;
const DEFAULT_MIN_MESSAGES_TO_COMPRESS: usize = 1;
const DEFAULT_SEARCH_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hard bound on research rounds before a forced proceed.
    pub max_iterations: u32,
    /// Trailing messages folded into one summary per compression pass.
    pub compression_window_size: usize,
    /// Aggregate confidence strictly above this proceeds to synthesis.
    pub high_confidence_threshold: f64,
    /// Aggregate confidence below this is reported as low confidence.
    pub low_confidence_threshold: f64,
    /// Windows smaller than this are left alone.
    pub min_messages_to_compress: usize,
    /// Allow earlier compression summaries to be compressed again.
    pub recompress_summaries: bool,
    pub aggregate: Aggregate,
    /// Results requested from the search provider per research turn.
    pub search_max_results: usize,
    /// Per-call limit for collaborator calls; `None` waits indefinitely.
    pub collaborator_timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            compression_window_size: DEFAULT_WINDOW_SIZE,
            high_confidence_threshold: DEFAULT_HIGH_THRESHOLD,
            low_confidence_threshold: DEFAULT_LOW_THRESHOLD,
            min_messages_to_compress: DEFAULT_MIN_MESSAGES_TO_COMPRESS,
            recompress_summaries: false,
            aggregate: Aggregate::default(),
            search_max_results: DEFAULT_SEARCH_MAX_RESULTS,
            collaborator_timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigurationError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn collaborator_timeout(&self) -> Option<Duration> {
        self.collaborator_timeout_secs.map(Duration::from_secs)
    }

    /// Reject values that would make the loop unbounded or meaningless.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_iterations == 0 {
            return Err(ConfigurationError::invalid("max_iterations", "must be at least 1"));
        }
        if self.compression_window_size == 0 {
            return Err(ConfigurationError::invalid(
                "compression_window_size",
                "must be at least 1",
            ));
        }
        for (field, value) in [
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("low_confidence_threshold", self.low_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigurationError::invalid(
                    field,
                    format!("{value} is outside [0, 1]"),
                ));
            }
        }
        if self.low_confidence_threshold > self.high_confidence_threshold {
            return Err(ConfigurationError::invalid(
                "low_confidence_threshold",
                format!(
                    "{} exceeds high_confidence_threshold {}",
                    self.low_confidence_threshold, self.high_confidence_threshold
                ),
            ));
        }
        if self.collaborator_timeout_secs == Some(0) {
            return Err(ConfigurationError::invalid(
                "collaborator_timeout_secs",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }
}
