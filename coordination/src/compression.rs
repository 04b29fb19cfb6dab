//! Context compression — folds a trailing window of messages into one
//! factual summary message.
//!
//! ## Window
//!
//! The window is the last `compression_window_size` messages. Unless
//! `recompress_summaries` is set, it never reaches back past the most recent
//! compression message, so a summary is not summarised again on the next
//! round. An empty window (or one smaller than `min_messages_to_compress`)
//! leaves the state untouched.
//!
//! ## Failure handling
//!
//! A generation failure is a pass-through: messages stay as they were and
//! the error lands in `compression_error`. A blank response is treated the
//! same way. A response that is not valid structured output is used verbatim
//! as the summary.
//!
//! ## Sources
//!
//! The summary message carries no sources of its own. Sources attached to the
//! replaced messages, plus any the model cites in its `sources` list, are
//! handed to the state as archived sources.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::collaborators::{with_timeout, TextGenerator};
use crate::config::EngineConfig;
use crate::errors::ParseError;
use crate::state::{
    AgentId, CompressionMetadata, FailureNote, Message, MessagesUpdate, NewMessage, StateUpdate,
    WorkflowState,
};

const EXTRACTION_PROMPT: &str = "You are a research data compression specialist.

EXTRACT ONLY:
- Core factual claims
- Research data and findings
- Source citations and URLs
- Numerical data and statistics

REMOVE:
- Conversational filler
- Meta-commentary
- Confidence assessments

TARGET: 70% reduction in length

INPUT MESSAGES:
{messages}

OUTPUT (JSON):
{
    \"key_findings\": [\"finding1\", \"finding2\"],
    \"data_points\": [\"data1\", \"data2\"],
    \"sources\": [\"url1\", \"url2\"],
    \"compressed_text\": \"Brief summary\"
}";

/// The trailing slice of messages selected for compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionWindow {
    /// Index of the first message in the window.
    pub start: usize,
    /// Number of messages in the window.
    pub len: usize,
    /// `sender: content` lines, blank-line separated.
    pub text: String,
    /// Sources attached to the window's messages, first occurrence order.
    pub sources: Vec<String>,
}

/// Structured output requested from the model.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompressedPayload {
    #[serde(default)]
    pub key_findings: Vec<serde_json::Value>,
    #[serde(default)]
    pub data_points: Vec<serde_json::Value>,
    #[serde(default)]
    pub sources: Vec<serde_json::Value>,
    #[serde(default)]
    pub compressed_text: String,
}

impl CompressedPayload {
    /// `compressed_text`, or the findings and data points when it is blank.
    pub fn summary(&self) -> String {
        let text = self.compressed_text.trim();
        if !text.is_empty() {
            return text.to_string();
        }
        self.key_findings
            .iter()
            .chain(self.data_points.iter())
            .map(value_text)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Cited sources that are plain strings, trimmed, blanks dropped.
    pub fn source_list(&self) -> Vec<String> {
        self.sources
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render the fixed extraction instruction around `messages`.
pub fn build_prompt(messages: &str) -> String {
    EXTRACTION_PROMPT.replace("{messages}", messages)
}

/// Locate and decode the JSON object in a model response.
///
/// Accepts ```` ```json ```` fences, bare ```` ``` ```` fences, or an
/// unfenced object surrounded by prose.
pub fn parse_payload(raw: &str) -> Result<CompressedPayload, ParseError> {
    let body = fenced_body(raw).unwrap_or(raw);
    let start = body.find('{').ok_or(ParseError::NoStructuredPayload)?;
    let end = body.rfind('}').ok_or(ParseError::NoStructuredPayload)?;
    if end < start {
        return Err(ParseError::NoStructuredPayload);
    }
    serde_json::from_str(&body[start..=end]).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

fn fenced_body(raw: &str) -> Option<&str> {
    let (open, skip) = match raw.find("```json") {
        Some(pos) => (pos, "```json".len()),
        None => (raw.find("```")?, 3),
    };
    let rest = &raw[open + skip..];
    let close = rest.find("```").unwrap_or(rest.len());
    Some(rest[..close].trim())
}

/// Summary text to store for a model response; falls back to the raw text.
pub fn extract_summary(raw: &str) -> String {
    extract(raw).0
}

/// Summary text and cited sources of a model response.
fn extract(raw: &str) -> (String, Vec<String>) {
    match parse_payload(raw) {
        Ok(payload) => {
            let cited = payload.source_list();
            let summary = payload.summary();
            if summary.is_empty() {
                debug!("Compression payload had no usable text, keeping raw response");
                (raw.trim().to_string(), cited)
            } else {
                (summary, cited)
            }
        }
        Err(e) => {
            warn!(error = %e, "Compression response not structured, keeping raw response");
            (raw.trim().to_string(), Vec::new())
        }
    }
}

fn push_unique(list: &mut Vec<String>, source: &str) {
    if !list.iter().any(|s| s == source) {
        list.push(source.to_string());
    }
}

/// Compression pass over the shared state.
pub struct Compressor {
    generator: Arc<dyn TextGenerator>,
    window_size: usize,
    min_messages: usize,
    recompress_summaries: bool,
    timeout: Option<Duration>,
}

impl Compressor {
    pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
        Self {
            generator,
            window_size: config.compression_window_size,
            min_messages: config.min_messages_to_compress.max(1),
            recompress_summaries: config.recompress_summaries,
            timeout: config.collaborator_timeout(),
        }
    }

    /// Pick the window to compress, if any.
    pub fn select_window(&self, messages: &[Message]) -> Option<CompressionWindow> {
        let floor = if self.recompress_summaries {
            0
        } else {
            messages
                .iter()
                .rposition(|m| m.sender == AgentId::Compressor)
                .map_or(0, |i| i + 1)
        };
        let start = messages.len().saturating_sub(self.window_size).max(floor);
        let len = messages.len() - start;
        if len == 0 || len < self.min_messages {
            return None;
        }

        let text = messages[start..]
            .iter()
            .map(|m| format!("{}: {}", m.sender, m.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let mut sources = Vec::new();
        for source in messages[start..].iter().flat_map(|m| m.sources.iter()) {
            push_unique(&mut sources, source);
        }
        Some(CompressionWindow {
            start,
            len,
            text,
            sources,
        })
    }

    /// Run one compression pass. Never fails; problems are recorded in the update.
    pub async fn compress(&self, state: &WorkflowState) -> StateUpdate {
        if state.messages.is_empty() {
            return StateUpdate {
                compressed_summary: Some(String::new()),
                ..StateUpdate::default()
            };
        }

        let Some(window) = self.select_window(&state.messages) else {
            debug!(
                messages = state.messages.len(),
                "Nothing new to compress, skipping"
            );
            return StateUpdate::none();
        };

        let prompt = build_prompt(&window.text);
        let raw = match with_timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, window = window.len, "Compression failed, passing state through");
                return pass_through(e.to_string());
            }
        };

        let (summary, cited) = extract(&raw);
        if summary.trim().is_empty() {
            warn!(window = window.len, "Compression returned no text, passing state through");
            return pass_through("compression returned an empty summary".to_string());
        }
        let mut archived = window.sources;
        for source in &cited {
            push_unique(&mut archived, source);
        }
        let metadata = CompressionMetadata::new(
            window.text.chars().count(),
            summary.chars().count(),
            window.len,
        );

        info!(
            messages_processed = metadata.messages_processed,
            original_length = metadata.original_length,
            compressed_length = metadata.compressed_length,
            ratio = metadata.ratio,
            "Compressed message window"
        );

        StateUpdate {
            messages: MessagesUpdate::ReplaceWindow {
                start: window.start,
                summary: NewMessage::new(AgentId::Compressor, summary.clone())
                    .with_confidence(1.0),
            },
            compressed_summary: Some(summary),
            compression_metadata: Some(metadata),
            archived_sources: archived,
            ..StateUpdate::default()
        }
    }
}

/// Leave the messages alone and record why.
fn pass_through(error: String) -> StateUpdate {
    StateUpdate {
        failures: vec![FailureNote::new(AgentId::Compressor, &error)],
        compression_error: Some(error),
        ..StateUpdate::default()
    }
}
