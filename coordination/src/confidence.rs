//! Confidence extraction from free-form model output.
//!
//! Agents ask the model to finish with a labelled line such as
//! `Confidence: 0.85` or `Score: 7/10`. [`extract_confidence`] pulls the
//! number after the last occurrence of the label and normalises it into
//! `[0, 1]`, returning the caller's fallback when nothing usable is found.

use std::sync::LazyLock;

use regex::Regex;

/// Default used when a critic score cannot be read.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// A number, optionally followed by `%` or an `/ N` denominator.
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\s:*=\[\(]*([+-]?\d+(?:\.\d+)?|[+-]?\.\d+)\s*(%|/\s*(\d+(?:\.\d+)?))?")
        .expect("valid confidence regex")
});

/// Clamp into `[0, 1]`. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Read the confidence that follows `label` in `text`.
///
/// The label match is case-insensitive and the last occurrence wins, so a
/// model that restates the format instructions before answering is still
/// read correctly. Percentages (`85%`) and ratios (`8/10`) are normalised.
/// Values out of range are clamped; a missing label or unparseable number
/// yields `fallback` (itself clamped).
pub fn extract_confidence(text: &str, label: &str, fallback: f64) -> f64 {
    let fallback = clamp_unit(fallback);
    if label.is_empty() {
        return fallback;
    }

    let haystack = text.to_lowercase();
    let needle = label.to_lowercase();

    // Try occurrences from the end until one is followed by a number.
    let mut end = haystack.len();
    while let Some(pos) = haystack[..end].rfind(&needle) {
        if let Some(value) = parse_after(&haystack[pos + needle.len()..]) {
            return clamp_unit(value);
        }
        end = pos;
    }
    fallback
}

fn parse_after(rest: &str) -> Option<f64> {
    let caps = NUMBER_RE.captures(rest)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    match caps.get(2).map(|m| m.as_str()) {
        Some("%") => Some(value / 100.0),
        Some(_) => {
            let denom: f64 = caps.get(3)?.as_str().parse().ok()?;
            (denom > 0.0).then(|| value / denom)
        }
        None => Some(value),
    }
}
