//! Response extraction: recover a JSON value from free-form model text.
//!
//! Even when asked for "ONLY JSON", vision models wrap answers in Markdown
//! fences, prepend a sentence of prose, or trail off with an explanation.
//! This stage tolerates that noise with an ordered fallback chain and **never
//! fails**: the result is always a parsed value, an explicit "model said
//! nothing" marker, or an error envelope that keeps the raw text verbatim so
//! nothing the model produced is lost.
//!
//! ## Strategies
//!
//! The two backends were tuned against different models and use different
//! fallback orders; both are kept as [`ExtractionStrategy`] variants.
//!
//! | Strategy | Order |
//! |----------|-------|
//! | [`FencedBlock`](ExtractionStrategy::FencedBlock) | ```` ```json ```` block → first `{` … last `}` → whole text, one parse |
//! | [`StripFences`](ExtractionStrategy::StripFences) | drop all fence markers and parse → first `{` … last `}` |

use crate::prompts::{JSON_BLOCK_END, JSON_BLOCK_START};
use crate::schema::Prescription;
use once_cell::sync::Lazy;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

/// Value of the `error` key in the error envelope.
pub const PARSING_FAILED: &str = "parsing_failed";

static RE_JSON_FENCE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

static RE_BRACE_SPAN: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"(?s)\{.*\}").unwrap());

/// Fallback order used to locate the JSON payload in a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractionStrategy {
    /// Pick one candidate (labelled fence, else brace span, else whole text)
    /// and parse it once. Default for per-page submission.
    FencedBlock,
    /// Remove every fence marker and parse the remainder; if that fails,
    /// parse the brace span of the original text. Default for whole-document
    /// submission.
    StripFences,
}

/// Outcome of extracting JSON from one reply.
///
/// Serialises to the JSON written into output files: `null`, the parsed
/// value, or `{"error": "parsing_failed", "raw_content": "<reply>"}`.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The model returned nothing (or the request failed).
    Empty,
    /// A JSON value was recovered.
    Parsed(Value),
    /// No candidate parsed; the reply is kept exactly as received.
    Failed { raw_content: String },
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        matches!(self, Extraction::Empty)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Extraction::Failed { .. })
    }

    /// The JSON value written to the output file.
    pub fn into_value(self) -> Value {
        match self {
            Extraction::Empty => Value::Null,
            Extraction::Parsed(v) => v,
            Extraction::Failed { raw_content } => {
                let mut envelope = serde_json::Map::new();
                envelope.insert("error".into(), Value::String(PARSING_FAILED.into()));
                envelope.insert("raw_content".into(), Value::String(raw_content));
                Value::Object(envelope)
            }
        }
    }

    /// Read the parsed value as a [`Prescription`], if it has that shape.
    ///
    /// An object without any of the schema's lists is not a prescription.
    pub fn as_prescription(&self) -> Option<Prescription> {
        match self {
            Extraction::Parsed(v @ Value::Object(_)) => serde_json::from_value(v.clone())
                .ok()
                .filter(|rx| *rx != Prescription::default()),
            _ => None,
        }
    }
}

impl Serialize for Extraction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Extraction::Empty => serializer.serialize_none(),
            Extraction::Parsed(v) => v.serialize(serializer),
            Extraction::Failed { raw_content } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", PARSING_FAILED)?;
                map.serialize_entry("raw_content", raw_content)?;
                map.end()
            }
        }
    }
}

/// Extract a JSON value from a model reply.
///
/// `None` and `Some("")` both yield [`Extraction::Empty`]; any other input
/// yields either [`Extraction::Parsed`] or [`Extraction::Failed`] carrying
/// the untouched input.
pub fn extract(reply: Option<&str>, strategy: ExtractionStrategy) -> Extraction {
    let text = match reply {
        Some(t) if !t.is_empty() => t,
        _ => return Extraction::Empty,
    };

    match strategy {
        ExtractionStrategy::FencedBlock => extract_fenced_block(text),
        ExtractionStrategy::StripFences => extract_strip_fences(text),
    }
}

fn extract_fenced_block(text: &str) -> Extraction {
    let candidate = if let Some(inner) = RE_JSON_FENCE.captures(text).and_then(|c| c.get(1)) {
        inner.as_str()
    } else if let Some(span) = RE_BRACE_SPAN.find(text) {
        span.as_str()
    } else {
        text
    };

    match serde_json::from_str(candidate) {
        Ok(v) => Extraction::Parsed(v),
        Err(e) => {
            debug!("JSON decode error: {}", e);
            failed(text)
        }
    }
}

fn extract_strip_fences(text: &str) -> Extraction {
    let cleaned = text.replace(JSON_BLOCK_START, "").replace(JSON_BLOCK_END, "");
    match serde_json::from_str(cleaned.trim()) {
        Ok(v) => return Extraction::Parsed(v),
        Err(e) => debug!("JSON decode error after stripping fences: {}", e),
    }

    if let Some(span) = RE_BRACE_SPAN.find(text) {
        if let Ok(v) = serde_json::from_str(span.as_str()) {
            return Extraction::Parsed(v);
        }
    }

    failed(text)
}

fn failed(text: &str) -> Extraction {
    Extraction::Failed {
        raw_content: text.to_string(),
    }
}
