//! Model inference boundary.
//!
//! Pipeline stages talk to a provider through [`InferenceProvider`] and never
//! see HTTP. Raw completions come back as an [`InferenceResponse`], split by a
//! small heuristic into structured JSON or plain text.

pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

/// Stage labels attached to provider calls for logging and queue replay.
pub mod call_type {
    pub const ANALYSIS: &str = "analysis";
    pub const PLANNING: &str = "planning";
    pub const VERIFICATION: &str = "verification";
    pub const SUMMARIZATION: &str = "summarization";
    pub const DIRECT: &str = "direct";
}

/// One model completion, already shape-classified.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResponse {
    Json(Value),
    Text(String),
}

impl InferenceResponse {
    /// Classify a raw completion. Trimmed text opening with `{` or `[` is
    /// parsed as JSON; anything else, including JSON that fails to parse,
    /// stays text.
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(trimmed) {
                return InferenceResponse::Json(value);
            }
        }
        InferenceResponse::Text(raw.to_string())
    }

    /// Unwrap the structured form.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Inference`] when the model answered in prose
    /// where the caller needs machine-readable output.
    pub fn into_json(self) -> Result<Value, AgentError> {
        match self {
            InferenceResponse::Json(value) => Ok(value),
            InferenceResponse::Text(text) => Err(AgentError::Inference(format!(
                "expected structured output, got text: {}",
                text.chars().take(120).collect::<String>()
            ))),
        }
    }

    /// Flat text rendering, used for summaries and token estimation.
    pub fn to_text(&self) -> String {
        match self {
            InferenceResponse::Json(value) => value.to_string(),
            InferenceResponse::Text(text) => text.clone(),
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, InferenceResponse::Json(_))
    }
}

/// A model backend.
///
/// # Errors
///
/// Implementations map transport failures (timeouts, refused connections) to
/// [`AgentError::Connectivity`] so callers can queue the work, and everything
/// else (bad status, malformed body) to [`AgentError::Inference`].
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn call(&self, prompt: &str, call_type: &str) -> Result<InferenceResponse, AgentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_raw_classifies_json_objects_and_arrays() {
        assert_eq!(
            InferenceResponse::from_raw(r#"  {"steps": []}  "#),
            InferenceResponse::Json(json!({"steps": []}))
        );
        assert_eq!(
            InferenceResponse::from_raw("[1, 2, 3]"),
            InferenceResponse::Json(json!([1, 2, 3]))
        );
    }

    #[test]
    fn test_from_raw_keeps_prose_and_broken_json_as_text() {
        assert_eq!(
            InferenceResponse::from_raw("The goal looks feasible."),
            InferenceResponse::Text("The goal looks feasible.".to_string())
        );
        // Opens like JSON but does not parse.
        assert_eq!(
            InferenceResponse::from_raw("{not json"),
            InferenceResponse::Text("{not json".to_string())
        );
    }

    #[test]
    fn test_into_json_rejects_text() {
        let err = InferenceResponse::Text("plain".into()).into_json().unwrap_err();
        assert!(matches!(err, AgentError::Inference(_)));
        assert_eq!(
            InferenceResponse::Json(json!({"a": 1})).into_json().unwrap(),
            json!({"a": 1})
        );
    }
}
