//! ROTA Vision - model provider traits and response handling.
//!
//! Provider-agnostic traits for the vision and text inference the
//! extraction pipeline consumes. The model call itself is an opaque
//! capability; this crate owns the part the system depends on: isolating
//! a JSON object from whatever text the model wraps around it, and
//! degrading a parse failure into a recoverable per-request payload
//! instead of an error.

use async_trait::async_trait;
use rota_core::VisionError;
use serde_json::{json, Value};

pub mod providers;

pub use providers::{GeminiProvider, OllamaProvider};

// ============================================================================
// PROVIDER TRAITS
// ============================================================================

/// Vision inference: image plus prompt to raw text.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run inference over an image. Returns the model's raw text, which
    /// may be wrapped in fenced code blocks or leading/trailing prose.
    async fn infer_image(
        &self,
        image: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String, VisionError>;
}

/// Plain text inference.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn infer(&self, prompt: &str) -> Result<String, VisionError>;
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

/// Isolate the JSON object inside a model response.
///
/// Models routinely wrap output in markdown fences or surround it with
/// prose. Strip a ```json (or bare ```) fence if present, then cut from
/// the first `{` to the last `}`.
pub fn isolate_json(raw: &str) -> Option<&str> {
    let body = if let Some(start) = raw.find("```json") {
        let after = &raw[start + "```json".len()..];
        match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
    } else if let Some(start) = raw.find("```") {
        let after = &raw[start + 3..];
        match after.find("```") {
            Some(end) => &after[..end],
            None => after,
        }
    } else {
        raw
    };

    let open = body.find('{')?;
    let close = body.rfind('}')?;
    if close < open {
        return None;
    }
    Some(body[open..=close].trim())
}

/// Parse a model response into JSON.
///
/// Parse failure is a recoverable per-request condition, not an error:
/// the caller gets `{"error": "malformed JSON", "raw": <text>}` and
/// decides what to surface.
pub fn parse_model_json(raw: &str) -> Value {
    let malformed = || {
        tracing::warn!(raw_len = raw.len(), "model returned malformed JSON");
        json!({ "error": "malformed JSON", "raw": raw })
    };

    match isolate_json(raw) {
        Some(candidate) => serde_json::from_str(candidate).unwrap_or_else(|_| malformed()),
        None => malformed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_plain_json() {
        let raw = r#"{"turni": []}"#;
        assert_eq!(isolate_json(raw), Some(r#"{"turni": []}"#));
    }

    #[test]
    fn test_isolate_fenced_json() {
        let raw = "Here you go:\n```json\n{\"turni\": [1]}\n```\nAnything else?";
        assert_eq!(isolate_json(raw), Some("{\"turni\": [1]}"));
    }

    #[test]
    fn test_isolate_bare_fence() {
        let raw = "```\n{\"a\": 1}\n```";
        assert_eq!(isolate_json(raw), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_isolate_prose_wrapped() {
        let raw = "The schedule is {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(isolate_json(raw), Some("{\"a\": {\"b\": 2}}"));
    }

    #[test]
    fn test_isolate_no_object() {
        assert_eq!(isolate_json("no braces here"), None);
        assert_eq!(isolate_json("} reversed {"), None);
    }

    #[test]
    fn test_parse_valid() {
        let value = parse_model_json("```json\n{\"turni\": []}\n```");
        assert!(value["turni"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_parse_malformed_is_recoverable() {
        let raw = "```json\n{\"turni\": [oops\n```";
        let value = parse_model_json(raw);
        assert_eq!(value["error"], "malformed JSON");
        assert_eq!(value["raw"], raw);
    }

    #[test]
    fn test_parse_empty_is_recoverable() {
        let value = parse_model_json("");
        assert_eq!(value["error"], "malformed JSON");
    }
}
