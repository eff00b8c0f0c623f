//! Decoding of streamed completion chunks.
//!
//! Each `data:` payload of an OpenAI-compatible stream is one JSON object:
//!
//! ```json
//! {"id":"chatcmpl-1","model":"gpt-4o-mini","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}
//! ```

use serde::Deserialize;

/// End-of-stream marker sent in place of a JSON chunk.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One decoded chunk.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionChunk {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Choice {
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(alias = "finishReason")]
    pub finish_reason: Option<String>,
}

/// Incremental message content carried by one choice.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkDelta {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl CompletionChunk {
    /// The choice the client renders. Only index 0 is surfaced.
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices
            .iter()
            .find(|c| c.index == 0)
            .or_else(|| self.choices.first())
    }
}

impl Choice {
    /// Finish reason, treating an empty string as absent.
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref().filter(|r| !r.is_empty())
    }

    /// Delta text, treating an empty string as absent.
    pub fn content(&self) -> Option<&str> {
        self.delta.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// True if `payload` is the end-of-stream sentinel.
pub fn is_done(payload: &str) -> bool {
    payload.trim() == DONE_SENTINEL
}

/// Decode one payload. Anything that is not chunk JSON yields `None`.
///
/// The sentinel is not chunk JSON either; callers check [`is_done`] first.
pub fn decode(payload: &str) -> Option<CompletionChunk> {
    serde_json::from_str(payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_content_delta() {
        let chunk = decode(
            r#"{"id":"c1","model":"m","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
        )
        .unwrap();

        assert_eq!(chunk.id.as_deref(), Some("c1"));
        assert_eq!(chunk.model.as_deref(), Some("m"));
        let choice = chunk.first_choice().unwrap();
        assert_eq!(choice.content(), Some("Hi"));
        assert_eq!(choice.finish_reason(), None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let chunk = decode(r#"{"choices":[{"delta":{}}]}"#).unwrap();
        assert_eq!(chunk.id, None);
        let choice = chunk.first_choice().unwrap();
        assert_eq!(choice.index, 0);
        assert_eq!(choice.delta, ChunkDelta::default());

        let empty = decode("{}").unwrap();
        assert!(empty.choices.is_empty());
        assert!(empty.first_choice().is_none());
    }

    #[test]
    fn role_only_delta() {
        let chunk = decode(r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#)
            .unwrap();
        let choice = chunk.first_choice().unwrap();
        assert_eq!(choice.delta.role.as_deref(), Some("assistant"));
        assert_eq!(choice.content(), None);
    }

    #[test]
    fn camel_case_finish_reason_accepted() {
        let chunk = decode(r#"{"choices":[{"index":0,"delta":{},"finishReason":"length"}]}"#)
            .unwrap();
        assert_eq!(chunk.first_choice().unwrap().finish_reason(), Some("length"));
    }

    #[test]
    fn empty_finish_reason_is_absent() {
        let chunk = decode(r#"{"choices":[{"index":0,"delta":{},"finish_reason":""}]}"#).unwrap();
        assert_eq!(chunk.first_choice().unwrap().finish_reason(), None);
    }

    #[test]
    fn first_choice_prefers_index_zero() {
        let chunk = decode(
            r#"{"choices":[{"index":1,"delta":{"content":"b"}},{"index":0,"delta":{"content":"a"}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.first_choice().unwrap().content(), Some("a"));
    }

    #[test]
    fn malformed_payloads_yield_none() {
        assert!(decode("not json").is_none());
        assert!(decode("").is_none());
        assert!(decode(r#"{"choices":"nope"}"#).is_none());
        assert!(decode(r#"{"choices":[{"index":"zero"}]}"#).is_none());
        assert!(decode("[DONE]").is_none());
    }

    #[test]
    fn sentinel_detection_trims() {
        assert!(is_done("[DONE]"));
        assert!(is_done("  [DONE]\n"));
        assert!(!is_done("[done]"));
        assert!(!is_done("{}"));
    }
}
