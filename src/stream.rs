//!
//! Finish-reason deduplication for streamed chat responses.
//!
//! Some backends emit a finish reason more than once per stream (typically a
//! `tool_calls` finish followed by a trailing `stop`). Clients treat the last
//! one as authoritative, which loses the tool calls. `FinishDeduplicator` lets
//! the first finish reason through and neutralizes every later one. It also
//! guarantees the `[DONE]` sentinel is written exactly once.
//!
//! One deduplicator belongs to one response stream and is dropped with it.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

/* --- constants ------------------------------------------------------------------------------- */

/** SSE data payload that terminates an OpenAI-style stream */
pub const DONE_SENTINEL: &str = "[DONE]";

/* --- types ----------------------------------------------------------------------------------- */

///
/// Whether the stream has already emitted its finish reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /** no finish reason seen yet */
    Open,
    /** a finish reason was emitted, later ones are suppressed */
    Closed,
}

///
/// Per-stream finish-reason state machine.
#[derive(Debug)]
pub struct FinishDeduplicator {
    /** current phase */
    phase: StreamPhase,
    /** finish reason that closed the stream */
    finish_reason: Option<String>,
    /** whether `[DONE]` has been handed out */
    done_sent: bool,
    /** chunks dropped or rewritten after closing */
    suppressed: usize,
    /** when false every chunk passes unchanged, only `[DONE]` is deduplicated */
    dedupe: bool,
}

/* --- start of code -------------------------------------------------------------------------- */

impl Default for FinishDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl FinishDeduplicator {
    /// Create a deduplicator for a new stream
    pub fn new() -> Self {
        Self {
            phase: StreamPhase::Open,
            finish_reason: None,
            done_sent: false,
            suppressed: 0,
            dedupe: true,
        }
    }

    /// Create a deduplicator that forwards every chunk as is and only
    /// guards the `[DONE]` sentinel
    pub fn passthrough() -> Self {
        Self { dedupe: false, ..Self::new() }
    }

    ///
    /// Observe one outgoing chunk.
    ///
    /// # Arguments
    ///  * `chunk` - parsed SSE data payload
    ///
    /// # Returns
    ///  * `Some(chunk)` to emit, possibly with its finish reason cleared to null
    ///  * `None` when the chunk carried nothing but a repeated finish reason
    pub fn observe(&mut self, mut chunk: Value) -> Option<Value> {
        if !self.dedupe {
            return Some(chunk);
        }
        let Some(object) = chunk.as_object_mut() else {
            return Some(chunk);
        };

        match self.phase {
            StreamPhase::Open => {
                if let Some(reason) = first_finish_reason(object) {
                    tracing::debug!("Stream finished with reason '{}'", reason);
                    self.finish_reason = Some(reason);
                    self.phase = StreamPhase::Closed;
                }
                Some(chunk)
            }
            StreamPhase::Closed => {
                if clear_finish_reasons(object) == 0 {
                    return Some(chunk);
                }

                self.suppressed += 1;
                if carries_payload(object) {
                    Some(chunk)
                } else {
                    tracing::debug!("Dropped chunk carrying only a repeated finish reason");
                    None
                }
            }
        }
    }

    ///
    /// Observe one raw SSE `data:` payload.
    ///
    /// The `[DONE]` sentinel is swallowed here; the caller emits it through
    /// [`FinishDeduplicator::done`] when the upstream stream ends. Payloads
    /// that are not JSON are forwarded untouched.
    ///
    /// # Arguments
    ///  * `data` - text after `data:` on one SSE line
    ///
    /// # Returns
    ///  * payload to emit, if any
    pub fn observe_data(&mut self, data: &str) -> Option<String> {
        let trimmed = data.trim();
        if trimmed == DONE_SENTINEL {
            return None;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(chunk) if self.dedupe => {
                let before = self.suppressed;
                let emitted = self.observe(chunk)?;
                // Untouched chunks keep their exact upstream bytes
                if self.suppressed == before {
                    Some(data.to_string())
                } else {
                    Some(emitted.to_string())
                }
            }
            _ => Some(data.to_string()),
        }
    }

    ///
    /// Hand out the stream terminator.
    ///
    /// # Returns
    ///  * `Some("[DONE]")` on the first call, `None` afterwards
    pub fn done(&mut self) -> Option<&'static str> {
        if self.done_sent {
            return None;
        }
        self.done_sent = true;
        Some(DONE_SENTINEL)
    }

    /// Current phase
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Finish reason that closed the stream, if any
    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Number of chunks dropped or rewritten because of a repeated finish reason
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

/* --- chunk inspection ------------------------------------------------------------------------ */

fn choices_mut(chunk: &mut Map<String, Value>) -> impl Iterator<Item = &mut Map<String, Value>> {
    chunk
        .get_mut("choices")
        .and_then(Value::as_array_mut)
        .into_iter()
        .flat_map(|choices| choices.iter_mut().filter_map(Value::as_object_mut))
}

fn choices(chunk: &Map<String, Value>) -> impl Iterator<Item = &Map<String, Value>> {
    chunk
        .get("choices")
        .and_then(Value::as_array)
        .into_iter()
        .flat_map(|choices| choices.iter().filter_map(Value::as_object))
}

fn finish_reason_of(map: &Map<String, Value>) -> Option<&Value> {
    map.get("finish_reason").filter(|reason| !reason.is_null())
}

/// First non-null finish reason, per-choice reasons before a top-level one
fn first_finish_reason(chunk: &Map<String, Value>) -> Option<String> {
    choices(chunk)
        .find_map(finish_reason_of)
        .or_else(|| finish_reason_of(chunk))
        .map(|reason| match reason {
            Value::String(reason) => reason.clone(),
            other => other.to_string(),
        })
}

/// Null every finish reason, returning how many were cleared
fn clear_finish_reasons(chunk: &mut Map<String, Value>) -> usize {
    let mut cleared = 0;
    for choice in choices_mut(chunk) {
        if let Some(reason) = choice.get_mut("finish_reason").filter(|r| !r.is_null()) {
            *reason = Value::Null;
            cleared += 1;
        }
    }
    if let Some(reason) = chunk.get_mut("finish_reason").filter(|r| !r.is_null()) {
        *reason = Value::Null;
        cleared += 1;
    }
    cleared
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Whether a delta (or message) carries anything beyond its role
fn delta_has_payload(delta: &Value) -> bool {
    match delta {
        Value::Object(map) => map.iter().any(|(key, value)| key != "role" && !is_blank(value)),
        other => !is_blank(other),
    }
}

/// Whether a chunk is worth emitting once its finish reason is cleared
fn carries_payload(chunk: &Map<String, Value>) -> bool {
    let top_level = ["usage", "tool_calls", "content"]
        .iter()
        .any(|key| chunk.get(*key).is_some_and(|value| !is_blank(value)));

    top_level
        || choices(chunk).any(|choice| {
            ["delta", "message"].iter().any(|key| choice.get(*key).is_some_and(delta_has_payload))
                || ["text", "logprobs"]
                    .iter()
                    .any(|key| choice.get(*key).is_some_and(|value| !is_blank(value)))
        })
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn finish_chunk(reason: &str) -> Value {
        json!({"id": "c", "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
    }

    #[test]
    fn test_first_finish_passes_unchanged() {
        let mut dedup = FinishDeduplicator::new();
        let chunk = finish_chunk("tool_calls");

        assert_eq!(dedup.observe(chunk.clone()), Some(chunk));
        assert_eq!(dedup.phase(), StreamPhase::Closed);
        assert_eq!(dedup.finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_repeated_bare_finish_is_dropped() {
        let mut dedup = FinishDeduplicator::new();
        dedup.observe(finish_chunk("tool_calls"));

        assert_eq!(dedup.observe(finish_chunk("stop")), None);
        assert_eq!(dedup.finish_reason(), Some("tool_calls"));
        assert_eq!(dedup.suppressed(), 1);
    }

    #[test]
    fn test_repeated_finish_with_usage_is_cleared() {
        let mut dedup = FinishDeduplicator::new();
        dedup.observe(finish_chunk("stop"));

        let chunk = json!({
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5}
        });
        let emitted = dedup.observe(chunk).expect("usage chunk must be kept");
        assert_eq!(emitted["choices"][0]["finish_reason"], Value::Null);
        assert_eq!(emitted["usage"]["completion_tokens"], 5);
    }

    #[test]
    fn test_repeated_finish_with_content_is_cleared() {
        let mut dedup = FinishDeduplicator::new();
        dedup.observe(finish_chunk("length"));

        let chunk = json!({"choices": [{"delta": {"content": "tail"}, "finish_reason": "stop"}]});
        let emitted = dedup.observe(chunk).unwrap();
        assert_eq!(emitted["choices"][0]["finish_reason"], Value::Null);
        assert_eq!(emitted["choices"][0]["delta"]["content"], "tail");
    }

    #[test]
    fn test_top_level_finish_reason() {
        let mut dedup = FinishDeduplicator::new();
        assert!(dedup.observe(json!({"finish_reason": "tool_calls", "tool_calls": [{"id": "a"}]})).is_some());
        assert_eq!(dedup.observe(json!({"finish_reason": "stop"})), None);
        assert_eq!(dedup.finish_reason(), Some("tool_calls"));
    }

    #[test]
    fn test_chunks_without_finish_pass_in_both_phases() {
        let mut dedup = FinishDeduplicator::new();
        let content = json!({"choices": [{"delta": {"content": "x"}, "finish_reason": null}]});

        assert_eq!(dedup.observe(content.clone()), Some(content.clone()));
        dedup.observe(finish_chunk("stop"));
        assert_eq!(dedup.observe(content.clone()), Some(content));
        assert_eq!(dedup.suppressed(), 0);
    }

    #[test]
    fn test_non_object_chunks_pass() {
        let mut dedup = FinishDeduplicator::new();
        assert_eq!(dedup.observe(json!([1, 2])), Some(json!([1, 2])));
    }

    #[test]
    fn test_done_is_emitted_once() {
        let mut dedup = FinishDeduplicator::new();
        assert_eq!(dedup.done(), Some(DONE_SENTINEL));
        assert_eq!(dedup.done(), None);
        assert_eq!(dedup.done(), None);
    }

    #[test]
    fn test_observe_data_swallows_done_and_keeps_raw_text() {
        let mut dedup = FinishDeduplicator::new();
        let raw = r#"{"choices":[{"delta":{"content":"hi"},  "finish_reason":null}]}"#;

        assert_eq!(dedup.observe_data(" [DONE] "), None);
        assert_eq!(dedup.observe_data(raw).as_deref(), Some(raw));
        assert_eq!(dedup.observe_data("keep-alive").as_deref(), Some("keep-alive"));

        dedup.observe_data(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(dedup.observe_data(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#), None);
    }

    #[test]
    fn test_passthrough_keeps_every_finish() {
        let mut dedup = FinishDeduplicator::passthrough();
        dedup.observe(finish_chunk("tool_calls"));
        assert_eq!(dedup.observe(finish_chunk("stop")), Some(finish_chunk("stop")));
        assert_eq!(dedup.phase(), StreamPhase::Open);
        assert_eq!(dedup.done(), Some(DONE_SENTINEL));
    }
}
