//!
//! Anthropic-style tool blocks to OpenAI-style tool calls.
//!
//! Assistant turns carrying `tool_use` segments become string content plus a
//! `tool_calls` array. User turns carrying a `tool_result` segment become
//! `role:"tool"` messages answering the matching call.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value, json};

use super::content::{Content, extract_text, segment_type};
use super::messages::{PLACEHOLDER_CONTENT, messages_mut, role};

/* --- constants ------------------------------------------------------------------------------- */

/** Tool result content used when the result carried no text */
const EMPTY_TOOL_RESULT: &str = "{}";

/* --- start of code -------------------------------------------------------------------------- */

///
/// Rewrite every assistant message whose content holds `tool_use` segments.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of converted messages
pub fn convert_tool_use(doc: &mut Map<String, Value>) -> usize {
    let Some(messages) = messages_mut(doc) else {
        return 0;
    };

    let mut converted = 0;
    for message in messages.iter_mut().filter_map(Value::as_object_mut) {
        if role(message) != "assistant" {
            continue;
        }
        let Content::Segments(segments) = Content::of_message(message) else {
            continue;
        };

        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();
        for segment in segments {
            match segment_type(segment) {
                "text" => {
                    if let Some(text) = segment.get("text").and_then(Value::as_str) {
                        if !text.is_empty() {
                            texts.push(text);
                        }
                    }
                }
                "tool_use" => tool_calls.push(tool_call_from(segment)),
                _ => {}
            }
        }

        if tool_calls.is_empty() {
            continue;
        }

        let text = texts.join("\n");
        let content = if text.is_empty() { PLACEHOLDER_CONTENT.to_string() } else { text };
        message.insert("content".to_string(), Value::String(content));
        message.insert("tool_calls".to_string(), Value::Array(tool_calls));
        converted += 1;
    }
    converted
}

///
/// Rewrite every user message whose content holds a `tool_result` segment.
///
/// Only the first tool result of a message is kept; further results in the
/// same message are dropped with the rest of the array content.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of converted messages
pub fn convert_tool_result(doc: &mut Map<String, Value>) -> usize {
    let Some(messages) = messages_mut(doc) else {
        return 0;
    };

    let mut converted = 0;
    for message in messages.iter_mut().filter_map(Value::as_object_mut) {
        if role(message) != "user" {
            continue;
        }
        let Content::Segments(segments) = Content::of_message(message) else {
            continue;
        };
        let Some(result) = segments.iter().find(|s| segment_type(s) == "tool_result") else {
            continue;
        };

        let tool_use_id = string_field(result, "tool_use_id");
        let mut text = extract_text(Content::of(result.get("content")));
        if text.is_empty() {
            text = EMPTY_TOOL_RESULT.to_string();
        }

        message.insert("role".to_string(), Value::from("tool"));
        message.insert("tool_call_id".to_string(), Value::String(tool_use_id));
        message.insert("content".to_string(), Value::String(text));
        converted += 1;
    }
    converted
}

///
/// Build one OpenAI tool call from a `tool_use` segment.
///
/// A missing `input` is sent as an empty argument object.
fn tool_call_from(segment: &Value) -> Value {
    let arguments = match segment.get("input") {
        None | Some(Value::Null) => EMPTY_TOOL_RESULT.to_string(),
        Some(input) => input.to_string(),
    };

    json!({
        "id": string_field(segment, "id"),
        "type": "function",
        "function": {
            "name": string_field(segment, "name"),
            "arguments": arguments,
        }
    })
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
