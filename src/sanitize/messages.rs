//!
//! Per-message cleanup: cache annotations and empty assistant turns.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

use super::content::{Content, flatten};

/* --- constants ------------------------------------------------------------------------------- */

/** Content used where the backend needs a non-empty string but there is no text */
pub const PLACEHOLDER_CONTENT: &str = " ";

/* --- start of code -------------------------------------------------------------------------- */

///
/// Mutable access to the `messages` array of a request, if it is one.
pub fn messages_mut(doc: &mut Map<String, Value>) -> Option<&mut Vec<Value>> {
    doc.get_mut("messages").and_then(Value::as_array_mut)
}

/// Role of a message object (`""` when missing)
pub fn role(message: &Map<String, Value>) -> &str {
    message.get("role").and_then(Value::as_str).unwrap_or("")
}

///
/// Remove `cache_control` and `name` from every message, plus `cache_control`
/// on content segments and on items nested one level inside a segment's own
/// `content` array.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of keys deleted
pub fn strip_message_annotations(doc: &mut Map<String, Value>) -> usize {
    let Some(messages) = messages_mut(doc) else {
        return 0;
    };

    let mut removed = 0;
    for message in messages.iter_mut().filter_map(Value::as_object_mut) {
        removed += remove_keys(message, &["cache_control", "name"]);

        let Some(segments) = message.get_mut("content").and_then(Value::as_array_mut) else {
            continue;
        };
        for segment in segments.iter_mut().filter_map(Value::as_object_mut) {
            removed += remove_keys(segment, &["cache_control"]);

            if let Some(inner) = segment.get_mut("content").and_then(Value::as_array_mut) {
                for item in inner.iter_mut().filter_map(Value::as_object_mut) {
                    removed += remove_keys(item, &["cache_control"]);
                }
            }
        }
    }
    removed
}

///
/// Collapse array content made of text segments into a single string.
///
/// Arrays without any non-empty text segment (images only, say) are kept.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of flattened messages
pub fn flatten_messages(doc: &mut Map<String, Value>) -> usize {
    let Some(messages) = messages_mut(doc) else {
        return 0;
    };

    let mut flattened = 0;
    for message in messages.iter_mut().filter_map(Value::as_object_mut) {
        let Content::Segments(segments) = Content::of_message(message) else {
            continue;
        };
        if let Some(text) = flatten(segments) {
            message.insert("content".to_string(), Value::String(text));
            flattened += 1;
        }
    }
    flattened
}

///
/// Repair assistant messages whose content is empty.
///
/// Messages that still carry `tool_calls` get placeholder content, the rest
/// are removed from the conversation.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of messages repaired or removed
pub fn repair_empty_assistant_messages(doc: &mut Map<String, Value>) -> usize {
    let Some(messages) = messages_mut(doc) else {
        return 0;
    };

    let mut fixed = 0;
    messages.retain_mut(|message| {
        let Some(message) = message.as_object_mut() else {
            return true;
        };
        if role(message) != "assistant" || !Content::of_message(message).is_empty() {
            return true;
        }

        fixed += 1;
        if has_tool_calls(message) {
            message.insert("content".to_string(), Value::from(PLACEHOLDER_CONTENT));
            true
        } else {
            false
        }
    });
    fixed
}

/// `tool_calls` present and not null
fn has_tool_calls(message: &Map<String, Value>) -> bool {
    !matches!(message.get("tool_calls"), None | Some(Value::Null))
}

fn remove_keys(map: &mut Map<String, Value>, keys: &[&str]) -> usize {
    keys.iter().filter(|key| map.shift_remove(**key).is_some()).count()
}

/* --- tests ----------------------------------------------------------------------------------- */
