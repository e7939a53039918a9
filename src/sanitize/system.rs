//!
//! Top-level `system` instruction handling.
//!
//! Some reasoning ("thinking") backends ignore a separate system field, so for
//! those models the instruction is folded into the first user turn. Whatever
//! remains of an array-valued `system` afterwards loses its cache annotations.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

use super::content::{Content, segment_type, text_segments};
use super::messages::{messages_mut, role};

/* --- constants ------------------------------------------------------------------------------- */

/** Model name fragment that enables relocation */
const THINKING_MARKER: &str = "thinking";

/* --- start of code -------------------------------------------------------------------------- */

///
/// Whether the request targets a model that needs the system field relocated.
pub fn needs_relocation(doc: &Map<String, Value>) -> bool {
    doc.get("model")
        .and_then(Value::as_str)
        .is_some_and(|model| model.to_lowercase().contains(THINKING_MARKER))
}

///
/// Move `system` into the first user message.
///
/// The instruction is wrapped in `<system>` tags and prepended to the user's
/// text. Empty instructions, requests without a user turn, and user turns
/// whose content is neither a string nor an array simply lose the field.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * true when `system` was removed (relocated or dropped)
pub fn relocate_system(doc: &mut Map<String, Value>) -> bool {
    let Some(system) = doc.shift_remove("system") else {
        return false;
    };

    let text = system_text(&system);
    if text.is_empty() {
        return true;
    }

    let Some(messages) = messages_mut(doc) else {
        return true;
    };
    let first_user = messages
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|message| role(message) == "user");

    if let Some(message) = first_user {
        let base: String = match Content::of_message(message) {
            Content::Text(text) => text.to_string(),
            Content::Segments(segments) => text_segments(segments).collect(),
            Content::Absent | Content::Object(_) | Content::Other => return true,
        };
        let merged = format!("<system>\n{}\n</system>\n\n{}", text, base);
        message.insert("content".to_string(), Value::String(merged));
    }

    true
}

///
/// Delete `cache_control` from each item of an array-valued `system`.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of keys deleted
pub fn strip_system_annotations(doc: &mut Map<String, Value>) -> usize {
    let Some(segments) = doc.get_mut("system").and_then(Value::as_array_mut) else {
        return 0;
    };

    segments
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .filter_map(|segment| segment.shift_remove("cache_control"))
        .count()
}

///
/// Plain text of a `system` value.
///
/// Arrays may mix `type:"text"` segments and bare strings; both contribute,
/// joined with a newline.
fn system_text(system: &Value) -> String {
    match system {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.as_str()),
                Value::Object(_) if segment_type(item) == "text" => {
                    item.get("text").and_then(Value::as_str)
                }
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

/* --- tests ----------------------------------------------------------------------------------- */
