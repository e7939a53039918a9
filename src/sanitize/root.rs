//!
//! Top-level request fields: unsupported keys and tool choice.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

/* --- constants ------------------------------------------------------------------------------- */

/** Top-level keys the backend rejects */
pub const UNSUPPORTED_ROOT_FIELDS: [&str; 9] = [
    "cache_control",
    "citations",
    "container",
    "metadata",
    "service_tier",
    "logprobs",
    "top_logprobs",
    "logit_bias",
    "parallel_tool_calls",
];

/** String tool-choice values the backend does not understand */
const UNSUPPORTED_TOOL_CHOICE_VALUES: [&str; 2] = ["required", "validated"];

/* --- start of code -------------------------------------------------------------------------- */

///
/// Delete every unsupported top-level key.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of keys deleted
pub fn strip_root_fields(doc: &mut Map<String, Value>) -> usize {
    UNSUPPORTED_ROOT_FIELDS.iter().filter(|field| doc.shift_remove(**field).is_some()).count()
}

///
/// Map `tool_choice` onto the backend vocabulary.
///
/// Unsupported strings and "let the model decide" objects become `"auto"`.
/// Forced choices (`function` / `tool` objects) are dropped, the backend
/// then picks tools on its own.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * 1 when the field was rewritten or deleted, 0 otherwise
pub fn normalize_tool_choice(doc: &mut Map<String, Value>) -> usize {
    let action = match doc.get("tool_choice") {
        Some(Value::String(value)) if UNSUPPORTED_TOOL_CHOICE_VALUES.contains(&value.as_str()) => {
            ChoiceAction::Auto
        }
        Some(Value::Object(map)) => match map.get("type").and_then(Value::as_str).unwrap_or("") {
            "" | "auto" | "any" => ChoiceAction::Auto,
            "function" | "tool" => ChoiceAction::Drop,
            _ => ChoiceAction::Keep,
        },
        _ => ChoiceAction::Keep,
    };

    match action {
        ChoiceAction::Auto => {
            doc.insert("tool_choice".to_string(), Value::from("auto"));
            1
        }
        ChoiceAction::Drop => {
            doc.shift_remove("tool_choice");
            1
        }
        ChoiceAction::Keep => 0,
    }
}

enum ChoiceAction {
    Auto,
    Drop,
    Keep,
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_strip_root_fields_counts_present_keys() {
        let mut doc = object(json!({
            "model": "m",
            "metadata": {"user": "u"},
            "service_tier": "auto",
            "parallel_tool_calls": false,
            "stream": true
        }));

        assert_eq!(strip_root_fields(&mut doc), 3);
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["model", "stream"]);
        assert_eq!(strip_root_fields(&mut doc), 0);
    }

    #[test]
    fn test_tool_choice_strings() {
        let mut doc = object(json!({"tool_choice": "required"}));
        assert_eq!(normalize_tool_choice(&mut doc), 1);
        assert_eq!(doc["tool_choice"], "auto");

        let mut doc = object(json!({"tool_choice": "validated"}));
        assert_eq!(normalize_tool_choice(&mut doc), 1);
        assert_eq!(doc["tool_choice"], "auto");

        let mut doc = object(json!({"tool_choice": "none"}));
        assert_eq!(normalize_tool_choice(&mut doc), 0);
        assert_eq!(doc["tool_choice"], "none");
    }

    #[test]
    fn test_tool_choice_objects() {
        for choice in [json!({"type": "auto"}), json!({"type": "any"}), json!({})] {
            let mut doc = object(json!({"tool_choice": choice}));
            assert_eq!(normalize_tool_choice(&mut doc), 1);
            assert_eq!(doc["tool_choice"], "auto");
        }

        let mut doc = object(json!({"tool_choice": {"type": "tool", "name": "write"}}));
        assert_eq!(normalize_tool_choice(&mut doc), 1);
        assert!(!doc.contains_key("tool_choice"));

        let mut doc =
            object(json!({"tool_choice": {"type": "function", "function": {"name": "w"}}}));
        assert_eq!(normalize_tool_choice(&mut doc), 1);
        assert!(!doc.contains_key("tool_choice"));

        let mut doc = object(json!({"tool_choice": {"type": "none"}}));
        assert_eq!(normalize_tool_choice(&mut doc), 0);
    }

    #[test]
    fn test_missing_tool_choice_is_noop() {
        let mut doc = object(json!({"model": "m"}));
        assert_eq!(normalize_tool_choice(&mut doc), 0);
        assert_eq!(doc.len(), 1);
    }
}
