//!
//! Views over heterogeneous message content.
//!
//! Message content arrives as a plain string, an array of typed segments or
//! (for tool results) a bare object. `Content` borrows one of those shapes so
//! every stage can `match` on it instead of probing JSON types ad hoc.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

/* --- types ----------------------------------------------------------------------------------- */

///
/// Borrowed view of a `content` value.
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    /** field missing or explicitly null */
    Absent,
    /** plain string content */
    Text(&'a str),
    /** ordered array of typed segments */
    Segments(&'a [Value]),
    /** single object, e.g. a tool result payload */
    Object(&'a Map<String, Value>),
    /** number or boolean, never produced by well-behaved clients */
    Other,
}

/* --- start of code -------------------------------------------------------------------------- */

impl<'a> Content<'a> {
    ///
    /// Classify an optional content value.
    ///
    /// # Arguments
    ///  * `value` - the `content` field, if present
    ///
    /// # Returns
    ///  * view over the value
    pub fn of(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Content::Absent,
            Some(Value::String(s)) => Content::Text(s),
            Some(Value::Array(items)) => Content::Segments(items),
            Some(Value::Object(map)) => Content::Object(map),
            Some(_) => Content::Other,
        }
    }

    /// Content of a message object
    pub fn of_message(message: &'a Map<String, Value>) -> Self {
        Self::of(message.get("content"))
    }

    /// Absent, null or the empty string
    pub fn is_empty(&self) -> bool {
        matches!(self, Content::Absent | Content::Text(""))
    }
}

///
/// Type tag of a content segment (`""` when missing or not a string).
pub fn segment_type(segment: &Value) -> &str {
    segment.get("type").and_then(Value::as_str).unwrap_or("")
}

///
/// Non-empty `text` values of the `type:"text"` segments, in order.
///
/// # Arguments
///  * `segments` - content segments
///
/// # Returns
///  * iterator over the text of each text segment with non-empty text
pub fn text_segments(segments: &[Value]) -> impl Iterator<Item = &str> {
    segments
        .iter()
        .filter(|segment| segment_type(segment) == "text")
        .filter_map(|segment| segment.get("text").and_then(Value::as_str))
        .filter(|text| !text.is_empty())
}

///
/// Extract plain text from any content shape.
///
/// Strings are returned as is, segment arrays yield their text segments
/// joined with a newline, objects yield their `text` field. Anything else
/// extracts to the empty string.
///
/// # Arguments
///  * `content` - content view
///
/// # Returns
///  * extracted text
pub fn extract_text(content: Content<'_>) -> String {
    match content {
        Content::Text(text) => text.to_string(),
        Content::Segments(segments) => text_segments(segments).collect::<Vec<_>>().join("\n"),
        Content::Object(map) => match map.get("text") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Content::Absent | Content::Other => String::new(),
    }
}

///
/// Concatenate the text segments of an array with no separator.
///
/// # Returns
///  * `Some(text)` when at least one non-empty text segment exists
///  * `None` otherwise, the content should be left untouched
pub fn flatten(segments: &[Value]) -> Option<String> {
    let mut parts = text_segments(segments).peekable();
    parts.peek()?;
    Some(parts.collect())
}

/* --- tests ----------------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification() {
        assert!(matches!(Content::of(None), Content::Absent));
        assert!(matches!(Content::of(Some(&Value::Null)), Content::Absent));
        assert!(matches!(Content::of(Some(&json!("hi"))), Content::Text("hi")));
        assert!(matches!(Content::of(Some(&json!([]))), Content::Segments(_)));
        assert!(matches!(Content::of(Some(&json!({"text": "x"}))), Content::Object(_)));
        assert!(matches!(Content::of(Some(&json!(4))), Content::Other));
    }

    #[test]
    fn test_emptiness() {
        assert!(Content::of(None).is_empty());
        assert!(Content::of(Some(&json!(""))).is_empty());
        assert!(!Content::of(Some(&json!(" "))).is_empty());
        assert!(!Content::of(Some(&json!([]))).is_empty());
    }

    #[test]
    fn test_extract_text_shapes() {
        let segments = json!([
            {"type": "text", "text": "a"},
            {"type": "image", "source": {}},
            {"type": "text", "text": ""},
            {"type": "text", "text": "b"}
        ]);
        assert_eq!(extract_text(Content::of(Some(&segments))), "a\nb");
        assert_eq!(extract_text(Content::of(Some(&json!("raw")))), "raw");
        assert_eq!(extract_text(Content::of(Some(&json!({"text": "obj"})))), "obj");
        assert_eq!(extract_text(Content::of(Some(&json!({"data": 1})))), "");
        assert_eq!(extract_text(Content::of(Some(&json!(true)))), "");
        assert_eq!(extract_text(Content::Absent), "");
    }

    #[test]
    fn test_flatten_joins_without_separator() {
        let segments = json!([{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]);
        assert_eq!(flatten(segments.as_array().unwrap()).as_deref(), Some("ab"));

        let images = json!([{"type": "image_url", "image_url": {"url": "x"}}]);
        assert_eq!(flatten(images.as_array().unwrap()), None);
        assert_eq!(flatten(&[]), None);
    }
}
