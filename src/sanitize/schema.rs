//!
//! Tool definition cleanup and JSON-Schema keyword pruning.
//!
//! The backend accepts a small JSON-Schema subset. Unsupported keywords are
//! removed from tool parameter schemas recursively through `properties` and
//! object-valued `items`; everything else in the schema is left as sent.
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- uses ------------------------------------------------------------------------------------ */

use serde_json::{Map, Value};

/* --- constants ------------------------------------------------------------------------------- */

/** Schema keywords the backend rejects */
pub const UNSUPPORTED_SCHEMA_KEYWORDS: [&str; 30] = [
    "additionalProperties",
    "$schema",
    "pattern",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "minItems",
    "maxItems",
    "minLength",
    "maxLength",
    "default",
    "format",
    "examples",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "dependentSchemas",
    "dependentRequired",
    "propertyNames",
    "unevaluatedProperties",
    "unevaluatedItems",
    "contentMediaType",
    "contentEncoding",
];

/** Schema-bearing keys of an OpenAI-style `function` wrapper */
const FUNCTION_SCHEMA_KEYS: [&str; 2] = ["parameters", "input_schema"];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Dialect of a single tool definition.
enum ToolShape<'a> {
    /** `{type:"function", function:{name, parameters, strict?}}` */
    OpenAi(&'a mut Map<String, Value>),
    /** `{name, input_schema}` */
    Anthropic(&'a mut Map<String, Value>),
    /** anything else, left alone */
    Unknown,
}

/* --- start of code -------------------------------------------------------------------------- */

impl<'a> ToolShape<'a> {
    fn of(tool: &'a mut Value) -> Self {
        let Some(tool) = tool.as_object_mut() else {
            return ToolShape::Unknown;
        };

        if tool.contains_key("function") {
            return match tool.get_mut("function") {
                Some(Value::Object(function)) => ToolShape::OpenAi(function),
                _ => ToolShape::Unknown,
            };
        }

        if tool.contains_key("input_schema") {
            ToolShape::Anthropic(tool)
        } else {
            ToolShape::Unknown
        }
    }
}

///
/// Prune every tool definition in the request.
///
/// # Arguments
///  * `doc` - request document root
///
/// # Returns
///  * number of keys deleted, including `function.strict`
pub fn sanitize_tools(doc: &mut Map<String, Value>) -> usize {
    let Some(tools) = doc.get_mut("tools").and_then(Value::as_array_mut) else {
        return 0;
    };

    tools
        .iter_mut()
        .map(|tool| match ToolShape::of(tool) {
            ToolShape::OpenAi(function) => {
                let mut removed = usize::from(function.shift_remove("strict").is_some());
                for key in FUNCTION_SCHEMA_KEYS {
                    if let Some(schema) = function.get_mut(key) {
                        removed += prune_schema(schema);
                    }
                }
                removed
            }
            ToolShape::Anthropic(tool) => tool.get_mut("input_schema").map_or(0, prune_schema),
            ToolShape::Unknown => 0,
        })
        .sum()
}

///
/// Remove unsupported keywords from a schema and its nested schemas.
///
/// Recurses into every value of `properties` and into `items` when it is a
/// single schema object. Tuple-style `items` arrays are not descended.
///
/// # Arguments
///  * `schema` - schema node, non-objects are ignored
///
/// # Returns
///  * number of keywords deleted
pub fn prune_schema(schema: &mut Value) -> usize {
    let Some(node) = schema.as_object_mut() else {
        return 0;
    };

    let mut removed =
        UNSUPPORTED_SCHEMA_KEYWORDS.iter().filter(|k| node.shift_remove(**k).is_some()).count();

    if let Some(Value::Object(properties)) = node.get_mut("properties") {
        removed += properties.values_mut().map(prune_schema).sum::<usize>();
    }

    if let Some(items) = node.get_mut("items").filter(|items| items.is_object()) {
        removed += prune_schema(items);
    }

    removed
}

/* --- tests ----------------------------------------------------------------------------------- */
