//!
//! Request sanitizing pipeline.
//!
//! Clients on the same endpoints speak two chat dialects (OpenAI-style and
//! Anthropic-style). The backend accepts only the OpenAI-compatible one, so
//! every request body is parsed once, rewritten in a fixed order of stages and
//! serialized once. The pipeline is fail-open: bodies that are not a JSON
//! object, or that need no change, are forwarded byte-for-byte.
//!
//! Stages, in order:
//! - `root` - unsupported top-level fields and `tool_choice`
//! - `messages` - cache annotations and `name`
//! - `schema` - tool definitions and JSON-Schema keywords
//! - `tool_calls` - `tool_use` / `tool_result` conversion
//! - `messages` - flattening and empty assistant repair
//! - `system` - relocation for thinking models and annotation cleanup
//!
//! Authors:
//!   Jaro <yarenty@gmail.com>
//!
//! Copyright (c) 2026 SkyCorp

/* --- modules --------------------------------------------------------------------------------- */

pub mod content;
pub mod messages;
pub mod root;
pub mod schema;
pub mod system;
pub mod tool_calls;

/* --- uses ------------------------------------------------------------------------------------ */

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::config::LogLevel;

/* --- constants ------------------------------------------------------------------------------- */

/** Path fragments of endpoints whose bodies are chat requests */
const SANITIZED_PATH_FRAGMENTS: [&str; 4] =
    ["/chat/completions", "/completions", "/responses", "/messages"];

/* --- types ----------------------------------------------------------------------------------- */

///
/// Aggregate change statistics of one sanitized request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    /** deleted or rewritten fields, converted and repaired messages */
    pub total_removed: usize,
    /** messages whose segment array was collapsed to a string */
    pub flattened_messages: usize,
    /** whether the `system` field was relocated or dropped */
    pub merged_system: bool,
}

///
/// Rewrites chat request bodies into the backend dialect.
///
/// Stateless apart from the log level; one instance is shared by all requests.
#[derive(Debug, Clone, Copy)]
pub struct RequestSanitizer {
    /** logging level for debug output */
    log_level: LogLevel,
}

/* --- start of code -------------------------------------------------------------------------- */

impl SanitizeStats {
    /// Whether any stage changed the document
    pub fn is_modified(&self) -> bool {
        self.total_removed > 0 || self.flattened_messages > 0 || self.merged_system
    }
}

impl RequestSanitizer {
    ///
    /// Create a new sanitizer.
    ///
    /// # Arguments
    ///  * `log_level` - logging level for debug output
    pub fn new(log_level: LogLevel) -> Self {
        Self { log_level }
    }

    ///
    /// Sanitize one raw request body.
    ///
    /// # Arguments
    ///  * `body` - request body as received
    ///
    /// # Returns
    ///  * the rewritten body, or `body` itself when it is not a JSON object or
    ///    nothing had to change
    ///  * change statistics (all zero when `body` is returned unchanged)
    pub fn sanitize(&self, body: Bytes) -> (Bytes, SanitizeStats) {
        if body.is_empty() {
            return (body, SanitizeStats::default());
        }

        let mut doc = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(doc)) => doc,
            Ok(_) => {
                self.debug("Request body is not a JSON object, forwarding unchanged");
                return (body, SanitizeStats::default());
            }
            Err(e) => {
                self.debug(&format!("Request body is not valid JSON ({}), forwarding unchanged", e));
                return (body, SanitizeStats::default());
            }
        };

        let stats = self.sanitize_document(&mut doc);
        if !stats.is_modified() {
            return (body, stats);
        }

        match serde_json::to_vec(&Value::Object(doc)) {
            Ok(rewritten) => (Bytes::from(rewritten), stats),
            Err(e) => {
                tracing::warn!("Failed to serialize sanitized request, forwarding original: {}", e);
                (body, SanitizeStats::default())
            }
        }
    }

    ///
    /// Run every stage over a parsed request document.
    ///
    /// # Arguments
    ///  * `doc` - request document root, mutated in place
    ///
    /// # Returns
    ///  * aggregate change statistics
    pub fn sanitize_document(&self, doc: &mut Map<String, Value>) -> SanitizeStats {
        let mut stats = SanitizeStats::default();

        stats.total_removed += self.stage("root_fields", root::strip_root_fields(doc));
        stats.total_removed += self.stage("tool_choice", root::normalize_tool_choice(doc));
        stats.total_removed +=
            self.stage("message_annotations", messages::strip_message_annotations(doc));
        stats.total_removed += self.stage("tool_schemas", schema::sanitize_tools(doc));
        stats.total_removed += self.stage("tool_use", tool_calls::convert_tool_use(doc));
        stats.total_removed += self.stage("tool_result", tool_calls::convert_tool_result(doc));
        stats.flattened_messages = self.stage("flatten", messages::flatten_messages(doc));
        stats.total_removed +=
            self.stage("empty_assistant", messages::repair_empty_assistant_messages(doc));

        if system::needs_relocation(doc) && system::relocate_system(doc) {
            self.debug("Relocated system instruction into first user message");
            stats.merged_system = true;
            stats.total_removed += 1;
        }

        stats.total_removed +=
            self.stage("system_annotations", system::strip_system_annotations(doc));

        stats
    }

    /// Trace a stage result and pass its count through
    fn stage(&self, name: &str, count: usize) -> usize {
        if count > 0 {
            self.debug(&format!("Stage {} changed {} item(s)", name, count));
        }
        count
    }

    ///
    /// Log debug message if trace logging is enabled.
    ///
    /// # Arguments
    ///  * `msg` - debug message to log
    pub(crate) fn debug(&self, msg: &str) {
        if self.log_level.is_trace_enabled() {
            tracing::debug!("[TRACE] {}", msg);
        }
    }
}

///
/// Whether a request path carries a chat request body.
///
/// # Arguments
///  * `path` - request URI path
pub fn should_sanitize_path(path: &str) -> bool {
    SANITIZED_PATH_FRAGMENTS.iter().any(|fragment| path.contains(fragment))
}

/* --- tests ----------------------------------------------------------------------------------- */
