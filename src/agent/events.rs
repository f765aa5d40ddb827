//! Events emitted by the streaming agent variant.

use serde::Serialize;
use serde_json::Value;

/// One element of the ordered event stream for a chat turn.
///
/// Ordering guarantee per iteration: every `token` precedes any
/// `tool_call`, which precedes its `tool_result`; the final `done`
/// follows everything.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Status {
        stage: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        iteration: Option<usize>,
    },
    Token {
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        id: String,
        name: String,
        success: bool,
        /// Possibly truncated for transport; the full output still goes
        /// back to the LLM.
        output: String,
    },
    Done {
        message: String,
        tool_calls_count: usize,
        iterations: usize,
    },
    Error {
        message: String,
        kind: String,
    },
}
