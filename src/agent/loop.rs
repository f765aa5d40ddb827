//! The agent loop: call the LLM, execute requested tools, feed results
//! back, repeat until the model answers in plain text or the iteration
//! cap is hit.

use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::agent::events::AgentEvent;
use crate::agent::prompts::SYSTEM_PROMPT;
use crate::agent::runner::CachedRunner;
use crate::cache::CacheManager;
use crate::config::{AgentConfig, OrchestratorConfig};
use crate::orchestrator::{Orchestrator, SandboxRunner, ToolRunner};
use crate::provider::{ChatDelta, LLMProvider, Message, ToolCallRequest, ToolDefinition};
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::session::MessageRecord;
use crate::tools::ToolRegistry;
use crate::utils::truncate_chars;

const MAX_TOKENS: u32 = 4096;
// Tool-calling turns run at zero temperature for determinism.
const TOOL_TEMPERATURE: f32 = 0.0;
const MAX_ITERATIONS_MESSAGE: &str =
    "I've reached the maximum number of operations. Here's what I found so far based on the tool results above.";
/// Tool output is truncated to this many characters on the event stream;
/// the LLM still receives the full (already size-capped) output.
const STREAM_OUTPUT_PREVIEW_CHARS: usize = 1000;

/// Result record paired with the call that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResultRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: ExecutionResult,
}

/// Final outcome of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub message: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_results: Vec<ToolResultRecord>,
}

/// Decode tool arguments as a JSON object; malformed text is wrapped
/// under a single `raw` field and left for the tool to reject.
fn parse_tool_arguments(raw: &str) -> Value {
    if raw.is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Value::Object(map),
        _ => json!({"raw": raw}),
    }
}

fn normalize_arguments(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        Value::Null => json!({}),
        Value::String(s) => parse_tool_arguments(&s),
        other => json!({"raw": other.to_string()}),
    }
}

fn record_to_message(record: &MessageRecord) -> Message {
    Message {
        role: record.role.clone(),
        content: record.content.clone(),
        tool_calls: record.tool_calls.clone(),
        tool_call_id: record.tool_call_id.clone(),
    }
}

/// Partially assembled tool call built up from stream deltas.
#[derive(Debug, Clone, Default)]
struct DraftToolCall {
    id: String,
    name: String,
    arguments: String,
}

pub struct Agent {
    provider: Arc<dyn LLMProvider>,
    registry: Arc<ToolRegistry>,
    orchestrator: Orchestrator,
    model: Option<String>,
    system_prompt: String,
    max_tool_iterations: usize,
    parallel_enabled: bool,
}

impl Agent {
    /// Wire an agent over a sandbox and registry. With a cache manager,
    /// `cat`/`head` route through the content cache and `grep`/`find`
    /// through the search cache; without one, everything goes straight
    /// to the sandbox.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        sandbox: Arc<SandboxExecutor>,
        registry: Arc<ToolRegistry>,
        caches: Option<Arc<CacheManager>>,
        agent_config: &AgentConfig,
        orchestrator_config: &OrchestratorConfig,
    ) -> Self {
        let runner: Arc<dyn ToolRunner> = match caches {
            Some(caches) => Arc::new(CachedRunner::new(
                sandbox.clone(),
                registry.clone(),
                caches,
            )),
            None => Arc::new(SandboxRunner::new(sandbox.clone(), registry.clone())),
        };

        Self {
            provider,
            registry,
            orchestrator: Orchestrator::new(runner, orchestrator_config.max_concurrent),
            model: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_tool_iterations: agent_config.max_tool_iterations,
            parallel_enabled: orchestrator_config.parallel_enabled,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    fn build_messages(&self, user_message: &str, history: &[MessageRecord]) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history.iter().map(record_to_message));
        messages.push(Message::user(user_message));
        messages
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry
            .list_all()
            .into_iter()
            .map(|tool| {
                let schema = tool.to_llm_schema();
                ToolDefinition {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: schema["function"]["parameters"].clone(),
                }
            })
            .collect()
    }

    async fn dispatch(
        &self,
        calls: &[ToolCallRequest],
    ) -> Vec<(ToolCallRequest, ExecutionResult)> {
        if self.parallel_enabled && calls.len() > 1 {
            info!("executing {} tools in parallel", calls.len());
            self.orchestrator.execute_with_strategy(calls).await
        } else {
            info!("executing {} tool(s) sequentially", calls.len());
            self.orchestrator.execute_sequential(calls).await
        }
    }

    /// Process a user message and return the final response.
    pub async fn chat(
        &self,
        user_message: &str,
        history: &[MessageRecord],
    ) -> Result<AgentResponse> {
        let mut messages = self.build_messages(user_message, history);
        let tool_defs = self.tool_definitions();

        let mut all_tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut all_tool_results: Vec<ToolResultRecord> = Vec::new();

        for iteration in 1..=self.max_tool_iterations {
            info!("agent iteration {}/{}", iteration, self.max_tool_iterations);

            let response = self
                .provider
                .chat_with_retry(
                    messages.clone(),
                    Some(tool_defs.clone()),
                    self.model.as_deref(),
                    MAX_TOKENS,
                    TOOL_TEMPERATURE,
                    None,
                )
                .await?;

            if !response.has_tool_calls() {
                return Ok(AgentResponse {
                    message: response.content.unwrap_or_default(),
                    tool_calls: all_tool_calls,
                    tool_results: all_tool_results,
                });
            }

            let tool_calls: Vec<ToolCallRequest> = response
                .tool_calls
                .into_iter()
                .map(|mut call| {
                    call.arguments = normalize_arguments(call.arguments);
                    call
                })
                .collect();
            all_tool_calls.extend(tool_calls.iter().cloned());

            messages.push(Message::assistant(
                response.content.unwrap_or_default(),
                Some(tool_calls.clone()),
            ));

            for (call, result) in self.dispatch(&tool_calls).await {
                let output = if result.success {
                    result.stdout.clone()
                } else {
                    format!("Error: {}", result.stderr)
                };
                all_tool_results.push(ToolResultRecord {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result,
                });
                messages.push(Message::tool_result(call.id, output));
            }
        }

        warn!("max tool iterations reached");
        Ok(AgentResponse {
            message: MAX_ITERATIONS_MESSAGE.to_string(),
            tool_calls: all_tool_calls,
            tool_results: all_tool_results,
        })
    }

    /// Streaming variant of [`Agent::chat`]: the same loop, surfaced as
    /// an ordered event stream. Dropping the receiver cancels the turn
    /// best-effort: no new work is started, but a tool batch already
    /// dispatched runs to completion within its own timeouts.
    pub fn chat_stream(
        self: Arc<Self>,
        user_message: String,
        history: Vec<MessageRecord>,
    ) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            self.run_stream(&tx, &user_message, &history).await;
        });
        rx
    }

    async fn run_stream(
        &self,
        tx: &mpsc::Sender<AgentEvent>,
        user_message: &str,
        history: &[MessageRecord],
    ) {
        let mut messages = self.build_messages(user_message, history);
        let tool_defs = self.tool_definitions();

        let mut all_tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut iterations = 0;

        if tx
            .send(AgentEvent::Status {
                stage: "thinking".into(),
                message: "Analyzing your request...".into(),
                iteration: None,
            })
            .await
            .is_err()
        {
            return;
        }

        for iteration in 1..=self.max_tool_iterations {
            iterations = iteration;
            info!(
                "agent stream iteration {}/{}",
                iteration, self.max_tool_iterations
            );

            if tx
                .send(AgentEvent::Status {
                    stage: "llm_call".into(),
                    message: format!("Calling model (iteration {})...", iteration),
                    iteration: Some(iteration),
                })
                .await
                .is_err()
            {
                return;
            }

            let mut deltas = match self
                .provider
                .chat_stream(
                    messages.clone(),
                    Some(tool_defs.clone()),
                    self.model.as_deref(),
                    MAX_TOKENS,
                    TOOL_TEMPERATURE,
                )
                .await
            {
                Ok(deltas) => deltas,
                Err(e) => {
                    let _ = tx
                        .send(AgentEvent::Error {
                            message: e.to_string(),
                            kind: "provider_error".into(),
                        })
                        .await;
                    return;
                }
            };

            let mut collected_content = String::new();
            let mut drafts: Vec<DraftToolCall> = Vec::new();

            while let Some(delta) = deltas.recv().await {
                match delta {
                    Ok(ChatDelta::Content(text)) => {
                        collected_content.push_str(&text);
                        if tx.send(AgentEvent::Token { content: text }).await.is_err() {
                            return;
                        }
                    }
                    Ok(ChatDelta::ToolCall {
                        index,
                        id,
                        name,
                        arguments,
                    }) => {
                        if drafts.len() <= index {
                            drafts.resize_with(index + 1, DraftToolCall::default);
                        }
                        if let Some(id) = id {
                            drafts[index].id = id;
                        }
                        if let Some(name) = name {
                            drafts[index].name = name;
                        }
                        if let Some(fragment) = arguments {
                            drafts[index].arguments.push_str(&fragment);
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(AgentEvent::Error {
                                message: e.to_string(),
                                kind: "provider_error".into(),
                            })
                            .await;
                        return;
                    }
                }
            }

            if drafts.is_empty() {
                let _ = tx
                    .send(AgentEvent::Done {
                        message: collected_content,
                        tool_calls_count: all_tool_calls.len(),
                        iterations,
                    })
                    .await;
                return;
            }

            let mut tool_calls = Vec::with_capacity(drafts.len());
            for draft in drafts {
                let call = ToolCallRequest {
                    id: draft.id,
                    name: draft.name,
                    arguments: parse_tool_arguments(&draft.arguments),
                };
                all_tool_calls.push(call.clone());
                if tx
                    .send(AgentEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    })
                    .await
                    .is_err()
                {
                    return;
                }
                tool_calls.push(call);
            }

            messages.push(Message::assistant(
                collected_content,
                Some(tool_calls.clone()),
            ));

            if tx
                .send(AgentEvent::Status {
                    stage: "executing_tools".into(),
                    message: format!("Executing {} tool(s)...", tool_calls.len()),
                    iteration: Some(iteration),
                })
                .await
                .is_err()
            {
                return;
            }

            for (call, result) in self.dispatch(&tool_calls).await {
                let output = if result.success {
                    result.stdout
                } else {
                    format!("Error: {}", result.stderr)
                };

                if tx
                    .send(AgentEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        success: result.success,
                        output: truncate_chars(&output, STREAM_OUTPUT_PREVIEW_CHARS, "..."),
                    })
                    .await
                    .is_err()
                {
                    return;
                }

                messages.push(Message::tool_result(call.id, output));
            }
        }

        warn!("max tool iterations reached in stream");
        let _ = tx
            .send(AgentEvent::Status {
                stage: "max_iterations".into(),
                message: "Maximum iterations reached".into(),
                iteration: None,
            })
            .await;
        let _ = tx
            .send(AgentEvent::Done {
                message: "I've reached the maximum number of operations. Here's what I found so far."
                    .into(),
                tool_calls_count: all_tool_calls.len(),
                iterations,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_arguments_pass_through() {
        let args = json!({"path": "a.txt"});
        assert_eq!(normalize_arguments(args.clone()), args);
    }

    #[test]
    fn string_arguments_are_decoded() {
        let args = Value::String("{\"path\": \"a.txt\"}".into());
        assert_eq!(normalize_arguments(args), json!({"path": "a.txt"}));
    }

    #[test]
    fn malformed_arguments_are_wrapped_raw() {
        let args = Value::String("{not json".into());
        assert_eq!(normalize_arguments(args), json!({"raw": "{not json"}));
    }

    #[test]
    fn null_arguments_become_empty_object() {
        assert_eq!(normalize_arguments(Value::Null), json!({}));
    }

    #[test]
    fn empty_fragment_parses_to_empty_object() {
        assert_eq!(parse_tool_arguments(""), json!({}));
    }

    #[test]
    fn non_object_json_is_wrapped_raw() {
        assert_eq!(parse_tool_arguments("[1,2]"), json!({"raw": "[1,2]"}));
    }
}
