//! Shared fixtures: a scripted LLM provider and a fully wired agent
//! over a temporary document tree.
#![allow(dead_code)] // each suite uses a different subset of the helpers

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

use burrow::agent::Agent;
use burrow::cache::CacheManager;
use burrow::config::{AgentConfig, CacheConfig, OrchestratorConfig, SandboxConfig};
use burrow::provider::{
    ChatDelta, LLMProvider, LLMResponse, Message, ToolCallRequest, ToolDefinition,
};
use burrow::sandbox::SandboxExecutor;
use burrow::tools::default_registry;

/// Provider that replays a scripted sequence of responses. When the
/// script runs out it falls back to a fixed text answer, which keeps
/// concurrency tests independent of call interleaving.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<LLMResponse>>,
    fallback: String,
    pub calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            fallback: "All done.".to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(text: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn text(content: &str) -> LLMResponse {
        LLMResponse {
            content: Some(content.to_string()),
            tool_calls: vec![],
        }
    }

    pub fn tool_calls(calls: &[(&str, &str, Value)]) -> LLMResponse {
        LLMResponse {
            content: None,
            tool_calls: calls
                .iter()
                .map(|(id, name, arguments)| ToolCallRequest {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                    arguments: arguments.clone(),
                })
                .collect(),
        }
    }

    async fn next_response(&self) -> LLMResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Self::text(&self.fallback))
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<ToolDefinition>>,
        _model: Option<&str>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> anyhow::Result<LLMResponse> {
        Ok(self.next_response().await)
    }

    async fn chat_stream(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<ToolDefinition>>,
        _model: Option<&str>,
        _max_tokens: u32,
        _temperature: f32,
    ) -> anyhow::Result<mpsc::Receiver<anyhow::Result<ChatDelta>>> {
        let response = self.next_response().await;
        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            if let Some(content) = response.content {
                // Word-level chunks exercise token accumulation.
                for chunk in content.split_inclusive(' ') {
                    if tx
                        .send(Ok(ChatDelta::Content(chunk.to_string())))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            for (index, call) in response.tool_calls.into_iter().enumerate() {
                let _ = tx
                    .send(Ok(ChatDelta::ToolCall {
                        index,
                        id: Some(call.id),
                        name: Some(call.name),
                        arguments: None,
                    }))
                    .await;
                // Arguments arrive split across two fragments.
                let rendered = call.arguments.to_string();
                let mid = rendered.len() / 2;
                for fragment in [&rendered[..mid], &rendered[mid..]] {
                    let _ = tx
                        .send(Ok(ChatDelta::ToolCall {
                            index,
                            id: None,
                            name: None,
                            arguments: Some(fragment.to_string()),
                        }))
                        .await;
                }
            }
        });

        Ok(rx)
    }

    fn default_model(&self) -> &str {
        "scripted"
    }
}

/// A sandbox root populated with a small document tree.
pub struct TestTree {
    pub dir: tempfile::TempDir,
    pub root: PathBuf,
}

impl TestTree {
    pub fn new() -> Self {
        // RUST_LOG=debug makes the suites narrate cache and sandbox activity.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join("notes")).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::write(root.join("docs/guide.md"), "# Guide\ntodo: write more\n").unwrap();
        fs::write(root.join("notes/daily.txt"), "remember the milk\n").unwrap();
        Self { dir, root }
    }

    pub fn write(&self, rel: &str, content: &str) {
        fs::write(self.root.join(rel), content).unwrap();
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }
}

pub fn build_agent(tree: &TestTree, provider: Arc<ScriptedProvider>, with_cache: bool) -> Arc<Agent> {
    let sandbox = Arc::new(SandboxExecutor::new(&SandboxConfig::new(&tree.root)).unwrap());
    let registry = Arc::new(default_registry());
    let caches = with_cache
        .then(|| Arc::new(CacheManager::new(&CacheConfig::new(tree.cache_dir())).unwrap()));

    Arc::new(Agent::new(
        provider,
        sandbox,
        registry,
        caches,
        &AgentConfig::default(),
        &OrchestratorConfig::default(),
    ))
}

/// Path of `rel` as the sandbox reports it (canonicalized root).
pub fn resolved(tree: &TestTree, rel: &str) -> PathBuf {
    tree.root.canonicalize().unwrap().join(rel)
}

pub fn touch(path: &Path) {
    let content = fs::read_to_string(path).unwrap_or_default();
    fs::write(path, content + " ").unwrap();
}
