//! Bounded-parallel dispatch of tool calls from one LLM turn.
//!
//! Calls are partitioned by a hard-coded read-only/mutating
//! classification; read-only calls fan out under a counting semaphore,
//! anything else (including unknown tools) runs sequentially afterward.
//! Results always come back in the caller's input order.

use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::errors::ToolErrorKind;
use crate::provider::ToolCallRequest;
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::tools::ToolRegistry;

/// Tools that only read data and are safe to run concurrently.
pub const READ_ONLY_TOOLS: &[&str] =
    &["grep", "find", "cat", "head", "tail", "ls", "tree", "wc"];

/// Tools that may modify state. Currently empty; kept for the day a
/// write-side tool appears. Unknown tools are treated as mutating.
pub const WRITE_TOOLS: &[&str] = &[];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    Parallel,
    Sequential,
}

/// A batch of calls sharing one execution strategy.
#[derive(Debug, Clone)]
pub struct ToolGroup {
    pub calls: Vec<ToolCallRequest>,
    pub strategy: ExecutionStrategy,
    pub depends_on: Vec<String>,
}

/// Seam between scheduling and execution. The plain implementation goes
/// straight to the sandbox; the agent substitutes a cache-routing one.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, call: &ToolCallRequest) -> ExecutionResult;
}

/// Runner that builds the argv via the registry and executes it in the
/// sandbox. Registry failures become `execution_error` results.
pub struct SandboxRunner {
    sandbox: Arc<SandboxExecutor>,
    registry: Arc<ToolRegistry>,
}

impl SandboxRunner {
    pub fn new(sandbox: Arc<SandboxExecutor>, registry: Arc<ToolRegistry>) -> Self {
        Self { sandbox, registry }
    }
}

#[async_trait]
impl ToolRunner for SandboxRunner {
    async fn run(&self, call: &ToolCallRequest) -> ExecutionResult {
        match self.registry.build_command(&call.name, &call.arguments) {
            Ok(argv) => {
                debug!("built command for {}: {:?}", call.name, argv);
                self.sandbox.execute(&argv).await
            }
            Err(e) => {
                warn!("failed to build command for {}: {}", call.name, e);
                ExecutionResult::failure(
                    format!("{} {}", call.name, call.arguments),
                    e.to_string(),
                    ToolErrorKind::ExecutionError,
                )
            }
        }
    }
}

pub struct Orchestrator {
    runner: Arc<dyn ToolRunner>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn ToolRunner>, max_concurrent: usize) -> Self {
        Self {
            runner,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Partition calls into execution groups. All read-only calls form
    /// one parallel group; mutating or unknown calls form a sequential
    /// group that depends on it.
    pub fn analyze_dependencies(calls: &[ToolCallRequest]) -> Vec<ToolGroup> {
        if calls.is_empty() {
            return Vec::new();
        }

        let mut read_only = Vec::new();
        let mut sequential = Vec::new();
        for call in calls {
            if READ_ONLY_TOOLS.contains(&call.name.as_str()) {
                read_only.push(call.clone());
            } else {
                if !WRITE_TOOLS.contains(&call.name.as_str()) {
                    warn!("unknown tool {}, treating as sequential", call.name);
                }
                sequential.push(call.clone());
            }
        }

        let mut groups = Vec::new();
        let has_read_only = !read_only.is_empty();
        if has_read_only {
            groups.push(ToolGroup {
                calls: read_only,
                strategy: ExecutionStrategy::Parallel,
                depends_on: Vec::new(),
            });
        }
        if !sequential.is_empty() {
            groups.push(ToolGroup {
                calls: sequential,
                strategy: ExecutionStrategy::Sequential,
                depends_on: if has_read_only {
                    vec!["read_only_group".to_string()]
                } else {
                    Vec::new()
                },
            });
        }
        groups
    }

    /// Run all calls concurrently, bounded by the semaphore. A worker
    /// that panics or is cancelled yields an `execution_error` result for
    /// its own call; peers are unaffected.
    pub async fn execute_parallel(
        &self,
        calls: &[ToolCallRequest],
    ) -> Vec<(ToolCallRequest, ExecutionResult)> {
        if calls.is_empty() {
            return Vec::new();
        }

        info!(
            "executing {} tools in parallel (max concurrent: {})",
            calls.len(),
            self.max_concurrent
        );

        let tasks: Vec<_> = calls
            .iter()
            .cloned()
            .map(|call| {
                let runner = self.runner.clone();
                let semaphore = self.semaphore.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        let result = ExecutionResult::failure(
                            call.name.clone(),
                            "Orchestrator shut down".to_string(),
                            ToolErrorKind::ExecutionError,
                        );
                        return (call, result);
                    };
                    let result = runner.run(&call).await;
                    (call, result)
                })
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (i, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => {
                    warn!("worker for {} failed: {}", calls[i].name, e);
                    results.push((
                        calls[i].clone(),
                        ExecutionResult::failure(
                            format!("{} {}", calls[i].name, calls[i].arguments),
                            e.to_string(),
                            ToolErrorKind::ExecutionError,
                        ),
                    ));
                }
            }
        }
        results
    }

    /// Run calls one at a time, same per-call semantics as the parallel
    /// path.
    pub async fn execute_sequential(
        &self,
        calls: &[ToolCallRequest],
    ) -> Vec<(ToolCallRequest, ExecutionResult)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            info!("executing tool sequentially: {}", call.name);
            let result = self.runner.run(call).await;
            results.push((call.clone(), result));
        }
        results
    }

    /// Main entry point: group, execute each group with its strategy,
    /// and return `(call, result)` pairs in the original input order
    /// regardless of completion order.
    pub async fn execute_with_strategy(
        &self,
        calls: &[ToolCallRequest],
    ) -> Vec<(ToolCallRequest, ExecutionResult)> {
        if calls.is_empty() {
            return Vec::new();
        }

        let groups = Self::analyze_dependencies(calls);
        let mut all_results = Vec::with_capacity(calls.len());

        for group in groups {
            debug!(
                "executing group: {:?} ({} tools)",
                group.strategy,
                group.calls.len()
            );
            let results = match group.strategy {
                ExecutionStrategy::Parallel => self.execute_parallel(&group.calls).await,
                ExecutionStrategy::Sequential => self.execute_sequential(&group.calls).await,
            };
            all_results.extend(results);
        }

        let mut by_id: HashMap<String, (ToolCallRequest, ExecutionResult)> = all_results
            .into_iter()
            .map(|(call, result)| (call.id.clone(), (call, result)))
            .collect();

        calls
            .iter()
            .filter_map(|call| by_id.remove(&call.id))
            .collect()
    }
}
