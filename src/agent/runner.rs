//! Cache-routing tool runner.
//!
//! `cat`/`head` consult the content cache with a loader that executes
//! the tool in the sandbox; `grep`/`find` consult the search cache the
//! same way. Everything else goes straight to the sandbox. The routing
//! is invisible to the LLM: the same `ExecutionResult` shape comes back
//! either way.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::errors::ToolErrorKind;
use crate::orchestrator::{SandboxRunner, ToolRunner};
use crate::provider::ToolCallRequest;
use crate::sandbox::{ExecutionResult, SandboxExecutor};
use crate::tools::ToolRegistry;

pub struct CachedRunner {
    sandbox: Arc<SandboxExecutor>,
    registry: Arc<ToolRegistry>,
    caches: Arc<CacheManager>,
    fallback: SandboxRunner,
}

impl CachedRunner {
    pub fn new(
        sandbox: Arc<SandboxExecutor>,
        registry: Arc<ToolRegistry>,
        caches: Arc<CacheManager>,
    ) -> Self {
        Self {
            fallback: SandboxRunner::new(sandbox.clone(), registry.clone()),
            sandbox,
            registry,
            caches,
        }
    }

    fn arg_str<'a>(call: &'a ToolCallRequest, key: &'a str) -> &'a str {
        call.arguments.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// Serve `cat`/`head` through the content cache, loading via the
    /// sandbox on miss or staleness.
    async fn cached_read(&self, call: &ToolCallRequest) -> ExecutionResult {
        let argv = match self.registry.build_command(&call.name, &call.arguments) {
            Ok(argv) => argv,
            Err(e) => {
                return ExecutionResult::failure(
                    format!("{} {}", call.name, call.arguments),
                    e.to_string(),
                    ToolErrorKind::ExecutionError,
                );
            }
        };
        let command_str = shell_words::join(argv.iter().map(String::as_str));

        let file_path = self.sandbox.root().join(Self::arg_str(call, "path"));
        let ttl = self.registry.get_cache_ttl(&call.name);

        let sandbox = self.sandbox.clone();
        let loader_argv = argv.clone();
        let loaded = self
            .caches
            .content()
            .get_content(
                &file_path,
                move |_p: PathBuf| async move {
                    let result = sandbox.execute(&loader_argv).await;
                    if result.success {
                        Ok(result.stdout)
                    } else {
                        anyhow::bail!("Failed to read file: {}", result.stderr)
                    }
                },
                ttl,
            )
            .await;

        match loaded {
            Ok(content) => ExecutionResult {
                success: true,
                stdout: content,
                stderr: String::new(),
                return_code: 0,
                command: command_str,
                error: None,
            },
            Err(e) => {
                warn!("cached read failed for {}: {}", call.name, e);
                ExecutionResult::failure(command_str, e.to_string(), ToolErrorKind::ExecutionError)
            }
        }
    }

    /// Serve `grep`/`find` through the search cache; on miss, execute
    /// and store the successful output. Cache machinery failures fall
    /// back to direct execution.
    async fn cached_search(&self, call: &ToolCallRequest) -> ExecutionResult {
        let (pattern, options) = match call.name.as_str() {
            "grep" => (
                Self::arg_str(call, "pattern").to_string(),
                json!({
                    "recursive": call.arguments.get("recursive").and_then(Value::as_bool).unwrap_or(true),
                    "ignore_case": call.arguments.get("ignore_case").and_then(Value::as_bool).unwrap_or(false),
                }),
            ),
            "find" => (
                Self::arg_str(call, "name").to_string(),
                json!({
                    "type": call.arguments.get("type").and_then(Value::as_str).unwrap_or("f"),
                }),
            ),
            other => {
                // Not a search operation; route directly.
                debug!("cached_search fallthrough for {}", other);
                return self.fallback.run(call).await;
            }
        };
        let scope = self.sandbox.root().join(Self::arg_str(call, "path"));

        match self
            .caches
            .search()
            .get_search_result(&call.name, &pattern, &scope, &options)
            .await
        {
            Ok(Some(cached)) => {
                let command = self
                    .registry
                    .build_command(&call.name, &call.arguments)
                    .map(|argv| shell_words::join(argv.iter().map(String::as_str)))
                    .unwrap_or_else(|_| call.name.clone());
                return ExecutionResult {
                    success: true,
                    stdout: cached,
                    stderr: String::new(),
                    return_code: 0,
                    command,
                    error: None,
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!("search cache lookup failed for {}: {}", call.name, e);
                return self.fallback.run(call).await;
            }
        }

        let result = self.fallback.run(call).await;
        if result.success {
            let ttl = self.registry.get_cache_ttl(&call.name);
            if let Err(e) = self
                .caches
                .search()
                .set_search_result(&call.name, &pattern, &scope, &options, &result.stdout, ttl)
                .await
            {
                warn!("failed to cache search result for {}: {}", call.name, e);
            }
        }
        result
    }
}

#[async_trait]
impl ToolRunner for CachedRunner {
    async fn run(&self, call: &ToolCallRequest) -> ExecutionResult {
        match call.name.as_str() {
            "cat" | "head" => self.cached_read(call).await,
            "grep" | "find" => self.cached_search(call).await,
            _ => self.fallback.run(call).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, SandboxConfig};
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        runner: CachedRunner,
        caches: Arc<CacheManager>,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.txt"), "hello").unwrap();

        let sandbox = Arc::new(SandboxExecutor::new(&SandboxConfig::new(&root)).unwrap());
        let registry = Arc::new(crate::tools::default_registry());
        let caches =
            Arc::new(CacheManager::new(&CacheConfig::new(dir.path().join("cache"))).unwrap());
        let root = sandbox.root().to_path_buf();
        Fixture {
            _dir: dir,
            runner: CachedRunner::new(sandbox, registry, caches.clone()),
            caches,
            root,
        }
    }

    fn call(name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: "1".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn cat_populates_content_cache() {
        let f = fixture();
        let request = call("cat", json!({"path": "a.txt"}));

        let first = f.runner.run(&request).await;
        assert!(first.success);
        assert_eq!(first.stdout, "hello");

        let keys = f.caches.store().iter_keys().await;
        assert!(
            keys.iter().any(|k| k.starts_with("_content:")),
            "content entry should be stored: {:?}",
            keys
        );

        let second = f.runner.run(&request).await;
        assert!(second.success);
        assert_eq!(second.stdout, "hello");
    }

    #[tokio::test]
    async fn cat_reload_after_modification() {
        let f = fixture();
        let request = call("cat", json!({"path": "a.txt"}));
        assert_eq!(f.runner.run(&request).await.stdout, "hello");

        fs::write(f.root.join("a.txt"), "world").unwrap();
        assert_eq!(f.runner.run(&request).await.stdout, "world");
    }

    #[tokio::test]
    async fn grep_results_are_cached_and_reused() {
        let f = fixture();
        fs::write(f.root.join("b.txt"), "needle here\n").unwrap();
        let request = call("grep", json!({"pattern": "needle", "path": "."}));

        let first = f.runner.run(&request).await;
        assert!(first.success, "stderr: {}", first.stderr);
        assert!(first.stdout.contains("needle"));

        let second = f.runner.run(&request).await;
        assert_eq!(second.stdout, first.stdout);
    }

    #[tokio::test]
    async fn failed_reads_are_not_cached() {
        let f = fixture();
        let request = call("cat", json!({"path": "missing.txt"}));
        let result = f.runner.run(&request).await;
        assert!(!result.success);
        assert_eq!(result.error, Some(ToolErrorKind::ExecutionError));

        // Creating the file afterwards must serve fresh content.
        fs::write(f.root.join("missing.txt"), "now here").unwrap();
        let result = f.runner.run(&request).await;
        assert!(result.success);
        assert_eq!(result.stdout, "now here");
    }

    #[tokio::test]
    async fn uncached_tools_run_directly() {
        let f = fixture();
        let result = f.runner.run(&call("ls", json!({"path": "."}))).await;
        assert!(result.success, "stderr: {}", result.stderr);
        assert!(result.stdout.contains("a.txt"));
    }
}
