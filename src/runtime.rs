//! One-stop wiring of the execution core.
//!
//! Hosts construct a [`Runtime`] once at program entry from an explicit
//! [`Config`] and pass its pieces down; nothing in the crate relies on
//! hidden globals, and tests can wire a fresh runtime per case.

use std::sync::Arc;
use tracing::info;

use crate::agent::{Agent, ChatService};
use crate::cache::CacheManager;
use crate::config::Config;
use crate::errors::BurrowResult;
use crate::provider::LLMProvider;
use crate::sandbox::SandboxExecutor;
use crate::session::SessionRepository;
use crate::tools::{ToolRegistry, default_registry};

/// Fully wired execution core: sandbox, registry, caches, sessions, and
/// the agent with its session-aware chat service.
pub struct Runtime {
    sandbox: Arc<SandboxExecutor>,
    registry: Arc<ToolRegistry>,
    caches: Arc<CacheManager>,
    sessions: Arc<SessionRepository>,
    agent: Arc<Agent>,
    service: ChatService,
}

impl Runtime {
    /// Build every component from the configuration, layered bottom-up:
    /// store and caches first, then the sandbox, then the agent over
    /// both.
    pub fn new(config: &Config, provider: Arc<dyn LLMProvider>) -> BurrowResult<Self> {
        let sandbox = Arc::new(
            SandboxExecutor::new(&config.sandbox)
                .map_err(|e| crate::errors::BurrowError::Config(e.to_string()))?,
        );
        let registry = Arc::new(default_registry());
        let caches = Arc::new(CacheManager::new(&config.cache)?);
        let sessions = Arc::new(SessionRepository::new(&config.session));

        let agent = Arc::new(Agent::new(
            provider,
            sandbox.clone(),
            registry.clone(),
            Some(caches.clone()),
            &config.agent,
            &config.orchestrator,
        ));
        let service = ChatService::new(agent.clone(), sessions.clone());

        info!(
            "runtime ready: root={}, cache={}, {} tools",
            sandbox.root().display(),
            config.cache.cache_dir.display(),
            registry.len()
        );

        Ok(Self {
            sandbox,
            registry,
            caches,
            sessions,
            agent,
            service,
        })
    }

    pub fn sandbox(&self) -> &Arc<SandboxExecutor> {
        &self.sandbox
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn sessions(&self) -> &Arc<SessionRepository> {
        &self.sessions
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }
}
