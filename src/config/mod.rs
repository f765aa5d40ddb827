//! Recognized configuration surface of the execution core.
//!
//! Loading these structs from files or the environment is the host
//! application's job; the core only defines the shapes and defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_file_size_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_output_size_bytes() -> usize {
    1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    5
}

fn default_cache_size_limit() -> u64 {
    500 * 1024 * 1024
}

fn default_content_ttl_seconds() -> u64 {
    0
}

fn default_search_ttl_seconds() -> u64 {
    300
}

fn default_session_ttl_seconds() -> u64 {
    3600
}

fn default_max_messages_per_session() -> usize {
    50
}

fn default_max_tool_iterations() -> usize {
    10
}

/// Sandbox executor limits and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Directory below which all tool invocations are confined.
    pub root_path: PathBuf,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    #[serde(default = "default_max_output_size_bytes")]
    pub max_output_size_bytes: usize,
    /// Disabling skips argument sanitization. Tests only.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SandboxConfig {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            timeout_seconds: default_timeout_seconds(),
            max_file_size_bytes: default_max_file_size_bytes(),
            max_output_size_bytes: default_max_output_size_bytes(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_true")]
    pub parallel_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            parallel_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory owned by the persistent store.
    pub cache_dir: PathBuf,
    #[serde(default = "default_cache_size_limit")]
    pub size_limit_bytes: u64,
    /// 0 means no time-based expiry; content is invalidated on file change only.
    #[serde(default = "default_content_ttl_seconds")]
    pub content_ttl_seconds: u64,
    #[serde(default = "default_search_ttl_seconds")]
    pub search_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            size_limit_bytes: default_cache_size_limit(),
            content_ttl_seconds: default_content_ttl_seconds(),
            search_ttl_seconds: default_search_ttl_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
    #[serde(default = "default_max_messages_per_session")]
    pub max_messages_per_session: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: default_session_ttl_seconds(),
            max_messages_per_session: default_max_messages_per_session(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
        }
    }
}

/// Aggregate configuration for the whole execution core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sandbox: SandboxConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[cfg(test)]
mod tests;
