use super::*;

#[test]
fn sandbox_defaults() {
    let cfg = SandboxConfig::new("/data");
    assert_eq!(cfg.timeout_seconds, 30);
    assert_eq!(cfg.max_file_size_bytes, 10 * 1024 * 1024);
    assert_eq!(cfg.max_output_size_bytes, 1024 * 1024);
    assert!(cfg.enabled);
}

#[test]
fn cache_defaults() {
    let cfg = CacheConfig::new("/tmp/cache");
    assert_eq!(cfg.size_limit_bytes, 500 * 1024 * 1024);
    assert_eq!(cfg.content_ttl_seconds, 0);
    assert_eq!(cfg.search_ttl_seconds, 300);
}

#[test]
fn orchestrator_and_session_defaults() {
    let orch = OrchestratorConfig::default();
    assert_eq!(orch.max_concurrent, 5);
    assert!(orch.parallel_enabled);

    let sess = SessionConfig::default();
    assert_eq!(sess.session_ttl_seconds, 3600);
    assert_eq!(sess.max_messages_per_session, 50);

    let agent = AgentConfig::default();
    assert_eq!(agent.max_tool_iterations, 10);
}

#[test]
fn config_deserializes_with_partial_fields() {
    let json = serde_json::json!({
        "sandbox": {"root_path": "/data", "timeout_seconds": 5},
        "cache": {"cache_dir": "/tmp/c"}
    });
    let cfg: Config = serde_json::from_value(json).unwrap();
    assert_eq!(cfg.sandbox.timeout_seconds, 5);
    assert!(cfg.sandbox.enabled);
    assert_eq!(cfg.cache.search_ttl_seconds, 300);
    assert_eq!(cfg.orchestrator.max_concurrent, 5);
    assert_eq!(cfg.agent.max_tool_iterations, 10);
}
