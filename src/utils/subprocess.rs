use tokio::process::Command;

/// Environment variables safe to pass through to child processes.
const ALLOWED_ENV_VARS: &[&str] = &["PATH", "HOME", "USER", "TZ", "TERM", "TMPDIR"];

/// Create a `Command` with a scrubbed environment.
///
/// Calls `env_clear()` then copies only the allowlisted environment
/// variables from the current process, and pins `LC_ALL` to a
/// deterministic UTF-8 locale so tool output is stable across hosts.
/// This also prevents accidental leakage of API keys and other secrets
/// to child processes.
pub fn scrubbed_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_clear();
    for &var in ALLOWED_ENV_VARS {
        if let Ok(val) = std::env::var(var) {
            cmd.env(var, val);
        }
    }
    cmd.env("LC_ALL", "C.UTF-8");
    cmd
}
