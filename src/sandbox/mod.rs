//! Sandboxed execution of read-only inspection commands.
//!
//! Every invocation is validated before a process exists: the command
//! must be on the allow-list, path-like arguments are resolved and
//! checked for containment under the sandbox root, and `cat` targets are
//! size-capped. Children run with a scrubbed environment, a wall-clock
//! timeout, and bounded output capture.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::errors::ToolErrorKind;
use crate::utils::paths::{display_for_error, resolve_or_normalize};
use crate::utils::subprocess::scrubbed_command;
use crate::utils::{ensure_dir, format_size};

/// The only commands the sandbox will ever spawn. POSIX-portable
/// inspection utilities; nothing here writes.
pub const ALLOWED_COMMANDS: &[&str] = &["grep", "find", "cat", "head", "tail", "ls", "wc"];

/// Short alphanumeric file extension, e.g. `notes.txt`, `data.csv`.
static EXTENSION_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\.[A-Za-z0-9]{1,5}$").expect("extension regex"));

/// Validation failures raised before any child process is spawned, plus
/// the timeout raised while supervising one.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Command '{0}' is not allowed. Allowed commands: cat, find, grep, head, ls, tail, wc")]
    CommandNotAllowed(String),

    #[error("Empty command")]
    EmptyCommand,

    #[error("Path '{0}' is outside the sandbox root")]
    PathTraversal(String),

    #[error(
        "File '{name}' ({size}) exceeds maximum allowed size ({max}). \
         Use 'head' to read the first N lines instead."
    )]
    FileTooLarge {
        name: String,
        size: String,
        max: String,
    },

    #[error("Failed to parse command: {0}")]
    Parse(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),
}

impl SandboxError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            SandboxError::CommandNotAllowed(_) | SandboxError::EmptyCommand => {
                ToolErrorKind::CommandNotAllowed
            }
            SandboxError::PathTraversal(_) => ToolErrorKind::PathTraversal,
            SandboxError::FileTooLarge { .. } => ToolErrorKind::FileTooLarge,
            SandboxError::Parse(_) => ToolErrorKind::ParseError,
            SandboxError::Timeout(_) => ToolErrorKind::Timeout,
        }
    }
}

/// Outcome of one sandboxed command run. Also produced for pre-exec
/// validation failures (`return_code` = −1, `error` set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub return_code: i32,
    /// Shell-joined rendering of the executed (sanitized) argv, for audit
    /// logs and cache keys.
    pub command: String,
    pub error: Option<ToolErrorKind>,
}

impl ExecutionResult {
    pub fn failure(command: impl Into<String>, stderr: impl Into<String>, kind: ToolErrorKind) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            return_code: -1,
            command: command.into(),
            error: Some(kind),
        }
    }
}

pub struct SandboxExecutor {
    root: PathBuf,
    timeout: Duration,
    max_output_size: usize,
    max_file_size: u64,
    enabled: bool,
}

impl SandboxExecutor {
    pub fn new(config: &SandboxConfig) -> anyhow::Result<Self> {
        let root = ensure_dir(&config.root_path)?
            .canonicalize()
            .map_err(|e| anyhow::anyhow!("Failed to canonicalize sandbox root: {}", e))?;

        if !config.enabled {
            warn!("sandbox checks disabled; test configuration only");
        }

        Ok(Self {
            root,
            timeout: Duration::from_secs(config.timeout_seconds),
            max_output_size: config.max_output_size_bytes,
            max_file_size: config.max_file_size_bytes,
            enabled: config.enabled,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Check that the command name (basename of argv[0], so full paths
    /// like `/usr/bin/grep` are handled) is on the allow-list.
    pub fn validate_command(&self, argv: &[String]) -> Result<(), SandboxError> {
        let Some(first) = argv.first() else {
            return Err(SandboxError::EmptyCommand);
        };
        let name = Path::new(first)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| first.clone());
        if ALLOWED_COMMANDS.contains(&name.as_str()) {
            Ok(())
        } else {
            Err(SandboxError::CommandNotAllowed(name))
        }
    }

    /// Resolve a path (relative paths against the root, symlinks
    /// followed) and reject anything that lands outside the root.
    /// The rejected path is redacted to its basename so out-of-sandbox
    /// locations never surface in error text.
    pub fn validate_path(&self, raw: &str) -> Result<PathBuf, SandboxError> {
        let path = Path::new(raw);
        let resolved = if path.is_absolute() {
            resolve_or_normalize(path)
        } else {
            resolve_or_normalize(&self.root.join(path))
        };

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(SandboxError::PathTraversal(display_for_error(
                Path::new(raw),
                &self.root,
            )))
        }
    }

    /// Conservative guess at whether an argument names a filesystem
    /// location. Search patterns, counts, and globs must pass through
    /// untouched; only arguments that plausibly are paths get resolved.
    fn looks_like_path(&self, arg: &str) -> bool {
        // Glob patterns are not paths (e.g. *.txt, file?.log)
        if arg.contains('*') || arg.contains('?') {
            return false;
        }

        if arg.contains('/') {
            return true;
        }

        if arg == "." || arg == ".." {
            return true;
        }

        // Bare name with a short extension: only a path if it actually
        // exists under the root, otherwise it is likely a search pattern.
        if !arg.starts_with('.') && EXTENSION_RE.is_match(arg) {
            return self.root.join(arg).exists();
        }

        self.root.join(arg).exists()
    }

    /// Replace path-like arguments with their resolved absolute form.
    /// Flags and non-path arguments pass through verbatim.
    fn sanitize_command(&self, argv: &[String]) -> Result<Vec<String>, SandboxError> {
        if !self.enabled {
            return Ok(argv.to_vec());
        }

        let mut sanitized = vec![argv[0].clone()];
        for arg in &argv[1..] {
            if arg.starts_with('-') {
                sanitized.push(arg.clone());
                continue;
            }
            if self.looks_like_path(arg) {
                sanitized.push(self.validate_path(arg)?.display().to_string());
            } else {
                sanitized.push(arg.clone());
            }
        }
        Ok(sanitized)
    }

    /// `cat` reads whole files; refuse targets above the size cap before
    /// a process is spawned.
    fn check_file_size_for_cat(&self, argv: &[String]) -> Result<(), SandboxError> {
        let name = Path::new(&argv[0])
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        if name != "cat" {
            return Ok(());
        }

        for arg in &argv[1..] {
            if arg.starts_with('-') {
                continue;
            }
            let path = Path::new(arg);
            if let Ok(meta) = path.metadata() {
                if meta.is_file() && meta.len() > self.max_file_size {
                    return Err(SandboxError::FileTooLarge {
                        name: path
                            .file_name()
                            .map(|f| f.to_string_lossy().to_string())
                            .unwrap_or_default(),
                        size: format_size(meta.len()),
                        max: format_size(self.max_file_size),
                    });
                }
            }
        }
        Ok(())
    }

    fn truncate_output(&self, bytes: &[u8]) -> String {
        // Truncate raw bytes before UTF-8 conversion to bound memory.
        let slice = if bytes.len() > self.max_output_size {
            &bytes[..self.max_output_size]
        } else {
            bytes
        };
        String::from_utf8_lossy(slice).into_owned()
    }

    /// Execute an argv in the sandbox. Validation failures never spawn a
    /// child; they come back as failed results with the matching error
    /// kind.
    pub async fn execute(&self, argv: &[String]) -> ExecutionResult {
        let command_str = shell_words::join(argv.iter().map(String::as_str));

        let sanitized = match self.prepare(argv) {
            Ok(sanitized) => sanitized,
            Err(e) => {
                debug!("sandbox rejected '{}': {}", command_str, e);
                return ExecutionResult::failure(command_str, e.to_string(), e.kind());
            }
        };
        let sanitized_str = shell_words::join(sanitized.iter().map(String::as_str));

        let mut cmd = scrubbed_command(&sanitized[0]);
        cmd.args(&sanitized[1..])
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let return_code = output.status.code().unwrap_or(-1);
                info!("sandbox ran '{}' -> {}", sanitized_str, return_code);
                ExecutionResult {
                    success: output.status.success(),
                    stdout: self.truncate_output(&output.stdout),
                    stderr: self.truncate_output(&output.stderr),
                    return_code,
                    command: sanitized_str,
                    error: None,
                }
            }
            Ok(Err(e)) => ExecutionResult::failure(
                sanitized_str,
                format!("Unexpected error: {}", e),
                ToolErrorKind::Unexpected,
            ),
            Err(_) => {
                // Dropping the output future kills and reaps the child
                // (kill_on_drop).
                let err = SandboxError::Timeout(self.timeout.as_secs());
                warn!("sandbox timeout: '{}'", sanitized_str);
                ExecutionResult::failure(sanitized_str, err.to_string(), err.kind())
            }
        }
    }

    /// Split a command string with shell quoting rules, then execute it.
    pub async fn execute_from_string(&self, command_str: &str) -> ExecutionResult {
        match shell_words::split(command_str) {
            Ok(argv) => self.execute(&argv).await,
            Err(e) => {
                let err = SandboxError::Parse(e.to_string());
                ExecutionResult::failure(command_str, err.to_string(), err.kind())
            }
        }
    }

    fn prepare(&self, argv: &[String]) -> Result<Vec<String>, SandboxError> {
        self.validate_command(argv)?;
        let sanitized = self.sanitize_command(argv)?;
        self.check_file_size_for_cat(&sanitized)?;
        Ok(sanitized)
    }
}
