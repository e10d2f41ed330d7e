//! Async tmux command executor with semaphore-controlled concurrency
//!
//! Provides non-blocking tmux command execution with:
//! - Semaphore to limit concurrent commands (default: 16)
//! - Timeout handling
//! - Structured output parsing

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use super::InputEvent;
use crate::error::{Result, TmuxError};

/// Default maximum concurrent tmux commands
pub const DEFAULT_MAX_CONCURRENT: usize = 16;

/// Default command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// tmux can report a dead pane before it fills in the exit status
const EXIT_STATUS_ATTEMPTS: usize = 10;
const EXIT_STATUS_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Options applied to a new session in the same tmux invocation that creates it
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Pane scrollback limit
    pub history_limit: u32,
    /// Enable mouse support
    pub mouse: bool,
    /// Status bar position ("top" or "bottom")
    pub status_position: String,
    /// Status bar refresh interval in seconds
    pub status_interval: u32,
    /// Working directory for the pane
    pub working_dir: Option<std::path::PathBuf>,
    /// Extra environment for the pane
    pub env: Vec<(String, String)>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            history_limit: 50_000,
            mouse: true,
            status_position: "bottom".to_string(),
            status_interval: 1,
            working_dir: None,
            env: Vec::new(),
        }
    }
}

/// Async tmux command executor
///
/// Uses a semaphore to limit concurrent tmux commands, preventing
/// the daemons from piling up commands against a slow tmux server.
#[derive(Clone)]
pub struct TmuxExecutor {
    /// Semaphore for concurrency control
    semaphore: Arc<Semaphore>,
    /// Command timeout
    timeout: Duration,
}

impl TmuxExecutor {
    /// Create a new executor with default settings
    pub fn new() -> Self {
        Self::with_max_concurrent(DEFAULT_MAX_CONCURRENT)
    }

    /// Create an executor with custom concurrency limit
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the command timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check if tmux is installed and accessible
    pub async fn check_installed(&self) -> Result<()> {
        let output = timeout(self.timeout, Command::new("tmux").arg("-V").output())
            .await
            .map_err(|_| TmuxError::NotInstalled)?
            .map_err(|_| TmuxError::NotInstalled)?;

        if output.status.success() {
            let version = String::from_utf8_lossy(&output.stdout);
            debug!("tmux version: {}", version.trim());
            Ok(())
        } else {
            Err(TmuxError::NotInstalled.into())
        }
    }

    /// Execute a tmux command and return its output
    #[instrument(skip(self), fields(args = ?args))]
    pub async fn execute(&self, args: &[&str]) -> Result<String> {
        // Acquire semaphore permit
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| TmuxError::SemaphoreError)?;

        // Build command
        let mut cmd = Command::new("tmux");
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Execute with timeout
        let result = timeout(self.timeout, cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    Err(TmuxError::CommandFailed {
                        command: format!("tmux {}", args.join(" ")),
                        stderr,
                    }
                    .into())
                }
            }
            Ok(Err(e)) => {
                warn!("tmux command failed: {}", e);
                Err(TmuxError::CommandFailed {
                    command: format!("tmux {}", args.join(" ")),
                    stderr: e.to_string(),
                }
                .into())
            }
            Err(_) => Err(TmuxError::Timeout(self.timeout).into()),
        }
    }

    /// Check if a tmux session exists
    pub async fn session_exists(&self, session_name: &str) -> Result<bool> {
        let target = exact_target(session_name);
        let result = self.execute(&["has-session", "-t", &target]).await;
        match result {
            Ok(_) => Ok(true),
            Err(crate::error::Error::Tmux(TmuxError::CommandFailed { .. })) => {
                // "has-session" returns non-zero if session doesn't exist
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a new detached session running `command` and apply its options
    ///
    /// Everything is sent as one `;`-separated tmux invocation so that
    /// `remain-on-exit` is in place before a short-lived command can exit.
    /// The pane takes its scrollback size when it is created, so the global
    /// `history-limit` is raised just before `new-session` and put back after.
    #[instrument(skip(self, options))]
    pub async fn create_session(
        &self,
        session_name: &str,
        command: &str,
        options: &SessionOptions,
    ) -> Result<()> {
        let previous_limit = self.global_history_limit().await;
        let args = build_create_args(session_name, command, options, previous_limit);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.execute(&arg_refs).await?;
        Ok(())
    }

    /// Server-wide `history-limit`, or `None` when no server is running
    async fn global_history_limit(&self) -> Option<u32> {
        let output = self
            .execute(&["show-options", "-gv", "history-limit"])
            .await
            .ok()?;
        output.trim().parse().ok()
    }

    /// Tear the whole session down once the pane's process exits
    pub async fn set_exit_hook(&self, session_name: &str) -> Result<()> {
        let target = pane_target(session_name);
        let hook = format!("kill-session -t {}", exact_target(session_name));
        self.execute(&["set-hook", "-t", &target, "pane-died", &hook])
            .await?;
        Ok(())
    }

    /// Kill a tmux session
    pub async fn kill_session(&self, session_name: &str) -> Result<()> {
        let target = exact_target(session_name);
        self.execute(&["kill-session", "-t", &target]).await?;
        Ok(())
    }

    /// Check if a pane is dead (program has exited)
    pub async fn is_pane_dead(&self, session_name: &str) -> Result<bool> {
        let target = pane_target(session_name);
        let output = self
            .execute(&["list-panes", "-t", &target, "-F", "#{pane_dead}"])
            .await?;

        // Returns "1" if pane is dead, "0" if alive
        Ok(output.lines().next().map(str::trim) == Some("1"))
    }

    /// Exit status of a dead pane's process
    pub async fn pane_exit_status(&self, session_name: &str) -> Result<i32> {
        let target = pane_target(session_name);
        let target = target.as_str();
        let executor = self;
        retry_exit_status(EXIT_STATUS_ATTEMPTS, EXIT_STATUS_RETRY_DELAY, move || async move {
            let output = executor
                .execute(&["list-panes", "-t", target, "-F", "#{pane_dead_status}"])
                .await?;
            Ok(parse_exit_status(&output))
        })
        .await
    }

    /// Send one input event to a tmux session
    pub async fn send_input(&self, session_name: &str, event: &InputEvent) -> Result<()> {
        let target = pane_target(session_name);
        let arg = event.to_tmux_arg();
        if event.is_literal() {
            self.execute(&["send-keys", "-t", &target, "-l", &arg])
                .await?;
        } else {
            self.execute(&["send-keys", "-t", &target, &arg]).await?;
        }
        Ok(())
    }

    /// Capture the visible content of a tmux pane
    pub async fn capture_pane(&self, session_name: &str) -> Result<String> {
        let target = pane_target(session_name);
        self.execute(&["capture-pane", "-t", &target, "-p"])
            .await
            .map_err(|e| TmuxError::CaptureFailed(e.to_string()).into())
    }

    /// Capture the whole scrollback of a tmux pane
    pub async fn capture_history(&self, session_name: &str) -> Result<String> {
        let target = pane_target(session_name);
        self.execute(&["capture-pane", "-t", &target, "-p", "-S", "-", "-E", "-"])
            .await
            .map_err(|e| TmuxError::CaptureFailed(e.to_string()).into())
    }
}

impl Default for TmuxExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix
fn exact_target(session_name: &str) -> String {
    format!("={}", session_name)
}

/// Active pane of the session's current window
fn pane_target(session_name: &str) -> String {
    format!("={}:", session_name)
}

fn parse_exit_status(output: &str) -> Option<i32> {
    output.lines().next()?.trim().parse().ok()
}

/// Run `query` until it yields a status, sleeping `delay` between attempts
async fn retry_exit_status<F, Fut>(attempts: usize, delay: Duration, mut query: F) -> Result<i32>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<i32>>>,
{
    for attempt in 1..=attempts {
        if let Some(status) = query().await? {
            return Ok(status);
        }
        if attempt < attempts {
            debug!("pane_dead_status not reported yet, retrying");
            tokio::time::sleep(delay).await;
        }
    }
    Err(TmuxError::ParseError("pane_dead_status stayed empty".to_string()).into())
}

fn build_create_args(
    session_name: &str,
    command: &str,
    options: &SessionOptions,
    previous_history_limit: Option<u32>,
) -> Vec<String> {
    let target = pane_target(session_name);
    let history_limit = options.history_limit.to_string();
    let mut args: Vec<String> = vec![
        "start-server".into(),
        ";".into(),
        "set-option".into(),
        "-g".into(),
        "history-limit".into(),
        history_limit,
        ";".into(),
        "new-session".into(),
        "-d".into(),
        "-s".into(),
        session_name.into(),
        "-x".into(),
        "200".into(),
        "-y".into(),
        "50".into(),
    ];

    if let Some(dir) = options.working_dir.as_deref().and_then(Path::to_str) {
        args.push("-c".into());
        args.push(dir.into());
    }

    for (key, value) in &options.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }

    args.push(command.into());

    let mut chain = |parts: &[&str]| {
        args.push(";".into());
        args.extend(parts.iter().map(|part| part.to_string()));
    };

    chain(&["set-option", "-t", &target, "remain-on-exit", "on"]);
    // tmux drops the rest of the chain after a failing command, so the
    // server default goes back before any option that could be rejected
    if let Some(limit) = previous_history_limit {
        chain(&["set-option", "-g", "history-limit", &limit.to_string()]);
    }
    chain(&["set-option", "-t", &target, "mouse", if options.mouse { "on" } else { "off" }]);
    chain(&["set-option", "-t", &target, "status-position", &options.status_position]);
    chain(&[
        "set-option",
        "-t",
        &target,
        "status-interval",
        &options.status_interval.to_string(),
    ]);

    args
}
