//! Foreground tmux session attachment
//!
//! Hands the operator's terminal to `tmux attach-session` and waits for it
//! to return, either because the operator detached or the session ended.

use std::io::{IsTerminal, Write};

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::{Result, TmuxError};

/// Result of a session attachment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachResult {
    /// tmux attach-session exited with this status
    Exited(i32),
    /// tmux attach-session was killed by a signal
    Signaled,
}

impl AttachResult {
    /// Exit code to propagate to the caller
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled => 1,
        }
    }
}

/// Whether stdin is a terminal that tmux can take over
pub fn can_attach() -> bool {
    std::io::stdin().is_terminal()
}

/// Attach to a tmux session with full terminal control
///
/// Blocks (asynchronously) until tmux returns; no timeout applies since the
/// operator decides how long to stay attached.
pub async fn attach_to_session(session_name: &str) -> Result<AttachResult> {
    let _ = std::io::stdout().flush();

    let target = format!("={}", session_name);
    info!("Attaching to tmux session {}", session_name);

    let status = Command::new("tmux")
        .args(["attach-session", "-t", &target])
        .status()
        .await
        .map_err(|e| TmuxError::CommandFailed {
            command: format!("tmux attach-session -t {}", target),
            stderr: e.to_string(),
        })?;

    // Drop keystrokes typed while tmux was tearing down
    flush_stdin();

    let result = match status.code() {
        Some(code) => AttachResult::Exited(code),
        None => {
            warn!("tmux attach-session terminated by signal");
            AttachResult::Signaled
        }
    };

    info!("Attach complete, result: {:?}", result);
    Ok(result)
}

/// Flush any pending input from stdin at the kernel level
fn flush_stdin() {
    use nix::sys::termios::{FlushArg, tcflush};

    if std::io::stdin().is_terminal() {
        let _ = tcflush(std::io::stdin(), FlushArg::TCIFLUSH);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_result_exit_code() {
        assert_eq!(AttachResult::Exited(0).exit_code(), 0);
        assert_eq!(AttachResult::Exited(3).exit_code(), 3);
        assert_eq!(AttachResult::Signaled.exit_code(), 1);
    }
}
