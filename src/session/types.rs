//! Core session types
//!
//! - `Session` is the tmux session hosting the wrapped program
//! - `OutputBuffer` is the bounded line history of a standalone process

use std::collections::VecDeque;
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{Result, SessionError};

/// Lines retained by a standalone process session
pub const OUTPUT_BUFFER_CAPACITY: usize = 100;

static SESSION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap());

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// tmux session being created and checked
    Starting,
    /// Program alive, daemons running
    Running,
    /// Program gone or operator left, daemons shutting down
    Draining,
    /// Session destroyed
    Terminated,
}

impl SessionPhase {
    /// Check if the program may still be driven
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Draining => write!(f, "draining"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// The tmux session owned by the orchestrator
#[derive(Debug, Clone)]
pub struct Session {
    /// tmux session name
    pub name: String,
    /// Command launched in the pane
    pub command: String,
    /// Current lifecycle phase
    pub phase: SessionPhase,
}

impl Session {
    /// Create a session after validating its name
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_session_name(&name)?;
        Ok(Self {
            name,
            command: command.into(),
            phase: SessionPhase::Starting,
        })
    }

    /// Liveness flag
    pub fn is_live(&self) -> bool {
        self.phase.is_live()
    }

    pub fn set_phase(&mut self, phase: SessionPhase) {
        tracing::debug!("Session {} {} -> {}", self.name, self.phase, phase);
        self.phase = phase;
    }
}

/// Reject names tmux would misinterpret as targets or that need quoting
pub fn validate_session_name(name: &str) -> Result<()> {
    if SESSION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(SessionError::InvalidName {
            name: name.to_string(),
            reason: "use 1-64 letters, digits, '-' or '_'".to_string(),
        }
        .into())
    }
}

/// Bounded, ordered history of output lines; oldest evicted first
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_capacity(OUTPUT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// The most recent `count` lines, oldest first
    pub fn last(&self, count: usize) -> Vec<String> {
        let start = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(start).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_name_validation() {
        assert!(validate_session_name("shell-bot").is_ok());
        assert!(validate_session_name("work_2").is_ok());
        assert!(validate_session_name("").is_err());
        assert!(validate_session_name("has space").is_err());
        assert!(validate_session_name("a:b").is_err());
        assert!(validate_session_name("x;kill-server").is_err());
        assert!(validate_session_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_session_starts_in_starting_phase() {
        let mut session = Session::new("demo", "bash").unwrap();
        assert_eq!(session.phase, SessionPhase::Starting);
        assert!(session.is_live());

        session.set_phase(SessionPhase::Draining);
        assert!(!session.is_live());
    }

    #[test]
    fn test_output_buffer_never_exceeds_capacity() {
        let mut buffer = OutputBuffer::new();
        for i in 0..250 {
            buffer.push(format!("line {}", i));
        }
        assert_eq!(buffer.len(), OUTPUT_BUFFER_CAPACITY);
        assert_eq!(buffer.last(1), vec!["line 249".to_string()]);
        assert_eq!(buffer.last(OUTPUT_BUFFER_CAPACITY)[0], "line 150");
    }

    #[test]
    fn test_output_buffer_last_more_than_available() {
        let mut buffer = OutputBuffer::new();
        buffer.push("a");
        buffer.push("b");
        buffer.push("c");
        assert_eq!(buffer.last(10), vec!["a", "b", "c"]);
        assert_eq!(buffer.last(2), vec!["b", "c"]);
        assert!(OutputBuffer::new().last(5).is_empty());
    }
}
