//! The surface the bot drives: a tmux pane or a standalone process

use async_trait::async_trait;
use tracing::debug;

use crate::error::Result;
use crate::tmux::{InputEvent, SpecialKey, TmuxExecutor};

/// Something that renders output and accepts keyboard input
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Current screen (or recent output) as raw text
    async fn capture(&self) -> Result<String>;

    /// Type text without submitting it
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Press Enter
    async fn send_enter(&self) -> Result<()>;

    /// Ctrl-C for a pane, termination for a standalone process
    async fn interrupt(&self) -> Result<()>;

    /// Tear the session down entirely
    async fn terminate(&self) -> Result<()>;

    /// Whether the program can still be driven
    async fn is_alive(&self) -> bool;

    /// Type a line and submit it
    async fn send_line(&self, text: &str) -> Result<()> {
        self.send_text(text).await?;
        self.send_enter().await
    }
}

/// Backend for the orchestrator's tmux pane
#[derive(Clone)]
pub struct TmuxBackend {
    executor: TmuxExecutor,
    session_name: String,
}

impl TmuxBackend {
    pub fn new(executor: TmuxExecutor, session_name: impl Into<String>) -> Self {
        Self {
            executor,
            session_name: session_name.into(),
        }
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }
}

#[async_trait]
impl SessionBackend for TmuxBackend {
    async fn capture(&self) -> Result<String> {
        self.executor.capture_pane(&self.session_name).await
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.executor
            .send_input(&self.session_name, &InputEvent::Text(text.to_string()))
            .await
    }

    async fn send_enter(&self) -> Result<()> {
        self.executor
            .send_input(&self.session_name, &InputEvent::Key(SpecialKey::Enter))
            .await
    }

    async fn interrupt(&self) -> Result<()> {
        self.executor
            .send_input(&self.session_name, &InputEvent::interrupt())
            .await
    }

    async fn terminate(&self) -> Result<()> {
        self.executor.kill_session(&self.session_name).await
    }

    async fn is_alive(&self) -> bool {
        match self.executor.session_exists(&self.session_name).await {
            Ok(exists) => exists,
            Err(e) => {
                // A timed-out check is transient; keep the daemons running
                debug!("Liveness check failed: {}", e);
                true
            }
        }
    }
}
