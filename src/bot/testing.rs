//! In-memory transport and backend shared by the bot's unit tests

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::transport::{MessageId, PollBatch, RemoteTransport, TransportResult};
use crate::config::ChatId;
use crate::error::{Result, SessionError, TransportError};
use crate::session::SessionBackend;

/// What the fake transport was asked to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send { chat_id: ChatId, id: MessageId, html: String },
    Edit { chat_id: ChatId, id: MessageId, html: String },
    Delete { chat_id: ChatId, id: MessageId },
}

#[derive(Default)]
pub struct FakeTransport {
    next_id: AtomicI64,
    pub calls: Mutex<Vec<Call>>,
    /// Errors returned by upcoming edits, in order
    pub edit_errors: Mutex<VecDeque<TransportError>>,
    pub batches: Mutex<VecDeque<PollBatch>>,
    /// While set, sends wait for `release_sends`
    held: AtomicBool,
    released: tokio::sync::Notify,
}

impl FakeTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Send { html, .. } => Some(html),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
        self.next_id.store(0, Ordering::SeqCst);
    }

    pub fn fail_next_edit(&self, error: TransportError) {
        self.edit_errors.lock().unwrap().push_back(error);
    }

    /// Park the next send until `release_sends`
    pub fn hold_sends(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release_sends(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.released.notify_one();
    }
}

#[async_trait]
impl RemoteTransport for FakeTransport {
    async fn poll(&self, _offset: i64, timeout: Duration) -> TransportResult<PollBatch> {
        let batch = self.batches.lock().unwrap().pop_front();
        match batch {
            Some(batch) => Ok(batch),
            None => {
                tokio::time::sleep(timeout.min(Duration::from_millis(10))).await;
                Ok(PollBatch::default())
            }
        }
    }

    async fn send_message(&self, chat_id: ChatId, html: &str) -> TransportResult<MessageId> {
        if self.held.load(Ordering::SeqCst) {
            self.released.notified().await;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().unwrap().push(Call::Send {
            chat_id,
            id,
            html: html.to_string(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        html: &str,
    ) -> TransportResult<()> {
        if let Some(error) = self.edit_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.calls.lock().unwrap().push(Call::Edit {
            chat_id,
            id: message_id,
            html: html.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        self.calls.lock().unwrap().push(Call::Delete {
            chat_id,
            id: message_id,
        });
        Ok(())
    }

    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<PathBuf> {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransportError::Download(e.to_string()))?;
        }
        std::fs::write(dest, file_id).map_err(|e| TransportError::Download(e.to_string()))?;
        Ok(dest.to_path_buf())
    }
}

/// Backend recording what the bot typed
#[derive(Default)]
pub struct FakeBackend {
    pub screen: Mutex<String>,
    pub typed: Mutex<Vec<String>>,
    pub interrupted: AtomicBool,
    pub terminated: AtomicBool,
}

impl FakeBackend {
    pub fn set_screen(&self, screen: &str) {
        *self.screen.lock().unwrap() = screen.to_string();
    }

    pub fn typed(&self) -> Vec<String> {
        self.typed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionBackend for FakeBackend {
    async fn capture(&self) -> Result<String> {
        Ok(self.screen.lock().unwrap().clone())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.typed.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn send_enter(&self) -> Result<()> {
        self.typed.lock().unwrap().push("<enter>".to_string());
        Ok(())
    }

    async fn interrupt(&self) -> Result<()> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(SessionError::NotRunning.into());
        }
        self.interrupted.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn terminate(&self) -> Result<()> {
        self.terminated.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst)
    }
}
