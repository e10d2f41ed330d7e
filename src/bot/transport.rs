//! Remote chat transport seam
//!
//! The bot only needs long-polling for incoming messages plus send, edit,
//! delete and file download. Outgoing text is HTML.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ChatId;
use crate::error::TransportError;

/// Identifier of a sent message, scoped to its chat
pub type MessageId = i64;

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Kinds of files an operator can send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Document,
    Audio,
    Voice,
}

impl AttachmentKind {
    /// File extension used when the transport gives no file name
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Document => "bin",
            Self::Audio => "mp3",
            Self::Voice => "ogg",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Photo => write!(f, "photo"),
            Self::Document => write!(f, "document"),
            Self::Audio => write!(f, "audio"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// A file attached to an incoming message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// Transport handle used to download the file
    pub file_id: String,
    pub file_name: Option<String>,
}

impl Attachment {
    /// File name to save under, made safe for the local filesystem
    pub fn local_name(&self) -> String {
        let name = self
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).file_name())
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty() && *n != "..")
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.{}", self.kind, self.kind.default_extension()));
        format!("{}-{}", uuid::Uuid::new_v4().simple(), name)
    }
}

/// What an operator sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingContent {
    Text(String),
    Attachment(Attachment),
}

/// One operator message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub content: IncomingContent,
}

impl IncomingMessage {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            content: IncomingContent::Text(text.into()),
        }
    }
}

/// Result of one long-poll
#[derive(Debug, Clone, Default)]
pub struct PollBatch {
    /// Offset to acknowledge on the next poll, if any update arrived
    pub next_offset: Option<i64>,
    pub messages: Vec<IncomingMessage>,
}

/// Remote messaging surface used by the bot
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Wait up to `timeout` for updates after `offset`
    async fn poll(&self, offset: i64, timeout: Duration) -> TransportResult<PollBatch>;

    /// Send an HTML message and return its id
    async fn send_message(&self, chat_id: ChatId, html: &str) -> TransportResult<MessageId>;

    /// Replace the text of a previously sent message
    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        html: &str,
    ) -> TransportResult<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()>;

    /// Download an attachment into `dest`
    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_name_strips_directories() {
        let attachment = Attachment {
            kind: AttachmentKind::Document,
            file_id: "f1".to_string(),
            file_name: Some("../../etc/passwd".to_string()),
        };
        let name = attachment.local_name();
        assert!(name.ends_with("-passwd"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_local_name_defaults_by_kind() {
        let attachment = Attachment {
            kind: AttachmentKind::Voice,
            file_id: "f2".to_string(),
            file_name: None,
        };
        assert!(attachment.local_name().ends_with("-voice.ogg"));
    }
}
