//! Telegram Bot API transport over reqwest

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::transport::{
    Attachment, AttachmentKind, IncomingContent, IncomingMessage, MessageId, PollBatch,
    RemoteTransport, TransportResult,
};
use crate::config::ChatId;
use crate::error::TransportError;

/// Timeout for every call except long-polls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added on top of the long-poll duration
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUpdate {
    update_id: i64,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    chat: RawChat,
    text: Option<String>,
    #[serde(default)]
    photo: Vec<RawFile>,
    document: Option<RawFile>,
    audio: Option<RawFile>,
    voice: Option<RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawChat {
    id: ChatId,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    file_id: String,
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct EditMessage<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Serialize)]
struct DeleteMessage {
    chat_id: ChatId,
    message_id: MessageId,
}

#[derive(Serialize)]
struct GetFile<'a> {
    file_id: &'a str,
}

impl TelegramClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> TransportResult<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(TransportError::MissingToken);
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Option<Duration>) -> TransportResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Error texts must never carry the token-bearing URL
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.without_url().to_string()))?;

        let parsed: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.without_url().to_string()))?;

        into_result(method, parsed)
    }
}

fn into_result<T>(method: &str, response: ApiResponse<T>) -> TransportResult<T> {
    if response.ok {
        return response
            .result
            .ok_or_else(|| TransportError::Malformed(format!("{method}: missing result")));
    }

    let description = response.description.unwrap_or_default();
    if description.contains("message is not modified") {
        return Err(TransportError::NotModified);
    }
    Err(TransportError::Api {
        method: method.to_string(),
        description,
    })
}

fn convert_message(message: RawMessage) -> Option<IncomingMessage> {
    let chat_id = message.chat.id;

    let attachment = |kind: AttachmentKind, file: RawFile| IncomingMessage {
        chat_id,
        content: IncomingContent::Attachment(Attachment {
            kind,
            file_id: file.file_id,
            file_name: file.file_name,
        }),
    };

    // Photos arrive in ascending sizes
    if let Some(photo) = message.photo.into_iter().last() {
        return Some(attachment(AttachmentKind::Photo, photo));
    }
    if let Some(document) = message.document {
        return Some(attachment(AttachmentKind::Document, document));
    }
    if let Some(audio) = message.audio {
        return Some(attachment(AttachmentKind::Audio, audio));
    }
    if let Some(voice) = message.voice {
        return Some(attachment(AttachmentKind::Voice, voice));
    }

    message.text.map(|text| IncomingMessage::text(chat_id, text))
}

fn into_batch(updates: Vec<RawUpdate>) -> PollBatch {
    let next_offset = updates.iter().map(|u| u.update_id + 1).max();
    let messages = updates
        .into_iter()
        .filter_map(|u| u.message)
        .filter_map(convert_message)
        .collect();
    PollBatch {
        next_offset,
        messages,
    }
}

#[async_trait]
impl RemoteTransport for TelegramClient {
    async fn poll(&self, offset: i64, timeout: Duration) -> TransportResult<PollBatch> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };
        let updates: Vec<RawUpdate> = self
            .call("getUpdates", &body, Some(timeout + POLL_GRACE))
            .await?;
        Ok(into_batch(updates))
    }

    #[instrument(skip(self, html))]
    async fn send_message(&self, chat_id: ChatId, html: &str) -> TransportResult<MessageId> {
        let body = SendMessage {
            chat_id,
            text: html,
            parse_mode: "HTML",
        };
        let sent: SentMessage = self.call("sendMessage", &body, None).await?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        html: &str,
    ) -> TransportResult<()> {
        let body = EditMessage {
            chat_id,
            message_id,
            text: html,
            parse_mode: "HTML",
        };
        // Result is the edited message or `true`
        let _: serde_json::Value = self.call("editMessageText", &body, None).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> TransportResult<()> {
        let body = DeleteMessage {
            chat_id,
            message_id,
        };
        let _: bool = self.call("deleteMessage", &body, None).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, file_id: &str, dest: &Path) -> TransportResult<PathBuf> {
        let info: FileInfo = self.call("getFile", &GetFile { file_id }, None).await?;
        let remote_path = info
            .file_path
            .ok_or_else(|| TransportError::Download("file is not downloadable".to_string()))?;

        let url = format!("{}/file/bot{}/{}", self.base_url, self.token, remote_path);
        let bytes = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TransportError::Download(e.without_url().to_string()))?
            .bytes()
            .await
            .map_err(|e| TransportError::Download(e.without_url().to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::Download(e.to_string()))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| TransportError::Download(e.to_string()))?;

        debug!("Downloaded {} bytes to {:?}", bytes.len(), dest);
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_updates(json: &str) -> PollBatch {
        let response: ApiResponse<Vec<RawUpdate>> = serde_json::from_str(json).unwrap();
        into_batch(into_result("getUpdates", response).unwrap())
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            TelegramClient::new("  ", "https://example.invalid"),
            Err(TransportError::MissingToken)
        ));
    }

    #[test]
    fn test_parse_text_and_photo_updates() {
        let batch = parse_updates(
            r#"{"ok": true, "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 7}, "text": "ls"}},
                {"update_id": 11, "message": {"message_id": 2, "chat": {"id": 7},
                    "photo": [{"file_id": "small"}, {"file_id": "large"}]}},
                {"update_id": 12, "edited_message": {}}
            ]}"#,
        );

        assert_eq!(batch.next_offset, Some(13));
        assert_eq!(batch.messages.len(), 2);
        assert_eq!(batch.messages[0], IncomingMessage::text(7, "ls"));
        match &batch.messages[1].content {
            IncomingContent::Attachment(a) => {
                assert_eq!(a.kind, AttachmentKind::Photo);
                assert_eq!(a.file_id, "large");
            }
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn test_parse_document_keeps_file_name() {
        let batch = parse_updates(
            r#"{"ok": true, "result": [{"update_id": 1, "message": {"chat": {"id": 3},
                "document": {"file_id": "doc", "file_name": "notes.txt"}, "caption": "hi"}}]}"#,
        );
        assert_eq!(
            batch.messages[0].content,
            IncomingContent::Attachment(Attachment {
                kind: AttachmentKind::Document,
                file_id: "doc".into(),
                file_name: Some("notes.txt".into()),
            })
        );
    }

    #[test]
    fn test_not_modified_is_distinguished() {
        let response: ApiResponse<serde_json::Value> = serde_json::from_str(
            r#"{"ok": false, "error_code": 400,
                "description": "Bad Request: message is not modified: specified new message content is the same"}"#,
        )
        .unwrap();
        assert!(matches!(
            into_result("editMessageText", response),
            Err(TransportError::NotModified)
        ));
    }

    #[test]
    fn test_api_error_carries_description() {
        let response: ApiResponse<bool> =
            serde_json::from_str(r#"{"ok": false, "description": "Forbidden: bot was blocked"}"#)
                .unwrap();
        match into_result("sendMessage", response) {
            Err(TransportError::Api {
                method,
                description,
            }) => {
                assert_eq!(method, "sendMessage");
                assert!(description.contains("blocked"));
            }
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_empty_poll_has_no_offset() {
        let batch = parse_updates(r#"{"ok": true, "result": []}"#);
        assert_eq!(batch.next_offset, None);
        assert!(batch.messages.is_empty());
    }
}
