//! The two messages the bot keeps editing or replacing in the owner's chat
//!
//! - `LiveMessageSlot` mirrors the screen, edited in place while possible
//! - `IdleNoticeSlot` holds at most one inactivity notice

use tracing::debug;

use super::format;
use super::transport::{MessageId, RemoteTransport, TransportResult};
use crate::config::ChatId;
use crate::error::TransportError;

/// Outcome of [`LiveMessageSlot::update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotUpdate {
    /// Content equals what was last sent
    Unchanged,
    /// Existing message edited
    Edited,
    /// New message sent and adopted
    Sent,
}

/// Message mirroring the latest screen content
#[derive(Debug, Clone, Default)]
pub struct LiveMessageSlot {
    message_id: Option<MessageId>,
    last_sent: Option<String>,
}

impl LiveMessageSlot {
    pub fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    /// Whether `content` differs from the last block sent
    pub fn is_stale(&self, content: &str) -> bool {
        self.last_sent.as_deref() != Some(content)
    }

    /// Edit the slot's message to show `content`, or send a new one
    pub async fn update(
        &mut self,
        transport: &dyn RemoteTransport,
        chat_id: ChatId,
        content: &str,
    ) -> TransportResult<SlotUpdate> {
        if !self.is_stale(content) {
            return Ok(SlotUpdate::Unchanged);
        }

        let html = format::pre_block(content);

        if let Some(id) = self.message_id {
            match transport.edit_message(chat_id, id, &html).await {
                Ok(()) | Err(TransportError::NotModified) => {
                    self.last_sent = Some(content.to_string());
                    return Ok(SlotUpdate::Edited);
                }
                Err(e) => debug!("Edit of message {} rejected ({}), sending new", id, e),
            }
        }

        let id = transport.send_message(chat_id, &html).await?;
        self.message_id = Some(id);
        self.last_sent = Some(content.to_string());
        Ok(SlotUpdate::Sent)
    }

    /// Forget the current message so the next update lands below newer chat traffic
    pub fn reset(&mut self) {
        self.message_id = None;
        self.last_sent = None;
    }
}

/// The single outstanding inactivity notice
#[derive(Debug, Clone, Default)]
pub struct IdleNoticeSlot {
    message_id: Option<MessageId>,
}

impl IdleNoticeSlot {
    pub fn is_shown(&self) -> bool {
        self.message_id.is_some()
    }

    /// Replace any previous notice with `html`
    pub async fn replace(
        &mut self,
        transport: &dyn RemoteTransport,
        chat_id: ChatId,
        html: &str,
    ) -> TransportResult<()> {
        self.retract(transport, chat_id).await;
        let id = transport.send_message(chat_id, html).await?;
        self.message_id = Some(id);
        Ok(())
    }

    /// Delete the outstanding notice; failures are ignored
    pub async fn retract(&mut self, transport: &dyn RemoteTransport, chat_id: ChatId) {
        if let Some(id) = self.message_id.take() {
            if let Err(e) = transport.delete_message(chat_id, id).await {
                debug!("Could not delete idle notice {}: {}", id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::{Call, FakeTransport};
    use pretty_assertions::assert_eq;

    const CHAT: ChatId = 42;

    #[tokio::test]
    async fn test_first_update_sends_then_edits() {
        let transport = FakeTransport::default();
        let mut slot = LiveMessageSlot::default();

        assert_eq!(slot.update(&transport, CHAT, "one").await.unwrap(), SlotUpdate::Sent);
        assert_eq!(slot.update(&transport, CHAT, "two").await.unwrap(), SlotUpdate::Edited);

        assert_eq!(
            transport.calls(),
            vec![
                Call::Send { chat_id: CHAT, id: 1, html: "<pre>one</pre>".into() },
                Call::Edit { chat_id: CHAT, id: 1, html: "<pre>two</pre>".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_identical_content_is_not_resent() {
        let transport = FakeTransport::default();
        let mut slot = LiveMessageSlot::default();

        slot.update(&transport, CHAT, "same").await.unwrap();
        assert_eq!(slot.update(&transport, CHAT, "same").await.unwrap(), SlotUpdate::Unchanged);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_not_modified_keeps_slot() {
        let transport = FakeTransport::default();
        let mut slot = LiveMessageSlot::default();
        slot.update(&transport, CHAT, "a").await.unwrap();

        transport.fail_next_edit(TransportError::NotModified);
        assert_eq!(slot.update(&transport, CHAT, "b").await.unwrap(), SlotUpdate::Edited);
        assert_eq!(slot.message_id(), Some(1));
        assert_eq!(transport.sent_texts().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_edit_sends_new_message() {
        let transport = FakeTransport::default();
        let mut slot = LiveMessageSlot::default();
        slot.update(&transport, CHAT, "a").await.unwrap();

        transport.fail_next_edit(TransportError::Api {
            method: "editMessageText".into(),
            description: "message to edit not found".into(),
        });
        assert_eq!(slot.update(&transport, CHAT, "b").await.unwrap(), SlotUpdate::Sent);
        assert_eq!(slot.message_id(), Some(2));
    }

    #[tokio::test]
    async fn test_reset_sends_below_new_traffic() {
        let transport = FakeTransport::default();
        let mut slot = LiveMessageSlot::default();
        slot.update(&transport, CHAT, "a").await.unwrap();

        slot.reset();
        assert_eq!(slot.update(&transport, CHAT, "a").await.unwrap(), SlotUpdate::Sent);
    }

    #[tokio::test]
    async fn test_idle_notice_replaces_previous() {
        let transport = FakeTransport::default();
        let mut notice = IdleNoticeSlot::default();

        notice.replace(&transport, CHAT, "idle").await.unwrap();
        notice.replace(&transport, CHAT, "still idle").await.unwrap();
        notice.retract(&transport, CHAT).await;
        notice.retract(&transport, CHAT).await;

        assert!(!notice.is_shown());
        assert_eq!(
            transport.calls(),
            vec![
                Call::Send { chat_id: CHAT, id: 1, html: "idle".into() },
                Call::Delete { chat_id: CHAT, id: 1 },
                Call::Send { chat_id: CHAT, id: 2, html: "still idle".into() },
                Call::Delete { chat_id: CHAT, id: 2 },
            ]
        );
    }
}
