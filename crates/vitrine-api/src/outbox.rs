//! Broadcast-backed outbound transport.
//!
//! Replies from the dialog engine are published onto a broadcast
//! channel; SSE handlers subscribe and stream them to connected
//! clients. Publishing with no live subscriber is a delivery failure,
//! which the engine already treats as non-fatal for the conversation.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::{ChatId, MessageId};
use vitrine_dialog::{ChatTransport, ControlSet};

/// How a subscriber should render an outbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundKind {
    /// Plain text message.
    Text,
    /// Photo with a text caption.
    Photo,
    /// Replaces the content of an earlier message in place.
    Edit,
}

/// One outbound chat message as published to subscribers.
///
/// For `Edit`, `message_id` names the already delivered message whose
/// content is being replaced, not a new one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub chat: ChatId,
    pub message_id: MessageId,
    pub kind: OutboundKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controls: Option<ControlSet>,
}

/// Outbound transport over a tokio broadcast channel.
///
/// Message ids come from a process-local counter, so they are unique
/// for the lifetime of the server but not across restarts.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: broadcast::Sender<OutboundMessage>,
    next_id: AtomicU64,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            next_id: AtomicU64::new(0),
        }
    }

    /// Open a new subscription to the outbound stream.
    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.tx.subscribe()
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn publish(&self, message: OutboundMessage) -> Result<()> {
        self.tx.send(message).map(|_| ()).map_err(|_| {
            VitrineError::Delivery("no outbound subscribers connected".to_string())
        })
    }
}

#[async_trait]
impl ChatTransport for ChannelTransport {
    async fn send_text(
        &self,
        chat: &ChatId,
        text: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId> {
        let id = self.allocate_id();
        self.publish(OutboundMessage {
            chat: chat.clone(),
            message_id: id,
            kind: OutboundKind::Text,
            text: text.to_string(),
            photo_url: None,
            controls: controls.cloned(),
        })?;
        Ok(id)
    }

    async fn send_photo(
        &self,
        chat: &ChatId,
        photo_url: &str,
        caption: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId> {
        let id = self.allocate_id();
        self.publish(OutboundMessage {
            chat: chat.clone(),
            message_id: id,
            kind: OutboundKind::Photo,
            text: caption.to_string(),
            photo_url: Some(photo_url.to_string()),
            controls: controls.cloned(),
        })?;
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat: &ChatId,
        message: MessageId,
        text: &str,
        photo_url: Option<&str>,
        controls: Option<&ControlSet>,
    ) -> Result<()> {
        self.publish(OutboundMessage {
            chat: chat.clone(),
            message_id: message,
            kind: OutboundKind::Edit,
            text: text.to_string(),
            photo_url: photo_url.map(|url| url.to_string()),
            controls: controls.cloned(),
        })
    }
}
