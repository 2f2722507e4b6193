//! Transport abstraction for outbound chat messages.
//!
//! The engine renders plain text plus labelled controls; a transport
//! binding decides how those appear on the wire. Delivery failures come
//! back as errors and the caller treats them as non-fatal.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::{ChatId, MessageId};

use crate::state::ControlAction;

// ============================================================================
// Controls
// ============================================================================

/// What pressing a control does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// Routed back to the engine as a control press.
    Action(ControlAction),
    /// Client echoes the control label back as a plain text message.
    Reply,
    /// Opens an external URL on the client side, no round trip.
    Link(String),
}

/// A single labelled control attached to a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Control {
    pub label: String,
    pub kind: ControlKind,
}

impl Control {
    pub fn action(label: impl Into<String>, action: ControlAction) -> Self {
        Self {
            label: label.into(),
            kind: ControlKind::Action(action),
        }
    }

    pub fn reply(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ControlKind::Reply,
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind: ControlKind::Link(url.into()),
        }
    }
}

/// Controls laid out in rows, attached to one message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSet {
    pub rows: Vec<Vec<Control>>,
}

impl ControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(mut self, row: Vec<Control>) -> Self {
        self.rows.push(row);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Outbound side of a chat channel.
///
/// `edit_message` replaces the content of an already delivered message;
/// transports that cannot edit should return a delivery error so the
/// engine falls back to a fresh send.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(
        &self,
        chat: &ChatId,
        text: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId>;

    async fn send_photo(
        &self,
        chat: &ChatId,
        photo_url: &str,
        caption: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId>;

    async fn edit_message(
        &self,
        chat: &ChatId,
        message: MessageId,
        text: &str,
        photo_url: Option<&str>,
        controls: Option<&ControlSet>,
    ) -> Result<()>;
}

// ============================================================================
// Mock Transport
// ============================================================================

/// How a recorded delivery went out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentKind {
    Text,
    Photo(String),
    Edit(MessageId),
}

/// One delivery captured by [`MockTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub chat: ChatId,
    pub kind: SentKind,
    pub text: String,
    pub controls: Option<ControlSet>,
    pub id: MessageId,
}

/// In-memory transport for tests.
///
/// Records every delivery in order and can be switched into failing
/// modes for sends and edits independently.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<SentMessage>>,
    next_id: AtomicU64,
    fail_sends: AtomicBool,
    fail_edits: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_edits(&self, fail: bool) {
        self.fail_edits.store(fail, Ordering::SeqCst);
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Just the message texts, in order.
    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|message| message.text)
            .collect()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent().into_iter().last()
    }

    fn record(&self, message: SentMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
    }

    fn allocate_id(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send_text(
        &self,
        chat: &ChatId,
        text: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(VitrineError::Delivery(
                "mock transport set to fail sends".to_string(),
            ));
        }
        let id = self.allocate_id();
        self.record(SentMessage {
            chat: chat.clone(),
            kind: SentKind::Text,
            text: text.to_string(),
            controls: controls.cloned(),
            id,
        });
        Ok(id)
    }

    async fn send_photo(
        &self,
        chat: &ChatId,
        photo_url: &str,
        caption: &str,
        controls: Option<&ControlSet>,
    ) -> Result<MessageId> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(VitrineError::Delivery(
                "mock transport set to fail sends".to_string(),
            ));
        }
        let id = self.allocate_id();
        self.record(SentMessage {
            chat: chat.clone(),
            kind: SentKind::Photo(photo_url.to_string()),
            text: caption.to_string(),
            controls: controls.cloned(),
            id,
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        chat: &ChatId,
        message: MessageId,
        text: &str,
        _photo_url: Option<&str>,
        controls: Option<&ControlSet>,
    ) -> Result<()> {
        if self.fail_edits.load(Ordering::SeqCst) {
            return Err(VitrineError::Delivery(
                "mock transport set to fail edits".to_string(),
            ));
        }
        self.record(SentMessage {
            chat: chat.clone(),
            kind: SentKind::Edit(message),
            text: text.to_string(),
            controls: controls.cloned(),
            id: message,
        });
        Ok(())
    }
}
