//! Per-chat session state and the shared session store.
//!
//! A session owns at most one flow at a time: either a result set being
//! browsed or an in-progress report draft, never both. The store hands
//! out `Arc<tokio::sync::Mutex<Session>>` handles; holding that lock for
//! the whole turn is what serializes events per identity.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use vitrine_core::error::{Result, VitrineError};
use vitrine_core::types::{ChatId, MessageId, ResultSet};

use crate::state::ChatState;

// ============================================================================
// Session
// ============================================================================

/// Result set under pagination plus the message card it is rendered in.
#[derive(Clone, Debug)]
pub struct SearchSession {
    pub results: ResultSet,
    /// The card message being edited in place, once one was delivered.
    pub card: Option<MessageId>,
}

/// Partially collected problem report.
#[derive(Clone, Debug, Default)]
pub struct ReportDraft {
    pub name: Option<String>,
    pub contact: Option<String>,
}

/// Flow-scoped data, mutually exclusive by flow.
#[derive(Clone, Debug, Default)]
pub enum FlowData {
    #[default]
    None,
    Search(SearchSession),
    Report(ReportDraft),
}

/// One chat's conversation state.
#[derive(Clone, Debug)]
pub struct Session {
    pub chat: ChatId,
    pub state: ChatState,
    pub flow: FlowData,
}

impl Session {
    pub fn new(chat: ChatId) -> Self {
        Self {
            chat,
            state: ChatState::Idle,
            flow: FlowData::None,
        }
    }

    /// Drop the active flow and return to the menu state.
    pub fn reset(&mut self) {
        self.state = ChatState::Idle;
        self.flow = FlowData::None;
    }
}

// ============================================================================
// SessionStore
// ============================================================================

/// Shared map of chat identities to their sessions.
///
/// The outer lock guards only map access and is never held across an
/// await point. Turn-level exclusivity comes from the per-session async
/// mutex: at most one writer per identity, identities independent.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<ChatId, Arc<tokio::sync::Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the session for an identity, creating it on first contact.
    pub fn session(&self, chat: &ChatId) -> Result<Arc<tokio::sync::Mutex<Session>>> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|e| VitrineError::Session(format!("session map lock poisoned: {}", e)))?;
        let entry = sessions
            .entry(chat.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(Session::new(chat.clone()))));
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
