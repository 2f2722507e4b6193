//! Conversation state machine with a single transition table.
//!
//! Triggers are classified from raw inbound events, then dispatched
//! against (state, trigger) to a bound action. The dispatcher is pure:
//! it never touches a session, a transport, or the pipeline, so the
//! whole table is testable in isolation. Pairs outside the table map to
//! `DialogAction::Ignore`.

use serde::{Deserialize, Serialize};

use crate::render::{LABEL_BROWSE, LABEL_REPORT};

// ============================================================================
// States and Triggers
// ============================================================================

/// Where a chat currently is in the conversation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    #[default]
    Idle,
    AwaitingQuery,
    BrowsingResults,
    AwaitingName,
    AwaitingPhone,
    AwaitingProblem,
}

/// Interactive control presses a transport can route back to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Next,
    Prev,
    Menu,
}

/// A classified inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Start,
    Cancel,
    Browse,
    Report,
    Next,
    Prev,
    Menu,
    Text(String),
}

impl From<ControlAction> for Trigger {
    fn from(action: ControlAction) -> Self {
        match action {
            ControlAction::Next => Trigger::Next,
            ControlAction::Prev => Trigger::Prev,
            ControlAction::Menu => Trigger::Menu,
        }
    }
}

/// Classify raw message text into a trigger.
///
/// Commands are matched case-insensitively after trimming; the main
/// menu button labels double as the browse/report triggers because
/// menu buttons echo their label as plain text. Everything else is
/// free text, kept verbatim.
pub fn classify_text(text: &str) -> Trigger {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("/start") {
        return Trigger::Start;
    }
    if trimmed.eq_ignore_ascii_case("/cancel") {
        return Trigger::Cancel;
    }
    if trimmed == LABEL_BROWSE {
        return Trigger::Browse;
    }
    if trimmed == LABEL_REPORT {
        return Trigger::Report;
    }
    Trigger::Text(text.to_string())
}

// ============================================================================
// Dispatch
// ============================================================================

/// The action a (state, trigger) pair binds to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogAction {
    /// Reset the session and present the main menu.
    ShowMenu,
    /// Discard flow data, acknowledge the cancel, return to the menu.
    CancelFlow,
    /// Ask for a search query.
    PromptQuery,
    /// Ask for the reporter's name.
    PromptName,
    /// Run the search pipeline on the captured query.
    RunSearch(String),
    /// Step the result cursor forward.
    PageNext,
    /// Step the result cursor backward.
    PagePrev,
    /// Discard the result set and return to the menu.
    LeaveResults,
    /// Store the reporter's name, ask for contact details.
    CaptureName(String),
    /// Store the contact details, ask for the problem description.
    CaptureContact(String),
    /// Complete and submit the report.
    SubmitReport(String),
    /// Pair is outside the transition table.
    Ignore,
}

/// Look up the action bound to (state, trigger).
///
/// Start is an unconditional entry point; cancel only applies while a
/// flow is active.
pub fn dispatch(state: ChatState, trigger: &Trigger) -> DialogAction {
    match (state, trigger) {
        (_, Trigger::Start) => DialogAction::ShowMenu,
        (ChatState::Idle, Trigger::Cancel) => DialogAction::Ignore,
        (_, Trigger::Cancel) => DialogAction::CancelFlow,
        (ChatState::Idle, Trigger::Browse) => DialogAction::PromptQuery,
        (ChatState::Idle, Trigger::Report) => DialogAction::PromptName,
        (ChatState::AwaitingQuery, Trigger::Text(query)) => DialogAction::RunSearch(query.clone()),
        (ChatState::BrowsingResults, Trigger::Next) => DialogAction::PageNext,
        (ChatState::BrowsingResults, Trigger::Prev) => DialogAction::PagePrev,
        (ChatState::BrowsingResults, Trigger::Menu) => DialogAction::LeaveResults,
        (ChatState::AwaitingName, Trigger::Text(name)) => DialogAction::CaptureName(name.clone()),
        (ChatState::AwaitingPhone, Trigger::Text(contact)) => {
            DialogAction::CaptureContact(contact.clone())
        }
        (ChatState::AwaitingProblem, Trigger::Text(problem)) => {
            DialogAction::SubmitReport(problem.clone())
        }
        _ => DialogAction::Ignore,
    }
}
