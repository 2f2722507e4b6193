//! Vitrine dialog crate - conversation state machine and engine.
//!
//! The flow is: transport binding receives an inbound event, the engine
//! classifies it into a trigger, the pure dispatcher maps (state,
//! trigger) to an action, and the engine executes that action against
//! the search pipeline, the report sink, and the outbound transport.

pub mod engine;
pub mod render;
pub mod session;
pub mod state;
pub mod transport;

pub use engine::DialogEngine;
pub use session::{FlowData, ReportDraft, SearchSession, Session, SessionStore};
pub use state::{classify_text, dispatch, ChatState, ControlAction, DialogAction, Trigger};
pub use transport::{
    ChatTransport, Control, ControlKind, ControlSet, MockTransport, SentKind, SentMessage,
};
