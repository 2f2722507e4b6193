//! Vitrine API crate - axum HTTP server, route handlers, SSE streaming.
//!
//! Provides the REST surface for the Vitrine application: inbound chat
//! messages and control presses, outbound message streaming (SSE),
//! search preview, catalog lookup, and health checks.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod outbox;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use outbox::{ChannelTransport, OutboundKind, OutboundMessage};
pub use routes::{create_router, start_server};
pub use state::AppState;
