//! Application state shared across all route handlers.
//!
//! AppState holds references to the dialog engine and shared resources.
//! It is passed to handlers via axum's State extractor.

use std::sync::Arc;
use std::time::Instant;

use vitrine_core::config::VitrineConfig;
use vitrine_dialog::DialogEngine;

use crate::outbox::ChannelTransport;

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<VitrineConfig>,
    /// Conversation engine handling every inbound chat turn.
    pub engine: Arc<DialogEngine>,
    /// Outbound message channel the engine delivers through.
    pub outbox: Arc<ChannelTransport>,
    /// Bearer token required on protected routes.
    pub api_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Create a new AppState with the given components.
    pub fn new(
        config: VitrineConfig,
        engine: Arc<DialogEngine>,
        outbox: Arc<ChannelTransport>,
        api_token: String,
    ) -> Self {
        Self {
            config: Arc::new(config),
            engine,
            outbox,
            api_token,
            start_time: Instant::now(),
        }
    }
}
