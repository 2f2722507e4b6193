use serde::{Deserialize, Serialize};

use crate::types::{ChatId, SearchStage, Timestamp};

/// All domain events that can occur in the Vitrine system.
///
/// Events are emitted by the dialog engine after state changes and consumed by:
/// - The SSE broadcast channel (for operator dashboards)
/// - The event log (for audit/debugging)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DomainEvent {
    // =========================================================================
    // Search Events
    // =========================================================================
    /// A catalog search ran to completion.
    SearchPerformed {
        chat: ChatId,
        query: String,
        result_count: usize,
        latency_ms: u64,
        timestamp: Timestamp,
    },

    /// A catalog search failed before producing results.
    SearchFailed {
        chat: ChatId,
        stage: SearchStage,
        reason: String,
        timestamp: Timestamp,
    },

    /// The result cursor moved to another item.
    ResultPaged {
        chat: ChatId,
        cursor: usize,
        result_count: usize,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Dialog Events
    // =========================================================================
    /// An in-progress flow was cancelled by the user.
    FlowCancelled {
        chat: ChatId,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Report Events
    // =========================================================================
    /// A problem report was persisted.
    ReportSubmitted {
        chat: ChatId,
        timestamp: Timestamp,
    },

    /// A completed problem report could not be persisted.
    ReportPersistFailed {
        chat: ChatId,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Delivery Events
    // =========================================================================
    /// An outbound message could not be delivered.
    DeliveryFailed {
        chat: ChatId,
        reason: String,
        timestamp: Timestamp,
    },

    // =========================================================================
    // Application Lifecycle Events
    // =========================================================================
    /// Application started successfully.
    ApplicationStarted {
        version: String,
        config_path: String,
        timestamp: Timestamp,
    },
}

impl DomainEvent {
    /// Returns the timestamp of the event.
    pub fn timestamp(&self) -> Timestamp {
        match self {
            DomainEvent::SearchPerformed { timestamp, .. }
            | DomainEvent::SearchFailed { timestamp, .. }
            | DomainEvent::ResultPaged { timestamp, .. }
            | DomainEvent::FlowCancelled { timestamp, .. }
            | DomainEvent::ReportSubmitted { timestamp, .. }
            | DomainEvent::ReportPersistFailed { timestamp, .. }
            | DomainEvent::DeliveryFailed { timestamp, .. }
            | DomainEvent::ApplicationStarted { timestamp, .. } => *timestamp,
        }
    }

    /// Returns a human-readable event name for logging and SSE.
    pub fn event_name(&self) -> &'static str {
        match self {
            DomainEvent::SearchPerformed { .. } => "search_performed",
            DomainEvent::SearchFailed { .. } => "search_failed",
            DomainEvent::ResultPaged { .. } => "result_paged",
            DomainEvent::FlowCancelled { .. } => "flow_cancelled",
            DomainEvent::ReportSubmitted { .. } => "report_submitted",
            DomainEvent::ReportPersistFailed { .. } => "report_persist_failed",
            DomainEvent::DeliveryFailed { .. } => "delivery_failed",
            DomainEvent::ApplicationStarted { .. } => "application_started",
        }
    }
}
