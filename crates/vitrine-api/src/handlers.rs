//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters via axum extractors,
//! drives the dialog engine or search pipeline, and returns JSON
//! responses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use vitrine_core::types::{ChatId, SearchOutcome};
use vitrine_dialog::ControlAction;

use crate::error::ApiError;
use crate::state::AppState;

/// Upper bound on `k` for the search preview endpoint.
const MAX_PREVIEW_K: usize = 50;

// =============================================================================
// Request types
// =============================================================================

/// Request body for POST /chat/{chat_id}/message.
#[derive(Debug, Deserialize)]
pub struct ChatMessageBody {
    /// The raw message text as typed by the user.
    pub text: String,
}

/// Request body for POST /chat/{chat_id}/control.
#[derive(Debug, Deserialize)]
pub struct ChatControlBody {
    /// Which control was pressed.
    pub action: ControlAction,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OutboxParams {
    /// Restrict the stream to one conversation.
    pub chat: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: u64,
    pub catalog_items: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatAck {
    pub accepted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchPreviewItem {
    pub rank: usize,
    pub title: String,
    pub category: String,
    pub description: String,
    pub price: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchPreviewResponse {
    pub outcome: String,
    pub count: usize,
    pub items: Vec<SearchPreviewItem>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogItemResponse {
    pub position: i64,
    pub title: String,
    pub category: String,
    pub description: String,
    pub price: Option<String>,
    pub photos: Vec<String>,
    pub url: Option<String>,
}

// =============================================================================
// Chat endpoints
// =============================================================================

/// POST /chat/{chat_id}/message - feed one inbound text message to the engine.
pub async fn chat_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<ChatMessageBody>,
) -> Result<Json<ChatAck>, ApiError> {
    let chat = ChatId(chat_id);
    state
        .engine
        .handle_message(&chat, &body.text)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ChatAck { accepted: true }))
}

/// POST /chat/{chat_id}/control - feed one control press to the engine.
pub async fn chat_control(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(body): Json<ChatControlBody>,
) -> Result<Json<ChatAck>, ApiError> {
    let chat = ChatId(chat_id);
    state
        .engine
        .handle_control(&chat, body.action)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(ChatAck { accepted: true }))
}

/// GET /chat/outbox - SSE stream of outbound chat messages.
///
/// With `?chat=<id>` the stream carries only that conversation.
pub async fn outbox(
    State(state): State<AppState>,
    Query(params): Query<OutboxParams>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.outbox.subscribe();
    let filter = params.chat.map(ChatId);
    let stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(message) => {
            if let Some(chat) = &filter {
                if &message.chat != chat {
                    return None;
                }
            }
            let data = serde_json::to_string(&message).unwrap_or_default();
            Some(Ok(Event::default().event("message").data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// GET /events - SSE stream of domain events.
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.engine.subscribe_events();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.event_name()).data(data)))
        }
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

// =============================================================================
// Search and catalog endpoints
// =============================================================================

/// GET /search - run the search pipeline without touching any session.
pub async fn search_preview(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchPreviewResponse>, ApiError> {
    let query = params
        .q
        .ok_or_else(|| ApiError::BadRequest("Missing query parameter 'q'".to_string()))?;
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Query parameter 'q' must not be empty".to_string(),
        ));
    }

    let k = params
        .k
        .unwrap_or_else(|| state.engine.pipeline().top_k())
        .clamp(1, MAX_PREVIEW_K);

    let outcome = state
        .engine
        .pipeline()
        .run_with_k(&query, k)
        .await
        .map_err(ApiError::from)?;

    let response = match outcome {
        SearchOutcome::Found(results) => {
            let items: Vec<SearchPreviewItem> = results
                .items()
                .iter()
                .enumerate()
                .map(|(rank, item)| SearchPreviewItem {
                    rank: rank + 1,
                    title: item.title.clone(),
                    category: item.category.clone(),
                    description: item.description.clone(),
                    price: item.price.clone(),
                    url: item.url.clone(),
                })
                .collect();
            SearchPreviewResponse {
                outcome: "found".to_string(),
                count: items.len(),
                items,
            }
        }
        SearchOutcome::NoResults => SearchPreviewResponse {
            outcome: "no_results".to_string(),
            count: 0,
            items: Vec::new(),
        },
    };

    Ok(Json(response))
}

/// GET /catalog/{position} - look up one catalog item by row position.
pub async fn catalog_item(
    State(state): State<AppState>,
    Path(position): Path<i64>,
) -> Result<Json<CatalogItemResponse>, ApiError> {
    let catalog = state.engine.pipeline().catalog();
    let item = catalog
        .get(position)
        .ok_or_else(|| ApiError::NotFound(format!("No catalog item at position {}", position)))?;

    Ok(Json(CatalogItemResponse {
        position,
        title: item.title.clone(),
        category: item.category.clone(),
        description: item.description.clone(),
        price: item.price.clone(),
        photos: item.photos.clone(),
        url: item.url.clone(),
    }))
}

// =============================================================================
// Health endpoint
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let uptime = state.start_time.elapsed().as_secs();

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: "0.1.0".to_string(),
        uptime_secs: uptime,
        active_sessions: state.engine.sessions().len() as u64,
        catalog_items: state.engine.pipeline().catalog().len() as u64,
    }))
}
