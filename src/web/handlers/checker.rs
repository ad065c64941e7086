//! Manual triggers and queue endpoints
//!
//! Triggers that mutate upstream state are rejected with 409 while
//! stream-checking work is active.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::errors::AppError;
use crate::web::{AppState, handle_result};

pub async fn refresh_playlist(State(state): State<AppState>) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        let refreshed = state.engine.refresh_playlists().await?;
        Ok(serde_json::json!({ "accounts_refreshed": refreshed }))
    }
    .await;
    handle_result(result)
}

pub async fn discover_streams(State(state): State<AppState>) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        state.engine.discover_streams().await
    }
    .await;
    handle_result(result)
}

pub async fn global_action(State(state): State<AppState>) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        state.engine.run_global_action().await?;
        Ok(serde_json::json!({ "completed": true }))
    }
    .await;
    handle_result(result)
}

#[derive(Debug, Deserialize)]
pub struct CheckSingleChannelRequest {
    pub channel_id: i64,
}

pub async fn check_single_channel(
    State(state): State<AppState>,
    Json(request): Json<CheckSingleChannelRequest>,
) -> Response {
    let result = state
        .engine
        .check_single_channel(request.channel_id)
        .await
        .map(|_| serde_json::json!({ "queued": request.channel_id }));
    handle_result(result)
}

pub async fn test_streams_without_stats(State(state): State<AppState>) -> Response {
    let result = state
        .engine
        .test_streams_without_stats()
        .await
        .map(|queued| serde_json::json!({ "channels_queued": queued }));
    handle_result(result)
}

pub async fn rescore_resort(State(state): State<AppState>) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        let rewritten = state.engine.rescore_resort_all().await?;
        Ok(serde_json::json!({ "channels_rewritten": rewritten }))
    }
    .await;
    handle_result(result)
}

pub async fn apply_account_limits(State(state): State<AppState>) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        let trimmed = state.engine.apply_account_limits_to_existing_channels().await?;
        Ok(serde_json::json!({ "channels_trimmed": trimmed }))
    }
    .await;
    handle_result(result)
}

pub async fn queue_state(State(state): State<AppState>) -> Response {
    let stats = state.engine.queue.stats().await;
    let pending = state.engine.queue.pending_entries().await;
    let in_progress = state.engine.queue.in_progress_channels().await;
    Json(serde_json::json!({
        "size": stats.size,
        "in_progress": stats.in_progress,
        "completed": stats.completed,
        "failed": stats.failed,
        "pending": pending.iter().map(|e| serde_json::json!({
            "channel_id": e.channel_id,
            "priority": e.priority,
            "enqueued_at": e.enqueued_at,
            "force_check": e.force_check,
        })).collect::<Vec<_>>(),
        "in_progress_channels": in_progress,
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
pub struct QueueAddRequest {
    pub channel_ids: Vec<i64>,
    #[serde(default)]
    pub priority: i32,
}

pub async fn queue_add(
    State(state): State<AppState>,
    Json(request): Json<QueueAddRequest>,
) -> Response {
    let result = async {
        if request.channel_ids.is_empty() {
            return Err(AppError::validation_field(
                "channel_ids must not be empty",
                "channel_ids",
            ));
        }
        let mut queued = 0usize;
        for channel_id in &request.channel_ids {
            if state
                .engine
                .queue
                .enqueue(*channel_id, request.priority, false)
                .await
            {
                queued += 1;
            }
        }
        Ok(serde_json::json!({ "queued": queued }))
    }
    .await;
    handle_result(result)
}

pub async fn queue_clear(State(state): State<AppState>) -> Response {
    let cleared = state.engine.queue.clear().await;
    Json(serde_json::json!({ "cleared": cleared })).into_response()
}
