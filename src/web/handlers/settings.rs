//! Channel and group setting endpoints

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::models::SettingOverrides;
use crate::store::settings::SettingsField;
use crate::web::{AppState, handle_result};

pub async fn all_channel_settings(State(state): State<AppState>) -> Response {
    Json(state.engine.settings.channel_overrides().await).into_response()
}

pub async fn get_channel_settings(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> Response {
    let overrides = state.engine.settings.channel_override(channel_id).await;
    let channel = state.engine.index.get_channel(channel_id).await;
    let effective = state
        .engine
        .settings
        .effective(channel_id, channel.and_then(|c| c.channel_group_id))
        .await;
    Json(serde_json::json!({
        "overrides": overrides,
        "effective": {
            "matching_mode": effective.matching_mode,
            "checking_mode": effective.checking_mode,
            "quality_preference": effective.quality_preference,
        }
    }))
    .into_response()
}

pub async fn put_channel_settings(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(overrides): Json<SettingOverrides>,
) -> Response {
    let result = state
        .engine
        .settings
        .set_channel_override(channel_id, overrides.clone())
        .await
        .map(|_| overrides)
        .map_err(AppError::from);
    handle_result(result)
}

pub async fn all_group_settings(State(state): State<AppState>) -> Response {
    Json(state.engine.settings.group_overrides().await).into_response()
}

pub async fn get_group_settings(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Response {
    Json(state.engine.settings.group_override(group_id).await).into_response()
}

pub async fn put_group_settings(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(overrides): Json<SettingOverrides>,
) -> Response {
    let result = state
        .engine
        .settings
        .set_group_override(group_id, overrides.clone())
        .await
        .map(|_| overrides)
        .map_err(AppError::from);
    handle_result(result)
}

/// Disable matching on every group that currently has channels
pub async fn bulk_disable_matching(State(state): State<AppState>) -> Response {
    bulk_disable(state, SettingsField::Matching).await
}

/// Disable checking on every group that currently has channels
pub async fn bulk_disable_checking(State(state): State<AppState>) -> Response {
    bulk_disable(state, SettingsField::Checking).await
}

async fn bulk_disable(state: AppState, field: SettingsField) -> Response {
    let group_ids: Vec<i64> = state
        .engine
        .index
        .list_groups(true)
        .await
        .into_iter()
        .map(|g| g.id)
        .collect();
    let result = state
        .engine
        .settings
        .bulk_disable_group_field(field, &group_ids)
        .await
        .map(|groups| serde_json::json!({ "groups": groups }))
        .map_err(AppError::from);
    handle_result(result)
}
