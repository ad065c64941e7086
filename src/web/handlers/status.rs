//! Status, listing and changelog endpoints

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::models::{Channel, EffectiveSettings, M3uAccount, QualityPreference, SettingMode};
use crate::web::AppState;

pub async fn health() -> Response {
    Json(serde_json::json!({ "status": "ok" })).into_response()
}

pub async fn status(State(state): State<AppState>) -> Response {
    Json(state.engine.status().await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ChangelogQuery {
    #[serde(default = "default_changelog_days")]
    pub days: u32,
}

fn default_changelog_days() -> u32 {
    7
}

pub async fn changelog(
    State(state): State<AppState>,
    Query(query): Query<ChangelogQuery>,
) -> Response {
    let entries = state.engine.changelog.entries_since_days(query.days).await;
    Json(entries).into_response()
}

/// Channel listing entry with the channel's resolved settings
#[derive(Debug, Serialize)]
pub struct ChannelView {
    #[serde(flatten)]
    pub channel: Channel,
    pub matching_mode: SettingMode,
    pub checking_mode: SettingMode,
    pub quality_preference: QualityPreference,
}

/// List channels; channels whose effective matching and checking are both
/// disabled are hidden
pub async fn channels(State(state): State<AppState>) -> Response {
    let mut views = Vec::new();
    for channel in state.engine.index.list_channels().await {
        let effective: EffectiveSettings = state
            .engine
            .settings
            .effective(channel.id, channel.channel_group_id)
            .await;
        if !effective.matching_mode.is_enabled() && !effective.checking_mode.is_enabled() {
            continue;
        }
        views.push(ChannelView {
            channel,
            matching_mode: effective.matching_mode,
            checking_mode: effective.checking_mode,
            quality_preference: effective.quality_preference,
        });
    }
    Json(views).into_response()
}

pub async fn m3u_accounts(State(state): State<AppState>) -> Response {
    let accounts: Vec<M3uAccount> = state.engine.index.list_accounts().await;
    Json(accounts).into_response()
}

pub async fn dead_streams(State(state): State<AppState>) -> Response {
    Json(state.engine.dead.list().await).into_response()
}
