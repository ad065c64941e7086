//! Regex pattern management and the live pattern tester

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::matching::preprocess_pattern;
use crate::models::RegexPatternRecord;
use crate::web::{AppState, handle_result};

pub async fn list_all(State(state): State<AppState>) -> Response {
    Json(state.engine.patterns.snapshot().await).into_response()
}

pub async fn list_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> Response {
    Json(state.engine.patterns.patterns_for(channel_id).await).into_response()
}

#[derive(Debug, Deserialize)]
pub struct AddPatternRequest {
    pub channel_id: i64,
    pub pattern: String,
    #[serde(default)]
    pub m3u_accounts: Option<Vec<i64>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub async fn add(
    State(state): State<AppState>,
    Json(request): Json<AddPatternRequest>,
) -> Response {
    let record = RegexPatternRecord {
        pattern: request.pattern,
        m3u_accounts: request.m3u_accounts,
        enabled: request.enabled,
    };
    let result = state
        .engine
        .patterns
        .add_pattern(request.channel_id, record)
        .await
        .map(|_| serde_json::json!({ "added": true }));
    handle_result(result)
}

pub async fn replace_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(patterns): Json<Vec<RegexPatternRecord>>,
) -> Response {
    let result = state
        .engine
        .patterns
        .set_patterns(channel_id, patterns)
        .await
        .map(|_| serde_json::json!({ "replaced": true }));
    handle_result(result)
}

pub async fn remove(
    State(state): State<AppState>,
    Path((channel_id, index)): Path<(i64, usize)>,
) -> Response {
    let result = state
        .engine
        .patterns
        .remove_pattern(channel_id, index)
        .await
        .map(|_| serde_json::json!({ "removed": true }));
    handle_result(result)
}

#[derive(Debug, Deserialize)]
pub struct CommonPatternRequest {
    pub channel_ids: Vec<i64>,
    pub pattern: String,
    #[serde(default)]
    pub m3u_accounts: Option<Vec<i64>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

pub async fn add_common(
    State(state): State<AppState>,
    Json(request): Json<CommonPatternRequest>,
) -> Response {
    let result = async {
        if request.channel_ids.is_empty() {
            return Err(AppError::validation_field(
                "channel_ids must not be empty",
                "channel_ids",
            ));
        }
        let record = RegexPatternRecord {
            pattern: request.pattern,
            m3u_accounts: request.m3u_accounts,
            enabled: request.enabled,
        };
        state
            .engine
            .patterns
            .add_common_pattern(&request.channel_ids, record)
            .await?;
        Ok(serde_json::json!({ "channels": request.channel_ids.len() }))
    }
    .await;
    handle_result(result)
}

#[derive(Debug, Deserialize)]
pub struct BulkEditRequest {
    pub channel_ids: Vec<i64>,
    pub enabled: bool,
}

pub async fn bulk_edit(
    State(state): State<AppState>,
    Json(request): Json<BulkEditRequest>,
) -> Response {
    let result = state
        .engine
        .patterns
        .bulk_set_enabled(&request.channel_ids, request.enabled)
        .await
        .map(|touched| serde_json::json!({ "patterns_touched": touched }));
    handle_result(result)
}

#[derive(Debug, Deserialize)]
pub struct MassEditRequest {
    pub find: String,
    pub replace: String,
    #[serde(default)]
    pub channel_ids: Option<Vec<i64>>,
}

pub async fn mass_edit_preview(
    State(state): State<AppState>,
    Json(request): Json<MassEditRequest>,
) -> Response {
    let result = state
        .engine
        .patterns
        .mass_edit_preview(&request.find, &request.replace, request.channel_ids.as_deref())
        .await;
    handle_result(result)
}

pub async fn mass_edit(
    State(state): State<AppState>,
    Json(request): Json<MassEditRequest>,
) -> Response {
    let result = async {
        state.ensure_not_checking().await?;
        state
            .engine
            .patterns
            .mass_edit(&request.find, &request.replace, request.channel_ids.as_deref())
            .await
    }
    .await;
    handle_result(result)
}

#[derive(Debug, Deserialize)]
pub struct TestRegexRequest {
    pub patterns: Vec<String>,
    #[serde(default)]
    pub channel_id: Option<i64>,
    #[serde(default = "default_max_matches")]
    pub max_matches: usize,
}

fn default_max_matches() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct TestRegexMatch {
    pub pattern: String,
    pub prepared: String,
    pub matches: Vec<String>,
    pub total_matches: usize,
}

/// Run candidate patterns against the live stream snapshot without mutating
/// any state
pub async fn test_live(
    State(state): State<AppState>,
    Json(request): Json<TestRegexRequest>,
) -> Response {
    let result = async {
        if request.patterns.is_empty() {
            return Err(AppError::validation_field(
                "patterns must not be empty",
                "patterns",
            ));
        }
        let channel_name = match request.channel_id {
            Some(id) => state
                .engine
                .index
                .get_channel(id)
                .await
                .map(|c| c.name)
                .ok_or_else(|| AppError::not_found("channel", id))?,
            None => String::new(),
        };

        let mut reports = Vec::new();
        for pattern in &request.patterns {
            let prepared = preprocess_pattern(pattern, &channel_name);
            let compiled = Regex::new(&prepared).map_err(|e| {
                AppError::validation_field(format!("invalid pattern '{pattern}': {e}"), "patterns")
            })?;
            let streams = state.engine.index.get_streams_matching(&compiled, None).await;
            let total = streams.len();
            reports.push(TestRegexMatch {
                pattern: pattern.clone(),
                prepared,
                matches: streams
                    .into_iter()
                    .take(request.max_matches)
                    .map(|s| s.name)
                    .collect(),
                total_matches: total,
            });
        }
        Ok(reports)
    }
    .await;
    handle_result(result)
}
