//! Configuration blob endpoints
//!
//! Each PUT validates the whole blob before persisting; invalid payloads
//! never reach engine state.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use crate::errors::AppError;
use crate::models::ChangelogAction;
use crate::store::{AutomationConfig, ProfileConfigMap, StreamCheckerConfig};
use crate::web::{AppState, handle_result};

pub async fn get_automation(State(state): State<AppState>) -> Response {
    Json(state.engine.automation_config.get().await).into_response()
}

pub async fn put_automation(
    State(state): State<AppState>,
    Json(config): Json<AutomationConfig>,
) -> Response {
    let result = async {
        config.validate()?;
        state
            .engine
            .automation_config
            .set(config.clone())
            .await
            .map_err(AppError::from)?;
        let _ = state
            .engine
            .changelog
            .append(ChangelogAction::ConfigChange, "automation config updated")
            .await;
        Ok(config)
    }
    .await;
    handle_result(result)
}

pub async fn get_stream_checker(State(state): State<AppState>) -> Response {
    Json(state.engine.checker_config.get().await).into_response()
}

pub async fn put_stream_checker(
    State(state): State<AppState>,
    Json(config): Json<StreamCheckerConfig>,
) -> Response {
    let result = async {
        config.validate()?;
        state
            .engine
            .checker_config
            .set(config.clone())
            .await
            .map_err(AppError::from)?;
        let _ = state
            .engine
            .changelog
            .append(
                ChangelogAction::ConfigChange,
                "stream checker config updated",
            )
            .await;
        Ok(config)
    }
    .await;
    handle_result(result)
}

pub async fn get_profile(State(state): State<AppState>) -> Response {
    Json(state.engine.profile_config.get().await).into_response()
}

pub async fn put_profile(
    State(state): State<AppState>,
    Json(config): Json<ProfileConfigMap>,
) -> Response {
    let result = async {
        for (profile_id, snapshot) in &config {
            if snapshot.profile_id != *profile_id {
                return Err(AppError::validation_field(
                    format!(
                        "snapshot key {profile_id} does not match profile_id {}",
                        snapshot.profile_id
                    ),
                    "profile_id",
                ));
            }
        }
        state
            .engine
            .profile_config
            .set(config.clone())
            .await
            .map_err(AppError::from)?;
        let _ = state
            .engine
            .changelog
            .append(ChangelogAction::ConfigChange, "profile config updated")
            .await;
        Ok(config)
    }
    .await;
    handle_result(result)
}
