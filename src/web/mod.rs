//! HTTP control surface
//!
//! Thin JSON façade over the automation engine: every handler validates its
//! input, checks the stream-checking gate where a mutation could conflict
//! with running work, and delegates to engine operations.

use anyhow::Result;
use axum::{
    Router,
    routing::{delete, get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::scheduler::AutomationEngine;

pub mod handlers;
pub mod responses;

pub use responses::{handle_error, handle_result};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AutomationEngine>,
}

impl AppState {
    /// Reject mutations that would conflict with running checks
    pub async fn ensure_not_checking(&self) -> AppResult<()> {
        if self.engine.stream_checking_mode().await {
            Err(AppError::conflict(
                "stream checking in progress, try again once the queue drains",
            ))
        } else {
            Ok(())
        }
    }
}

/// Web server bound to the configured address
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, engine: Arc<AutomationEngine>) -> Result<Self> {
        let state = AppState { engine };
        let app = Self::create_router(state);
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self { app, addr })
    }

    fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::status::health))
            .route("/status", get(handlers::status::status))
            .route("/changelog", get(handlers::status::changelog))
            .route("/channels", get(handlers::status::channels))
            .route("/m3u-accounts", get(handlers::status::m3u_accounts))
            .route("/dead-streams", get(handlers::status::dead_streams))
            .route(
                "/config/automation",
                get(handlers::config::get_automation).put(handlers::config::put_automation),
            )
            .route(
                "/config/stream_checker",
                get(handlers::config::get_stream_checker)
                    .put(handlers::config::put_stream_checker),
            )
            .route(
                "/config/profile",
                get(handlers::config::get_profile).put(handlers::config::put_profile),
            )
            .route(
                "/regex-patterns",
                get(handlers::patterns::list_all).post(handlers::patterns::add),
            )
            .route(
                "/regex-patterns/common",
                post(handlers::patterns::add_common),
            )
            .route(
                "/regex-patterns/bulk-edit",
                post(handlers::patterns::bulk_edit),
            )
            .route(
                "/regex-patterns/mass-edit-preview",
                post(handlers::patterns::mass_edit_preview),
            )
            .route(
                "/regex-patterns/mass-edit",
                post(handlers::patterns::mass_edit),
            )
            .route(
                "/regex-patterns/{channel_id}",
                get(handlers::patterns::list_channel).put(handlers::patterns::replace_channel),
            )
            .route(
                "/regex-patterns/{channel_id}/{index}",
                delete(handlers::patterns::remove),
            )
            .route("/test-regex-live", post(handlers::patterns::test_live))
            .route(
                "/channel-settings",
                get(handlers::settings::all_channel_settings),
            )
            .route(
                "/channel-settings/{id}",
                get(handlers::settings::get_channel_settings)
                    .put(handlers::settings::put_channel_settings),
            )
            .route(
                "/group-settings",
                get(handlers::settings::all_group_settings),
            )
            .route(
                "/group-settings/{id}",
                get(handlers::settings::get_group_settings)
                    .put(handlers::settings::put_group_settings),
            )
            .route(
                "/group-settings/bulk-disable-matching",
                post(handlers::settings::bulk_disable_matching),
            )
            .route(
                "/group-settings/bulk-disable-checking",
                post(handlers::settings::bulk_disable_checking),
            )
            .route("/refresh-playlist", post(handlers::checker::refresh_playlist))
            .route("/discover-streams", post(handlers::checker::discover_streams))
            .route(
                "/stream-checker/global-action",
                post(handlers::checker::global_action),
            )
            .route(
                "/stream-checker/check-single-channel",
                post(handlers::checker::check_single_channel),
            )
            .route(
                "/stream-checker/test-streams-without-stats",
                post(handlers::checker::test_streams_without_stats),
            )
            .route(
                "/stream-checker/rescore-resort",
                post(handlers::checker::rescore_resort),
            )
            .route(
                "/stream-checker/apply-account-limits",
                post(handlers::checker::apply_account_limits),
            )
            .route("/stream-checker/queue", get(handlers::checker::queue_state))
            .route(
                "/stream-checker/queue/add",
                post(handlers::checker::queue_add),
            )
            .route(
                "/stream-checker/queue/clear",
                post(handlers::checker::queue_clear),
            )
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until the cancellation token fires
    pub async fn serve(
        self,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("Control surface listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }
}
