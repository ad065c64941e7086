//! Automation engine and scheduler
//!
//! The engine value owns every store and service and is constructed once at
//! startup; components receive only what they need. The scheduler loop runs
//! the periodic playlist tick, fires the cron-scheduled global action and
//! pauses automatic work while any store reports corruption.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checker::{AccountLimiter, ChannelQueue, ProbeCache, QueueStats, StreamChecker, StreamProber};
use crate::checker::ordering::{RankedStream, apply_account_limits};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::index::UnifiedDataIndex;
use crate::matching::{MatchOptions, MatchingEngine};
use crate::models::{ChangelogAction, ProfileSnapshot};
use crate::store::{
    AutomationConfig, BlobStore, Changelog, DeadStreamTracker, ProfileConfigMap,
    RegexPatternStore, SettingsStore, StoreHealth, StreamCheckerConfig, UpdateTracker,
};
use crate::upstream::UpstreamClient;

const SCHEDULER_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome summary of one matching run
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchSummary {
    pub channels_considered: usize,
    pub channels_changed: Vec<i64>,
    pub streams_added: usize,
    pub streams_removed: usize,
}

/// Engine status published through `GET /status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub automation_running: bool,
    pub stream_checker_running: bool,
    pub global_action_in_progress: bool,
    pub stream_checking_mode: bool,
    pub queue: QueueStats,
    pub last_playlist_update: Option<DateTime<Utc>>,
    pub last_global_check: Option<DateTime<Utc>>,
    pub store_health: HashMap<String, String>,
    pub last_error: Option<String>,
    pub config: StatusConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusConfig {
    pub automation: AutomationConfig,
    pub stream_checker: StreamCheckerConfig,
}

/// Top-level engine owning all stores and background tasks
pub struct AutomationEngine {
    pub index: Arc<UnifiedDataIndex>,
    pub client: Arc<UpstreamClient>,
    pub queue: Arc<ChannelQueue>,
    pub limiter: Arc<AccountLimiter>,
    pub stats: Arc<ProbeCache>,
    pub dead: Arc<DeadStreamTracker>,
    pub updates: Arc<UpdateTracker>,
    pub settings: Arc<SettingsStore>,
    pub patterns: Arc<RegexPatternStore>,
    pub changelog: Arc<Changelog>,
    pub automation_config: Arc<BlobStore<AutomationConfig>>,
    pub checker_config: Arc<BlobStore<StreamCheckerConfig>>,
    pub profile_config: Arc<BlobStore<ProfileConfigMap>>,
    pub store_health: StoreHealth,
    pub checker: Arc<StreamChecker>,
    matching: MatchingEngine,
    cancel: CancellationToken,
    global_action_lock: Mutex<()>,
    global_action_in_progress: AtomicBool,
    running: AtomicBool,
    last_playlist_update: RwLock<Option<DateTime<Utc>>>,
    last_global_check: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
}

impl AutomationEngine {
    pub async fn new(config: &Config) -> AppResult<Arc<Self>> {
        let data_dir = config.storage.data_dir.as_path();
        let store_health = StoreHealth::new();

        let index = Arc::new(UnifiedDataIndex::new());
        let client = Arc::new(UpstreamClient::new(&config.upstream)?);
        let queue = Arc::new(ChannelQueue::new());
        let limiter = Arc::new(AccountLimiter::new());
        let stats = Arc::new(ProbeCache::new());
        let dead = Arc::new(DeadStreamTracker::open(data_dir, store_health.clone()).await);
        let updates = Arc::new(UpdateTracker::open(data_dir, store_health.clone()).await);
        let settings = Arc::new(SettingsStore::open(data_dir, store_health.clone()).await);
        let patterns = Arc::new(RegexPatternStore::open(data_dir, store_health.clone()).await);
        let changelog = Arc::new(Changelog::open(data_dir, store_health.clone()).await);
        let automation_config = Arc::new(
            BlobStore::open(
                data_dir,
                "automation_config",
                "automation_config.json",
                store_health.clone(),
            )
            .await,
        );
        let checker_config = Arc::new(
            BlobStore::open(
                data_dir,
                "stream_checker_config",
                "stream_checker_config.json",
                store_health.clone(),
            )
            .await,
        );
        let profile_config = Arc::new(
            BlobStore::open(
                data_dir,
                "profile_config",
                "profile_config.json",
                store_health.clone(),
            )
            .await,
        );

        let cancel = CancellationToken::new();
        let checker = Arc::new(StreamChecker::new(
            index.clone(),
            client.clone(),
            queue.clone(),
            limiter.clone(),
            Arc::new(StreamProber::new(None)),
            stats.clone(),
            dead.clone(),
            updates.clone(),
            settings.clone(),
            changelog.clone(),
            automation_config.clone(),
            checker_config.clone(),
            cancel.clone(),
        ));

        Ok(Arc::new(Self {
            matching: MatchingEngine::new(index.clone()),
            index,
            client,
            queue,
            limiter,
            stats,
            dead,
            updates,
            settings,
            patterns,
            changelog,
            automation_config,
            checker_config,
            profile_config,
            store_health,
            checker,
            cancel,
            global_action_lock: Mutex::new(()),
            global_action_in_progress: AtomicBool::new(false),
            running: AtomicBool::new(false),
            last_playlist_update: RwLock::new(None),
            last_global_check: RwLock::new(None),
            last_error: RwLock::new(None),
        }))
    }

    /// Start background tasks: probe workers, lease reaper, scheduler loop
    pub async fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);

        if let Err(e) = self.refresh_udi().await {
            warn!("Initial upstream refresh failed, continuing: {e}");
            self.record_error(format!("initial refresh: {e}")).await;
        }

        let mut handles = self.checker.spawn_workers().await;
        handles.push(self.checker.spawn_lease_reaper());

        let engine = Arc::clone(self);
        handles.push(tokio::spawn(async move { engine.run_scheduler().await }));
        handles
    }

    /// Orderly shutdown: cancel children; workers release leases and exit
    pub fn shutdown(&self) {
        info!("Engine shutdown requested");
        self.running.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // --- status -------------------------------------------------------------

    pub fn global_action_in_progress(&self) -> bool {
        self.global_action_in_progress.load(Ordering::SeqCst)
    }

    /// True while probing or a global action could conflict with mutations
    pub async fn stream_checking_mode(&self) -> bool {
        if self.global_action_in_progress() {
            return true;
        }
        let stats = self.queue.stats().await;
        stats.size > 0 || stats.in_progress > 0
    }

    pub async fn status(&self) -> StatusPayload {
        StatusPayload {
            automation_running: self.running.load(Ordering::SeqCst),
            stream_checker_running: self.running.load(Ordering::SeqCst),
            global_action_in_progress: self.global_action_in_progress(),
            stream_checking_mode: self.stream_checking_mode().await,
            queue: self.queue.stats().await,
            last_playlist_update: *self.last_playlist_update.read().await,
            last_global_check: *self.last_global_check.read().await,
            store_health: self.store_health.snapshot().await,
            last_error: self.last_error.read().await.clone(),
            config: StatusConfig {
                automation: self.automation_config.get().await,
                stream_checker: self.checker_config.get().await,
            },
        }
    }

    async fn record_error(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }

    // --- upstream refresh ---------------------------------------------------

    /// Reload every UDI collection and re-sync limiter capacities and
    /// profile snapshots
    pub async fn refresh_udi(&self) -> AppResult<()> {
        self.index.refresh_m3u_accounts(&self.client).await?;
        self.index.refresh_streams(&self.client).await?;
        self.index.refresh_channels(&self.client).await?;
        self.index.refresh_channel_groups(&self.client).await?;
        if let Err(e) = self.index.refresh_proxy_sessions(&self.client).await {
            // The proxy view is optional at refresh time; probing re-reads it
            debug!("Proxy session refresh failed: {e}");
        }

        let accounts = self.index.list_accounts().await;
        let mut snapshots: ProfileConfigMap = HashMap::new();
        for account in &accounts {
            self.limiter
                .set_account_capacity(account.id, account.max_streams);
            for profile in &account.profiles {
                self.limiter
                    .set_profile_capacity(profile.id, profile.max_streams);
                snapshots.insert(
                    profile.id,
                    ProfileSnapshot {
                        profile_id: profile.id,
                        account_id: account.id,
                        name: profile.name.clone(),
                        max_streams: profile.max_streams,
                        search_pattern: profile.search_pattern.clone(),
                        replace_pattern: profile.replace_pattern.clone(),
                    },
                );
            }
        }
        if let Err(e) = self.profile_config.set(snapshots).await {
            warn!("Profile snapshot persist failed: {e}");
        }
        Ok(())
    }

    /// Trigger playlist re-ingestion upstream for every account, then reload
    pub async fn refresh_playlists(&self) -> AppResult<usize> {
        let accounts = self.index.list_accounts().await;
        let mut refreshed = 0usize;
        for account in &accounts {
            match self.client.refresh_m3u_account(account.id).await {
                Ok(()) => refreshed += 1,
                Err(e) => {
                    warn!("Playlist refresh failed for account {} ({}): {e}", account.id, account.name);
                }
            }
        }
        self.refresh_udi().await?;
        *self.last_playlist_update.write().await = Some(Utc::now());
        let _ = self
            .changelog
            .append(
                ChangelogAction::PlaylistRefresh,
                format!("refreshed {refreshed}/{} account playlists", accounts.len()),
            )
            .await;
        Ok(refreshed)
    }

    // --- matching -----------------------------------------------------------

    /// Run matching for every channel with matching enabled and at least one
    /// enabled pattern; writes changed memberships upstream
    pub async fn run_matching(&self) -> AppResult<MatchSummary> {
        let automation = self.automation_config.get().await;
        let options = MatchOptions {
            remove_non_matching: automation.remove_non_matching_streams,
            enabled_accounts: automation.enabled_accounts.clone(),
        };
        let pattern_map = self.patterns.snapshot().await;

        let mut summary = MatchSummary::default();
        for channel in self.index.list_channels().await {
            let effective = self
                .settings
                .effective(channel.id, channel.channel_group_id)
                .await;
            if !effective.matching_mode.is_enabled() {
                continue;
            }
            let Some(records) = pattern_map.get(&channel.id) else {
                continue;
            };
            if !records.iter().any(|r| r.enabled) {
                continue;
            }
            summary.channels_considered += 1;

            let outcome = self.matching.compute(&channel, records, &options).await;
            if !outcome.changed() {
                continue;
            }
            match self
                .client
                .update_channel_streams(channel.id, &outcome.membership)
                .await
            {
                Ok(()) => {
                    debug!(
                        "Channel {} ({}): +{} -{} streams",
                        channel.id,
                        channel.name,
                        outcome.added.len(),
                        outcome.removed.len()
                    );
                    summary.streams_added += outcome.added.len();
                    summary.streams_removed += outcome.removed.len();
                    summary.channels_changed.push(channel.id);
                }
                Err(e) => {
                    warn!("Membership write failed for channel {}: {e}", channel.id);
                    let _ = self
                        .changelog
                        .append(
                            ChangelogAction::Failure,
                            format!("matching write failed for channel {}: {e}", channel.id),
                        )
                        .await;
                }
            }
        }

        if !summary.channels_changed.is_empty() {
            // Later stages read membership from the index
            if let Err(e) = self.index.refresh_channels(&self.client).await {
                warn!("Channel reload after matching failed: {e}");
            }
        }
        let _ = self
            .changelog
            .append(
                ChangelogAction::StreamMatching,
                format!(
                    "matched {} channels, {} changed (+{} streams, -{})",
                    summary.channels_considered,
                    summary.channels_changed.len(),
                    summary.streams_added,
                    summary.streams_removed
                ),
            )
            .await;
        Ok(summary)
    }

    /// Queue channels whose membership changed, honoring queue immunity
    async fn enqueue_changed_channels(&self, channel_ids: &[i64], immunity_hours: u64) {
        for channel_id in channel_ids {
            let state = self.updates.get(*channel_id).await;
            if self
                .updates
                .is_recently_updated(*channel_id, immunity_hours)
                .await
            {
                debug!("Channel {channel_id} recently checked, not queueing");
                continue;
            }
            self.queue
                .enqueue(*channel_id, 0, state.force_check_requested)
                .await;
        }
    }

    // --- scheduled duties ---------------------------------------------------

    /// One automatic playlist tick: refresh, match, queue
    pub async fn playlist_tick(&self) {
        // Global actions block normal ticks until they finish
        let _guard = self.global_action_lock.lock().await;

        if let Err(e) = self.refresh_playlists().await {
            error!("Playlist tick failed: {e}");
            self.record_error(format!("playlist tick: {e}")).await;
            let _ = self
                .changelog
                .append(ChangelogAction::Failure, format!("playlist tick failed: {e}"))
                .await;
            return;
        }

        let automation = self.automation_config.get().await;
        if !automation.auto_stream_matching {
            return;
        }
        match self.run_matching().await {
            Ok(summary) => {
                if automation.auto_quality_checking {
                    self.enqueue_changed_channels(
                        &summary.channels_changed,
                        automation.immunity_hours,
                    )
                    .await;
                }
            }
            Err(e) => {
                error!("Matching run failed: {e}");
                self.record_error(format!("matching: {e}")).await;
            }
        }
    }

    /// The comprehensive Update → Match → Check cycle
    ///
    /// Holds the exclusive lock for its whole duration; concurrent requests
    /// are rejected rather than queued.
    pub async fn run_global_action(&self) -> AppResult<()> {
        let Ok(_guard) = self.global_action_lock.try_lock() else {
            return Err(AppError::conflict("global action already in progress"));
        };
        self.global_action_in_progress.store(true, Ordering::SeqCst);
        let result = self.global_action_inner().await;
        self.global_action_in_progress.store(false, Ordering::SeqCst);
        match &result {
            Ok(()) => {
                *self.last_global_check.write().await = Some(Utc::now());
                let _ = self
                    .changelog
                    .append(ChangelogAction::GlobalAction, "global action completed")
                    .await;
            }
            Err(e) => {
                self.record_error(format!("global action: {e}")).await;
                let _ = self
                    .changelog
                    .append(
                        ChangelogAction::Failure,
                        format!("global action failed: {e}"),
                    )
                    .await;
            }
        }
        result
    }

    async fn global_action_inner(&self) -> AppResult<()> {
        info!("Global action starting");
        self.refresh_udi().await?;

        let cleared = self.dead.clear_all().await?;
        info!("Global action cleared {cleared} dead stream record(s)");

        self.refresh_playlists().await?;
        self.run_matching().await?;

        // Force-check every channel; workers drop the checking-disabled ones
        let channels = self.index.list_channels().await;
        for channel in &channels {
            if let Err(e) = self.updates.request_force_check(channel.id).await {
                warn!("Force-check flag persist failed for channel {}: {e}", channel.id);
            }
            self.queue.enqueue(channel.id, 1, true).await;
        }
        info!("Global action queued {} channel(s)", channels.len());
        Ok(())
    }

    /// Re-score and re-sort every channel from cached stats, without probing
    pub async fn rescore_resort_all(&self) -> AppResult<usize> {
        let mut rewritten = 0usize;
        for channel in self.index.list_channels().await {
            match self.checker.rescore_channel(channel.id).await {
                Ok(true) => rewritten += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Rescore failed for channel {}: {e}", channel.id);
                }
            }
        }
        if rewritten > 0 {
            if let Err(e) = self.index.refresh_channels(&self.client).await {
                warn!("Channel reload after rescore failed: {e}");
            }
        }
        let _ = self
            .changelog
            .append(
                ChangelogAction::RescoreResort,
                format!("rescore-resort rewrote {rewritten} channel(s)"),
            )
            .await;
        Ok(rewritten)
    }

    /// Matching only, queueing changed channels with force-check
    pub async fn discover_streams(&self) -> AppResult<MatchSummary> {
        let summary = self.run_matching().await?;
        for channel_id in &summary.channels_changed {
            self.queue.enqueue(*channel_id, 0, true).await;
        }
        Ok(summary)
    }

    /// Queue channels that still contain streams with no cached probe stats
    pub async fn test_streams_without_stats(&self) -> AppResult<usize> {
        let mut queued = 0usize;
        for channel in self.index.list_channels().await {
            let mut missing = false;
            for stream_id in &channel.streams {
                if !self.stats.contains(*stream_id).await {
                    missing = true;
                    break;
                }
            }
            if missing && self.queue.enqueue(channel.id, 0, false).await {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Queue one channel with high priority and forced probing
    pub async fn check_single_channel(&self, channel_id: i64) -> AppResult<()> {
        if self.index.get_channel(channel_id).await.is_none() {
            return Err(AppError::not_found("channel", channel_id));
        }
        self.queue.enqueue(channel_id, 10, true).await;
        Ok(())
    }

    /// Trim existing channel memberships to the configured account limits,
    /// preserving the current order
    pub async fn apply_account_limits_to_existing_channels(&self) -> AppResult<usize> {
        let cfg = self.checker_config.get().await;
        let mut trimmed_channels = 0usize;
        for channel in self.index.list_channels().await {
            let mut ranked = Vec::new();
            for stream_id in &channel.streams {
                if let Some(stream) = self.index.get_stream(*stream_id).await {
                    ranked.push(RankedStream {
                        stream,
                        score: 0.0,
                        account_name: None,
                        account_priority: 0,
                        dead: false,
                    });
                }
            }
            let kept = apply_account_limits(ranked, &cfg.account_stream_limits);
            let kept_ids: Vec<i64> = kept.iter().map(|e| e.stream.id).collect();
            if kept_ids == channel.streams {
                continue;
            }
            match self
                .client
                .update_channel_streams(channel.id, &kept_ids)
                .await
            {
                Ok(()) => trimmed_channels += 1,
                Err(e) => warn!("Limit trim failed for channel {}: {e}", channel.id),
            }
        }
        if trimmed_channels > 0 {
            if let Err(e) = self.index.refresh_channels(&self.client).await {
                warn!("Channel reload after limit trim failed: {e}");
            }
        }
        Ok(trimmed_channels)
    }

    // --- scheduler loop -----------------------------------------------------

    async fn run_scheduler(self: Arc<Self>) {
        info!("Scheduler started");
        let mut next_playlist_at = self.next_playlist_time().await;
        let mut next_global_at = self.next_global_time().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(SCHEDULER_POLL_INTERVAL) => {}
                _ = self.cancel.cancelled() => break,
            }

            if !self.store_health.is_healthy().await {
                warn!("Persisted state unhealthy, automatic ticks paused");
                continue;
            }

            let now = Utc::now();
            if let Some(due) = next_global_at {
                if now >= due {
                    if let Err(e) = self.run_global_action().await {
                        warn!("Scheduled global action did not run: {e}");
                    }
                    next_global_at = self.next_global_time().await;
                }
            } else {
                next_global_at = self.next_global_time().await;
            }

            if let Some(due) = next_playlist_at {
                if now >= due {
                    self.playlist_tick().await;
                    next_playlist_at = self.next_playlist_time().await;
                }
            } else {
                next_playlist_at = self.next_playlist_time().await;
            }
        }
        info!("Scheduler stopped");
    }

    async fn next_playlist_time(&self) -> Option<DateTime<Utc>> {
        let automation = self.automation_config.get().await;
        if let Some(cron) = automation.playlist_update_cron.as_deref() {
            if let Some(next) = crate::utils::next_cron_occurrence(cron) {
                return Some(next);
            }
            warn!("Invalid playlist_update_cron '{cron}', falling back to interval");
        }
        Some(
            Utc::now()
                + ChronoDuration::minutes(automation.playlist_update_interval_minutes as i64),
        )
    }

    async fn next_global_time(&self) -> Option<DateTime<Utc>> {
        let automation = self.automation_config.get().await;
        automation
            .global_action_cron
            .as_deref()
            .and_then(crate::utils::next_cron_occurrence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, UpstreamConfig, WebConfig};

    fn config(dir: &std::path::Path) -> Config {
        Config {
            web: WebConfig::default(),
            upstream: UpstreamConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                username: "x".to_string(),
                password: "y".to_string(),
                request_timeout_seconds: 1,
                retry_attempts: 1,
                page_size: 100,
            },
            storage: StorageConfig {
                data_dir: dir.to_path_buf(),
            },
        }
    }

    #[tokio::test]
    async fn stream_checking_mode_follows_queue_and_global_action() {
        let dir = tempfile::tempdir().unwrap();
        let engine = AutomationEngine::new(&config(dir.path())).await.unwrap();

        assert!(!engine.stream_checking_mode().await);

        engine.queue.enqueue(1, 0, false).await;
        assert!(engine.stream_checking_mode().await);

        let entry = engine.queue.dequeue().await.unwrap();
        assert!(engine.stream_checking_mode().await);
        engine.queue.complete(entry.channel_id, true).await;
        assert!(!engine.stream_checking_mode().await);

        engine
            .global_action_in_progress
            .store(true, Ordering::SeqCst);
        assert!(engine.stream_checking_mode().await);
    }

    #[tokio::test]
    async fn check_single_channel_requires_known_channel() {
        let dir = tempfile::tempdir().unwrap();
        let engine = AutomationEngine::new(&config(dir.path())).await.unwrap();

        assert!(matches!(
            engine.check_single_channel(5).await,
            Err(AppError::NotFound { .. })
        ));

        engine
            .index
            .install_channels(vec![crate::models::Channel {
                id: 5,
                name: "CNN".to_string(),
                number: 5.0,
                logo_id: None,
                channel_group_id: None,
                streams: vec![],
            }])
            .await;
        engine.check_single_channel(5).await.unwrap();
        assert_eq!(engine.queue.size().await, 1);
    }

    #[tokio::test]
    async fn matching_run_skips_channels_without_enabled_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let engine = AutomationEngine::new(&config(dir.path())).await.unwrap();

        engine
            .index
            .install_channels(vec![crate::models::Channel {
                id: 1,
                name: "CNN".to_string(),
                number: 1.0,
                logo_id: None,
                channel_group_id: None,
                streams: vec![],
            }])
            .await;
        engine.index.install_streams(vec![]).await;

        // No regex configured: nothing is considered, nothing is queued
        let summary = engine.run_matching().await.unwrap();
        assert_eq!(summary.channels_considered, 0);
        assert!(summary.channels_changed.is_empty());
        assert_eq!(engine.queue.size().await, 0);
        assert!(!engine.stream_checking_mode().await);
    }

    #[tokio::test]
    async fn test_streams_without_stats_only_queues_missing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = AutomationEngine::new(&config(dir.path())).await.unwrap();

        engine
            .index
            .install_streams(vec![
                crate::models::Stream {
                    id: 10,
                    name: "a".to_string(),
                    url: "http://e/10.ts".to_string(),
                    m3u_account_id: None,
                    is_custom: true,
                },
                crate::models::Stream {
                    id: 11,
                    name: "b".to_string(),
                    url: "http://e/11.ts".to_string(),
                    m3u_account_id: None,
                    is_custom: true,
                },
            ])
            .await;
        engine
            .index
            .install_channels(vec![
                crate::models::Channel {
                    id: 1,
                    name: "has stats".to_string(),
                    number: 1.0,
                    logo_id: None,
                    channel_group_id: None,
                    streams: vec![10],
                },
                crate::models::Channel {
                    id: 2,
                    name: "missing stats".to_string(),
                    number: 2.0,
                    logo_id: None,
                    channel_group_id: None,
                    streams: vec![11],
                },
            ])
            .await;

        engine
            .stats
            .insert(
                10,
                crate::models::ProbeResult {
                    status: crate::models::ProbeStatus::Ok,
                    resolution_w: 1280,
                    resolution_h: 720,
                    fps: 25.0,
                    video_codec: None,
                    audio_codec: None,
                    bitrate_kbps: Some(2000),
                    last_checked_at: Utc::now(),
                    used_profile_id: None,
                    error_message: None,
                },
            )
            .await;

        let queued = engine.test_streams_without_stats().await.unwrap();
        assert_eq!(queued, 1);
        assert_eq!(engine.queue.dequeue().await.unwrap().channel_id, 2);
    }
}
