//! Probe runner
//!
//! Workers pull channel entries from the queue, probe each member stream
//! through the media analyzer with per-account concurrency leases, evaluate
//! profile failover (Phase 1 free profiles, Phase 2 intelligent polling),
//! score and re-order the channel and write the result back upstream.

use chrono::Utc;
use futures::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::limiter::AccountLimiter;
use super::ordering::{
    RankedStream, apply_account_limits, diversify, prune_dead, sort_by_score,
};
use super::prober::{ProbeRequest, StreamProber};
use super::queue::{ChannelQueue, ChannelQueueEntry};
use super::scorer::{ScoreContext, score_probe};
use super::stats::ProbeCache;
use crate::errors::AppResult;
use crate::index::UnifiedDataIndex;
use crate::models::{
    Channel, ChangelogAction, DEAD_NAME_PREFIX, EffectiveSettings, M3uAccount, ProbeResult,
    ProbeStatus, Stream,
};
use crate::store::{
    AutomationConfig, BlobStore, Changelog, DeadStreamTracker, SettingsStore,
    StreamCheckerConfig, UpdateTracker,
};
use crate::upstream::UpstreamClient;

pub struct StreamChecker {
    index: Arc<UnifiedDataIndex>,
    client: Arc<UpstreamClient>,
    pub queue: Arc<ChannelQueue>,
    pub limiter: Arc<AccountLimiter>,
    prober: Arc<StreamProber>,
    pub stats: Arc<ProbeCache>,
    dead: Arc<DeadStreamTracker>,
    updates: Arc<UpdateTracker>,
    settings: Arc<SettingsStore>,
    changelog: Arc<Changelog>,
    automation_config: Arc<BlobStore<AutomationConfig>>,
    checker_config: Arc<BlobStore<StreamCheckerConfig>>,
    cancel: CancellationToken,
    requeued_once: Mutex<HashSet<i64>>,
}

impl StreamChecker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: Arc<UnifiedDataIndex>,
        client: Arc<UpstreamClient>,
        queue: Arc<ChannelQueue>,
        limiter: Arc<AccountLimiter>,
        prober: Arc<StreamProber>,
        stats: Arc<ProbeCache>,
        dead: Arc<DeadStreamTracker>,
        updates: Arc<UpdateTracker>,
        settings: Arc<SettingsStore>,
        changelog: Arc<Changelog>,
        automation_config: Arc<BlobStore<AutomationConfig>>,
        checker_config: Arc<BlobStore<StreamCheckerConfig>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            index,
            client,
            queue,
            limiter,
            prober,
            stats,
            dead,
            updates,
            settings,
            changelog,
            automation_config,
            checker_config,
            cancel,
            requeued_once: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn the configured number of channel workers
    pub async fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let worker_count = self.checker_config.get().await.global_concurrent_limit;
        (0..worker_count)
            .map(|worker_id| {
                let checker = Arc::clone(self);
                tokio::spawn(async move { checker.run_worker(worker_id).await })
            })
            .collect()
    }

    /// Spawn the stale-lease reaper
    pub fn spawn_lease_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let checker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let max_age = chrono::Duration::seconds(
                            checker.checker_config.get().await.stale_token_seconds as i64,
                        );
                        let reaped = checker.limiter.reap_stale(max_age);
                        if reaped > 0 {
                            warn!("Lease reaper force-released {reaped} stale lease(s)");
                        }
                    }
                    _ = checker.cancel.cancelled() => break,
                }
            }
        })
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        debug!("Stream checker worker {worker_id} started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.queue.dequeue().await {
                Some(entry) => self.process_entry(entry).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(500)) => {}
                        _ = self.cancel.cancelled() => break,
                    }
                }
            }
        }
        debug!("Stream checker worker {worker_id} stopped");
    }

    /// Run the full probe cycle for one dequeued channel
    pub async fn process_entry(self: &Arc<Self>, entry: ChannelQueueEntry) {
        let channel_id = entry.channel_id;
        let Some(channel) = self.index.get_channel(channel_id).await else {
            debug!("Channel {channel_id} not in index, dropping queue entry");
            self.queue.complete(channel_id, false).await;
            return;
        };

        let effective = self
            .settings
            .effective(channel.id, channel.channel_group_id)
            .await;
        if !effective.checking_mode.is_enabled() {
            info!(
                "Channel {} ({}) has checking disabled, dropping queue entry",
                channel.id, channel.name
            );
            self.queue.complete(channel_id, true).await;
            return;
        }

        let cfg = self.checker_config.get().await;
        let automation = self.automation_config.get().await;

        let mut members = Vec::new();
        for id in &channel.streams {
            if let Some(stream) = self.index.get_stream(*id).await {
                members.push(stream);
            }
        }

        // Probe what the immunity window and exclusions leave over
        let mut to_probe = Vec::new();
        for stream in &members {
            if self.is_quality_excluded(stream, &cfg) {
                continue;
            }
            let immune = !entry.force_check
                && self
                    .stats
                    .is_fresh(stream.id, automation.immunity_hours)
                    .await;
            if !immune {
                to_probe.push(stream.clone());
            }
        }
        debug!(
            "Channel {}: probing {}/{} streams (force={})",
            channel.id,
            to_probe.len(),
            members.len(),
            entry.force_check
        );

        let results = self.probe_streams(to_probe, &cfg).await;
        for (stream_id, result) in &results {
            self.stats.insert(*stream_id, result.clone()).await;
        }
        if self.cancel.is_cancelled() {
            // No partial upstream write on shutdown
            self.queue.complete(channel_id, false).await;
            return;
        }

        self.apply_dead_transitions(&members, &results).await;

        let mut ranked = self.build_ranked(&members, &cfg, &effective).await;
        sort_by_score(&mut ranked);
        if cfg.diversification.enabled {
            ranked = diversify(ranked, cfg.diversification.strategy);
        }
        ranked = apply_account_limits(ranked, &cfg.account_stream_limits);
        ranked = prune_dead(ranked);

        let final_ids: Vec<i64> = ranked.iter().map(|e| e.stream.id).collect();
        if final_ids == channel.streams {
            self.finish_success(&channel, final_ids.len(), false).await;
            return;
        }

        match self
            .client
            .update_channel_streams(channel.id, &final_ids)
            .await
        {
            Ok(()) => {
                self.finish_success(&channel, final_ids.len(), true).await;
            }
            Err(e) => {
                warn!(
                    "Write-back failed for channel {} ({}): {e}",
                    channel.id, channel.name
                );
                let _ = self
                    .changelog
                    .append(
                        ChangelogAction::Failure,
                        format!("write-back failed for channel {}: {e}", channel.id),
                    )
                    .await;
                self.queue.complete(channel_id, false).await;

                // Requeue once with lowered priority; tracker is not advanced
                let mut requeued = self.requeued_once.lock().await;
                if requeued.insert(channel_id) {
                    drop(requeued);
                    self.queue
                        .enqueue(channel_id, entry.priority - 1, entry.force_check)
                        .await;
                }
            }
        }
    }

    async fn finish_success(&self, channel: &Channel, stream_count: usize, wrote: bool) {
        if let Err(e) = self
            .updates
            .mark_updated(channel.id, stream_count as u32)
            .await
        {
            warn!("Update tracker write failed for channel {}: {e}", channel.id);
        }
        let detail = if wrote {
            format!(
                "channel {} ({}) checked, {} streams written",
                channel.id, channel.name, stream_count
            )
        } else {
            format!(
                "channel {} ({}) checked, order unchanged",
                channel.id, channel.name
            )
        };
        let _ = self
            .changelog
            .append(ChangelogAction::QualityCheck, detail)
            .await;
        self.queue.complete(channel.id, true).await;
        self.requeued_once.lock().await.remove(&channel.id);
    }

    /// Probe a batch of streams through a bounded pool
    ///
    /// Each probe runs in its own task so a panic is contained: the worker
    /// records an error result and carries on.
    async fn probe_streams(
        self: &Arc<Self>,
        streams: Vec<Stream>,
        cfg: &StreamCheckerConfig,
    ) -> Vec<(i64, ProbeResult)> {
        let concurrency = cfg.probe_concurrency.max(1);
        futures::stream::iter(streams)
            .map(|stream| {
                let checker = Arc::clone(self);
                let cfg = cfg.clone();
                async move {
                    let stream_id = stream.id;
                    let handle =
                        tokio::spawn(
                            async move { checker.probe_stream(&stream, &cfg).await },
                        );
                    match handle.await {
                        Ok(result) => (stream_id, result),
                        Err(e) if e.is_panic() => {
                            warn!("Probe task for stream {stream_id} panicked");
                            (stream_id, synthetic_error("probe task panicked"))
                        }
                        Err(_) => (stream_id, synthetic_error("probe task cancelled")),
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Probe one stream with profile failover
    async fn probe_stream(&self, stream: &Stream, cfg: &StreamCheckerConfig) -> ProbeResult {
        let account = match stream.m3u_account_id {
            Some(id) => self.index.get_account(id).await,
            None => None,
        };

        // Custom streams have no account or profiles; probe directly
        let Some(account) = account else {
            return self
                .invoke_analyzer(&stream.url, None, cfg)
                .await;
        };

        let mut tried: HashSet<i64> = HashSet::new();
        let mut last: Option<ProbeResult> = None;

        // Phase 1: currently available profiles in priority order
        for profile in self
            .index
            .get_all_available_profiles_for_stream(stream)
            .await
        {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(token) = self.limiter.try_acquire(account.id, Some(profile.id)) else {
                continue;
            };
            tried.insert(profile.id);
            let url = UnifiedDataIndex::apply_profile_url_transformation(stream, &profile);
            let mut result = self
                .invoke_analyzer(&url, account.proxy.as_deref(), cfg)
                .await;
            token.release();
            result.used_profile_id = Some(profile.id);
            if result.status == ProbeStatus::Ok {
                return result;
            }
            last = Some(result);
        }

        // Phase 2: poll for profiles that were busy during Phase 1
        if cfg.try_full_profiles && !self.cancel.is_cancelled() {
            if let Some(result) = self
                .phase2_poll(stream, &account, &tried, cfg)
                .await
            {
                if result.status == ProbeStatus::Ok {
                    return result;
                }
                last = Some(result);
            }
        }

        last.unwrap_or_else(|| synthetic_error("no profile available for probing"))
    }

    /// Phase 2 intelligent polling
    ///
    /// Re-reads the live session view each round; any remaining profile that
    /// freed up is tested immediately, otherwise the worker sleeps one poll
    /// interval. Gives up when every profile was tried or the wait budget is
    /// spent.
    async fn phase2_poll(
        &self,
        stream: &Stream,
        account: &M3uAccount,
        already_tried: &HashSet<i64>,
        cfg: &StreamCheckerConfig,
    ) -> Option<ProbeResult> {
        let deadline =
            Instant::now() + Duration::from_secs(cfg.phase2_max_wait_seconds.max(1));
        let mut remaining: Vec<_> = self
            .index
            .get_all_profiles_for_stream(stream)
            .await
            .into_iter()
            .filter(|p| !already_tried.contains(&p.id))
            .collect();
        if remaining.is_empty() {
            return None;
        }
        debug!(
            "Stream {}: phase 2 polling {} remaining profile(s)",
            stream.id,
            remaining.len()
        );

        let mut last: Option<ProbeResult> = None;
        while !remaining.is_empty()
            && Instant::now() < deadline
            && !self.cancel.is_cancelled()
        {
            if let Err(e) = self.index.refresh_proxy_sessions(&self.client).await {
                debug!("Session refresh during phase 2 failed: {e}");
            }

            let mut still_busy = Vec::new();
            let mut probed_any = false;
            for profile in remaining {
                let available = profile.max_streams == 0
                    || self.index.active_sessions_for_profile(profile.id).await
                        < profile.max_streams;
                if !available {
                    still_busy.push(profile);
                    continue;
                }
                let Some(token) = self.limiter.try_acquire(account.id, Some(profile.id))
                else {
                    still_busy.push(profile);
                    continue;
                };
                probed_any = true;
                let url =
                    UnifiedDataIndex::apply_profile_url_transformation(stream, &profile);
                let mut result = self
                    .invoke_analyzer(&url, account.proxy.as_deref(), cfg)
                    .await;
                token.release();
                result.used_profile_id = Some(profile.id);
                if result.status == ProbeStatus::Ok {
                    return Some(result);
                }
                last = Some(result);
            }
            remaining = still_busy;

            if !remaining.is_empty() && !probed_any {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(
                        cfg.phase2_poll_interval_seconds.max(1),
                    )) => {}
                    _ = self.cancel.cancelled() => break,
                }
            }
        }
        last
    }

    async fn invoke_analyzer(
        &self,
        url: &str,
        proxy: Option<&str>,
        cfg: &StreamCheckerConfig,
    ) -> ProbeResult {
        let request = ProbeRequest {
            url: url.to_string(),
            duration_seconds: cfg.ffmpeg_duration_seconds,
            timeout_seconds: cfg.analyzer_timeout_seconds,
            retries: cfg.analyzer_retries,
            retry_delay_seconds: cfg.retry_delay_seconds,
            user_agent: cfg.user_agent.clone(),
            proxy: proxy.map(|p| p.to_string()),
        };
        self.prober.probe(&request, &self.cancel).await
    }

    /// Record dead transitions and revive streams that probe healthy again
    async fn apply_dead_transitions(&self, members: &[Stream], results: &[(i64, ProbeResult)]) {
        for (stream_id, result) in results {
            let Some(stream) = members.iter().find(|s| s.id == *stream_id) else {
                continue;
            };
            if result.is_dead() {
                let reason = if result.resolution_w == 0 && result.resolution_h == 0 {
                    "probe returned no picture"
                } else {
                    "probe returned zero bitrate"
                };
                if let Err(e) = self.dead.record(*stream_id, reason).await {
                    warn!("Dead tracker write failed for stream {stream_id}: {e}");
                }
                let _ = self
                    .changelog
                    .append(
                        ChangelogAction::DeadStream,
                        format!("stream {} ({}) marked dead: {reason}", stream.id, stream.name),
                    )
                    .await;
            } else if result.status == ProbeStatus::Ok {
                match self.dead.revive(*stream_id).await {
                    Ok(true) => {
                        debug!("Stream {} probed healthy again", stream.id);
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Dead tracker revive failed for stream {stream_id}: {e}"),
                }
                // Keep the upstream name in sync with the tracker
                if stream.has_dead_prefix() {
                    let clean = stream
                        .name
                        .trim_start()
                        .trim_start_matches(DEAD_NAME_PREFIX)
                        .trim_start()
                        .to_string();
                    if let Err(e) = self.client.update_stream_name(stream.id, &clean).await {
                        warn!("Could not strip dead prefix from stream {}: {e}", stream.id);
                    }
                }
            }
        }
    }

    fn is_quality_excluded(&self, stream: &Stream, cfg: &StreamCheckerConfig) -> bool {
        stream
            .m3u_account_id
            .map(|id| cfg.quality_excluded_accounts.contains(&id))
            .unwrap_or(false)
    }

    /// Score every member stream from the probe cache
    pub async fn build_ranked(
        &self,
        members: &[Stream],
        cfg: &StreamCheckerConfig,
        effective: &EffectiveSettings,
    ) -> Vec<RankedStream> {
        let mut ranked = Vec::with_capacity(members.len());
        for stream in members {
            let (account_name, account_priority) = match stream.m3u_account_id {
                Some(id) => self
                    .index
                    .get_account(id)
                    .await
                    .map(|a| (Some(a.name), a.priority))
                    .unwrap_or((None, 0)),
                None => (None, 0),
            };
            let context = ScoreContext {
                weights: cfg.weights,
                preference: effective.quality_preference,
                account_priority,
                priority_boost_factor: cfg.priority_boost_factor,
            };
            let excluded = self.is_quality_excluded(stream, cfg);
            let result = self.stats.get(stream.id).await;
            let dead = self.dead.contains(stream.id).await
                || result.as_ref().map(|r| r.is_dead()).unwrap_or(false);

            let (score, dead) = if excluded {
                // Priority-only contract: never probed, never pruned here
                (context.priority_only_score(), false)
            } else {
                (score_probe(result.as_ref(), dead, &context), dead)
            };
            ranked.push(RankedStream {
                stream: stream.clone(),
                score,
                account_name,
                account_priority,
                dead,
            });
        }
        ranked
    }

    /// Re-score and re-sort one channel from cached stats, without probing
    ///
    /// Returns Ok(true) when a new ordering was written upstream. Channels
    /// without any cached stats are skipped.
    pub async fn rescore_channel(&self, channel_id: i64) -> AppResult<bool> {
        let Some(channel) = self.index.get_channel(channel_id).await else {
            return Ok(false);
        };

        let mut members = Vec::new();
        for id in &channel.streams {
            if let Some(stream) = self.index.get_stream(*id).await {
                members.push(stream);
            }
        }

        let mut any_stats = false;
        for stream in &members {
            if self.stats.contains(stream.id).await {
                any_stats = true;
                break;
            }
        }
        if !any_stats {
            return Ok(false);
        }

        let cfg = self.checker_config.get().await;
        let effective = self
            .settings
            .effective(channel.id, channel.channel_group_id)
            .await;

        let mut ranked = self.build_ranked(&members, &cfg, &effective).await;
        sort_by_score(&mut ranked);
        if cfg.diversification.enabled {
            ranked = diversify(ranked, cfg.diversification.strategy);
        }
        ranked = apply_account_limits(ranked, &cfg.account_stream_limits);

        let final_ids: Vec<i64> = ranked.iter().map(|e| e.stream.id).collect();
        if final_ids == channel.streams {
            return Ok(false);
        }

        self.client
            .update_channel_streams(channel.id, &final_ids)
            .await
            .map_err(crate::errors::AppError::from)?;
        let _ = self
            .changelog
            .append(
                ChangelogAction::RescoreResort,
                format!("channel {} ({}) re-sorted from cached stats", channel.id, channel.name),
            )
            .await;
        Ok(true)
    }
}

fn synthetic_error(message: &str) -> ProbeResult {
    ProbeResult {
        status: ProbeStatus::Error,
        resolution_w: 0,
        resolution_h: 0,
        fps: 0.0,
        video_codec: None,
        audio_codec: None,
        bitrate_kbps: None,
        last_checked_at: Utc::now(),
        used_profile_id: None,
        error_message: Some(message.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UpstreamConfig;
    use crate::models::QualityPreference;
    use crate::store::StoreHealth;

    async fn checker_fixture(dir: &std::path::Path) -> Arc<StreamChecker> {
        let upstream_config = UpstreamConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            username: "x".to_string(),
            password: "y".to_string(),
            request_timeout_seconds: 1,
            retry_attempts: 1,
            page_size: 100,
        };
        let health = StoreHealth::new();
        Arc::new(StreamChecker::new(
            Arc::new(UnifiedDataIndex::new()),
            Arc::new(UpstreamClient::new(&upstream_config).unwrap()),
            Arc::new(ChannelQueue::new()),
            Arc::new(AccountLimiter::new()),
            Arc::new(StreamProber::new(None)),
            Arc::new(ProbeCache::new()),
            Arc::new(DeadStreamTracker::open(dir, health.clone()).await),
            Arc::new(UpdateTracker::open(dir, health.clone()).await),
            Arc::new(SettingsStore::open(dir, health.clone()).await),
            Arc::new(Changelog::open(dir, health.clone()).await),
            Arc::new(
                BlobStore::open(dir, "automation", "automation_config.json", health.clone())
                    .await,
            ),
            Arc::new(
                BlobStore::open(
                    dir,
                    "stream_checker",
                    "stream_checker_config.json",
                    health,
                )
                .await,
            ),
            CancellationToken::new(),
        ))
    }

    fn stream(id: i64, account: Option<i64>) -> Stream {
        Stream {
            id,
            name: format!("stream-{id}"),
            url: format!("http://provider.example/{id}.ts"),
            m3u_account_id: account,
            is_custom: account.is_none(),
        }
    }

    fn ok_result(bitrate: Option<u32>) -> ProbeResult {
        ProbeResult {
            status: ProbeStatus::Ok,
            resolution_w: 1920,
            resolution_h: 1080,
            fps: 50.0,
            video_codec: Some("h264".to_string()),
            audio_codec: None,
            bitrate_kbps: bitrate,
            last_checked_at: Utc::now(),
            used_profile_id: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn build_ranked_scores_and_flags_dead() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker_fixture(dir.path()).await;

        checker
            .index
            .install_accounts(vec![M3uAccount {
                id: 1,
                name: "provider".to_string(),
                server_url: None,
                max_streams: 0,
                priority: 5,
                proxy: None,
                profiles: vec![],
            }])
            .await;

        let members = vec![stream(1, Some(1)), stream(2, Some(1)), stream(3, Some(1))];
        checker.stats.insert(1, ok_result(Some(5000))).await;
        checker.stats.insert(2, ok_result(Some(2000))).await;
        checker.dead.record(3, "probe returned no picture").await.unwrap();

        let cfg = StreamCheckerConfig::default();
        let effective = EffectiveSettings::default();
        let ranked = checker.build_ranked(&members, &cfg, &effective).await;

        assert_eq!(ranked.len(), 3);
        assert!(ranked[0].score > ranked[1].score);
        assert!(ranked[2].dead);
        assert_eq!(ranked[2].score, 0.0);
        // Priority boost applied through the account
        assert!(ranked[0].score > 5.0);
    }

    #[tokio::test]
    async fn build_ranked_priority_only_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker_fixture(dir.path()).await;
        checker
            .index
            .install_accounts(vec![M3uAccount {
                id: 9,
                name: "legacy".to_string(),
                server_url: None,
                max_streams: 0,
                priority: 42,
                proxy: None,
                profiles: vec![],
            }])
            .await;

        let cfg = StreamCheckerConfig {
            quality_excluded_accounts: vec![9],
            ..Default::default()
        };
        let members = vec![stream(1, Some(9))];
        let ranked = checker
            .build_ranked(&members, &cfg, &EffectiveSettings::default())
            .await;
        // Never probed: scored by priority alone, not flagged dead
        assert_eq!(ranked[0].score, 42.0);
        assert!(!ranked[0].dead);
    }

    #[tokio::test]
    async fn build_ranked_applies_quality_preference() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker_fixture(dir.path()).await;

        let members = vec![stream(1, None)];
        let mut uhd = ok_result(Some(8000));
        uhd.resolution_w = 3840;
        uhd.resolution_h = 2160;
        checker.stats.insert(1, uhd).await;

        let cfg = StreamCheckerConfig::default();
        let capped = EffectiveSettings {
            quality_preference: QualityPreference::Max1080p,
            ..Default::default()
        };
        let ranked = checker.build_ranked(&members, &cfg, &capped).await;
        assert!(ranked[0].score < 0.0);
    }

    #[tokio::test]
    async fn rescore_skips_channels_without_stats() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker_fixture(dir.path()).await;
        checker
            .index
            .install_channels(vec![Channel {
                id: 1,
                name: "CNN".to_string(),
                number: 1.0,
                logo_id: None,
                channel_group_id: None,
                streams: vec![10, 11],
            }])
            .await;
        checker
            .index
            .install_streams(vec![stream(10, None), stream(11, None)])
            .await;

        assert!(!checker.rescore_channel(1).await.unwrap());
        // Unknown channel is skipped, not an error
        assert!(!checker.rescore_channel(99).await.unwrap());
    }

    #[tokio::test]
    async fn checking_disabled_drops_entry_without_tracker_update() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker_fixture(dir.path()).await;
        checker
            .index
            .install_channels(vec![Channel {
                id: 1,
                name: "CNN".to_string(),
                number: 1.0,
                logo_id: None,
                channel_group_id: None,
                streams: vec![],
            }])
            .await;
        checker
            .settings
            .set_channel_override(
                1,
                crate::models::SettingOverrides {
                    checking_mode: Some(crate::models::SettingMode::Disabled),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        checker.queue.enqueue(1, 0, false).await;
        let entry = checker.queue.dequeue().await.unwrap();
        checker.process_entry(entry).await;

        assert_eq!(checker.queue.in_progress_count().await, 0);
        assert!(checker.updates.get(1).await.last_updated_at.is_none());
    }
}
