//! Runtime-mutable configuration blobs
//!
//! Three JSON blobs edited through the HTTP surface: automation behavior,
//! stream-checker behavior and the per-profile snapshots. Each blob has
//! defaults for every key, a validation function applied at the HTTP
//! boundary and in-place mutation through [`BlobStore::update`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use strum::{Display, EnumString};
use tokio::sync::RwLock;
use tracing::warn;

use super::{JsonFile, StoreHealth};
use crate::errors::{AppError, StoreError};
use crate::models::ProfileSnapshot;
use crate::utils::cron_helper::validate_cron_expression;

/// Generic store for one JSON configuration blob
pub struct BlobStore<T> {
    name: &'static str,
    file: JsonFile,
    health: StoreHealth,
    state: RwLock<T>,
}

impl<T> BlobStore<T>
where
    T: Clone + Serialize + DeserializeOwned + Default,
{
    /// Open the blob, starting from defaults when the file is missing or
    /// unreadable. Corruption is recorded in `health` rather than failing
    /// startup.
    pub async fn open(
        data_dir: &Path,
        name: &'static str,
        file_name: &str,
        health: StoreHealth,
    ) -> Self {
        let file = JsonFile::new(data_dir, file_name);
        let state = match file.load_or_default::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Store {name} starting from defaults: {e}");
                health.record(name, e.to_string()).await;
                T::default()
            }
        };
        Self {
            name,
            file,
            health,
            state: RwLock::new(state),
        }
    }

    /// Snapshot the current value
    pub async fn get(&self) -> T {
        self.state.read().await.clone()
    }

    /// Replace the whole blob; persists before the in-memory swap
    pub async fn set(&self, value: T) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        self.file.save(&value)?;
        *state = value;
        self.health.clear(self.name).await;
        Ok(())
    }

    /// Mutate the blob in place; persists before the in-memory swap
    pub async fn update<F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        mutate(&mut next);
        self.file.save(&next)?;
        *state = next.clone();
        self.health.clear(self.name).await;
        Ok(next)
    }
}

/// Automation behavior: playlist refresh cadence and matching toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// Interval between playlist refresh ticks; ignored when a cron is set
    #[serde(default = "default_playlist_interval_minutes")]
    pub playlist_update_interval_minutes: u64,
    /// Optional cron expression overriding the interval
    #[serde(default)]
    pub playlist_update_cron: Option<String>,
    #[serde(default = "default_true")]
    pub auto_stream_matching: bool,
    #[serde(default = "default_true")]
    pub auto_quality_checking: bool,
    /// Cron for the comprehensive global action; disabled when unset
    #[serde(default)]
    pub global_action_cron: Option<String>,
    /// Drop channel streams that no enabled pattern matches anymore
    #[serde(default)]
    pub remove_non_matching_streams: bool,
    /// When set, matching only considers streams of these accounts
    #[serde(default)]
    pub enabled_accounts: Option<Vec<i64>>,
    /// Recently probed channels are not re-queued within this window
    #[serde(default = "default_immunity_hours")]
    pub immunity_hours: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            playlist_update_interval_minutes: default_playlist_interval_minutes(),
            playlist_update_cron: None,
            auto_stream_matching: true,
            auto_quality_checking: true,
            global_action_cron: None,
            remove_non_matching_streams: false,
            enabled_accounts: None,
            immunity_hours: default_immunity_hours(),
        }
    }
}

impl AutomationConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.playlist_update_interval_minutes == 0 {
            return Err(AppError::validation_field(
                "playlist_update_interval_minutes must be at least 1",
                "playlist_update_interval_minutes",
            ));
        }
        for (field, cron) in [
            ("playlist_update_cron", &self.playlist_update_cron),
            ("global_action_cron", &self.global_action_cron),
        ] {
            if let Some(expression) = cron {
                validate_cron_expression(expression)
                    .map_err(|e| AppError::validation_field(e, field))?;
            }
        }
        Ok(())
    }
}

/// Relative weights of the quality score components; sum-normalized at use
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_resolution_weight")]
    pub resolution: f64,
    #[serde(default = "default_bitrate_weight")]
    pub bitrate: f64,
    #[serde(default = "default_fps_weight")]
    pub fps: f64,
    #[serde(default = "default_codec_weight")]
    pub codec: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            resolution: default_resolution_weight(),
            bitrate: default_bitrate_weight(),
            fps: default_fps_weight(),
            codec: default_codec_weight(),
        }
    }
}

/// Interleaving strategy across provider accounts
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiversificationStrategy {
    #[default]
    RoundRobin,
    PriorityWeighted,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiversificationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: DiversificationStrategy,
}

/// Post-sort per-account stream caps; 0 means unlimited
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountStreamLimits {
    #[serde(default)]
    pub global_limit: u32,
    #[serde(default)]
    pub per_account: HashMap<i64, u32>,
}

impl AccountStreamLimits {
    /// Effective cap for one account; `None` means unlimited
    pub fn limit_for(&self, account_id: i64) -> Option<u32> {
        let limit = self
            .per_account
            .get(&account_id)
            .copied()
            .unwrap_or(self.global_limit);
        (limit > 0).then_some(limit)
    }
}

/// Stream checker behavior: worker pool, analyzer invocation, failover,
/// scoring and final-ordering knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamCheckerConfig {
    /// Number of channel workers pulling from the queue
    #[serde(default = "default_global_concurrent_limit")]
    pub global_concurrent_limit: usize,
    /// Concurrent analyzer invocations per channel
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
    #[serde(default = "default_ffmpeg_duration_seconds")]
    pub ffmpeg_duration_seconds: u64,
    #[serde(default = "default_analyzer_timeout_seconds")]
    pub analyzer_timeout_seconds: u64,
    #[serde(default = "default_analyzer_retries")]
    pub analyzer_retries: u32,
    #[serde(default = "default_retry_delay_seconds")]
    pub retry_delay_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Enables Phase 2 intelligent polling after Phase 1 exhausts
    #[serde(default = "default_true")]
    pub try_full_profiles: bool,
    #[serde(default = "default_phase2_max_wait_seconds")]
    pub phase2_max_wait_seconds: u64,
    #[serde(default = "default_phase2_poll_interval_seconds")]
    pub phase2_poll_interval_seconds: u64,
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Multiplied with account priority and added to the quality score
    #[serde(default = "default_priority_boost_factor")]
    pub priority_boost_factor: f64,
    #[serde(default)]
    pub diversification: DiversificationConfig,
    #[serde(default)]
    pub account_stream_limits: AccountStreamLimits,
    /// Accounts whose streams are ordered by priority alone, never probed
    #[serde(default)]
    pub quality_excluded_accounts: Vec<i64>,
    /// Leases older than this are force-released by the reaper
    #[serde(default = "default_stale_token_seconds")]
    pub stale_token_seconds: u64,
}

impl Default for StreamCheckerConfig {
    fn default() -> Self {
        Self {
            global_concurrent_limit: default_global_concurrent_limit(),
            probe_concurrency: default_probe_concurrency(),
            ffmpeg_duration_seconds: default_ffmpeg_duration_seconds(),
            analyzer_timeout_seconds: default_analyzer_timeout_seconds(),
            analyzer_retries: default_analyzer_retries(),
            retry_delay_seconds: default_retry_delay_seconds(),
            user_agent: default_user_agent(),
            try_full_profiles: true,
            phase2_max_wait_seconds: default_phase2_max_wait_seconds(),
            phase2_poll_interval_seconds: default_phase2_poll_interval_seconds(),
            weights: ScoreWeights::default(),
            priority_boost_factor: default_priority_boost_factor(),
            diversification: DiversificationConfig::default(),
            account_stream_limits: AccountStreamLimits::default(),
            quality_excluded_accounts: Vec::new(),
            stale_token_seconds: default_stale_token_seconds(),
        }
    }
}

impl StreamCheckerConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.global_concurrent_limit == 0 {
            return Err(AppError::validation_field(
                "global_concurrent_limit must be at least 1",
                "global_concurrent_limit",
            ));
        }
        if self.probe_concurrency == 0 {
            return Err(AppError::validation_field(
                "probe_concurrency must be at least 1",
                "probe_concurrency",
            ));
        }
        if self.analyzer_timeout_seconds == 0 {
            return Err(AppError::validation_field(
                "analyzer_timeout_seconds must be positive",
                "analyzer_timeout_seconds",
            ));
        }
        let weights = self.weights;
        if weights.resolution < 0.0
            || weights.bitrate < 0.0
            || weights.fps < 0.0
            || weights.codec < 0.0
        {
            return Err(AppError::validation_field(
                "score weights must be non-negative",
                "weights",
            ));
        }
        if weights.resolution + weights.bitrate + weights.fps + weights.codec <= 0.0 {
            return Err(AppError::validation_field(
                "at least one score weight must be positive",
                "weights",
            ));
        }
        Ok(())
    }
}

/// Per-profile snapshots keyed by profile id
pub type ProfileConfigMap = HashMap<i64, ProfileSnapshot>;

fn default_true() -> bool {
    true
}

fn default_playlist_interval_minutes() -> u64 {
    60
}

fn default_immunity_hours() -> u64 {
    2
}

fn default_global_concurrent_limit() -> usize {
    4
}

fn default_probe_concurrency() -> usize {
    3
}

fn default_ffmpeg_duration_seconds() -> u64 {
    10
}

fn default_analyzer_timeout_seconds() -> u64 {
    30
}

fn default_analyzer_retries() -> u32 {
    1
}

fn default_retry_delay_seconds() -> u64 {
    2
}

fn default_user_agent() -> String {
    "VLC/3.0.20 LibVLC/3.0.20".to_string()
}

fn default_phase2_max_wait_seconds() -> u64 {
    300
}

fn default_phase2_poll_interval_seconds() -> u64 {
    10
}

fn default_priority_boost_factor() -> f64 {
    1.0
}

fn default_resolution_weight() -> f64 {
    0.4
}

fn default_bitrate_weight() -> f64 {
    0.3
}

fn default_fps_weight() -> f64 {
    0.2
}

fn default_codec_weight() -> f64 {
    0.1
}

fn default_stale_token_seconds() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let health = StoreHealth::new();
        let store: BlobStore<AutomationConfig> =
            BlobStore::open(dir.path(), "automation", "automation_config.json", health).await;

        let mut config = store.get().await;
        config.playlist_update_interval_minutes = 15;
        config.auto_quality_checking = false;
        store.set(config.clone()).await.unwrap();

        // Reopen from disk; values must survive
        let reopened: BlobStore<AutomationConfig> = BlobStore::open(
            dir.path(),
            "automation",
            "automation_config.json",
            StoreHealth::new(),
        )
        .await;
        let loaded = reopened.get().await;
        assert_eq!(loaded.playlist_update_interval_minutes, 15);
        assert!(!loaded.auto_quality_checking);
        assert!(loaded.auto_stream_matching);
    }

    #[tokio::test]
    async fn update_persists_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store: BlobStore<StreamCheckerConfig> = BlobStore::open(
            dir.path(),
            "stream_checker",
            "stream_checker_config.json",
            StoreHealth::new(),
        )
        .await;

        store
            .update(|c| c.global_concurrent_limit = 9)
            .await
            .unwrap();
        assert_eq!(store.get().await.global_concurrent_limit, 9);
    }

    #[test]
    fn account_limit_resolution() {
        let mut limits = AccountStreamLimits {
            global_limit: 3,
            per_account: HashMap::new(),
        };
        limits.per_account.insert(7, 1);
        limits.per_account.insert(8, 0);

        assert_eq!(limits.limit_for(7), Some(1));
        // Explicit 0 override means unlimited for that account
        assert_eq!(limits.limit_for(8), None);
        assert_eq!(limits.limit_for(9), Some(3));

        let off = AccountStreamLimits::default();
        assert_eq!(off.limit_for(7), None);
    }

    #[test]
    fn checker_config_validation() {
        let mut config = StreamCheckerConfig::default();
        assert!(config.validate().is_ok());

        config.global_concurrent_limit = 0;
        assert!(config.validate().is_err());

        config = StreamCheckerConfig::default();
        config.weights.resolution = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn automation_config_cron_validation() {
        let mut config = AutomationConfig {
            global_action_cron: Some("0 0 3 * * * *".to_string()),
            ..AutomationConfig::default()
        };
        assert!(config.validate().is_ok());

        config.global_action_cron = Some("bogus".to_string());
        assert!(config.validate().is_err());
    }
}
