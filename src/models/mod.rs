//! Core data model shared across the engine
//!
//! All entity identifiers are opaque integers supplied by the upstream
//! service. The engine never invents entity ids; internal lease ids for the
//! concurrency limiter use UUIDs instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Name prefix the upstream carries on streams previously declared dead
pub const DEAD_NAME_PREFIX: &str = "[DEAD]";

/// One playable source as reported by the upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub name: String,
    pub url: String,
    /// None for custom streams that do not belong to a provider account
    pub m3u_account_id: Option<i64>,
    #[serde(default)]
    pub is_custom: bool,
}

impl Stream {
    /// True when the upstream name carries the dead marker prefix
    pub fn has_dead_prefix(&self) -> bool {
        self.name.trim_start().starts_with(DEAD_NAME_PREFIX)
    }
}

/// User-facing channel with an ordered stream membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub number: f64,
    pub logo_id: Option<i64>,
    pub channel_group_id: Option<i64>,
    /// Ordered stream ids; the upstream order is authoritative
    #[serde(default)]
    pub streams: Vec<i64>,
}

/// Channel group summary; only groups with at least one channel are surfaced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub channel_count: u32,
    #[serde(default)]
    pub m3u_account_count: u32,
}

/// Provider credential and identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M3uAccount {
    pub id: i64,
    pub name: String,
    pub server_url: Option<String>,
    /// Maximum concurrent sessions; 0 means unlimited
    #[serde(default)]
    pub max_streams: u32,
    /// Additive ordering boost for streams of this account
    #[serde(default)]
    pub priority: i32,
    /// Optional HTTP proxy used for analyzer invocations on this account
    pub proxy: Option<String>,
    #[serde(default)]
    pub profiles: Vec<M3uProfile>,
}

/// Alternate access path to an account, possibly rewriting stream URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct M3uProfile {
    pub id: i64,
    #[serde(default)]
    pub account_id: i64,
    pub name: String,
    /// Maximum concurrent sessions on this profile; 0 means unlimited
    #[serde(default)]
    pub max_streams: u32,
    #[serde(default)]
    pub is_active: bool,
    pub search_pattern: Option<String>,
    pub replace_pattern: Option<String>,
    #[serde(default)]
    pub is_default: bool,
}

/// Live proxy session state for one channel, as published by the upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySessionChannel {
    pub channel_id: i64,
    #[serde(default)]
    pub state: String,
    pub m3u_profile_id: Option<i64>,
    #[serde(default)]
    pub client_count: u32,
    pub stream_id: Option<i64>,
}

/// Structured proxy session view; legacy shapes are rejected by the client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySessions {
    #[serde(default)]
    pub channels: Vec<ProxySessionChannel>,
    #[serde(default)]
    pub count: u32,
}

/// Outcome classification of a single analyzer invocation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProbeStatus {
    Ok,
    Error,
    Timeout,
}

/// Cached per-stream probe result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub status: ProbeStatus,
    pub resolution_w: u32,
    pub resolution_h: u32,
    pub fps: f64,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub bitrate_kbps: Option<u32>,
    pub last_checked_at: DateTime<Utc>,
    pub used_profile_id: Option<i64>,
    pub error_message: Option<String>,
}

impl ProbeResult {
    /// A probe that technically succeeded but produced no usable picture
    pub fn is_dead(&self) -> bool {
        match self.status {
            ProbeStatus::Ok => {
                (self.resolution_w == 0 && self.resolution_h == 0)
                    || self.bitrate_kbps == Some(0)
            }
            ProbeStatus::Error | ProbeStatus::Timeout => false,
        }
    }
}

/// Quality preference applied when scoring a channel's streams
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
pub enum QualityPreference {
    #[default]
    Default,
    #[serde(rename = "prefer_4k")]
    #[strum(serialize = "prefer_4k")]
    Prefer4k,
    #[serde(rename = "avoid_4k")]
    #[strum(serialize = "avoid_4k")]
    Avoid4k,
    #[serde(rename = "max_1080p")]
    #[strum(serialize = "max_1080p")]
    Max1080p,
    #[serde(rename = "max_720p")]
    #[strum(serialize = "max_720p")]
    Max720p,
}

/// Enable/disable switch used by channel and group settings
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
pub enum SettingMode {
    #[default]
    Enabled,
    Disabled,
}

impl SettingMode {
    pub fn is_enabled(self) -> bool {
        self == SettingMode::Enabled
    }
}

/// Per-channel or per-group setting overrides; unset fields inherit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingOverrides {
    pub matching_mode: Option<SettingMode>,
    pub checking_mode: Option<SettingMode>,
    pub quality_preference: Option<QualityPreference>,
}

/// Fully resolved settings for one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveSettings {
    pub matching_mode: SettingMode,
    pub checking_mode: SettingMode,
    pub quality_preference: QualityPreference,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            matching_mode: SettingMode::Enabled,
            checking_mode: SettingMode::Enabled,
            quality_preference: QualityPreference::Default,
        }
    }
}

/// One regex rule attached to a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegexPatternRecord {
    pub pattern: String,
    /// When set, only streams of these accounts are eligible for this pattern
    pub m3u_accounts: Option<Vec<i64>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Per-channel freshness bookkeeping
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateState {
    pub last_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_stream_count: u32,
    #[serde(default)]
    pub force_check_requested: bool,
}

/// Persistent record of a stream previously determined unplayable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadStreamRecord {
    pub stream_id: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub reason: String,
}

/// Coarse action kinds recorded in the changelog
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangelogAction {
    PlaylistRefresh,
    StreamMatching,
    QualityCheck,
    GlobalAction,
    RescoreResort,
    DeadStream,
    ConfigChange,
    Failure,
}

/// One changelog line; appends are totally ordered by `seq`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogEntry {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ChangelogAction,
    pub detail: String,
}

/// Snapshot of an upstream profile kept for reviving disabled streams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub profile_id: i64,
    pub account_id: i64,
    pub name: String,
    #[serde(default)]
    pub max_streams: u32,
    pub search_pattern: Option<String>,
    pub replace_pattern: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_prefix_detection() {
        let stream = Stream {
            id: 1,
            name: "[DEAD] CNN HD".to_string(),
            url: "http://example.com/1".to_string(),
            m3u_account_id: Some(1),
            is_custom: false,
        };
        assert!(stream.has_dead_prefix());

        let healthy = Stream {
            name: "CNN HD".to_string(),
            ..stream
        };
        assert!(!healthy.has_dead_prefix());
    }

    #[test]
    fn probe_result_dead_classification() {
        let base = ProbeResult {
            status: ProbeStatus::Ok,
            resolution_w: 1920,
            resolution_h: 1080,
            fps: 50.0,
            video_codec: Some("h264".to_string()),
            audio_codec: Some("aac".to_string()),
            bitrate_kbps: Some(4200),
            last_checked_at: Utc::now(),
            used_profile_id: None,
            error_message: None,
        };
        assert!(!base.is_dead());

        let no_picture = ProbeResult {
            resolution_w: 0,
            resolution_h: 0,
            ..base.clone()
        };
        assert!(no_picture.is_dead());

        let zero_bitrate = ProbeResult {
            bitrate_kbps: Some(0),
            ..base.clone()
        };
        assert!(zero_bitrate.is_dead());

        // A failed probe is an error, not a dead classification
        let errored = ProbeResult {
            status: ProbeStatus::Error,
            resolution_w: 0,
            resolution_h: 0,
            ..base
        };
        assert!(!errored.is_dead());
    }

    #[test]
    fn quality_preference_serde_round_trip() {
        let json = serde_json::to_string(&QualityPreference::Max1080p).unwrap();
        assert_eq!(json, "\"max_1080p\"");
        let back: QualityPreference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, QualityPreference::Max1080p);
    }
}
