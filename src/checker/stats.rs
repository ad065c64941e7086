//! Per-stream probe result cache
//!
//! Backs the immunity window, `rescore-resort` and the
//! `test-streams-without-stats` trigger. Process-local; probing after a
//! restart rebuilds it.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::ProbeResult;

#[derive(Default)]
pub struct ProbeCache {
    inner: RwLock<HashMap<i64, ProbeResult>>,
}

impl ProbeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, stream_id: i64) -> Option<ProbeResult> {
        self.inner.read().await.get(&stream_id).cloned()
    }

    pub async fn insert(&self, stream_id: i64, result: ProbeResult) {
        self.inner.write().await.insert(stream_id, result);
    }

    pub async fn contains(&self, stream_id: i64) -> bool {
        self.inner.read().await.contains_key(&stream_id)
    }

    /// True when the stream was probed within the immunity window
    pub async fn is_fresh(&self, stream_id: i64, window_hours: u64) -> bool {
        let inner = self.inner.read().await;
        inner
            .get(&stream_id)
            .map(|r| Utc::now() - r.last_checked_at < Duration::hours(window_hours as i64))
            .unwrap_or(false)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProbeStatus;

    fn result(hours_ago: i64) -> ProbeResult {
        ProbeResult {
            status: ProbeStatus::Ok,
            resolution_w: 1920,
            resolution_h: 1080,
            fps: 50.0,
            video_codec: Some("h264".to_string()),
            audio_codec: None,
            bitrate_kbps: Some(4000),
            last_checked_at: Utc::now() - Duration::hours(hours_ago),
            used_profile_id: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn freshness_window() {
        let cache = ProbeCache::new();
        cache.insert(1, result(0)).await;
        cache.insert(2, result(3)).await;

        assert!(cache.is_fresh(1, 2).await);
        assert!(!cache.is_fresh(2, 2).await);
        assert!(!cache.is_fresh(99, 2).await);
    }
}
