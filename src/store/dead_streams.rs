//! Dead-stream tracker
//!
//! Streams that probed unplayable (zero resolution or zero bitrate) are
//! recorded here so matching excludes them and ordering prunes them. The
//! whole set is cleared at the start of every global action, giving each
//! stream a fresh chance to prove itself.

use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{JsonFile, StoreHealth};
use crate::errors::StoreError;
use crate::models::DeadStreamRecord;

const STORE_NAME: &str = "dead_streams";

type DeadMap = HashMap<i64, DeadStreamRecord>;

pub struct DeadStreamTracker {
    file: JsonFile,
    health: StoreHealth,
    state: RwLock<DeadMap>,
}

impl DeadStreamTracker {
    pub async fn open(data_dir: &Path, health: StoreHealth) -> Self {
        let file = JsonFile::new(data_dir, "dead_streams.json");
        let state = match file.load_or_default::<DeadMap>() {
            Ok(map) => map,
            Err(e) => {
                warn!("Dead-stream tracker starting empty: {e}");
                health.record(STORE_NAME, e.to_string()).await;
                DeadMap::default()
            }
        };
        Self {
            file,
            health,
            state: RwLock::new(state),
        }
    }

    pub async fn contains(&self, stream_id: i64) -> bool {
        self.state.read().await.contains_key(&stream_id)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    pub async fn list(&self) -> Vec<DeadStreamRecord> {
        let mut records: Vec<_> = self.state.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.stream_id);
        records
    }

    /// Record a stream as dead, updating `last_seen_at` on repeat sightings
    pub async fn record(&self, stream_id: i64, reason: &str) -> Result<(), StoreError> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.entry(stream_id)
            .and_modify(|record| {
                record.last_seen_at = now;
                record.reason = reason.to_string();
            })
            .or_insert_with(|| DeadStreamRecord {
                stream_id,
                first_seen_at: now,
                last_seen_at: now,
                reason: reason.to_string(),
            });
        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        debug!("Recorded dead stream {stream_id}: {reason}");
        Ok(())
    }

    /// Revival protocol: a healthy probe removes the record
    pub async fn revive(&self, stream_id: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if !state.contains_key(&stream_id) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.remove(&stream_id);
        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        debug!("Revived stream {stream_id}");
        Ok(true)
    }

    /// Wholesale clear, invoked at global-action start
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let mut state = self.state.write().await;
        let cleared = state.len();
        let next = DeadMap::default();
        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_revive_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = DeadStreamTracker::open(dir.path(), StoreHealth::new()).await;

        tracker.record(42, "no video stream").await.unwrap();
        assert!(tracker.contains(42).await);

        // Second sighting keeps first_seen_at
        let first_seen = tracker.list().await[0].first_seen_at;
        tracker.record(42, "zero bitrate").await.unwrap();
        let record = &tracker.list().await[0];
        assert_eq!(record.first_seen_at, first_seen);
        assert_eq!(record.reason, "zero bitrate");

        assert!(tracker.revive(42).await.unwrap());
        assert!(!tracker.revive(42).await.unwrap());
        assert!(tracker.is_empty().await);
    }

    #[tokio::test]
    async fn clear_all_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = DeadStreamTracker::open(dir.path(), StoreHealth::new()).await;
        tracker.record(1, "r").await.unwrap();
        tracker.record(2, "r").await.unwrap();

        let reopened = DeadStreamTracker::open(dir.path(), StoreHealth::new()).await;
        assert_eq!(reopened.len().await, 2);

        assert_eq!(reopened.clear_all().await.unwrap(), 2);
        let reopened_again = DeadStreamTracker::open(dir.path(), StoreHealth::new()).await;
        assert!(reopened_again.is_empty().await);
    }
}
