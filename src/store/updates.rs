//! Per-channel update tracker
//!
//! Freshness bookkeeping that backs queue immunity: when a channel was last
//! written, how many streams it had, and whether a force check is pending.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::warn;

use super::{JsonFile, StoreHealth};
use crate::errors::StoreError;
use crate::models::UpdateState;

const STORE_NAME: &str = "channel_updates";

type UpdateMap = HashMap<i64, UpdateState>;

pub struct UpdateTracker {
    file: JsonFile,
    health: StoreHealth,
    state: RwLock<UpdateMap>,
}

impl UpdateTracker {
    pub async fn open(data_dir: &Path, health: StoreHealth) -> Self {
        let file = JsonFile::new(data_dir, "channel_updates.json");
        let state = match file.load_or_default::<UpdateMap>() {
            Ok(map) => map,
            Err(e) => {
                warn!("Update tracker starting empty: {e}");
                health.record(STORE_NAME, e.to_string()).await;
                UpdateMap::default()
            }
        };
        Self {
            file,
            health,
            state: RwLock::new(state),
        }
    }

    pub async fn get(&self, channel_id: i64) -> UpdateState {
        self.state
            .read()
            .await
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> UpdateMap {
        self.state.read().await.clone()
    }

    /// True when the channel was written within the immunity window and no
    /// force check is pending
    pub async fn is_recently_updated(&self, channel_id: i64, window_hours: u64) -> bool {
        let state = self.state.read().await;
        let Some(entry) = state.get(&channel_id) else {
            return false;
        };
        if entry.force_check_requested {
            return false;
        }
        match entry.last_updated_at {
            Some(at) => Utc::now() - at < Duration::hours(window_hours as i64),
            None => false,
        }
    }

    /// Mark a successful write-back; clears any pending force flag
    pub async fn mark_updated(&self, channel_id: i64, stream_count: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.insert(
            channel_id,
            UpdateState {
                last_updated_at: Some(Utc::now()),
                last_stream_count: stream_count,
                force_check_requested: false,
            },
        );
        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(())
    }

    /// Flag the channel so the next queue pass bypasses immunity
    pub async fn request_force_check(&self, channel_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let mut next = state.clone();
        next.entry(channel_id).or_default().force_check_requested = true;
        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(())
    }
}
