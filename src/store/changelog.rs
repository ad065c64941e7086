//! Append-only activity changelog
//!
//! Entries are totally ordered by a monotonic sequence number. Appends prune
//! entries older than the retention window so the file stays bounded.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::warn;

use super::{JsonFile, StoreHealth};
use crate::errors::StoreError;
use crate::models::{ChangelogAction, ChangelogEntry};

const STORE_NAME: &str = "changelog";
const RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChangelogState {
    next_seq: u64,
    entries: Vec<ChangelogEntry>,
}

pub struct Changelog {
    file: JsonFile,
    health: StoreHealth,
    state: RwLock<ChangelogState>,
}

impl Changelog {
    pub async fn open(data_dir: &Path, health: StoreHealth) -> Self {
        let file = JsonFile::new(data_dir, "changelog.json");
        let state = match file.load_or_default::<ChangelogState>() {
            Ok(state) => state,
            Err(e) => {
                warn!("Changelog starting empty: {e}");
                health.record(STORE_NAME, e.to_string()).await;
                ChangelogState::default()
            }
        };
        Self {
            file,
            health,
            state: RwLock::new(state),
        }
    }

    /// Append one entry; assigns the next sequence number and prunes old
    /// entries in the same write
    pub async fn append(
        &self,
        action: ChangelogAction,
        detail: impl Into<String>,
    ) -> Result<ChangelogEntry, StoreError> {
        let now = Utc::now();
        let cutoff = now - Duration::days(RETENTION_DAYS);

        let mut state = self.state.write().await;
        let mut next = state.clone();
        let entry = ChangelogEntry {
            seq: next.next_seq,
            timestamp: now,
            action,
            detail: detail.into(),
        };
        next.next_seq += 1;
        next.entries.retain(|e| e.timestamp >= cutoff);
        next.entries.push(entry.clone());

        self.file.save(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(entry)
    }

    /// Entries from the last `days` days, newest first
    pub async fn entries_since_days(&self, days: u32) -> Vec<ChangelogEntry> {
        let cutoff = Utc::now() - Duration::days(days as i64);
        let state = self.state.read().await;
        let mut entries: Vec<_> = state
            .entries
            .iter()
            .filter(|e| e.timestamp >= cutoff)
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_are_sequenced() {
        let dir = tempfile::tempdir().unwrap();
        let log = Changelog::open(dir.path(), StoreHealth::new()).await;

        let a = log
            .append(ChangelogAction::PlaylistRefresh, "refreshed 3 accounts")
            .await
            .unwrap();
        let b = log
            .append(ChangelogAction::QualityCheck, "channel 5 checked")
            .await
            .unwrap();
        assert!(b.seq > a.seq);

        let entries = log.entries_since_days(1).await;
        assert_eq!(entries.len(), 2);
        // Newest first
        assert_eq!(entries[0].seq, b.seq);
    }

    #[tokio::test]
    async fn sequence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let log = Changelog::open(dir.path(), StoreHealth::new()).await;
            log.append(ChangelogAction::GlobalAction, "run").await.unwrap();
        }
        let log = Changelog::open(dir.path(), StoreHealth::new()).await;
        let entry = log
            .append(ChangelogAction::GlobalAction, "run again")
            .await
            .unwrap();
        assert_eq!(entry.seq, 1);
    }

    #[tokio::test]
    async fn window_filter_excludes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let log = Changelog::open(dir.path(), StoreHealth::new()).await;
        log.append(ChangelogAction::Failure, "boom").await.unwrap();

        assert_eq!(log.entries_since_days(0).await.len(), 0);
        assert_eq!(log.entries_since_days(7).await.len(), 1);
    }
}
