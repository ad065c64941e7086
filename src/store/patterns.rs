//! Per-channel regex pattern store
//!
//! Each channel owns an ordered list of pattern records. Order matters for
//! presentation only; matching unions all enabled patterns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::warn;

use super::{JsonFile, StoreHealth};
use crate::errors::{AppError, AppResult, StoreError};
use crate::models::RegexPatternRecord;

const STORE_NAME: &str = "channel_regex";

type PatternMap = HashMap<i64, Vec<RegexPatternRecord>>;

/// One pattern-text rewrite produced by a mass edit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MassEditChange {
    pub channel_id: i64,
    pub index: usize,
    pub before: String,
    pub after: String,
}

pub struct RegexPatternStore {
    file: JsonFile,
    health: StoreHealth,
    state: RwLock<PatternMap>,
}

impl RegexPatternStore {
    pub async fn open(data_dir: &Path, health: StoreHealth) -> Self {
        let file = JsonFile::new(data_dir, "channel_regex_config.json");
        let state = match file.load_or_default::<PatternMap>() {
            Ok(map) => map,
            Err(e) => {
                warn!("Pattern store starting empty: {e}");
                health.record(STORE_NAME, e.to_string()).await;
                PatternMap::default()
            }
        };
        Self {
            file,
            health,
            state: RwLock::new(state),
        }
    }

    pub async fn snapshot(&self) -> PatternMap {
        self.state.read().await.clone()
    }

    pub async fn patterns_for(&self, channel_id: i64) -> Vec<RegexPatternRecord> {
        self.state
            .read()
            .await
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace a channel's full pattern list
    pub async fn set_patterns(
        &self,
        channel_id: i64,
        patterns: Vec<RegexPatternRecord>,
    ) -> AppResult<()> {
        for record in &patterns {
            validate_pattern_text(&record.pattern)?;
        }
        self.commit(|map| {
            if patterns.is_empty() {
                map.remove(&channel_id);
            } else {
                map.insert(channel_id, patterns.clone());
            }
        })
        .await?;
        Ok(())
    }

    /// Append one pattern to a channel
    pub async fn add_pattern(&self, channel_id: i64, record: RegexPatternRecord) -> AppResult<()> {
        validate_pattern_text(&record.pattern)?;
        self.commit(|map| {
            map.entry(channel_id).or_default().push(record.clone());
        })
        .await?;
        Ok(())
    }

    /// Remove a channel's pattern by position
    pub async fn remove_pattern(&self, channel_id: i64, index: usize) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(patterns) = state.get(&channel_id) else {
            return Err(AppError::not_found("channel patterns", channel_id));
        };
        if index >= patterns.len() {
            return Err(AppError::not_found(
                "pattern index",
                format!("{channel_id}/{index}"),
            ));
        }
        let mut next = state.clone();
        let list = next.entry(channel_id).or_default();
        list.remove(index);
        if list.is_empty() {
            next.remove(&channel_id);
        }
        self.persist(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(())
    }

    /// Append the same pattern to many channels
    pub async fn add_common_pattern(
        &self,
        channel_ids: &[i64],
        record: RegexPatternRecord,
    ) -> AppResult<()> {
        validate_pattern_text(&record.pattern)?;
        self.commit(|map| {
            for channel_id in channel_ids {
                map.entry(*channel_id).or_default().push(record.clone());
            }
        })
        .await?;
        Ok(())
    }

    /// Toggle the enabled flag on every pattern of the given channels
    pub async fn bulk_set_enabled(&self, channel_ids: &[i64], enabled: bool) -> AppResult<usize> {
        let mut touched = 0usize;
        self.commit(|map| {
            for channel_id in channel_ids {
                if let Some(patterns) = map.get_mut(channel_id) {
                    for record in patterns.iter_mut() {
                        if record.enabled != enabled {
                            record.enabled = enabled;
                            touched += 1;
                        }
                    }
                }
            }
        })
        .await?;
        Ok(touched)
    }

    /// Compute the rewrites a mass edit would apply, without applying them
    pub async fn mass_edit_preview(
        &self,
        find: &str,
        replace: &str,
        channel_ids: Option<&[i64]>,
    ) -> AppResult<Vec<MassEditChange>> {
        let finder = Regex::new(find)
            .map_err(|e| AppError::validation_field(format!("invalid find pattern: {e}"), "find"))?;

        let state = self.state.read().await;
        let mut changes = Vec::new();
        for (channel_id, patterns) in state.iter() {
            if let Some(filter) = channel_ids {
                if !filter.contains(channel_id) {
                    continue;
                }
            }
            for (index, record) in patterns.iter().enumerate() {
                let rewritten = finder.replace_all(&record.pattern, replace).into_owned();
                if rewritten != record.pattern {
                    changes.push(MassEditChange {
                        channel_id: *channel_id,
                        index,
                        before: record.pattern.clone(),
                        after: rewritten,
                    });
                }
            }
        }
        changes.sort_by_key(|c| (c.channel_id, c.index));
        Ok(changes)
    }

    /// Apply a mass edit; rewritten patterns must still compile
    pub async fn mass_edit(
        &self,
        find: &str,
        replace: &str,
        channel_ids: Option<&[i64]>,
    ) -> AppResult<Vec<MassEditChange>> {
        let changes = self.mass_edit_preview(find, replace, channel_ids).await?;
        for change in &changes {
            validate_pattern_text(&change.after)?;
        }
        self.commit(|map| {
            for change in &changes {
                if let Some(patterns) = map.get_mut(&change.channel_id) {
                    if let Some(record) = patterns.get_mut(change.index) {
                        record.pattern = change.after.clone();
                    }
                }
            }
        })
        .await?;
        Ok(changes)
    }

    async fn commit<F>(&self, mutate: F) -> Result<(), StoreError>
    where
        F: FnMut(&mut PatternMap),
    {
        let mut mutate = mutate;
        let mut state = self.state.write().await;
        let mut next = state.clone();
        mutate(&mut next);
        self.persist(&next)?;
        *state = next;
        self.health.clear(STORE_NAME).await;
        Ok(())
    }

    fn persist(&self, map: &PatternMap) -> Result<(), StoreError> {
        self.file.save(map)
    }
}

/// Reject pattern text that can never compile
///
/// The `CHANNEL_NAME` token is replaced with an escaped literal at match
/// time, so validation substitutes a plain placeholder first.
fn validate_pattern_text(pattern: &str) -> AppResult<()> {
    let candidate = pattern.replace(crate::matching::CHANNEL_NAME_TOKEN, "placeholder");
    Regex::new(&candidate)
        .map(|_| ())
        .map_err(|e| AppError::validation_field(format!("invalid regex: {e}"), "pattern"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pattern: &str) -> RegexPatternRecord {
        RegexPatternRecord {
            pattern: pattern.to_string(),
            m3u_accounts: None,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn add_and_persist_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;

        store.add_pattern(5, record(".*CNN.*")).await.unwrap();
        store.add_pattern(5, record("^US: CNN")).await.unwrap();

        let reopened = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;
        let patterns = reopened.patterns_for(5).await;
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].pattern, ".*CNN.*");
    }

    #[tokio::test]
    async fn invalid_regex_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;

        let result = store.add_pattern(1, record("[unclosed")).await;
        assert!(matches!(result, Err(AppError::Validation { .. })));
        assert!(store.patterns_for(1).await.is_empty());
    }

    #[tokio::test]
    async fn channel_name_token_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;
        store
            .add_pattern(1, record(".*CHANNEL_NAME.*"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mass_edit_preview_then_apply() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;
        store.add_pattern(1, record("^UK: Sky Sports")).await.unwrap();
        store.add_pattern(2, record("^UK: BBC One")).await.unwrap();

        let preview = store.mass_edit_preview("\\^UK: ", "^GB: ", None).await.unwrap();
        assert_eq!(preview.len(), 2);
        // Preview does not mutate
        assert_eq!(store.patterns_for(1).await[0].pattern, "^UK: Sky Sports");

        let applied = store.mass_edit("\\^UK: ", "^GB: ", None).await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(store.patterns_for(1).await[0].pattern, "^GB: Sky Sports");
    }

    #[tokio::test]
    async fn bulk_enable_disable() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;
        store.add_pattern(1, record("a")).await.unwrap();
        store.add_pattern(2, record("b")).await.unwrap();

        let touched = store.bulk_set_enabled(&[1, 2], false).await.unwrap();
        assert_eq!(touched, 2);
        assert!(!store.patterns_for(1).await[0].enabled);
    }

    #[tokio::test]
    async fn remove_pattern_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegexPatternStore::open(dir.path(), StoreHealth::new()).await;
        store.add_pattern(1, record("a")).await.unwrap();

        assert!(store.remove_pattern(1, 3).await.is_err());
        assert!(store.remove_pattern(9, 0).await.is_err());
        store.remove_pattern(1, 0).await.unwrap();
        assert!(store.patterns_for(1).await.is_empty());
    }
}
