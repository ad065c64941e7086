//! Channel and group setting overrides
//!
//! Resolution order per field: channel override, then the channel's group
//! override, then the global default (`enabled`/`enabled`/`default`).

use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::warn;

use super::{JsonFile, StoreHealth};
use crate::errors::StoreError;
use crate::models::{EffectiveSettings, SettingMode, SettingOverrides};

const CHANNEL_STORE: &str = "channel_settings";
const GROUP_STORE: &str = "group_settings";

type OverrideMap = HashMap<i64, SettingOverrides>;

/// Field selector for bulk group operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsField {
    Matching,
    Checking,
}

pub struct SettingsStore {
    channel_file: JsonFile,
    group_file: JsonFile,
    health: StoreHealth,
    channels: RwLock<OverrideMap>,
    groups: RwLock<OverrideMap>,
}

impl SettingsStore {
    pub async fn open(data_dir: &Path, health: StoreHealth) -> Self {
        let channel_file = JsonFile::new(data_dir, "channel_settings.json");
        let group_file = JsonFile::new(data_dir, "group_settings.json");

        let channels = match channel_file.load_or_default::<OverrideMap>() {
            Ok(map) => map,
            Err(e) => {
                warn!("Channel settings starting empty: {e}");
                health.record(CHANNEL_STORE, e.to_string()).await;
                OverrideMap::default()
            }
        };
        let groups = match group_file.load_or_default::<OverrideMap>() {
            Ok(map) => map,
            Err(e) => {
                warn!("Group settings starting empty: {e}");
                health.record(GROUP_STORE, e.to_string()).await;
                OverrideMap::default()
            }
        };

        Self {
            channel_file,
            group_file,
            health,
            channels: RwLock::new(channels),
            groups: RwLock::new(groups),
        }
    }

    /// Resolve the effective settings for a channel in the given group
    pub async fn effective(&self, channel_id: i64, group_id: Option<i64>) -> EffectiveSettings {
        let channels = self.channels.read().await;
        let groups = self.groups.read().await;

        let channel = channels.get(&channel_id);
        let group = group_id.and_then(|id| groups.get(&id));

        let defaults = EffectiveSettings::default();
        EffectiveSettings {
            matching_mode: channel
                .and_then(|c| c.matching_mode)
                .or_else(|| group.and_then(|g| g.matching_mode))
                .unwrap_or(defaults.matching_mode),
            checking_mode: channel
                .and_then(|c| c.checking_mode)
                .or_else(|| group.and_then(|g| g.checking_mode))
                .unwrap_or(defaults.checking_mode),
            quality_preference: channel
                .and_then(|c| c.quality_preference)
                .or_else(|| group.and_then(|g| g.quality_preference))
                .unwrap_or(defaults.quality_preference),
        }
    }

    /// A channel is hidden from listings when both effective modes are off
    pub async fn is_hidden(&self, channel_id: i64, group_id: Option<i64>) -> bool {
        let effective = self.effective(channel_id, group_id).await;
        !effective.matching_mode.is_enabled() && !effective.checking_mode.is_enabled()
    }

    pub async fn channel_overrides(&self) -> OverrideMap {
        self.channels.read().await.clone()
    }

    pub async fn group_overrides(&self) -> OverrideMap {
        self.groups.read().await.clone()
    }

    pub async fn channel_override(&self, channel_id: i64) -> SettingOverrides {
        self.channels
            .read()
            .await
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn group_override(&self, group_id: i64) -> SettingOverrides {
        self.groups
            .read()
            .await
            .get(&group_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn set_channel_override(
        &self,
        channel_id: i64,
        overrides: SettingOverrides,
    ) -> Result<(), StoreError> {
        let mut state = self.channels.write().await;
        let mut next = state.clone();
        upsert(&mut next, channel_id, overrides);
        self.channel_file.save(&next)?;
        *state = next;
        self.health.clear(CHANNEL_STORE).await;
        Ok(())
    }

    pub async fn set_group_override(
        &self,
        group_id: i64,
        overrides: SettingOverrides,
    ) -> Result<(), StoreError> {
        let mut state = self.groups.write().await;
        let mut next = state.clone();
        upsert(&mut next, group_id, overrides);
        self.group_file.save(&next)?;
        *state = next;
        self.health.clear(GROUP_STORE).await;
        Ok(())
    }

    /// Set one field to `disabled` across the given groups
    ///
    /// The caller provides the non-empty group ids; the store does not know
    /// which groups have channels.
    pub async fn bulk_disable_group_field(
        &self,
        field: SettingsField,
        group_ids: &[i64],
    ) -> Result<usize, StoreError> {
        let mut state = self.groups.write().await;
        let mut next = state.clone();
        for group_id in group_ids {
            let entry = next.entry(*group_id).or_default();
            match field {
                SettingsField::Matching => entry.matching_mode = Some(SettingMode::Disabled),
                SettingsField::Checking => entry.checking_mode = Some(SettingMode::Disabled),
            }
        }
        self.group_file.save(&next)?;
        *state = next;
        self.health.clear(GROUP_STORE).await;
        Ok(group_ids.len())
    }
}

fn upsert(map: &mut OverrideMap, id: i64, overrides: SettingOverrides) {
    let empty = overrides.matching_mode.is_none()
        && overrides.checking_mode.is_none()
        && overrides.quality_preference.is_none();
    if empty {
        map.remove(&id);
    } else {
        map.insert(id, overrides);
    }
}
