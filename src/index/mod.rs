//! UDI - Unified Data Index
//!
//! Refreshable in-memory view of upstream state, the sole accessor used by
//! the rest of the engine. Each collection lives behind its own atomically
//! swapped `Arc` snapshot: readers that started before a refresh keep
//! iterating the old snapshot, id lookups are O(1) on the current one.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::errors::UpstreamError;
use crate::models::{Channel, ChannelGroup, M3uAccount, M3uProfile, ProxySessions, Stream};
use crate::upstream::UpstreamClient;

#[derive(Debug, Default)]
struct StreamIndex {
    by_id: HashMap<i64, Stream>,
    order: Vec<i64>,
}

#[derive(Debug, Default)]
struct ChannelIndex {
    by_id: HashMap<i64, Channel>,
    order: Vec<i64>,
}

#[derive(Debug, Default)]
struct AccountIndex {
    by_id: HashMap<i64, M3uAccount>,
    profiles_by_id: HashMap<i64, M3uProfile>,
    profile_to_account: HashMap<i64, i64>,
}

#[derive(Default)]
pub struct UnifiedDataIndex {
    streams: RwLock<Arc<StreamIndex>>,
    channels: RwLock<Arc<ChannelIndex>>,
    accounts: RwLock<Arc<AccountIndex>>,
    groups: RwLock<Arc<Vec<ChannelGroup>>>,
    proxy: RwLock<Arc<ProxySessions>>,
}

impl UnifiedDataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    // --- refresh operations -------------------------------------------------

    pub async fn refresh_streams(&self, client: &UpstreamClient) -> Result<(), UpstreamError> {
        let streams = client.list_streams(None).await?;
        debug!("UDI refreshed {} streams", streams.len());
        self.install_streams(streams).await;
        Ok(())
    }

    pub async fn refresh_channels(&self, client: &UpstreamClient) -> Result<(), UpstreamError> {
        let channels = client.list_channels().await?;
        debug!("UDI refreshed {} channels", channels.len());
        self.install_channels(channels).await;
        Ok(())
    }

    pub async fn refresh_m3u_accounts(
        &self,
        client: &UpstreamClient,
    ) -> Result<(), UpstreamError> {
        let accounts = client.list_m3u_accounts().await?;
        debug!("UDI refreshed {} M3U accounts", accounts.len());
        self.install_accounts(accounts).await;
        Ok(())
    }

    pub async fn refresh_channel_groups(
        &self,
        client: &UpstreamClient,
    ) -> Result<(), UpstreamError> {
        let groups = client.list_channel_groups().await?;
        debug!("UDI refreshed {} channel groups", groups.len());
        self.install_groups(groups).await;
        Ok(())
    }

    pub async fn refresh_proxy_sessions(
        &self,
        client: &UpstreamClient,
    ) -> Result<(), UpstreamError> {
        let sessions = client.proxy_sessions().await?;
        self.install_proxy_sessions(sessions).await;
        Ok(())
    }

    // --- snapshot installation (also used by tests) -------------------------

    pub async fn install_streams(&self, streams: Vec<Stream>) {
        let order: Vec<i64> = streams.iter().map(|s| s.id).collect();
        let by_id = streams.into_iter().map(|s| (s.id, s)).collect();
        *self.streams.write().await = Arc::new(StreamIndex { by_id, order });
    }

    pub async fn install_channels(&self, channels: Vec<Channel>) {
        let order: Vec<i64> = channels.iter().map(|c| c.id).collect();
        let by_id = channels.into_iter().map(|c| (c.id, c)).collect();
        *self.channels.write().await = Arc::new(ChannelIndex { by_id, order });
    }

    pub async fn install_accounts(&self, accounts: Vec<M3uAccount>) {
        let mut profiles_by_id = HashMap::new();
        let mut profile_to_account = HashMap::new();
        for account in &accounts {
            for profile in &account.profiles {
                profiles_by_id.insert(profile.id, profile.clone());
                profile_to_account.insert(profile.id, account.id);
            }
        }
        let by_id = accounts.into_iter().map(|a| (a.id, a)).collect();
        *self.accounts.write().await = Arc::new(AccountIndex {
            by_id,
            profiles_by_id,
            profile_to_account,
        });
    }

    pub async fn install_groups(&self, groups: Vec<ChannelGroup>) {
        *self.groups.write().await = Arc::new(groups);
    }

    pub async fn install_proxy_sessions(&self, sessions: ProxySessions) {
        *self.proxy.write().await = Arc::new(sessions);
    }

    // --- lookups ------------------------------------------------------------

    pub async fn get_stream(&self, id: i64) -> Option<Stream> {
        self.streams.read().await.by_id.get(&id).cloned()
    }

    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.order.len()
    }

    /// Streams whose name matches `pattern`, optionally restricted to a set
    /// of accounts. Iterates the current snapshot once.
    pub async fn get_streams_matching(
        &self,
        pattern: &Regex,
        account_filter: Option<&[i64]>,
    ) -> Vec<Stream> {
        let snapshot = self.streams.read().await.clone();
        snapshot
            .order
            .iter()
            .filter_map(|id| snapshot.by_id.get(id))
            .filter(|stream| {
                if let Some(accounts) = account_filter {
                    match stream.m3u_account_id {
                        Some(account_id) => accounts.contains(&account_id),
                        None => false,
                    }
                } else {
                    true
                }
            })
            .filter(|stream| pattern.is_match(&stream.name))
            .cloned()
            .collect()
    }

    pub async fn get_channel(&self, id: i64) -> Option<Channel> {
        self.channels.read().await.by_id.get(&id).cloned()
    }

    pub async fn list_channels(&self) -> Vec<Channel> {
        let snapshot = self.channels.read().await.clone();
        snapshot
            .order
            .iter()
            .filter_map(|id| snapshot.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Channel groups; by default only groups that contain channels
    pub async fn list_groups(&self, only_non_empty: bool) -> Vec<ChannelGroup> {
        self.groups
            .read()
            .await
            .iter()
            .filter(|g| !only_non_empty || g.channel_count > 0)
            .cloned()
            .collect()
    }

    pub async fn get_account(&self, id: i64) -> Option<M3uAccount> {
        self.accounts.read().await.by_id.get(&id).cloned()
    }

    pub async fn list_accounts(&self) -> Vec<M3uAccount> {
        let mut accounts: Vec<_> = self.accounts.read().await.by_id.values().cloned().collect();
        accounts.sort_by_key(|a| a.id);
        accounts
    }

    pub async fn get_profile(&self, id: i64) -> Option<M3uProfile> {
        self.accounts.read().await.profiles_by_id.get(&id).cloned()
    }

    pub async fn account_for_profile(&self, profile_id: i64) -> Option<i64> {
        self.accounts
            .read()
            .await
            .profile_to_account
            .get(&profile_id)
            .copied()
    }

    // --- derived views ------------------------------------------------------

    /// Upstream connections currently held on one profile
    ///
    /// Each proxied channel holds one upstream session regardless of how
    /// many clients share it.
    pub async fn active_sessions_for_profile(&self, profile_id: i64) -> u32 {
        self.proxy
            .read()
            .await
            .channels
            .iter()
            .filter(|c| c.m3u_profile_id == Some(profile_id))
            .count() as u32
    }

    /// Active sessions per account, derived through the profile→account map
    pub async fn active_sessions_for_account(&self, account_id: i64) -> u32 {
        let proxy = self.proxy.read().await.clone();
        let accounts = self.accounts.read().await.clone();
        proxy
            .channels
            .iter()
            .filter(|c| {
                c.m3u_profile_id
                    .and_then(|pid| accounts.profile_to_account.get(&pid))
                    .is_some_and(|aid| *aid == account_id)
            })
            .count() as u32
    }

    /// Phase-1 view: currently available profiles for a stream's account
    ///
    /// A profile is available iff it is active and has spare session
    /// capacity (`max_streams = 0` means unlimited). Ordered default-first,
    /// then by id, so the provider's primary path is tried first.
    pub async fn get_all_available_profiles_for_stream(&self, stream: &Stream) -> Vec<M3uProfile> {
        let mut profiles = Vec::new();
        for profile in self.get_all_profiles_for_stream(stream).await {
            let available = profile.max_streams == 0
                || self.active_sessions_for_profile(profile.id).await < profile.max_streams;
            if available {
                profiles.push(profile);
            }
        }
        profiles
    }

    /// Phase-2 universe: every active profile on the stream's account
    pub async fn get_all_profiles_for_stream(&self, stream: &Stream) -> Vec<M3uProfile> {
        let Some(account_id) = stream.m3u_account_id else {
            return Vec::new();
        };
        let accounts = self.accounts.read().await.clone();
        let Some(account) = accounts.by_id.get(&account_id) else {
            return Vec::new();
        };
        let mut profiles: Vec<_> = account
            .profiles
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        profiles.sort_by_key(|p| (std::cmp::Reverse(p.is_default), p.id));
        profiles
    }

    /// Rewrite a stream URL through a profile's search/replace patterns
    ///
    /// Returns the original URL when the profile has no patterns, the
    /// pattern does not match, or the pattern fails to compile.
    pub fn apply_profile_url_transformation(stream: &Stream, profile: &M3uProfile) -> String {
        let (Some(search), Some(replace)) = (
            profile.search_pattern.as_deref(),
            profile.replace_pattern.as_deref(),
        ) else {
            return stream.url.clone();
        };
        let pattern = match Regex::new(search) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    "Profile {} has an invalid search pattern, using original URL: {e}",
                    profile.id
                );
                return stream.url.clone();
            }
        };
        if !pattern.is_match(&stream.url) {
            return stream.url.clone();
        }
        pattern.replace(&stream.url, replace).into_owned()
    }
}
