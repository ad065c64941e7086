//! Regex-driven stream-to-channel matching
//!
//! Pattern text is preprocessed at match time for every (channel, pattern)
//! pair: the literal `CHANNEL_NAME` token becomes the regex-escaped channel
//! name and runs of literal spaces become `\s+`, so `CNN HD` matches
//! `CNN  HD` and `CNN\tHD` alike. Preprocessing is idempotent.

use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::index::UnifiedDataIndex;
use crate::models::{Channel, RegexPatternRecord};

/// Literal token replaced by the escaped channel name at match time
pub const CHANNEL_NAME_TOKEN: &str = "CHANNEL_NAME";

/// Runs of literal spaces, including user-escaped `\ ` sequences
static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\\ | )+").expect("space-run pattern is valid"));

/// Prepare a stored pattern for compilation against stream names
pub fn preprocess_pattern(pattern: &str, channel_name: &str) -> String {
    let substituted = if pattern.contains(CHANNEL_NAME_TOKEN) {
        pattern.replace(CHANNEL_NAME_TOKEN, &regex::escape(channel_name))
    } else {
        pattern.to_string()
    };
    SPACE_RUN.replace_all(&substituted, r"\s+").into_owned()
}

/// Result of one matching run for one channel
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub channel_id: i64,
    /// New ordered membership: retained ids in current order, additions last
    pub membership: Vec<i64>,
    pub added: Vec<i64>,
    pub removed: Vec<i64>,
}

impl MatchOutcome {
    pub fn changed(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

/// Options resolved from automation config before a matching run
#[derive(Debug, Clone, Default)]
pub struct MatchOptions {
    /// Drop current members that no enabled pattern matches anymore
    pub remove_non_matching: bool,
    /// When set, candidates must belong to one of these accounts
    pub enabled_accounts: Option<Vec<i64>>,
}

pub struct MatchingEngine {
    index: Arc<UnifiedDataIndex>,
}

impl MatchingEngine {
    pub fn new(index: Arc<UnifiedDataIndex>) -> Self {
        Self { index }
    }

    /// Compute the candidate set and membership diff for one channel
    ///
    /// Invalid patterns are skipped with a log entry; they never fail the
    /// run. The caller is responsible for checking that matching is enabled
    /// for the channel before invoking this.
    pub async fn compute(
        &self,
        channel: &Channel,
        patterns: &[RegexPatternRecord],
        options: &MatchOptions,
    ) -> MatchOutcome {
        let mut candidates: Vec<i64> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();

        for record in patterns.iter().filter(|r| r.enabled) {
            let prepared = preprocess_pattern(&record.pattern, &channel.name);
            let compiled = match Regex::new(&prepared) {
                Ok(re) => re,
                Err(e) => {
                    warn!(
                        "Skipping invalid pattern '{}' on channel {}: {e}",
                        record.pattern, channel.id
                    );
                    continue;
                }
            };

            let account_filter = record.m3u_accounts.as_deref();
            for stream in self
                .index
                .get_streams_matching(&compiled, account_filter)
                .await
            {
                if stream.has_dead_prefix() {
                    continue;
                }
                if let Some(enabled) = options.enabled_accounts.as_deref() {
                    let on_enabled_account = stream
                        .m3u_account_id
                        .map(|id| enabled.contains(&id))
                        .unwrap_or(false);
                    if !on_enabled_account && !stream.is_custom {
                        continue;
                    }
                }
                if seen.insert(stream.id) {
                    candidates.push(stream.id);
                }
            }
        }

        let candidate_set: HashSet<i64> = seen;
        let current: Vec<i64> = channel.streams.clone();
        let current_set: HashSet<i64> = current.iter().copied().collect();

        // Retained ids keep the upstream order; ids that vanished from the
        // UDI are dropped regardless of options so the write-back never
        // references unknown streams.
        let mut membership = Vec::new();
        let mut removed = Vec::new();
        for id in &current {
            if self.index.get_stream(*id).await.is_none() {
                debug!("Channel {}: stream {id} no longer exists upstream", channel.id);
                removed.push(*id);
                continue;
            }
            if options.remove_non_matching && !candidate_set.contains(id) {
                removed.push(*id);
                continue;
            }
            membership.push(*id);
        }

        let mut added = Vec::new();
        for id in candidates {
            if !current_set.contains(&id) {
                membership.push(id);
                added.push(id);
            }
        }

        MatchOutcome {
            channel_id: channel.id,
            membership,
            added,
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Stream;

    fn stream(id: i64, name: &str, account: Option<i64>) -> Stream {
        Stream {
            id,
            name: name.to_string(),
            url: format!("http://provider.example/{id}.ts"),
            m3u_account_id: account,
            is_custom: account.is_none(),
        }
    }

    fn channel(id: i64, name: &str, streams: Vec<i64>) -> Channel {
        Channel {
            id,
            name: name.to_string(),
            number: id as f64,
            logo_id: None,
            channel_group_id: None,
            streams,
        }
    }

    fn record(pattern: &str) -> RegexPatternRecord {
        RegexPatternRecord {
            pattern: pattern.to_string(),
            m3u_accounts: None,
            enabled: true,
        }
    }

    #[test]
    fn preprocessing_substitutes_and_collapses() {
        let prepared = preprocess_pattern(".*CHANNEL_NAME.*", "CNN HD");
        assert_eq!(prepared, r".*CNN\s+HD.*");

        let compiled = Regex::new(&prepared).unwrap();
        assert!(compiled.is_match("US: CNN HD Premium"));
        assert!(compiled.is_match("CNN  HD"));
        assert!(compiled.is_match("CNN\tHD"));
        assert!(!compiled.is_match("CNNHD"));
    }

    #[test]
    fn preprocessing_escapes_metacharacters_in_name() {
        let prepared = preprocess_pattern("^CHANNEL_NAME$", "Sky (UK)");
        let compiled = Regex::new(&prepared).unwrap();
        assert!(compiled.is_match("Sky (UK)"));
        assert!(!compiled.is_match("Sky XUKX"));
    }

    #[test]
    fn preprocessing_is_idempotent() {
        for (pattern, name) in [
            (".*CHANNEL_NAME.*", "CNN HD"),
            ("^US: +Fox  Sports", "irrelevant"),
            (r"already\s+done", "x"),
        ] {
            let once = preprocess_pattern(pattern, name);
            let twice = preprocess_pattern(&once, name);
            assert_eq!(once, twice, "pattern {pattern:?} not stable");
        }
    }

    async fn engine_with_streams(streams: Vec<Stream>) -> MatchingEngine {
        let index = Arc::new(UnifiedDataIndex::new());
        index.install_streams(streams).await;
        MatchingEngine::new(index)
    }

    #[tokio::test]
    async fn single_channel_matching_scenario() {
        let engine = engine_with_streams(vec![
            stream(1, "US: CNN HD Premium", Some(1)),
            stream(2, "CNN  HD", Some(1)),
            stream(3, "CNN\tHD", Some(2)),
            stream(4, "BBC One", Some(1)),
        ])
        .await;

        let ch = channel(7, "CNN HD", vec![4]);
        let outcome = engine
            .compute(&ch, &[record(".*CHANNEL_NAME.*")], &MatchOptions::default())
            .await;

        assert_eq!(outcome.added, vec![1, 2, 3]);
        assert!(outcome.removed.is_empty());
        // Retained id 4 keeps its position, additions appended
        assert_eq!(outcome.membership, vec![4, 1, 2, 3]);
        assert!(outcome.changed());
    }

    #[tokio::test]
    async fn disabled_and_invalid_patterns_are_skipped() {
        let engine = engine_with_streams(vec![stream(1, "CNN", Some(1))]).await;
        let ch = channel(7, "CNN", vec![]);

        let disabled = RegexPatternRecord {
            enabled: false,
            ..record(".*CNN.*")
        };
        let invalid = record("[unclosed");
        let outcome = engine
            .compute(&ch, &[disabled, invalid], &MatchOptions::default())
            .await;
        assert!(outcome.membership.is_empty());
        assert!(!outcome.changed());
    }

    #[tokio::test]
    async fn per_pattern_account_filter() {
        let engine = engine_with_streams(vec![
            stream(1, "CNN A", Some(1)),
            stream(2, "CNN B", Some(2)),
        ])
        .await;
        let ch = channel(7, "CNN", vec![]);

        let mut rec = record(".*CNN.*");
        rec.m3u_accounts = Some(vec![2]);
        let outcome = engine.compute(&ch, &[rec], &MatchOptions::default()).await;
        assert_eq!(outcome.membership, vec![2]);
    }

    #[tokio::test]
    async fn dead_prefixed_streams_are_excluded() {
        let engine = engine_with_streams(vec![
            stream(1, "[DEAD] CNN HD", Some(1)),
            stream(2, "CNN HD", Some(1)),
        ])
        .await;
        let ch = channel(7, "CNN", vec![]);
        let outcome = engine
            .compute(&ch, &[record(".*CNN.*")], &MatchOptions::default())
            .await;
        assert_eq!(outcome.membership, vec![2]);
    }

    #[tokio::test]
    async fn globally_enabled_accounts_restrict_candidates() {
        let engine = engine_with_streams(vec![
            stream(1, "CNN A", Some(1)),
            stream(2, "CNN B", Some(2)),
            stream(3, "CNN custom", None),
        ])
        .await;
        let ch = channel(7, "CNN", vec![]);
        let options = MatchOptions {
            enabled_accounts: Some(vec![1]),
            ..Default::default()
        };
        let outcome = engine.compute(&ch, &[record(".*CNN.*")], &options).await;
        // Custom streams are not subject to the account allowlist
        assert_eq!(outcome.membership, vec![1, 3]);
    }

    #[tokio::test]
    async fn remove_non_matching_drops_stale_members() {
        let engine = engine_with_streams(vec![
            stream(1, "CNN HD", Some(1)),
            stream(2, "Old feed", Some(1)),
        ])
        .await;
        let ch = channel(7, "CNN", vec![2, 1]);

        let keep = engine
            .compute(&ch, &[record(".*CNN.*")], &MatchOptions::default())
            .await;
        assert!(keep.removed.is_empty());
        assert_eq!(keep.membership, vec![2, 1]);
        assert!(!keep.changed());

        let strict = engine
            .compute(
                &ch,
                &[record(".*CNN.*")],
                &MatchOptions {
                    remove_non_matching: true,
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(strict.removed, vec![2]);
        assert_eq!(strict.membership, vec![1]);
    }

    #[tokio::test]
    async fn vanished_streams_are_always_dropped() {
        let engine = engine_with_streams(vec![stream(1, "CNN HD", Some(1))]).await;
        let ch = channel(7, "CNN", vec![99, 1]);
        let outcome = engine
            .compute(&ch, &[record(".*CNN.*")], &MatchOptions::default())
            .await;
        assert_eq!(outcome.removed, vec![99]);
        assert_eq!(outcome.membership, vec![1]);
    }
}
