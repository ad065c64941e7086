//! Final ordering pipeline
//!
//! Pure transformations applied after scoring: sort descending, optional
//! provider diversification, post-sort account stream limits, dead pruning.

use std::collections::HashMap;

use crate::models::Stream;
use crate::store::{AccountStreamLimits, DiversificationStrategy};

/// One scored stream flowing through the ordering pipeline
#[derive(Debug, Clone)]
pub struct RankedStream {
    pub stream: Stream,
    pub score: f64,
    pub account_name: Option<String>,
    pub account_priority: i32,
    pub dead: bool,
}

/// Stable sort by descending score
pub fn sort_by_score(ranked: &mut [RankedStream]) {
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Interleave streams across provider accounts
///
/// Streams are grouped by account preserving their score order inside each
/// group. Group order is alphabetical by account name for `RoundRobin` and
/// priority-descending for `PriorityWeighted`; rounds then take the head of
/// each non-empty group in that order.
pub fn diversify(
    ranked: Vec<RankedStream>,
    strategy: DiversificationStrategy,
) -> Vec<RankedStream> {
    let mut group_order: Vec<Option<i64>> = Vec::new();
    let mut groups: HashMap<Option<i64>, Vec<RankedStream>> = HashMap::new();

    for entry in ranked {
        let key = entry.stream.m3u_account_id;
        if !groups.contains_key(&key) {
            group_order.push(key);
        }
        groups.entry(key).or_default().push(entry);
    }

    match strategy {
        DiversificationStrategy::RoundRobin => {
            group_order.sort_by(|a, b| {
                let name_of = |key: &Option<i64>| {
                    groups
                        .get(key)
                        .and_then(|g| g.first())
                        .and_then(|e| e.account_name.clone())
                        .unwrap_or_default()
                };
                name_of(a).cmp(&name_of(b))
            });
        }
        DiversificationStrategy::PriorityWeighted => {
            group_order.sort_by_key(|key| {
                let priority = groups
                    .get(key)
                    .and_then(|g| g.first())
                    .map(|e| e.account_priority)
                    .unwrap_or(0);
                std::cmp::Reverse(priority)
            });
        }
    }

    let mut queues: Vec<std::collections::VecDeque<RankedStream>> = group_order
        .iter()
        .map(|key| groups.remove(key).unwrap_or_default().into())
        .collect();

    let mut interleaved = Vec::new();
    loop {
        let mut took_any = false;
        for queue in &mut queues {
            if let Some(entry) = queue.pop_front() {
                interleaved.push(entry);
                took_any = true;
            }
        }
        if !took_any {
            break;
        }
    }
    interleaved
}

/// Drop tail entries per account until each account is within its limit
pub fn apply_account_limits(
    ranked: Vec<RankedStream>,
    limits: &AccountStreamLimits,
) -> Vec<RankedStream> {
    let mut counts: HashMap<i64, u32> = HashMap::new();
    ranked
        .into_iter()
        .filter(|entry| {
            let Some(account_id) = entry.stream.m3u_account_id else {
                return true;
            };
            let Some(limit) = limits.limit_for(account_id) else {
                return true;
            };
            let count = counts.entry(account_id).or_insert(0);
            if *count < limit {
                *count += 1;
                true
            } else {
                false
            }
        })
        .collect()
}

/// Remove dead entries; they scored 0.0 and must not be written back
pub fn prune_dead(ranked: Vec<RankedStream>) -> Vec<RankedStream> {
    ranked.into_iter().filter(|entry| !entry.dead).collect()
}
