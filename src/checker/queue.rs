//! Channel queue with deduplication and priority ordering
//!
//! A priority FIFO of channel ids awaiting quality probing. A channel id is
//! tracked as either queued or in-progress, never both; enqueueing an
//! already-queued channel merges priority (max wins) and ORs the force flag.
//! Ordering is strictly by (-priority, enqueued_at).

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

/// A dequeued unit of work
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelQueueEntry {
    pub channel_id: i64,
    pub priority: i32,
    pub enqueued_at: DateTime<Utc>,
    pub force_check: bool,
}

/// Queue counters exposed through the HTTP surface
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct QueueStats {
    pub size: usize,
    pub in_progress: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Clone)]
struct QueuedMeta {
    seq: u64,
    priority: i32,
    enqueued_at: DateTime<Utc>,
    force_check: bool,
}

/// Heap entries are invalidated lazily: a merge bumps the channel's seq and
/// pushes a fresh entry, stale ones are skipped on pop.
#[derive(Debug, PartialEq, Eq)]
struct HeapEntry {
    priority: i32,
    enqueued_at: DateTime<Utc>,
    seq: u64,
    channel_id: i64,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.enqueued_at.cmp(&self.enqueued_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct QueueInner {
    heap: BinaryHeap<HeapEntry>,
    queued: HashMap<i64, QueuedMeta>,
    in_progress: HashSet<i64>,
    next_seq: u64,
    completed: u64,
    failed: u64,
}

/// Thread-safe priority FIFO of channels awaiting probing
#[derive(Default)]
pub struct ChannelQueue {
    inner: Mutex<QueueInner>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a channel; merges with an existing queued entry
    ///
    /// Returns true when the channel was newly queued. A channel currently
    /// in progress is not re-queued.
    pub async fn enqueue(&self, channel_id: i64, priority: i32, force_check: bool) -> bool {
        let mut inner = self.inner.lock().await;

        if inner.in_progress.contains(&channel_id) {
            debug!("Channel {channel_id} already in progress, not queued");
            return false;
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        if let Some(existing) = inner.queued.get(&channel_id).cloned() {
            let merged = QueuedMeta {
                seq,
                priority: existing.priority.max(priority),
                enqueued_at: existing.enqueued_at,
                force_check: existing.force_check || force_check,
            };
            inner.heap.push(HeapEntry {
                priority: merged.priority,
                enqueued_at: merged.enqueued_at,
                seq,
                channel_id,
            });
            inner.queued.insert(channel_id, merged);
            return false;
        }

        let meta = QueuedMeta {
            seq,
            priority,
            enqueued_at: Utc::now(),
            force_check,
        };
        inner.heap.push(HeapEntry {
            priority,
            enqueued_at: meta.enqueued_at,
            seq,
            channel_id,
        });
        inner.queued.insert(channel_id, meta);
        true
    }

    /// Pop the highest-priority entry, moving it to in-progress
    pub async fn dequeue(&self) -> Option<ChannelQueueEntry> {
        let mut inner = self.inner.lock().await;
        while let Some(candidate) = inner.heap.pop() {
            let current = match inner.queued.get(&candidate.channel_id) {
                Some(meta) if meta.seq == candidate.seq => meta.clone(),
                _ => continue, // superseded by a merge or cleared
            };
            inner.queued.remove(&candidate.channel_id);
            inner.in_progress.insert(candidate.channel_id);
            return Some(ChannelQueueEntry {
                channel_id: candidate.channel_id,
                priority: current.priority,
                enqueued_at: current.enqueued_at,
                force_check: current.force_check,
            });
        }
        None
    }

    /// Mark an in-progress channel finished
    pub async fn complete(&self, channel_id: i64, success: bool) {
        let mut inner = self.inner.lock().await;
        if inner.in_progress.remove(&channel_id) {
            if success {
                inner.completed += 1;
            } else {
                inner.failed += 1;
            }
        }
    }

    /// Drop all queued entries; in-progress channels are unaffected
    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let cleared = inner.queued.len();
        inner.queued.clear();
        inner.heap.clear();
        cleared
    }

    pub async fn size(&self) -> usize {
        self.inner.lock().await.queued.len()
    }

    pub async fn in_progress_count(&self) -> usize {
        self.inner.lock().await.in_progress.len()
    }

    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            size: inner.queued.len(),
            in_progress: inner.in_progress.len(),
            completed: inner.completed,
            failed: inner.failed,
        }
    }

    /// Pending entries in dequeue order, for the queue inspection endpoint
    pub async fn pending_entries(&self) -> Vec<ChannelQueueEntry> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<ChannelQueueEntry> = inner
            .queued
            .iter()
            .map(|(channel_id, meta)| ChannelQueueEntry {
                channel_id: *channel_id,
                priority: meta.priority,
                enqueued_at: meta.enqueued_at,
                force_check: meta.force_check,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.enqueued_at.cmp(&b.enqueued_at))
        });
        entries
    }

    pub async fn in_progress_channels(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.inner.lock().await.in_progress.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let queue = ChannelQueue::new();
        queue.enqueue(1, 0, false).await;
        queue.enqueue(2, 5, false).await;
        queue.enqueue(3, 0, false).await;

        assert_eq!(queue.dequeue().await.unwrap().channel_id, 2);
        assert_eq!(queue.dequeue().await.unwrap().channel_id, 1);
        assert_eq!(queue.dequeue().await.unwrap().channel_id, 3);
        assert!(queue.dequeue().await.is_none());
    }

    #[tokio::test]
    async fn duplicate_enqueue_merges() {
        let queue = ChannelQueue::new();
        assert!(queue.enqueue(1, 1, false).await);
        assert!(!queue.enqueue(1, 5, true).await);
        assert_eq!(queue.size().await, 1);

        let entry = queue.dequeue().await.unwrap();
        assert_eq!(entry.priority, 5);
        assert!(entry.force_check);

        // Merge never lowers priority
        queue.enqueue(2, 7, true).await;
        queue.enqueue(2, 3, false).await;
        let entry = queue.dequeue().await.unwrap();
        assert_eq!(entry.priority, 7);
        assert!(entry.force_check);
    }

    #[tokio::test]
    async fn queued_and_in_progress_are_disjoint() {
        let queue = ChannelQueue::new();
        queue.enqueue(1, 0, false).await;
        let entry = queue.dequeue().await.unwrap();
        assert_eq!(queue.size().await, 0);
        assert_eq!(queue.in_progress_count().await, 1);

        // An in-progress channel cannot be re-queued
        assert!(!queue.enqueue(1, 9, true).await);
        assert_eq!(queue.size().await, 0);

        queue.complete(entry.channel_id, true).await;
        assert_eq!(queue.in_progress_count().await, 0);
        assert!(queue.enqueue(1, 0, false).await);
    }

    #[tokio::test]
    async fn merge_keeps_original_enqueue_time_for_ordering() {
        let queue = ChannelQueue::new();
        queue.enqueue(1, 0, false).await;
        queue.enqueue(2, 0, false).await;
        // Merging channel 1 must not move it behind channel 2
        queue.enqueue(1, 0, true).await;

        assert_eq!(queue.dequeue().await.unwrap().channel_id, 1);
        assert_eq!(queue.dequeue().await.unwrap().channel_id, 2);
    }

    #[tokio::test]
    async fn counters_and_clear() {
        let queue = ChannelQueue::new();
        queue.enqueue(1, 0, false).await;
        queue.enqueue(2, 0, false).await;
        let entry = queue.dequeue().await.unwrap();
        queue.complete(entry.channel_id, true).await;

        let stats = queue.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.size, 1);

        assert_eq!(queue.clear().await, 1);
        assert!(queue.dequeue().await.is_none());

        // Completing an unknown channel does not skew counters
        queue.complete(99, false).await;
        assert_eq!(queue.stats().await.failed, 0);
    }
}
