//! Per-account and per-profile concurrency limiter
//!
//! Counted semaphores honoring the max-concurrent-sessions declared on each
//! account and profile. Capacity 0 means unlimited. Leases are identified by
//! UUID so release is idempotent, and a reaper force-releases leases held
//! past a configurable age to protect against crashed workers.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
struct SlotState {
    capacity: u32,
    in_use: u32,
}

impl SlotState {
    fn has_room(&self) -> bool {
        self.capacity == 0 || self.in_use < self.capacity
    }
}

#[derive(Debug, Clone)]
struct Lease {
    account_id: i64,
    profile_id: Option<i64>,
    acquired_at: DateTime<Utc>,
}

#[derive(Default)]
struct LimiterInner {
    accounts: HashMap<i64, SlotState>,
    profiles: HashMap<i64, SlotState>,
    leases: HashMap<Uuid, Lease>,
}

struct Shared {
    inner: Mutex<LimiterInner>,
    notify: Notify,
}

impl Shared {
    fn release(&self, lease_id: Uuid) -> bool {
        let mut inner = self.inner.lock().expect("limiter lock poisoned");
        let Some(lease) = inner.leases.remove(&lease_id) else {
            return false;
        };
        if let Some(slot) = inner.accounts.get_mut(&lease.account_id) {
            slot.in_use = slot.in_use.saturating_sub(1);
        }
        if let Some(profile_id) = lease.profile_id {
            if let Some(slot) = inner.profiles.get_mut(&profile_id) {
                slot.in_use = slot.in_use.saturating_sub(1);
            }
        }
        drop(inner);
        self.notify.notify_waiters();
        true
    }
}

/// Lease on one account (and optionally profile) slot
///
/// Dropping an unreleased token releases it; explicit release is idempotent.
pub struct LeaseToken {
    shared: Arc<Shared>,
    id: Uuid,
    account_id: i64,
    released: AtomicBool,
}

impl LeaseToken {
    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.shared.release(self.id);
        }
    }
}

impl Drop for LeaseToken {
    fn drop(&mut self) {
        self.release();
    }
}

/// Counted semaphores keyed by account and profile id
pub struct AccountLimiter {
    shared: Arc<Shared>,
}

impl Default for AccountLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountLimiter {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(LimiterInner::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Sync capacities from the current account snapshot
    ///
    /// Unknown accounts keep their in-use counts; capacity changes apply to
    /// future acquisitions only.
    pub fn set_account_capacity(&self, account_id: i64, max_streams: u32) {
        let mut inner = self.shared.inner.lock().expect("limiter lock poisoned");
        inner.accounts.entry(account_id).or_default().capacity = max_streams;
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    pub fn set_profile_capacity(&self, profile_id: i64, max_streams: u32) {
        let mut inner = self.shared.inner.lock().expect("limiter lock poisoned");
        inner.profiles.entry(profile_id).or_default().capacity = max_streams;
        drop(inner);
        self.shared.notify.notify_waiters();
    }

    /// Acquire a slot without waiting
    pub fn try_acquire(&self, account_id: i64, profile_id: Option<i64>) -> Option<LeaseToken> {
        let mut inner = self.shared.inner.lock().expect("limiter lock poisoned");

        let account_room = inner
            .accounts
            .get(&account_id)
            .copied()
            .unwrap_or_default()
            .has_room();
        if !account_room {
            return None;
        }
        if let Some(profile_id) = profile_id {
            let profile_room = inner
                .profiles
                .get(&profile_id)
                .copied()
                .unwrap_or_default()
                .has_room();
            if !profile_room {
                return None;
            }
        }

        inner.accounts.entry(account_id).or_default().in_use += 1;
        if let Some(profile_id) = profile_id {
            inner.profiles.entry(profile_id).or_default().in_use += 1;
        }

        let id = Uuid::new_v4();
        inner.leases.insert(
            id,
            Lease {
                account_id,
                profile_id,
                acquired_at: Utc::now(),
            },
        );

        Some(LeaseToken {
            shared: self.shared.clone(),
            id,
            account_id,
            released: AtomicBool::new(false),
        })
    }

    /// Acquire a slot, waiting until capacity frees or the context cancels
    ///
    /// Notify wakeups can be coalesced, so the wait re-checks periodically.
    pub async fn acquire(
        &self,
        account_id: i64,
        profile_id: Option<i64>,
        cancel: &CancellationToken,
    ) -> Option<LeaseToken> {
        loop {
            if let Some(token) = self.try_acquire(account_id, profile_id) {
                return Some(token);
            }
            tokio::select! {
                _ = self.shared.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(250)) => {}
                _ = cancel.cancelled() => {
                    debug!("Acquisition for account {account_id} cancelled");
                    return None;
                }
            }
        }
    }

    /// Force-release leases older than `max_age`; returns how many
    pub fn reap_stale(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let stale: Vec<Uuid> = {
            let inner = self.shared.inner.lock().expect("limiter lock poisoned");
            inner
                .leases
                .iter()
                .filter(|(_, lease)| lease.acquired_at < cutoff)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in &stale {
            warn!("Force-releasing stale lease {id}");
            self.shared.release(*id);
        }
        stale.len()
    }

    pub fn in_flight_for_account(&self, account_id: i64) -> u32 {
        self.shared
            .inner
            .lock()
            .expect("limiter lock poisoned")
            .accounts
            .get(&account_id)
            .map(|s| s.in_use)
            .unwrap_or(0)
    }

    pub fn outstanding_leases(&self) -> usize {
        self.shared
            .inner
            .lock()
            .expect("limiter lock poisoned")
            .leases
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_enforced() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 2);

        let a = limiter.try_acquire(1, None).unwrap();
        let _b = limiter.try_acquire(1, None).unwrap();
        assert!(limiter.try_acquire(1, None).is_none());
        assert_eq!(limiter.in_flight_for_account(1), 2);

        a.release();
        assert!(limiter.try_acquire(1, None).is_some());
    }

    #[test]
    fn zero_capacity_means_unlimited() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 0);
        let tokens: Vec<_> = (0..50)
            .map(|_| limiter.try_acquire(1, None).unwrap())
            .collect();
        assert_eq!(limiter.in_flight_for_account(1), 50);
        drop(tokens);
        assert_eq!(limiter.in_flight_for_account(1), 0);
    }

    #[test]
    fn unknown_account_is_unlimited() {
        let limiter = AccountLimiter::new();
        assert!(limiter.try_acquire(77, None).is_some());
    }

    #[test]
    fn profile_capacity_is_enforced_independently() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 5);
        limiter.set_profile_capacity(10, 1);

        let _a = limiter.try_acquire(1, Some(10)).unwrap();
        assert!(limiter.try_acquire(1, Some(10)).is_none());
        // The account still has room through another profile
        assert!(limiter.try_acquire(1, Some(11)).is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 1);
        let token = limiter.try_acquire(1, None).unwrap();
        token.release();
        token.release();
        drop(token);
        assert_eq!(limiter.in_flight_for_account(1), 0);
        assert!(limiter.try_acquire(1, None).is_some());
    }

    #[test]
    fn drop_releases_slot() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 1);
        {
            let _token = limiter.try_acquire(1, None).unwrap();
            assert!(limiter.try_acquire(1, None).is_none());
        }
        assert!(limiter.try_acquire(1, None).is_some());
    }

    #[test]
    fn reaper_force_releases_old_leases() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 1);
        let token = limiter.try_acquire(1, None).unwrap();

        // A young lease survives
        assert_eq!(limiter.reap_stale(Duration::hours(1)), 0);
        // Zero max-age reaps everything outstanding
        assert_eq!(limiter.reap_stale(Duration::zero()), 1);
        assert_eq!(limiter.in_flight_for_account(1), 0);

        // Releasing the reaped token is a no-op
        token.release();
        assert_eq!(limiter.in_flight_for_account(1), 0);
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let limiter = Arc::new(AccountLimiter::new());
        limiter.set_account_capacity(1, 1);
        let held = limiter.try_acquire(1, None).unwrap();

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter.acquire(1, None, &CancellationToken::new()).await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        held.release();

        let token = waiter.await.unwrap();
        assert!(token.is_some());
    }

    #[tokio::test]
    async fn acquire_honors_cancellation() {
        let limiter = AccountLimiter::new();
        limiter.set_account_capacity(1, 1);
        let _held = limiter.try_acquire(1, None).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(limiter.acquire(1, None, &cancel).await.is_none());
    }
}
