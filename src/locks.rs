// Per-user operation locks
// A registry of async mutexes keyed by user id. Reconciliation passes and
// mutations for the same user queue behind each other; different users run
// independently. Signed-out operations share one slot of their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::model::UserId;

/// `None` is the local-only slot, distinct from every user id.
type SlotKey = Option<UserId>;

#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<SlotKey, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one operation; released on drop.
pub struct UserLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user: Option<&UserId>) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(locks) => locks,
            // A panic elsewhere can't leave the map itself inconsistent
            Err(poisoned) => poisoned.into_inner(),
        };

        // An entry only the map references has no holder and no waiter
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Arc::clone(locks.entry(user.cloned()).or_default())
    }

    /// Wait for exclusive access for `user` (or the local-only slot when `None`).
    pub async fn acquire(&self, user: Option<&UserId>) -> UserLockGuard {
        let lock = self.lock_for(user);
        UserLockGuard { _guard: lock.lock_owned().await }
    }

    /// True while some operation for `user` holds the lock.
    pub fn is_busy(&self, user: Option<&UserId>) -> bool {
        self.lock_for(user).try_lock().is_err()
    }

    /// Number of slots currently tracked.
    pub fn tracked(&self) -> usize {
        match self.locks.lock() {
            Ok(locks) => locks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_user_is_exclusive() {
        let locks = Arc::new(UserLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            handles.push(tokio::spawn(async move {
                let user = UserId::new("alice");
                let _guard = locks.acquire(Some(&user)).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_users_do_not_block() {
        let locks = UserLocks::new();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let _a = locks.acquire(Some(&alice)).await;
        assert!(locks.is_busy(Some(&alice)));
        assert!(!locks.is_busy(Some(&bob)));
        assert!(!locks.is_busy(None));

        let _b = locks.acquire(Some(&bob)).await;
        assert!(locks.is_busy(Some(&bob)));
    }

    #[tokio::test]
    async fn test_local_only_slot_is_not_a_user() {
        let locks = UserLocks::new();
        let empty = UserId::new("");

        let _local = locks.acquire(None).await;
        assert!(locks.is_busy(None));
        assert!(!locks.is_busy(Some(&empty)));

        let _user = locks.acquire(Some(&empty)).await;
        assert!(locks.is_busy(Some(&empty)));
    }

    #[tokio::test]
    async fn test_idle_slots_are_pruned() {
        let locks = UserLocks::new();
        for i in 0..50 {
            let user = UserId::new(format!("user-{}", i));
            let _guard = locks.acquire(Some(&user)).await;
        }

        let held = UserId::new("held");
        let _guard = locks.acquire(Some(&held)).await;
        // Only the held slot survives the prune that ran on this acquire
        assert!(locks.tracked() <= 2);
        assert!(locks.is_busy(Some(&held)));
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let locks = UserLocks::new();
        {
            let _guard = locks.acquire(None).await;
            assert!(locks.is_busy(None));
        }
        assert!(!locks.is_busy(None));
    }
}
