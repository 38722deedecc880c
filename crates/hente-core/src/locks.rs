use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

/// Cooperative advisory locks over ordered segment paths.
///
/// A lock request names a store key, a path, and whether it is exclusive.
/// Any number of shared locks may coexist on overlapping paths; an
/// exclusive lock conflicts with every other lock whose path overlaps.
/// Two paths overlap when they belong to the same store key and one is a
/// prefix of (or equal to) the other.
///
/// Nothing enforces the locks beyond callers choosing to acquire them
/// before touching the shared path. Waiters queue in FIFO order and are
/// granted as soon as they are compatible with the held set and with
/// every waiter queued ahead of them.
#[derive(Debug, Clone, Default)]
pub struct LockManager {
    table: Arc<Mutex<LockTable>>,
}

#[derive(Debug, Default)]
struct LockTable {
    next_id: u64,
    held: Vec<HeldLock>,
    waiters: VecDeque<Waiter>,
}

#[derive(Debug, Clone)]
struct HeldLock {
    id: u64,
    store: String,
    path: Vec<String>,
    exclusive: bool,
}

#[derive(Debug)]
struct Waiter {
    lock: HeldLock,
    tx: oneshot::Sender<()>,
}

fn paths_overlap(a: &HeldLock, b: &HeldLock) -> bool {
    if a.store != b.store {
        return false;
    }
    let n = a.path.len().min(b.path.len());
    a.path[..n] == b.path[..n]
}

fn compatible(a: &HeldLock, b: &HeldLock) -> bool {
    if !a.exclusive && !b.exclusive {
        return true;
    }
    !paths_overlap(a, b)
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a lock, waiting until it is compatible with all held locks.
    ///
    /// The returned guard releases the lock when dropped, so the release
    /// runs no matter how the protected section exits.
    pub async fn acquire(&self, store: &str, path: &[&str], exclusive: bool) -> LockGuard {
        let (id, rx) = {
            let mut table = self.table.lock().unwrap();
            let id = table.next_id;
            table.next_id += 1;
            let lock = HeldLock {
                id,
                store: store.to_string(),
                path: path.iter().map(|s| s.to_string()).collect(),
                exclusive,
            };

            let grantable = table.held.iter().all(|h| compatible(h, &lock))
                && table.waiters.iter().all(|w| compatible(&w.lock, &lock));
            if grantable {
                table.held.push(lock);
                return LockGuard {
                    id,
                    table: Arc::clone(&self.table),
                };
            }

            let (tx, rx) = oneshot::channel();
            table.waiters.push_back(Waiter { lock, tx });
            (id, rx)
        };

        // The sender lives in the table; it is only dropped together with
        // the manager itself, in which case the guard is meaningless anyway.
        let _ = rx.await;
        LockGuard {
            id,
            table: Arc::clone(&self.table),
        }
    }
}

/// Held advisory lock. Dropping it releases the lock and wakes compatible
/// waiters.
#[derive(Debug)]
pub struct LockGuard {
    id: u64,
    table: Arc<Mutex<LockTable>>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        release(&self.table, self.id);
    }
}

fn release(table: &Arc<Mutex<LockTable>>, id: u64) {
    let mut table = table.lock().unwrap();
    table.held.retain(|h| h.id != id);

    // Grant queued waiters that are now compatible, preserving FIFO order:
    // a waiter is skipped while any earlier waiter conflicts with it.
    let mut i = 0;
    while i < table.waiters.len() {
        let grantable = {
            let candidate = &table.waiters[i].lock;
            table.held.iter().all(|h| compatible(h, candidate))
                && table
                    .waiters
                    .iter()
                    .take(i)
                    .all(|earlier| compatible(&earlier.lock, candidate))
        };
        if !grantable {
            i += 1;
            continue;
        }

        let waiter = table.waiters.remove(i).unwrap();
        let granted_id = waiter.lock.id;
        table.held.push(waiter.lock);
        if waiter.tx.send(()).is_err() {
            // The acquire future was dropped while waiting; roll the grant
            // back and rescan, since its removal may unblock others.
            table.held.retain(|h| h.id != granted_id);
        }
        i = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn lock(store: &str, path: &[&str], exclusive: bool) -> HeldLock {
        HeldLock {
            id: 0,
            store: store.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            exclusive,
        }
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let a = lock("entities", &["data", "postType", "post"], false);
        let b = lock("entities", &["data", "postType", "post", "1"], false);
        assert!(compatible(&a, &b));
    }

    #[test]
    fn test_exclusive_conflicts_on_prefix() {
        let a = lock("entities", &["data", "postType", "post"], true);
        let b = lock("entities", &["data", "postType", "post", "1"], false);
        let c = lock("entities", &["data", "postType", "page"], false);
        assert!(!compatible(&a, &b));
        assert!(!compatible(&b, &a));
        assert!(compatible(&a, &c));
    }

    #[test]
    fn test_different_stores_never_overlap() {
        let a = lock("entities", &["data"], true);
        let b = lock("widgets", &["data"], true);
        assert!(compatible(&a, &b));
    }

    #[tokio::test]
    async fn test_shared_locks_coexist() {
        let manager = LockManager::new();
        let _a = manager.acquire("entities", &["data", "post"], false).await;
        // Must not block.
        let _b = manager.acquire("entities", &["data", "post", "1"], false).await;
    }

    #[tokio::test]
    async fn test_exclusive_waits_for_readers() {
        let manager = LockManager::new();
        let reader = manager.acquire("entities", &["data", "post"], false).await;

        let acquired = Arc::new(AtomicBool::new(false));
        let task = {
            let manager = manager.clone();
            let acquired = Arc::clone(&acquired);
            tokio::spawn(async move {
                let guard = manager.acquire("entities", &["data", "post"], true).await;
                acquired.store(true, Ordering::SeqCst);
                drop(guard);
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!acquired.load(Ordering::SeqCst));

        drop(reader);
        task.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unrelated_path_is_not_queued() {
        let manager = LockManager::new();
        let _writer = manager.acquire("entities", &["data", "post"], true).await;
        // Disjoint path; must be granted immediately.
        let _other = manager.acquire("entities", &["data", "page"], true).await;
    }

    #[tokio::test]
    async fn test_waiters_granted_in_order() {
        let manager = LockManager::new();
        let reader = manager.acquire("entities", &["data"], false).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..2u32 {
            let manager = manager.clone();
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let guard = manager.acquire("entities", &["data"], true).await;
                order.lock().unwrap().push(i);
                drop(guard);
            }));
            // Let the task enqueue before spawning the next one.
            for _ in 0..5 {
                tokio::task::yield_now().await;
            }
        }

        drop(reader);
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1]);
    }
}
