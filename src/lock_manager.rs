//! Manages page-level locks for two-phase locking.
//!
//! Blocking is time-bounded rather than graph-based: a conflicting request
//! waits [`LOCK_WAIT`] per attempt and gives up after [`RETRY_MAX`] attempts,
//! so any deadlock cycle is broken by the first transaction whose retry
//! budget elapses.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::granite_debug_log;
use crate::page::{PageId, TransactionId};

/// How long a conflicting request waits before re-evaluating.
pub const LOCK_WAIT: Duration = Duration::from_millis(100);

/// How many timed waits a single acquisition may spend before giving up.
pub const RETRY_MAX: u32 = 3;

/// Represents the two modes of locking a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// A granted lock. The page and the holding transaction are the lock
/// table's keys; only the mode lives here.
#[derive(Debug, Clone)]
pub struct PageLock {
    pub mode: LockMode,
}

/// The main lock manager struct.
///
/// Per page, either exactly one holder with [`LockMode::Exclusive`] or any
/// number of holders all with [`LockMode::Shared`]. A page whose holder table
/// empties is removed from the map entirely.
#[derive(Debug, Default)]
pub struct LockManager {
    lock_table: Mutex<HashMap<PageId, HashMap<TransactionId, PageLock>>>,
    /// Wakes every waiter on any release; each re-evaluates against the
    /// current holder table, so lost and spurious wakeups are both harmless.
    cvar: Condvar,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `tid` holds a lock of any mode on `pid`.
    pub fn holds(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_table
            .lock()
            .unwrap()
            .get(&pid)
            .is_some_and(|holders| holders.contains_key(&tid))
    }

    /// The mode `tid` currently holds on `pid`, if any.
    pub fn mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        self.lock_table
            .lock()
            .unwrap()
            .get(&pid)
            .and_then(|holders| holders.get(&tid))
            .map(|lock| lock.mode)
    }

    /// Acquires `requested` on `pid` for `tid`, waiting when the request
    /// conflicts with current holders. `retry` is the starting attempt count;
    /// callers pass 0. Returns false once the retry budget is exhausted.
    pub fn acquire(
        &self,
        pid: PageId,
        tid: TransactionId,
        requested: LockMode,
        retry: u32,
    ) -> bool {
        let mut table = self.lock_table.lock().unwrap();
        let mut attempt = retry;
        loop {
            if attempt >= RETRY_MAX {
                granite_debug_log!(
                    "[LockManager::acquire] tid {} gave up on {:?} ({:?}) after {} attempts",
                    tid,
                    pid,
                    requested,
                    attempt
                );
                return false;
            }
            if Self::try_grant(&mut table, pid, tid, requested) {
                return true;
            }
            let (guard, _) = self.cvar.wait_timeout(table, LOCK_WAIT).unwrap();
            table = guard;
            attempt += 1;
        }
    }

    /// Removes `tid` from the page's holder table and wakes all waiters.
    /// No-op if `tid` holds nothing on `pid`.
    pub fn release(&self, tid: TransactionId, pid: PageId) {
        let mut table = self.lock_table.lock().unwrap();
        if let Some(holders) = table.get_mut(&pid) {
            if holders.remove(&tid).is_some() {
                if holders.is_empty() {
                    table.remove(&pid);
                }
                self.cvar.notify_all();
            }
        }
    }

    /// Releases every lock held by `tid` and wakes all waiters.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.lock_table.lock().unwrap();
        table.retain(|_, holders| {
            holders.remove(&tid);
            !holders.is_empty()
        });
        self.cvar.notify_all();
    }

    // The acquisition decision table. Grants (mutating the holder table) and
    // returns true, or returns false when the caller must wait.
    fn try_grant(
        table: &mut HashMap<PageId, HashMap<TransactionId, PageLock>>,
        pid: PageId,
        tid: TransactionId,
        requested: LockMode,
    ) -> bool {
        let holders = match table.entry(pid) {
            // No lock on the page: grant whatever was requested.
            Entry::Vacant(entry) => {
                entry.insert(HashMap::from([(tid, PageLock { mode: requested })]));
                return true;
            }
            Entry::Occupied(entry) => entry.into_mut(),
        };

        match holders.get(&tid).map(|own| own.mode) {
            None => match requested {
                // Someone else holds the page; an exclusive request always
                // waits.
                LockMode::Exclusive => false,
                LockMode::Shared => {
                    if holders
                        .values()
                        .any(|lock| lock.mode == LockMode::Exclusive)
                    {
                        false
                    } else {
                        holders.insert(
                            tid,
                            PageLock {
                                mode: LockMode::Shared,
                            },
                        );
                        true
                    }
                }
            },
            // An exclusive holder already has the strongest mode.
            Some(LockMode::Exclusive) => true,
            Some(LockMode::Shared) => match requested {
                LockMode::Shared => true,
                LockMode::Exclusive => {
                    if holders.len() == 1 {
                        // Upgrade: sole shared holder becomes exclusive. The
                        // table is never observed between remove and insert
                        // because the monitor is held throughout.
                        holders.insert(
                            tid,
                            PageLock {
                                mode: LockMode::Exclusive,
                            },
                        );
                        true
                    } else {
                        false
                    }
                }
            },
        }
    }
}
