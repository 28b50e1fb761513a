//! The buffer pool: the only entry point executors use to read or mutate
//! pages.
//!
//! Every access goes `(transaction, page, permissions)` -> lock manager ->
//! cache. Pages dirtied by a transaction stay in memory until that
//! transaction commits (NO-STEAL); commit flushes them behind a WAL write,
//! abort restores them from disk.

use std::sync::{Arc, Mutex, RwLock};

use crate::catalog::Catalog;
use crate::error::{DbError, Result};
use crate::granite_debug_log;
use crate::lock_manager::{LockManager, LockMode};
use crate::lru_cache::LruCache;
use crate::page::{Page, PageId, TransactionId};
use crate::tuple::Tuple;
use crate::wal::WalManager;
use crate::{DEFAULT_PAGES, DEFAULT_PAGE_SIZE};

/// The access a caller needs on a page. Read-only maps to a shared lock,
/// read-write to an exclusive lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// Construction-time configuration. The page size is fixed per pool; tests
/// build pools (and heap files) with a small page size instead of mutating
/// process-wide state.
#[derive(Debug, Clone, Copy)]
pub struct BufferPoolConfig {
    pub num_pages: usize,
    pub page_size: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            num_pages: DEFAULT_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// The buffer pool facade composing the lock manager and the LRU cache.
///
/// Two independent monitors: the cache mutex guards residency and the bulk
/// flush/rollback scans; the lock manager owns its own monitor and hosts the
/// wait protocol. The cache mutex is never held across a lock wait --
/// `get_page` acquires the page lock before touching the cache.
pub struct BufferPool {
    page_size: usize,
    cache: Mutex<LruCache>,
    lock_manager: LockManager,
    catalog: Arc<Catalog>,
    wal: Arc<Mutex<WalManager>>,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, wal: Arc<Mutex<WalManager>>) -> Self {
        Self::with_config(catalog, wal, BufferPoolConfig::default())
    }

    pub fn with_config(
        catalog: Arc<Catalog>,
        wal: Arc<Mutex<WalManager>>,
        config: BufferPoolConfig,
    ) -> Self {
        Self {
            page_size: config.page_size,
            cache: Mutex::new(LruCache::new(config.num_pages)),
            lock_manager: LockManager::new(),
            catalog,
            wal,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Retrieves the page with the given permissions, locking it on behalf of
    /// `tid` and loading it from its file if it is not resident.
    ///
    /// Fails with [`DbError::TransactionAborted`] when the lock cannot be
    /// acquired within the retry budget, and with [`DbError::NoEvictable`]
    /// when the page would have to displace a cache full of dirty pages (the
    /// page lock is retained in that case).
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: PageId,
        perm: Permissions,
    ) -> Result<Arc<RwLock<Page>>> {
        let requested = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        if !self.lock_manager.acquire(pid, tid, requested, 0) {
            granite_debug_log!(
                "[BufferPool::get_page] tid {} failed to lock {:?} for {:?}, aborting",
                tid,
                pid,
                perm
            );
            return Err(DbError::TransactionAborted);
        }

        let mut cache = self.cache.lock().unwrap();
        if !cache.contains(&pid) {
            let file = self.catalog.get_file(pid.table_id)?;
            let page = file.read_page(pid)?;
            cache.put(pid, Arc::new(RwLock::new(page)))?;
        }
        Ok(cache.get(&pid).expect("page is resident after put"))
    }

    /// True if `tid` holds a lock of any mode on `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds(tid, pid)
    }

    /// The lock mode `tid` holds on `pid`, if any.
    pub fn lock_mode(&self, tid: TransactionId, pid: PageId) -> Option<LockMode> {
        self.lock_manager.mode(tid, pid)
    }

    /// True if `pid` is resident in the cache. Does not touch recency.
    pub fn is_cached(&self, pid: PageId) -> bool {
        self.cache.lock().unwrap().contains(&pid)
    }

    /// Adds a tuple to the given table on behalf of `tid`, then marks every
    /// page the file modified as dirty and re-inserts it into the cache.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: i32, tuple: &mut Tuple) -> Result<()> {
        granite_debug_log!(
            "[BufferPool::insert_tuple] tid {} inserting into table {}",
            tid,
            table_id
        );
        let file = self.catalog.get_file(table_id)?;
        let dirtied = file.insert_tuple(self, tid, tuple)?;
        self.update_buffer_pool(dirtied, tid)
    }

    /// Removes a tuple from its table on behalf of `tid`. The table is
    /// resolved from the tuple's record id.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let rid = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        granite_debug_log!(
            "[BufferPool::delete_tuple] tid {} deleting {:?}",
            tid,
            rid
        );
        let file = self.catalog.get_file(rid.pid.table_id)?;
        let dirtied = file.delete_tuple(self, tid, tuple)?;
        self.update_buffer_pool(dirtied, tid)
    }

    /// Marks each page dirty for `tid` and re-inserts it so future requests
    /// see the up-to-date copy.
    pub fn update_buffer_pool(
        &self,
        pages: Vec<Arc<RwLock<Page>>>,
        tid: TransactionId,
    ) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        for page in pages {
            let pid = {
                let mut page = page.write().unwrap();
                page.mark_dirty(true, tid);
                page.id()
            };
            cache.put(pid, page)?;
        }
        Ok(())
    }

    /// Commits or aborts `tid`, then releases every lock it holds. After this
    /// call the transaction appears in no holder table and owns no dirty
    /// cache entry.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        if commit {
            self.flush_pages(tid)?;
            // Commit is the durable point; the flushed pages are clean again
            // and become evictable.
            let cache = self.cache.lock().unwrap();
            for (_, page) in cache.entries() {
                let mut page = page.write().unwrap();
                if page.is_dirty() == Some(tid) {
                    page.mark_dirty(false, tid);
                }
            }
        } else {
            self.rollback(tid)?;
        }
        self.lock_manager.release_all(tid);
        Ok(())
    }

    /// Writes every page dirtied by `tid` to disk, each behind a WAL record.
    /// The page's before-image is re-anchored to the about-to-be-durable
    /// contents first, so a later abort of a different transaction rolls back
    /// to this state. Dirty markers are left untouched; commit-level policy
    /// clears them.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let cache = self.cache.lock().unwrap();
        for (pid, page) in cache.entries() {
            let mut page = page.write().unwrap();
            if page.is_dirty() != Some(tid) {
                continue;
            }
            let before = page.before_image();
            page.set_before_image();
            self.wal.lock().unwrap().log_write(tid, &before, &page)?;
            self.catalog.get_file(pid.table_id)?.write_page(&page)?;
        }
        Ok(())
    }

    /// Discards `tid`'s in-memory modifications by re-reading each page it
    /// dirtied from disk and replacing the cache entry with the fresh copy.
    pub fn rollback(&self, tid: TransactionId) -> Result<()> {
        let mut cache = self.cache.lock().unwrap();
        let dirtied: Vec<PageId> = cache
            .entries()
            .filter(|(_, page)| page.read().unwrap().is_dirty() == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirtied {
            let file = self.catalog.get_file(pid.table_id)?;
            let fresh = file.read_page(pid)?;
            cache.put(pid, Arc::new(RwLock::new(fresh)))?;
        }
        Ok(())
    }

    /// Flushes every dirty page regardless of owner. Writes uncommitted data
    /// to disk, so invoking this mid-transaction breaks NO-STEAL; it exists
    /// for tests and recovery tooling only.
    pub fn flush_all_pages(&self) -> Result<()> {
        let cache = self.cache.lock().unwrap();
        for (pid, page) in cache.entries() {
            let page = page.read().unwrap();
            let Some(tid) = page.is_dirty() else {
                continue;
            };
            let before = page.before_image();
            self.wal.lock().unwrap().log_write(tid, &before, &page)?;
            self.catalog.get_file(pid.table_id)?.write_page(&page)?;
        }
        Ok(())
    }

    /// Releases `tid`'s lock on a single page with no safety check. The
    /// caller takes responsibility for isolation; tree operations that
    /// release ancestor pages early need this.
    pub fn unsafe_release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(tid, pid);
    }

    /// Evicts the entry without flushing. Used when a freed page must not
    /// linger in the cache.
    pub fn remove_page(&self, pid: PageId) {
        self.cache.lock().unwrap().remove(&pid);
    }
}
