//! The dirty-aware LRU page cache.
//!
//! Strict LRU would evict dirty pages, which the NO-STEAL policy forbids: a
//! dirty page may only reach disk when its transaction commits. Eviction
//! therefore scans from the cold end for the first clean page and fails with
//! [`DbError::NoEvictable`] when every resident page is dirty.

use std::sync::{Arc, RwLock};

use crate::error::{DbError, Result};
use crate::granite_debug_log;
use crate::page::{Page, PageId};

/// Fixed-capacity mapping from [`PageId`] to a shared in-memory page, with
/// recency tracking. Recency order is maintained by the underlying
/// `lru::LruCache`; capacity is enforced here because eviction must skip
/// dirty pages.
pub struct LruCache {
    capacity: usize,
    entries: lru::LruCache<PageId, Arc<RwLock<Page>>>,
}

impl LruCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: lru::LruCache::unbounded(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, pid: &PageId) -> bool {
        self.entries.contains(pid)
    }

    /// Returns the cached page and promotes it to most recently used.
    pub fn get(&mut self, pid: &PageId) -> Option<Arc<RwLock<Page>>> {
        self.entries.get(pid).cloned()
    }

    /// Inserts or replaces the page for `pid` and promotes it to most
    /// recently used. When the cache is full and `pid` is not resident, the
    /// least recently used clean page is evicted first.
    pub fn put(&mut self, pid: PageId, page: Arc<RwLock<Page>>) -> Result<()> {
        if !self.entries.contains(&pid) && self.entries.len() == self.capacity {
            let victim = self.find_victim().ok_or(DbError::NoEvictable)?;
            self.entries.pop(&victim);
        }
        self.entries.put(pid, page);
        Ok(())
    }

    /// Unlinks and drops the entry if present; no-op otherwise. Used by the
    /// rollback path and by page-freeing callers.
    pub fn remove(&mut self, pid: &PageId) {
        if self.entries.pop(pid).is_none() {
            granite_debug_log!("[LruCache::remove] page {:?} is not resident", pid);
        }
    }

    /// All resident pages, in unspecified order. Used only for bulk
    /// flush/rollback scans.
    pub fn entries(&self) -> impl Iterator<Item = (&PageId, &Arc<RwLock<Page>>)> {
        self.entries.iter()
    }

    // Least recently used page that is not dirty.
    fn find_victim(&self) -> Option<PageId> {
        for (pid, page) in self.entries.iter().rev() {
            if page.read().unwrap().is_dirty().is_none() {
                return Some(*pid);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::TransactionId;

    fn pid(n: i32) -> PageId {
        PageId::new(1, n)
    }

    fn clean_page(n: i32) -> Arc<RwLock<Page>> {
        Arc::new(RwLock::new(Page::new(pid(n), 32)))
    }

    fn dirty_page(n: i32, tid: TransactionId) -> Arc<RwLock<Page>> {
        let mut page = Page::new(pid(n), 32);
        page.mark_dirty(true, tid);
        Arc::new(RwLock::new(page))
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let mut cache = LruCache::new(3);
        cache.put(pid(1), clean_page(1)).unwrap();
        cache.put(pid(2), clean_page(2)).unwrap();
        cache.put(pid(3), clean_page(3)).unwrap();

        // Touch page 1; page 2 becomes the eviction candidate.
        assert!(cache.get(&pid(1)).is_some());
        cache.put(pid(4), clean_page(4)).unwrap();

        assert!(cache.contains(&pid(1)));
        assert!(!cache.contains(&pid(2)));
        assert!(cache.contains(&pid(3)));
        assert!(cache.contains(&pid(4)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn eviction_skips_dirty_pages() {
        let mut cache = LruCache::new(2);
        cache.put(pid(1), dirty_page(1, 7)).unwrap();
        cache.put(pid(2), clean_page(2)).unwrap();

        // Page 1 is older but dirty; the clean page 2 is evicted instead.
        cache.put(pid(3), clean_page(3)).unwrap();
        assert!(cache.contains(&pid(1)));
        assert!(!cache.contains(&pid(2)));
        assert!(cache.contains(&pid(3)));
    }

    #[test]
    fn put_fails_when_every_page_is_dirty() {
        let mut cache = LruCache::new(2);
        cache.put(pid(1), dirty_page(1, 7)).unwrap();
        cache.put(pid(2), dirty_page(2, 8)).unwrap();

        let err = cache.put(pid(3), clean_page(3)).unwrap_err();
        assert!(matches!(err, DbError::NoEvictable));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn put_replaces_resident_page_without_eviction() {
        let mut cache = LruCache::new(2);
        cache.put(pid(1), dirty_page(1, 7)).unwrap();
        cache.put(pid(2), dirty_page(2, 8)).unwrap();

        // Re-putting a resident key replaces in place even when full of
        // dirty pages.
        cache.put(pid(1), clean_page(1)).unwrap();
        assert_eq!(cache.len(), 2);
        let page = cache.get(&pid(1)).unwrap();
        assert_eq!(page.read().unwrap().is_dirty(), None);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        let mut cache = LruCache::new(3);
        for n in 0..10 {
            cache.put(pid(n), clean_page(n)).unwrap();
            assert!(cache.len() <= 3);
        }
    }

    #[test]
    fn remove_is_a_no_op_for_absent_pages() {
        let mut cache = LruCache::new(2);
        cache.put(pid(1), clean_page(1)).unwrap();
        cache.remove(&pid(9));
        assert_eq!(cache.len(), 1);
        cache.remove(&pid(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn dirty_page_is_evictable_after_marker_cleared() {
        let mut cache = LruCache::new(1);
        let page = dirty_page(1, 7);
        cache.put(pid(1), page.clone()).unwrap();

        assert!(matches!(
            cache.put(pid(2), clean_page(2)),
            Err(DbError::NoEvictable)
        ));

        page.write().unwrap().mark_dirty(false, 7);
        cache.put(pid(2), clean_page(2)).unwrap();
        assert!(!cache.contains(&pid(1)));
        assert!(cache.contains(&pid(2)));
    }
}
