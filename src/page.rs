use serde::{Deserialize, Serialize};

/// A unique identifier for a transaction. Transactions begin implicitly with
/// their first page access; the id is supplied by the caller.
pub type TransactionId = u64;

/// Identity of a page: which table it belongs to and its ordinal within that
/// table's file. Used as the key in both the cache and the lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: i32,
    pub page_number: i32,
}

impl PageId {
    pub fn new(table_id: i32, page_number: i32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }

    /// Canonical serialization: two signed 32-bit big-endian integers,
    /// table id first.
    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&self.table_id.to_be_bytes());
        buf[4..].copy_from_slice(&self.page_number.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: [u8; 8]) -> Self {
        let mut table_id = [0u8; 4];
        let mut page_number = [0u8; 4];
        table_id.copy_from_slice(&buf[..4]);
        page_number.copy_from_slice(&buf[4..]);
        Self {
            table_id: i32::from_be_bytes(table_id),
            page_number: i32::from_be_bytes(page_number),
        }
    }
}

/// An in-memory copy of a disk page. The cache and lock layers never interpret
/// `data`; heap files impose their own layout on it.
///
/// A page carries two pieces of transactional state: the id of the transaction
/// that last dirtied it (if any), and a before-image — the snapshot taken at
/// the last [`Page::set_before_image`] call, which anchors undo and rollback.
#[derive(Debug, Clone)]
pub struct Page {
    id: PageId,
    data: Vec<u8>,
    dirty: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl Page {
    /// A fresh zeroed page of `page_size` bytes.
    pub fn new(id: PageId, page_size: usize) -> Self {
        let data = vec![0u8; page_size];
        Self {
            id,
            before_image: data.clone(),
            data,
            dirty: None,
        }
    }

    /// A page wrapping bytes read from disk. The initial before-image is the
    /// on-disk content itself.
    pub fn from_data(id: PageId, data: Vec<u8>) -> Self {
        Self {
            id,
            before_image: data.clone(),
            data,
            dirty: None,
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the page contents. Callers are responsible for
    /// marking the page dirty; mutation alone does not.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The transaction that last dirtied this page, or `None` if clean.
    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    /// Set or clear the dirty owner.
    pub fn mark_dirty(&mut self, dirty: bool, tid: TransactionId) {
        self.dirty = if dirty { Some(tid) } else { None };
    }

    /// The snapshot captured at the last `set_before_image` call, as a clean
    /// standalone page.
    pub fn before_image(&self) -> Page {
        Page {
            id: self.id,
            data: self.before_image.clone(),
            dirty: None,
            before_image: self.before_image.clone(),
        }
    }

    /// Capture the current contents as the new before-image.
    pub fn set_before_image(&mut self) {
        self.before_image = self.data.clone();
    }
}
