use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::buffer_pool::BufferPool;
use crate::error::{DbError, Result};
use crate::page::{Page, PageId, TransactionId};
use crate::tuple::Tuple;

/// A file backing one table. The buffer pool reads and writes whole pages
/// through this interface and never touches the file's layout directly.
///
/// `insert_tuple` and `delete_tuple` fetch the pages they touch through the
/// buffer pool so that page-level locking covers the mutation, and return
/// every page whose contents they modified; the pool marks those dirty.
pub trait DbFile: Send + Sync {
    fn table_id(&self) -> i32;

    fn read_page(&self, pid: PageId) -> Result<Page>;

    fn write_page(&self, page: &Page) -> Result<()>;

    fn num_pages(&self) -> Result<usize>;

    fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<Arc<RwLock<Page>>>>;

    fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<Arc<RwLock<Page>>>>;
}

/// In-memory registry mapping table ids to their files.
#[derive(Default)]
pub struct Catalog {
    files: RwLock<HashMap<i32, Arc<dyn DbFile>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, file: Arc<dyn DbFile>) {
        self.files.write().unwrap().insert(file.table_id(), file);
    }

    pub fn get_file(&self, table_id: i32) -> Result<Arc<dyn DbFile>> {
        self.files
            .read()
            .unwrap()
            .get(&table_id)
            .cloned()
            .ok_or(DbError::UnknownTable(table_id))
    }
}
