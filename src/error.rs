use std::io;
use thiserror::Error;

use crate::page::PageId;

#[derive(Debug, Error)]
pub enum DbError {
    /// Lock acquisition exhausted its retry budget. The caller is expected to
    /// abort the transaction with `transaction_complete(tid, false)`.
    #[error("transaction aborted: lock acquisition retries exhausted")]
    TransactionAborted,

    /// Every resident page is dirty, so the cache cannot make room. Fatal to
    /// the current statement but does not by itself abort the transaction.
    #[error("no evictable page: all cached pages are dirty")]
    NoEvictable,

    #[error("unknown table: {0}")]
    UnknownTable(i32),

    #[error("page size {page_size} cannot hold a single tuple of {tuple_size} bytes")]
    PageTooSmall { page_size: usize, tuple_size: usize },

    #[error("tuple is {actual} bytes, table stores {expected}-byte tuples")]
    TupleSizeMismatch { expected: usize, actual: usize },

    #[error("tuple has no record id")]
    MissingRecordId,

    #[error("tuple belongs to table {actual}, not table {expected}")]
    ForeignTuple { expected: i32, actual: i32 },

    #[error("slot {slot} on page {pid:?} is empty")]
    EmptySlot { pid: PageId, slot: u16 },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;
