//! The Write-Ahead Log.
//!
//! Commit-time durability hook for the buffer pool: `flush_pages` logs each
//! page's before/after images here before the page itself reaches disk.
//! Checkpointing and recovery replay live above this layer.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::page::{Page, PageId, TransactionId};

/// A Log Sequence Number: the byte offset of a record in the log file.
pub type Lsn = u64;

// Per-record header: total_len (u32), tid (u64), crc (u32).
const RECORD_HEADER_LEN: usize = 16;

/// A single record in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalRecord {
    /// Before/after images of a page flushed at commit.
    Write {
        tid: TransactionId,
        pid: PageId,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Commit { tid: TransactionId },
    Abort { tid: TransactionId },
}

impl WalRecord {
    pub fn tid(&self) -> TransactionId {
        match self {
            WalRecord::Write { tid, .. } => *tid,
            WalRecord::Commit { tid } => *tid,
            WalRecord::Abort { tid } => *tid,
        }
    }
}

/// The WAL manager. Appends are serialized through the file mutex; the next
/// LSN is claimed atomically so records never overlap.
pub struct WalManager {
    file: Mutex<File>,
    next_lsn: AtomicU64,
}

impl WalManager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let next_lsn = AtomicU64::new(file.metadata()?.len());
        Ok(Self {
            file: Mutex::new(file),
            next_lsn,
        })
    }

    /// Appends a redo/undo record for a page write and returns its LSN.
    pub fn log_write(&self, tid: TransactionId, before: &Page, after: &Page) -> Result<Lsn> {
        self.append(&WalRecord::Write {
            tid,
            pid: after.id(),
            before: before.data().to_vec(),
            after: after.data().to_vec(),
        })
    }

    pub fn log_commit(&self, tid: TransactionId) -> Result<Lsn> {
        let lsn = self.append(&WalRecord::Commit { tid })?;
        self.file.lock().unwrap().sync_all()?;
        Ok(lsn)
    }

    pub fn log_abort(&self, tid: TransactionId) -> Result<Lsn> {
        let lsn = self.append(&WalRecord::Abort { tid })?;
        self.file.lock().unwrap().sync_all()?;
        Ok(lsn)
    }

    fn append(&self, record: &WalRecord) -> Result<Lsn> {
        let payload = bincode::serialize(record).unwrap();
        let total_len = (RECORD_HEADER_LEN + payload.len()) as u32;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let lsn = self.next_lsn.fetch_add(total_len as u64, Ordering::SeqCst);

        let mut header = [0u8; RECORD_HEADER_LEN];
        header[..4].copy_from_slice(&total_len.to_le_bytes());
        header[4..12].copy_from_slice(&record.tid().to_le_bytes());
        header[12..].copy_from_slice(&crc.to_le_bytes());

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(lsn))?;
        file.write_all(&header)?;
        file.write_all(&payload)?;
        Ok(lsn)
    }

    /// Reads back every record in LSN order, verifying checksums. Used by
    /// tests and recovery tooling.
    pub fn records(&self) -> Result<Vec<WalRecord>> {
        let mut buf = Vec::new();
        {
            let mut file = self.file.lock().unwrap();
            file.seek(SeekFrom::Start(0))?;
            file.read_to_end(&mut buf)?;
        }

        let mut records = Vec::new();
        let mut pos = 0;
        while pos + RECORD_HEADER_LEN <= buf.len() {
            let total_len =
                u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap()) as usize;
            let crc = u32::from_le_bytes(buf[pos + 12..pos + 16].try_into().unwrap());
            let payload_start = pos + RECORD_HEADER_LEN;
            let payload_end = pos + total_len;
            if total_len < RECORD_HEADER_LEN || payload_end > buf.len() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "truncated WAL record",
                )
                .into());
            }
            let payload = &buf[payload_start..payload_end];

            let mut hasher = Hasher::new();
            hasher.update(payload);
            if hasher.finalize() != crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "WAL record CRC mismatch",
                )
                .into());
            }

            let record = bincode::deserialize(payload).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "undecodable WAL record")
            })?;
            records.push(record);
            pos = payload_end;
        }
        Ok(records)
    }
}

impl Drop for WalManager {
    fn drop(&mut self) {
        if let Ok(file) = self.file.lock() {
            let _ = file.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageId;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn page_with_byte(pid: PageId, byte: u8) -> Page {
        let mut page = Page::new(pid, 32);
        page.data_mut()[0] = byte;
        page
    }

    #[test]
    fn records_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let wal = WalManager::open(dir.path().join("test.wal")).unwrap();

        let pid = PageId::new(1, 0);
        let before = page_with_byte(pid, 0x00);
        let after = page_with_byte(pid, 0xFF);

        let lsn1 = wal.log_write(7, &before, &after).unwrap();
        let lsn2 = wal.log_commit(7).unwrap();
        assert!(lsn2 > lsn1);

        let records = wal.records().unwrap();
        assert_eq!(records.len(), 2);
        match &records[0] {
            WalRecord::Write {
                tid,
                pid: rec_pid,
                before,
                after,
            } => {
                assert_eq!(*tid, 7);
                assert_eq!(*rec_pid, pid);
                assert_eq!(before[0], 0x00);
                assert_eq!(after[0], 0xFF);
            }
            other => panic!("expected write record, got {:?}", other),
        }
        assert!(matches!(records[1], WalRecord::Commit { tid: 7 }));
    }

    #[test]
    fn reopening_appends_after_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        {
            let wal = WalManager::open(&path).unwrap();
            wal.log_abort(1).unwrap();
        }
        let wal = WalManager::open(&path).unwrap();
        wal.log_commit(2).unwrap();

        let records = wal.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], WalRecord::Abort { tid: 1 }));
        assert!(matches!(records[1], WalRecord::Commit { tid: 2 }));
    }

    #[test]
    fn corrupted_payload_fails_crc_check() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let wal = WalManager::open(&path).unwrap();
            wal.log_commit(9).unwrap();
        }

        // Flip a payload byte behind the manager's back.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let mut f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.write_all(&bytes).unwrap();

        let wal = WalManager::open(&path).unwrap();
        assert!(wal.records().is_err());
    }
}
