//! Buffered log writer: the flush collaborator driven by the group commit
//! lock.
//!
//! Committing threads `reserve()` their record into an in-memory buffer and
//! receive the LSN at which the record ends. Durability is then obtained
//! through the lock: `sync_to()` blocks until the durable LSN covers the
//! record, and `commit_async()` registers a completion callback instead.
//! Whichever thread the lock elects as leader drains the buffer to disk with
//! a single write + fsync on behalf of every reserved record.
//!
//! LSNs are byte offsets into the log file. The durable LSN published through
//! the lock is always a record boundary.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::observability::Logger;
use crate::sync::{AcquireResult, CompletionCallback, GroupCommitLock, Lsn};

use super::errors::{FlushError, FlushResult};
use super::reader::LogVerifier;

/// Frame overhead per record: length prefix (u32), sequence number (u64),
/// trailing checksum (u32).
pub(crate) const RECORD_OVERHEAD: usize = 4 + 8 + 4;

/// Buffered, unflushed state. Guarded by its own mutex so reservations never
/// wait on a flush in progress.
struct LogBuffer {
    /// Framed bytes not yet written to the file
    pending: Vec<u8>,
    /// LSN at the end of the last reserved record
    reserved: Lsn,
    /// Sequence number for the next record (starts at 1, never reused)
    next_seq: u64,
}

/// Append-only log writer with group-committed fsync.
pub struct LogWriter {
    log_path: PathBuf,
    file: Mutex<File>,
    buffer: Mutex<LogBuffer>,
    lock: GroupCommitLock,
}

impl LogWriter {
    /// Opens or creates `<data_dir>/log/commit.log`.
    ///
    /// On reopen the existing file is scanned so sequence numbers continue
    /// and the durable LSN starts at the current end of file.
    ///
    /// # Errors
    ///
    /// `AERO_LOG_APPEND_FAILED` if the directory or file cannot be created,
    /// `AERO_LOG_CORRUPTION` if the existing file fails verification.
    pub fn open(data_dir: &Path) -> FlushResult<Self> {
        let log_dir = data_dir.join("log");
        let log_path = log_dir.join("commit.log");

        if !log_dir.exists() {
            fs::create_dir_all(&log_dir).map_err(|e| {
                FlushError::append_failed(
                    format!("Failed to create log directory: {}", log_dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| {
                FlushError::append_failed(
                    format!("Failed to open log file: {}", log_path.display()),
                    e,
                )
            })?;

        let scan = LogVerifier::scan(&log_path)?;

        Ok(Self {
            log_path,
            file: Mutex::new(file),
            buffer: Mutex::new(LogBuffer {
                pending: Vec::new(),
                reserved: scan.bytes,
                next_seq: scan.records + 1,
            }),
            lock: GroupCommitLock::new(scan.bytes),
        })
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.log_path
    }

    /// The group commit lock coordinating flushes of this log.
    pub fn commit_lock(&self) -> &GroupCommitLock {
        &self.lock
    }

    /// LSN up to which the log is durable on disk.
    pub fn durable_lsn(&self) -> Lsn {
        self.lock.value()
    }

    /// LSN at the end of the last reserved (possibly unflushed) record.
    pub fn reserved_lsn(&self) -> Lsn {
        self.buffer.lock().unwrap().reserved
    }

    /// Frames `payload` into the write buffer and returns the LSN the caller
    /// must wait for. Does not touch the file.
    ///
    /// Frame layout: `len: u32 LE | seq: u64 LE | payload | crc32 LE`, with
    /// the checksum covering the sequence number and payload.
    pub fn reserve(&self, payload: &[u8]) -> Lsn {
        let mut buffer = self.buffer.lock().unwrap();
        let seq = buffer.next_seq;
        buffer.next_seq += 1;

        buffer
            .pending
            .reserve(payload.len() + RECORD_OVERHEAD);
        buffer
            .pending
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buffer.pending.extend_from_slice(&seq.to_le_bytes());
        buffer.pending.extend_from_slice(payload);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&seq.to_le_bytes());
        hasher.update(payload);
        buffer
            .pending
            .extend_from_slice(&hasher.finalize().to_le_bytes());

        buffer.reserved += (payload.len() + RECORD_OVERHEAD) as Lsn;
        buffer.reserved
    }

    /// Blocks until the durable LSN reaches `lsn`, flushing as leader when
    /// the lock elects this thread.
    ///
    /// This is the canonical consumer loop: acquire; on `Acquired` drain the
    /// buffer, fsync, and release the flushed LSN; repeat while the release
    /// reports stalled callbacks that need another flush pass.
    ///
    /// # Errors
    ///
    /// Propagates flush failures. The lock is always released before an
    /// error returns, so other committers are not wedged.
    pub fn sync_to(&self, lsn: Lsn) -> FlushResult<()> {
        let mut target = lsn;
        loop {
            match self.lock.acquire(target, None) {
                AcquireResult::Expired => {
                    if self.lock.value() >= lsn {
                        return Ok(());
                    }
                    // Expired against a stall target below our own record.
                    target = lsn;
                }
                AcquireResult::Acquired => {
                    let durable = match self.flush() {
                        Ok(durable) => durable,
                        Err(e) => {
                            // Publish no progress, hand the lock off, fail.
                            self.lock.release(self.lock.value());
                            return Err(e);
                        }
                    };
                    let stalled = self.lock.release(durable);
                    if stalled == 0 {
                        if durable >= lsn {
                            return Ok(());
                        }
                        target = lsn;
                    } else {
                        // Callbacks past `durable` have no thread to drive
                        // them but this one.
                        target = stalled;
                    }
                }
                AcquireResult::CallbackQueued => unreachable!("no callback supplied"),
            }
        }
    }

    /// Registers `callback` to run once the durable LSN reaches `lsn`,
    /// without blocking on other leaders. If this thread is elected leader it
    /// performs the flush itself (and the callback fires during its release).
    ///
    /// # Errors
    ///
    /// Propagates flush failures from the leader path only; `CallbackQueued`
    /// and `Expired` outcomes cannot fail.
    pub fn commit_async(&self, lsn: Lsn, callback: CompletionCallback) -> FlushResult<()> {
        match self.lock.acquire(lsn, Some(callback)) {
            AcquireResult::Expired | AcquireResult::CallbackQueued => Ok(()),
            AcquireResult::Acquired => {
                let durable = match self.flush() {
                    Ok(durable) => durable,
                    Err(e) => {
                        self.lock.release(self.lock.value());
                        return Err(e);
                    }
                };
                let stalled = self.lock.release(durable);
                if stalled != 0 {
                    // Keep driving until the queue is dry.
                    self.sync_to(stalled)?;
                }
                Ok(())
            }
        }
    }

    /// Drains the buffer to the file and fsyncs. Returns the durable LSN.
    ///
    /// Must only be called by the thread currently holding leadership; the
    /// lock serializes flushes, so the file mutex is uncontended.
    ///
    /// # Errors
    ///
    /// `AERO_LOG_APPEND_FAILED` (ERROR) if the write fails,
    /// `AERO_LOG_FSYNC_FAILED` (FATAL) if fsync fails.
    fn flush(&self) -> FlushResult<Lsn> {
        let (bytes, upto) = {
            let mut buffer = self.buffer.lock().unwrap();
            (std::mem::take(&mut buffer.pending), buffer.reserved)
        };

        if !bytes.is_empty() {
            let mut file = self.file.lock().unwrap();
            file.write_all(&bytes).map_err(|e| {
                FlushError::append_failed(
                    format!("Failed to write {} log bytes", bytes.len()),
                    e,
                )
            })?;
            file.sync_all().map_err(|e| {
                FlushError::fsync_failed("fsync failed after log write", e)
            })?;

            Logger::trace(
                "LOG_FLUSH",
                &[
                    ("bytes", &bytes.len().to_string()),
                    ("durable_lsn", &upto.to_string()),
                ],
            );
        }

        Ok(upto)
    }
}
