//! Sequential log verification.
//!
//! Walks `commit.log` record by record, checking framing, sequence
//! continuity, and checksums. Any mismatch is corruption and halts the scan
//! with a FATAL error; a clean end-of-file is the only way to finish.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::flush::writer::RECORD_OVERHEAD;

use super::errors::{FlushError, FlushResult};

/// Result of a successful scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogScan {
    /// Number of valid records
    pub records: u64,
    /// Total bytes covered (the LSN at the end of the last record)
    pub bytes: u64,
}

/// Verifier for the framed commit log.
pub struct LogVerifier;

impl LogVerifier {
    /// Scans the log at `path`, validating every record.
    ///
    /// A missing or empty file scans as zero records.
    ///
    /// # Errors
    ///
    /// `AERO_LOG_CORRUPTION` on a truncated frame, checksum mismatch, or
    /// sequence discontinuity; `AERO_LOG_APPEND_FAILED` on read I/O errors.
    pub fn scan(path: &Path) -> FlushResult<LogScan> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogScan {
                    records: 0,
                    bytes: 0,
                })
            }
            Err(e) => {
                return Err(FlushError::append_failed(
                    format!("Failed to open log for verification: {}", path.display()),
                    e,
                ))
            }
        };

        let mut reader = BufReader::new(file);
        let mut records = 0u64;
        let mut offset = 0u64;

        loop {
            let mut len_bytes = [0u8; 4];
            match read_exact_or_eof(&mut reader, &mut len_bytes) {
                Ok(false) => break, // clean end of file
                Ok(true) => {}
                Err(e) => {
                    return Err(FlushError::append_failed(
                        "Read failed during verification",
                        e,
                    ))
                }
            }
            let payload_len = u32::from_le_bytes(len_bytes) as usize;

            let mut seq_bytes = [0u8; 8];
            let mut payload = vec![0u8; payload_len];
            let mut crc_bytes = [0u8; 4];
            reader
                .read_exact(&mut seq_bytes)
                .and_then(|_| reader.read_exact(&mut payload))
                .and_then(|_| reader.read_exact(&mut crc_bytes))
                .map_err(|_| {
                    FlushError::corruption_at_offset(
                        offset,
                        "record frame overruns end of file",
                    )
                })?;

            let seq = u64::from_le_bytes(seq_bytes);
            if seq != records + 1 {
                return Err(FlushError::corruption_at_offset(
                    offset,
                    format!("sequence discontinuity: expected {}, found {}", records + 1, seq),
                ));
            }

            let mut hasher = crc32fast::Hasher::new();
            hasher.update(&seq_bytes);
            hasher.update(&payload);
            if hasher.finalize() != u32::from_le_bytes(crc_bytes) {
                return Err(FlushError::corruption_at_offset(
                    offset,
                    "checksum mismatch",
                ));
            }

            records += 1;
            offset += (payload_len + RECORD_OVERHEAD) as u64;
        }

        Ok(LogScan {
            records,
            bytes: offset,
        })
    }
}

/// Reads exactly `buf.len()` bytes, returning `Ok(false)` on a clean EOF
/// before the first byte.
fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "partial frame header",
            ));
        }
        filled += n;
    }
    Ok(true)
}
