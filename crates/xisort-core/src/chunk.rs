//! Sealed chunk files.
//!
//! A chunk is `record[0] || ... || record[k-1] || tag16`, where `tag16` is
//! the first 16 bytes of the BLAKE3 digest of the record payload. Chunks
//! are written once and never mutated; the working directory is fsynced
//! after each write so a crash cannot leave a half-registered file.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::error::Result;
use crate::record::{RECORD_SIZE, SortRecord};
use crate::scratch::sync_parent_dir;

/// Integrity tag length (BLAKE3 digest prefix).
pub const TAG_LEN: usize = 16;

/// First 16 bytes of the BLAKE3 digest of `payload`.
#[must_use]
pub fn payload_tag(payload: &[u8]) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&blake3::hash(payload).as_bytes()[..TAG_LEN]);
    tag
}

/// First 16 bytes of an incremental hasher's digest.
#[must_use]
pub(crate) fn hasher_tag(hasher: &blake3::Hasher) -> [u8; TAG_LEN] {
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&hasher.finalize().as_bytes()[..TAG_LEN]);
    tag
}

/// Persist a sorted record batch as `payload || tag16` at `path`.
///
/// The file must not already exist. Returns the total bytes written so
/// the caller can charge the scratch budget.
pub fn write_chunk(path: &Path, records: &[SortRecord]) -> Result<u64> {
    let mut payload = Vec::with_capacity(records.len() * RECORD_SIZE);
    for rec in records {
        payload.extend_from_slice(rec.as_bytes());
    }
    let tag = payload_tag(&payload);

    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&payload)?;
    file.write_all(&tag)?;
    drop(file);
    sync_parent_dir(path);
    Ok((payload.len() + TAG_LEN) as u64)
}
