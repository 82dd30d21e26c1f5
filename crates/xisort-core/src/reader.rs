//! Verified iteration over sealed chunk files.
//!
//! Payloads are mapped read-only in aligned windows sized
//! `lcm(256 MiB, record size)`, so no record ever straddles a window
//! boundary. Each window feeds an incremental BLAKE3 hasher; once the
//! payload is exhausted the digest prefix is compared against the
//! trailing 16-byte tag. Structural and integrity failures are hard
//! errors by default and warnings under soft verification.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::chunk::{TAG_LEN, hasher_tag};
use crate::error::{Result, SortError, warn};
use crate::record::{RECORD_SIZE, SortRecord};

/// Base window size for large-file mapping.
pub const WINDOW_BASE: usize = 256 * 1024 * 1024;

/// Window length actually used: `lcm(WINDOW_BASE, RECORD_SIZE)`.
pub const WINDOW_LEN: usize = lcm(WINDOW_BASE, RECORD_SIZE);

const fn lcm(a: usize, b: usize) -> usize {
    let mut x = a;
    let mut y = b;
    while y != 0 {
        let r = x % y;
        x = y;
        y = r;
    }
    a / x * b
}

/// Lazily verified reader for one sealed chunk.
///
/// Yields records in on-disk order (already sorted within the chunk).
#[derive(Debug)]
pub struct ChunkReader {
    file: File,
    path: PathBuf,
    soft: bool,
    /// Effective payload length; possibly truncated under soft verify.
    payload: u64,
    file_len: u64,
    /// Next unread byte offset within the payload.
    pos: u64,
    window: Option<Mmap>,
    window_pos: usize,
    hasher: Option<blake3::Hasher>,
    done: bool,
}

impl ChunkReader {
    /// Open `path` and validate its framing.
    ///
    /// Under soft verification a misaligned payload is truncated to the
    /// nearest record boundary with a warning instead of failing, and a
    /// file shorter than one tag yields nothing.
    pub fn open(path: &Path, integrity: bool, soft: bool) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < TAG_LEN as u64 {
            let err = SortError::TruncatedFile {
                path: path.to_path_buf(),
                len: file_len,
            };
            if !soft {
                return Err(err);
            }
            warn(&err);
            return Ok(Self {
                file,
                path: path.to_path_buf(),
                soft,
                payload: 0,
                file_len,
                pos: 0,
                window: None,
                window_pos: 0,
                hasher: None,
                done: true,
            });
        }

        let mut payload = file_len - TAG_LEN as u64;
        if payload % RECORD_SIZE as u64 != 0 {
            let err = SortError::MisalignedPayload {
                path: path.to_path_buf(),
                payload,
                record_size: RECORD_SIZE as u64,
            };
            if !soft {
                return Err(err);
            }
            warn(format_args!("{err}; truncating to fit"));
            payload -= payload % RECORD_SIZE as u64;
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
            soft,
            payload,
            file_len,
            pos: 0,
            window: None,
            window_pos: 0,
            hasher: integrity.then(blake3::Hasher::new),
            done: false,
        })
    }

    /// Map the next aligned window starting at `self.pos` and feed it to
    /// the hasher.
    fn map_next_window(&mut self) -> Result<()> {
        let base = self.pos;
        let len = (self.payload - base).min(WINDOW_LEN as u64) as usize;
        let map = unsafe { MmapOptions::new().offset(base).len(len).map(&self.file)? };
        if let Some(hasher) = &mut self.hasher {
            hasher.update(&map);
        }
        self.window = Some(map);
        self.window_pos = 0;
        Ok(())
    }

    /// Compare the incremental digest against the stored tag once the
    /// payload is exhausted.
    fn finish(&mut self) -> Result<()> {
        self.window = None;
        let Some(hasher) = self.hasher.take() else {
            return Ok(());
        };
        let mut stored = [0u8; TAG_LEN];
        let mut file = &self.file;
        file.seek(SeekFrom::Start(self.file_len - TAG_LEN as u64))?;
        file.read_exact(&mut stored)?;
        if hasher_tag(&hasher) != stored {
            let err = SortError::TagMismatch {
                path: self.path.clone(),
            };
            if self.soft {
                warn(&err);
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

impl Iterator for ChunkReader {
    type Item = Result<SortRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        while self.pos < self.payload {
            if let Some(win) = &self.window {
                if self.window_pos < win.len() {
                    let mut bytes = [0u8; RECORD_SIZE];
                    bytes.copy_from_slice(&win[self.window_pos..self.window_pos + RECORD_SIZE]);
                    self.window_pos += RECORD_SIZE;
                    self.pos += RECORD_SIZE as u64;
                    return Some(Ok(SortRecord::from_bytes(bytes)));
                }
            }
            if let Err(e) = self.map_next_window() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.done = true;
        match self.finish() {
            Ok(()) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::write_chunk;
    use crate::record::TieKind;
    use crate::scratch::WorkDir;

    fn write_sample(wd: &WorkDir, idx: u64, n: u64) -> PathBuf {
        let records: Vec<SortRecord> = (0..n)
            .map(|i| SortRecord::int_tie(i as f64, i, i, i))
            .collect();
        let path = wd.chunk_path(idx);
        write_chunk(&path, &records).unwrap();
        path
    }

    fn collect(reader: ChunkReader) -> Result<Vec<SortRecord>> {
        reader.collect()
    }

    #[test]
    fn window_length_is_a_record_multiple() {
        assert_eq!(WINDOW_LEN % RECORD_SIZE, 0);
        assert_eq!(WINDOW_LEN % WINDOW_BASE, 0);
    }

    #[test]
    fn round_trips_records_in_order() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 100);
        let records = collect(ChunkReader::open(&path, true, false).unwrap()).unwrap();
        assert_eq!(records.len(), 100);
        for (i, rec) in records.iter().enumerate() {
            assert_eq!(rec.seq(), i as u64);
            assert_eq!(rec.val(), i as f64);
        }
    }

    #[test]
    fn tag_only_file_verifies_as_empty() {
        let wd = WorkDir::create(None).unwrap();
        let path = wd.chunk_path(0);
        write_chunk(&path, &[]).unwrap();
        let records = collect(ChunkReader::open(&path, true, false).unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn corrupted_tag_is_a_hard_error() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 10);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let err = collect(ChunkReader::open(&path, true, false).unwrap()).unwrap_err();
        assert!(matches!(err, SortError::TagMismatch { .. }));
    }

    #[test]
    fn corrupted_payload_is_a_hard_error() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 10);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[40] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let err = collect(ChunkReader::open(&path, true, false).unwrap()).unwrap_err();
        assert!(matches!(err, SortError::TagMismatch { .. }));
    }

    #[test]
    fn soft_verify_downgrades_a_mismatch() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 10);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let records = collect(ChunkReader::open(&path, true, true).unwrap()).unwrap();
        assert_eq!(records.len(), 10);
    }

    #[test]
    fn no_integrity_skips_the_tag_entirely() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 10);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let records = collect(ChunkReader::open(&path, false, false).unwrap()).unwrap();
        assert_eq!(records.len(), 10);
    }

    #[test]
    fn misaligned_payload_fails_hard() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 4);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 3]);
        std::fs::write(&path, &bytes).unwrap();

        let err = ChunkReader::open(&path, true, false).unwrap_err();
        assert!(matches!(err, SortError::MisalignedPayload { .. }));
    }

    #[test]
    fn misaligned_payload_truncates_under_soft_verify() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 4);
        let mut bytes = std::fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8; 3]);
        std::fs::write(&path, &bytes).unwrap();

        // The extra bytes shift the framing: the effective payload still
        // parses as whole records, the tag comparison warns instead of
        // failing, and every original record is recovered.
        let reader = ChunkReader::open(&path, true, true).unwrap();
        let records = collect(reader).unwrap();
        assert_eq!(records.len(), 4);
    }

    #[test]
    fn short_file_fails_hard_and_soft_yields_nothing() {
        let wd = WorkDir::create(None).unwrap();
        let path = wd.chunk_path(0);
        std::fs::write(&path, [0u8; 7]).unwrap();

        let err = ChunkReader::open(&path, true, false).unwrap_err();
        assert!(matches!(err, SortError::TruncatedFile { .. }));

        let records = collect(ChunkReader::open(&path, true, true).unwrap()).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn records_compare_sorted_after_read() {
        let wd = WorkDir::create(None).unwrap();
        let path = write_sample(&wd, 0, 50);
        let records = collect(ChunkReader::open(&path, true, false).unwrap()).unwrap();
        for pair in records.windows(2) {
            assert_eq!(
                pair[0].cmp_with(&pair[1], TieKind::Int),
                std::cmp::Ordering::Less
            );
        }
    }
}
