//! Tail storage and emission for non-finite values.
//!
//! Non-finite inputs (±inf, NaN) bypass the chunk pipeline entirely:
//! their raw little-endian bit patterns are appended to `tail.tmp` under a
//! running BLAKE3, then sealed by appending the 16-byte tag and atomically
//! renaming to `tail.fin`. After the merged finite stream is exhausted the
//! tail is emitted in shuffled order: payloads up to 512 MiB are loaded
//! whole, anything larger goes through a bounded reservoir sample.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;

use crate::chunk::{TAG_LEN, hasher_tag, payload_tag};
use crate::error::{Result, SortError, warn};
use crate::rng::XiRng;
use crate::scratch::{ScratchBudget, WorkDir, sync_parent_dir};

/// Payloads at or below this many bytes are loaded and shuffled whole.
pub const TAIL_LOAD_LIMIT: u64 = 512 * 1024 * 1024;

/// Reservoir capacity for oversized tails: 64 MiB worth of doubles.
pub const TAIL_RESERVOIR_CAP: usize = 64 * 1024 * 1024 / F64_SIZE;

const F64_SIZE: usize = size_of::<f64>();

/// Append-only store for the raw bit patterns of non-finite values.
pub struct TailStore {
    tmp: PathBuf,
    fin: PathBuf,
    file: Option<File>,
    hasher: blake3::Hasher,
}

impl TailStore {
    #[must_use]
    pub fn new(workdir: &WorkDir) -> Self {
        Self {
            tmp: workdir.tail_tmp_path(),
            fin: workdir.tail_fin_path(),
            file: None,
            hasher: blake3::Hasher::new(),
        }
    }

    /// Append raw values, updating the running digest and the budget.
    pub fn append(&mut self, vals: &[f64], budget: &mut ScratchBudget) -> Result<()> {
        if vals.is_empty() {
            return Ok(());
        }
        let mut raw = Vec::with_capacity(vals.len() * F64_SIZE);
        for v in vals {
            raw.extend_from_slice(&v.to_bits().to_le_bytes());
        }
        self.hasher.update(&raw);
        if self.file.is_none() {
            self.file = Some(
                OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&self.tmp)?,
            );
        }
        if let Some(file) = self.file.as_mut() {
            file.write_all(&raw)?;
        }
        budget.charge(raw.len() as u64)?;
        Ok(())
    }

    /// Seal the store: append the final tag, atomically rename
    /// `tail.tmp` to `tail.fin`, fsync the directory, and charge the tag
    /// bytes. Returns the sealed path, or `None` when no non-finite value
    /// was ever appended.
    pub fn finalize(mut self, budget: &mut ScratchBudget) -> Result<Option<PathBuf>> {
        let Some(mut file) = self.file.take() else {
            return Ok(None);
        };
        file.write_all(&hasher_tag(&self.hasher))?;
        drop(file);
        std::fs::rename(&self.tmp, &self.fin)?;
        sync_parent_dir(&self.fin);
        budget.charge(TAG_LEN as u64)?;
        Ok(Some(self.fin))
    }
}

/// Stream the sealed tail in shuffled order.
///
/// The trailing tag is verified (when `integrity` is on) before any value
/// is yielded, under the same hard/soft policy as chunk files. Tag
/// verification draws nothing from the PRNG, so the emitted sequence for
/// a valid file is independent of the integrity setting.
pub fn emit_tail(
    path: &Path,
    rng: &mut XiRng,
    integrity: bool,
    soft: bool,
) -> Result<std::vec::IntoIter<f64>> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    if file_len <= TAG_LEN as u64 {
        return Ok(Vec::new().into_iter());
    }

    let raw_payload = file_len - TAG_LEN as u64;
    let map = unsafe { MmapOptions::new().len(raw_payload as usize).map(&file)? };

    if integrity {
        let mut stored = [0u8; TAG_LEN];
        read_tag(&file, file_len, &mut stored)?;
        if payload_tag(&map) != stored {
            let err = SortError::TagMismatch {
                path: path.to_path_buf(),
            };
            if !soft {
                return Err(err);
            }
            warn(&err);
        }
    }

    let aligned = raw_payload - raw_payload % F64_SIZE as u64;
    if aligned != raw_payload {
        warn(format_args!(
            "tail payload {raw_payload} bytes in {} is not a multiple of {F64_SIZE}; truncating",
            path.display()
        ));
    }
    if aligned == 0 {
        return Ok(Vec::new().into_iter());
    }
    let data = &map[..aligned as usize];

    let mut vals = if aligned <= TAIL_LOAD_LIMIT {
        decode_f64s(data)
    } else {
        reservoir_sample(data, TAIL_RESERVOIR_CAP, rng)
    };
    rng.shuffle(&mut vals);
    Ok(vals.into_iter())
}

fn read_tag(mut file: &File, file_len: u64, out: &mut [u8; TAG_LEN]) -> Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    file.seek(SeekFrom::Start(file_len - TAG_LEN as u64))?;
    file.read_exact(out)?;
    Ok(())
}

fn decode_f64s(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(F64_SIZE)
        .map(|c| {
            let mut b = [0u8; F64_SIZE];
            b.copy_from_slice(c);
            f64::from_le_bytes(b)
        })
        .collect()
}

/// Vitter's Algorithm R over the raw payload, bounded at `cap` elements.
///
/// The first `cap` elements fill the reservoir; element `i >= cap` then
/// replaces slot `m = bounded(i + 1)` whenever `m < cap`.
fn reservoir_sample(data: &[u8], cap: usize, rng: &mut XiRng) -> Vec<f64> {
    let total = data.len() / F64_SIZE;
    let mut reservoir = Vec::with_capacity(cap.min(total));
    for idx in 0..total {
        let off = idx * F64_SIZE;
        let mut b = [0u8; F64_SIZE];
        b.copy_from_slice(&data[off..off + F64_SIZE]);
        let v = f64::from_le_bytes(b);
        if reservoir.len() < cap {
            reservoir.push(v);
        } else {
            let m = rng.bounded(idx as u64 + 1) as usize;
            if m < cap {
                reservoir[m] = v;
            }
        }
    }
    reservoir
}
