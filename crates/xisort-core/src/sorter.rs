//! The orchestrator: configuration, the streaming chunk loop, and the
//! merged output stream.
//!
//! One [`XiSort`] instance owns one run: its scratch directory, PRNG,
//! byte budget, and global sequence counter. [`XiSort::stream_sort`]
//! consumes the input, spills sorted chunks, and hands back a
//! [`SortedStream`] that lazily merges the chunks, then emits the tail,
//! and releases every scratch resource when dropped, even when the
//! consumer abandons the stream early.

use std::path::{Path, PathBuf};

use crate::chunk::write_chunk;
use crate::error::{Result, SortError, warn};
use crate::key::ieee_key;
use crate::merge::MergeStream;
use crate::metric::{SortMode, curved_metric};
use crate::reader::ChunkReader;
use crate::record::{SortRecord, TieBreak, TieKind, verify_record_abi};
use crate::rng::{XiRng, auto_seed};
use crate::scratch::{ScratchBudget, WorkDir};
use crate::tail::{TailStore, emit_tail};

/// Default number of values pulled per chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 1 << 18;

/// Construction options for [`XiSort`].
#[derive(Debug, Clone)]
pub struct XiSortConfig {
    /// Ordering regime for finite values.
    pub mode: SortMode,
    /// CURVED perturbation strength; `pi * epsilon` must be below 1.
    pub epsilon: f64,
    /// Secondary comparator for equal keys.
    pub tie_break: TieBreak,
    /// PRNG seed; `None` auto-seeds from OS entropy.
    pub seed: Option<u64>,
    /// Refuse to run without an explicit seed.
    pub require_deterministic: bool,
    /// Shuffle each chunk's non-finite values before the tail append.
    pub nan_shuffle: bool,
    /// Scratch quota in gibibytes.
    pub max_gb: f64,
    /// Parent of the working directory; `None` uses the system default.
    pub tmpdir: Option<PathBuf>,
    /// Verify BLAKE3 tags when reading scratch files back.
    pub integrity: bool,
    /// Demote integrity and structural failures to warnings.
    pub soft_verify: bool,
    /// Values pulled per chunk.
    pub chunk_capacity: usize,
}

impl Default for XiSortConfig {
    fn default() -> Self {
        Self {
            mode: SortMode::Strict,
            epsilon: 0.01,
            tie_break: TieBreak::Value,
            seed: None,
            require_deterministic: false,
            nan_shuffle: false,
            max_gb: 1.0,
            tmpdir: None,
            integrity: true,
            soft_verify: false,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
        }
    }
}

/// External sorter for one run.
pub struct XiSort {
    config: XiSortConfig,
    rng: XiRng,
    workdir: WorkDir,
    budget: ScratchBudget,
    kind: TieKind,
    gseq: u64,
    chunk_idx: u64,
}

impl XiSort {
    /// Validate `config`, seed the PRNG, and create the working directory.
    pub fn new(config: XiSortConfig) -> Result<Self> {
        if config.epsilon * std::f64::consts::PI >= 1.0 {
            return Err(SortError::EpsilonTooLarge {
                epsilon: config.epsilon,
            });
        }
        if config.require_deterministic && config.seed.is_none() {
            return Err(SortError::MissingSeed);
        }
        verify_record_abi()?;

        let seed = match config.seed {
            Some(s) => s,
            None => auto_seed()?,
        };
        let limit = (config.max_gb * (1u64 << 30) as f64) as u64;
        let workdir = WorkDir::create(config.tmpdir.as_deref())?;
        let kind = config.tie_break.tie_kind();
        Ok(Self {
            rng: XiRng::new(seed),
            workdir,
            budget: ScratchBudget::new(limit),
            kind,
            gseq: 0,
            chunk_idx: 0,
            config,
        })
    }

    /// The scratch directory this run writes into.
    #[must_use]
    pub fn workdir_path(&self) -> &Path {
        self.workdir.path()
    }

    /// Consume `input`, spill sorted chunks, and return the lazily merged
    /// output stream: finite values in key order, then the shuffled tail.
    pub fn stream_sort<I>(mut self, input: I) -> Result<SortedStream>
    where
        I: IntoIterator<Item = f64>,
    {
        let cap = self.config.chunk_capacity.max(1);
        let mut it = input.into_iter();
        let mut chunks: Vec<(PathBuf, u64)> = Vec::new();
        let mut tail = TailStore::new(&self.workdir);
        let mut buf: Vec<f64> = Vec::with_capacity(cap.min(1 << 20));
        let mut finite: Vec<f64> = Vec::new();
        let mut nonfinite: Vec<f64> = Vec::new();

        loop {
            buf.clear();
            while buf.len() < cap {
                match it.next() {
                    Some(v) => buf.push(v),
                    None => break,
                }
            }
            if buf.is_empty() {
                break;
            }

            finite.clear();
            nonfinite.clear();
            for &v in &buf {
                if v.is_finite() {
                    finite.push(v);
                } else {
                    nonfinite.push(v);
                }
            }

            if !nonfinite.is_empty() {
                if self.config.nan_shuffle {
                    self.rng.shuffle(&mut nonfinite);
                }
                tail.append(&nonfinite, &mut self.budget)?;
            }
            if finite.is_empty() {
                continue;
            }

            let n = finite.len() as u64;
            let Some(next_seq) = self.gseq.checked_add(n) else {
                return Err(SortError::SequenceOverflow);
            };

            let keys: Vec<u64> = match self.config.mode {
                SortMode::Strict => finite.iter().map(|&v| ieee_key(v)).collect(),
                SortMode::Curved => curved_metric(&finite, self.config.epsilon)
                    .iter()
                    .map(|&t| ieee_key(t))
                    .collect(),
            };

            let mut records: Vec<SortRecord> = Vec::with_capacity(finite.len());
            match self.config.tie_break {
                TieBreak::Value => {
                    for (i, (&v, &k)) in finite.iter().zip(&keys).enumerate() {
                        records.push(SortRecord::int_tie(v, k, k, self.gseq + i as u64));
                    }
                }
                TieBreak::Index => {
                    for (i, (&v, &k)) in finite.iter().zip(&keys).enumerate() {
                        let seq = self.gseq + i as u64;
                        records.push(SortRecord::float_tie(v, k, seq as f64, seq));
                    }
                }
                TieBreak::Random | TieBreak::Shuffle => {
                    for (i, (&v, &k)) in finite.iter().zip(&keys).enumerate() {
                        let tie = self.rng.uniform();
                        records.push(SortRecord::float_tie(v, k, tie, self.gseq + i as u64));
                    }
                }
            }
            self.gseq = next_seq;

            let kind = self.kind;
            records.sort_unstable_by(|a, b| a.cmp_with(b, kind));

            let path = self.workdir.chunk_path(self.chunk_idx);
            let size = write_chunk(&path, &records)?;
            self.budget.charge(size)?;
            chunks.push((path, size));
            self.chunk_idx += 1;
        }

        let tail_path = tail.finalize(&mut self.budget)?;

        let mut readers = Vec::with_capacity(chunks.len());
        for (path, _) in &chunks {
            readers.push(ChunkReader::open(
                path,
                self.config.integrity,
                self.config.soft_verify,
            )?);
        }
        let merge = MergeStream::new(readers, self.kind)?;

        Ok(SortedStream {
            merge,
            rng: self.rng,
            workdir: Some(self.workdir),
            budget: self.budget,
            chunks,
            tail_path,
            integrity: self.config.integrity,
            soft_verify: self.config.soft_verify,
            phase: Phase::Finite,
            tail_iter: None,
        })
    }
}

#[derive(Debug)]
enum Phase {
    Finite,
    Tail,
    Done,
}

/// Lazy output sequence: merged finite records, then the tail.
///
/// The stream fuses after its first error. Dropping it at any point
/// removes every scratch file and the working directory; cleanup failures
/// are warnings, never errors.
#[derive(Debug)]
pub struct SortedStream {
    merge: MergeStream,
    rng: XiRng,
    workdir: Option<WorkDir>,
    budget: ScratchBudget,
    chunks: Vec<(PathBuf, u64)>,
    tail_path: Option<PathBuf>,
    integrity: bool,
    soft_verify: bool,
    phase: Phase,
    tail_iter: Option<std::vec::IntoIter<f64>>,
}

impl SortedStream {
    /// Scratch bytes currently charged against the quota.
    #[must_use]
    pub fn scratch_used(&self) -> u64 {
        self.budget.used()
    }

    /// Remove every scratch file, credit the budget, and release the
    /// working directory. Safe to call more than once.
    fn cleanup(&mut self) {
        let Some(workdir) = self.workdir.take() else {
            return;
        };
        for (path, size) in self.chunks.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => self.budget.release(size),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.budget.release(size),
                Err(e) => warn(format_args!(
                    "could not remove {} during cleanup: {e}",
                    path.display()
                )),
            }
        }
        if let Some(path) = self.tail_path.take() {
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            match std::fs::remove_file(&path) {
                Ok(()) => self.budget.release(size),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn(format_args!(
                    "could not remove {} during cleanup: {e}",
                    path.display()
                )),
            }
        }
        workdir.report_leftovers();
        drop(workdir);
    }
}

impl Iterator for SortedStream {
    type Item = Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.phase {
                Phase::Finite => match self.merge.next() {
                    Some(Ok(rec)) => return Some(Ok(rec.val())),
                    Some(Err(e)) => {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                    None => {
                        self.phase = Phase::Tail;
                        if let Some(path) = self.tail_path.clone() {
                            match emit_tail(&path, &mut self.rng, self.integrity, self.soft_verify)
                            {
                                Ok(iter) => self.tail_iter = Some(iter),
                                Err(e) => {
                                    self.phase = Phase::Done;
                                    return Some(Err(e));
                                }
                            }
                        }
                    }
                },
                Phase::Tail => match self.tail_iter.as_mut().and_then(Iterator::next) {
                    Some(v) => return Some(Ok(v)),
                    None => {
                        self.phase = Phase::Done;
                        self.cleanup();
                        return None;
                    }
                },
                Phase::Done => return None,
            }
        }
    }
}

impl Drop for SortedStream {
    fn drop(&mut self) {
        self.cleanup();
    }
}
