//! Error types for the sorter.
//!
//! Every fatal failure class has its own variant; non-fatal conditions
//! (soft-verify downgrades, cleanup failures, leftover scratch files) are
//! reported through [`warn`] and never abort a stream.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SortError>;

/// Fatal failure classes for construction, spill, merge, and tail emission.
#[derive(Debug, Error)]
pub enum SortError {
    /// CURVED perturbation would not be monotone.
    #[error("epsilon {epsilon} too large: pi * epsilon must be < 1")]
    EpsilonTooLarge { epsilon: f64 },

    /// Determinism was requested without an explicit seed.
    #[error("require_deterministic is set but no seed was given")]
    MissingSeed,

    /// A scratch write would exceed the configured quota.
    #[error("scratch quota exceeded: {used} bytes live, limit {limit}")]
    QuotaExceeded { used: u64, limit: u64 },

    /// The global sequence counter would wrap.
    #[error("sequence counter exhausted")]
    SequenceOverflow,

    /// Computed BLAKE3 tag does not match the stored tag.
    #[error("integrity check failed (tag mismatch) in {}", .path.display())]
    TagMismatch { path: PathBuf },

    /// Payload length is not a multiple of the record size.
    #[error(
        "payload size {} in {} is not a multiple of record size {}",
        .payload,
        .path.display(),
        .record_size
    )]
    MisalignedPayload {
        path: PathBuf,
        payload: u64,
        record_size: u64,
    },

    /// File is too short to hold an integrity tag.
    #[error("{} is smaller ({} bytes) than an integrity tag", .path.display(), .len)]
    TruncatedFile { path: PathBuf, len: u64 },

    /// The integer-tie and float-tie record schemas disagree on layout.
    #[error("record schema drift: integer-tie and float-tie layouts differ")]
    RecordAbiDrift,

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Emit a non-fatal diagnostic on stderr.
pub(crate) fn warn(msg: impl std::fmt::Display) {
    eprintln!("xisort: warning: {msg}");
}
