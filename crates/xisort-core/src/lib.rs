//! External sorting for streams of 64-bit floats that may exceed memory.
//!
//! This crate provides:
//! - Key encoding: finite doubles map to totally ordered `u64` keys, with
//!   sentinel codes separating signed zeros and non-finite values
//! - A streaming chunk/merge pipeline: bounded scratch, BLAKE3-tagged
//!   chunk files, windowed mmap verification, lazy k-way merge
//! - Tail handling: ±inf and NaN are diverted to an append-only tail file
//!   and emitted (shuffled) after the finite stream
//! - A deterministic PRNG (xoshiro256** over SplitMix64 seeding), so a
//!   seeded run reproduces its scratch files and output byte for byte

pub mod chunk;
pub mod error;
pub mod key;
pub mod merge;
pub mod metric;
pub mod reader;
pub mod record;
pub mod rng;
pub mod scratch;
pub mod sorter;
pub mod tail;

pub use error::{Result, SortError};
pub use key::{K_NAN, K_NEG0, K_NEGINF, K_POS0, K_POSINF, SENTINEL_BASE, ieee_key};
pub use metric::{SortMode, curved_metric};
pub use record::{RECORD_SIZE, SortRecord, TieBreak, TieKind, verify_record_abi};
pub use rng::{XiRng, auto_seed};
pub use sorter::{DEFAULT_CHUNK_CAPACITY, SortedStream, XiSort, XiSortConfig};
