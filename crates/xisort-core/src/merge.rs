//! Lazy k-way merge of sorted chunk streams.
//!
//! A min-heap (via [`Reverse`]) holds exactly one record per source
//! chunk; popping the minimum pulls the replacement from the same chunk.
//! The comparator is lexicographic `(key, tie, seq)`, so the globally
//! unique sequence counter settles any cross-chunk tie.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::reader::ChunkReader;
use crate::record::{SortRecord, TieKind};

#[derive(Debug)]
struct HeapEntry {
    rec: SortRecord,
    src: usize,
    kind: TieKind,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rec
            .cmp_with(&other.rec, self.kind)
            .then_with(|| self.src.cmp(&other.src))
    }
}

/// Merged stream over all chunk readers.
#[derive(Debug)]
pub struct MergeStream {
    readers: Vec<ChunkReader>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    kind: TieKind,
    failed: bool,
}

impl MergeStream {
    /// Prime the heap with the head record of every reader.
    pub fn new(mut readers: Vec<ChunkReader>, kind: TieKind) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (src, reader) in readers.iter_mut().enumerate() {
            match reader.next() {
                Some(Ok(rec)) => heap.push(Reverse(HeapEntry { rec, src, kind })),
                Some(Err(e)) => return Err(e),
                None => {}
            }
        }
        Ok(Self {
            readers,
            heap,
            kind,
            failed: false,
        })
    }
}

impl Iterator for MergeStream {
    type Item = Result<SortRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let Reverse(min) = self.heap.pop()?;
        match self.readers[min.src].next() {
            Some(Ok(rec)) => self.heap.push(Reverse(HeapEntry {
                rec,
                src: min.src,
                kind: self.kind,
            })),
            Some(Err(e)) => {
                self.failed = true;
                return Some(Err(e));
            }
            None => {}
        }
        Some(Ok(min.rec))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::write_chunk;
    use crate::scratch::WorkDir;

    fn chunk_of(wd: &WorkDir, idx: u64, seqs: &[u64]) -> ChunkReader {
        let records: Vec<SortRecord> = seqs
            .iter()
            .map(|&s| SortRecord::int_tie(s as f64, s, s, s))
            .collect();
        let path = wd.chunk_path(idx);
        write_chunk(&path, &records).unwrap();
        ChunkReader::open(&path, true, false).unwrap()
    }

    #[test]
    fn unions_chunks_in_global_order() {
        let wd = WorkDir::create(None).unwrap();
        let readers = vec![
            chunk_of(&wd, 0, &[0, 3, 6, 9]),
            chunk_of(&wd, 1, &[1, 4, 7]),
            chunk_of(&wd, 2, &[2, 5, 8]),
        ];
        let merged: Vec<u64> = MergeStream::new(readers, TieKind::Int)
            .unwrap()
            .map(|r| r.unwrap().seq())
            .collect();
        assert_eq!(merged, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn equal_keys_fall_back_to_seq() {
        let wd = WorkDir::create(None).unwrap();
        let a: Vec<SortRecord> = [0u64, 2, 4]
            .iter()
            .map(|&s| SortRecord::int_tie(1.0, 7, 7, s))
            .collect();
        let b: Vec<SortRecord> = [1u64, 3, 5]
            .iter()
            .map(|&s| SortRecord::int_tie(1.0, 7, 7, s))
            .collect();
        write_chunk(&wd.chunk_path(0), &a).unwrap();
        write_chunk(&wd.chunk_path(1), &b).unwrap();
        let readers = vec![
            ChunkReader::open(&wd.chunk_path(0), true, false).unwrap(),
            ChunkReader::open(&wd.chunk_path(1), true, false).unwrap(),
        ];
        let merged: Vec<u64> = MergeStream::new(readers, TieKind::Int)
            .unwrap()
            .map(|r| r.unwrap().seq())
            .collect();
        assert_eq!(merged, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_reader_set_is_an_empty_stream() {
        let mut merged = MergeStream::new(Vec::new(), TieKind::Int).unwrap();
        assert!(merged.next().is_none());
    }
}
