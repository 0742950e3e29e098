use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::mem;
use std::path::PathBuf;

use rayon::prelude::*;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::codec;
use crate::error::Result;
use crate::io::{FramedReader, PairReader, PairWriter, RawPair};

/// Default in-memory budget before the sorter spills to disk.
pub const DEFAULT_SORT_BUFFER: usize = 1024 * 1024;

// Rough per-record bookkeeping cost on top of the key and value bytes.
const RECORD_OVERHEAD: usize = mem::size_of::<RawPair>();

/// Bounded-memory staging writer.
///
/// Pairs are buffered until `capacity` bytes are held, then sorted and spilled
/// to a temporary file in `spill_dir`. `close` merges the spills and writes a
/// single stream to `dest`, ascending by key bytes with ties kept in write
/// order.
pub struct ExternalSorter<W: Write> {
    dest: BufWriter<W>,
    spill_dir: PathBuf,
    capacity: usize,
    pending: Vec<RawPair>,
    pending_bytes: usize,
    spills: Vec<NamedTempFile>,
    written: u64,
}

impl<W: Write> ExternalSorter<W> {
    pub fn new(dest: W, spill_dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dest: BufWriter::new(dest),
            spill_dir: spill_dir.into(),
            capacity: capacity.max(1),
            pending: Vec::new(),
            pending_bytes: 0,
            spills: Vec::new(),
            written: 0,
        }
    }

    pub fn spill_count(&self) -> usize {
        self.spills.len()
    }

    fn sort_pending(&mut self) {
        // par_sort_by is stable, which keeps equal keys in write order.
        self.pending.par_sort_by(|a, b| a.key.cmp(&b.key));
    }

    fn spill(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.sort_pending();

        let mut spill = tempfile::Builder::new()
            .prefix("spill-")
            .tempfile_in(&self.spill_dir)?;
        {
            let mut out = BufWriter::new(spill.as_file_mut());
            for pair in self.pending.drain(..) {
                codec::write_record(&mut out, &pair.key, &pair.value)?;
            }
            out.flush()?;
        }
        debug!(
            path = %spill.path().display(),
            bytes = self.pending_bytes,
            "spilled sort buffer"
        );
        self.pending_bytes = 0;
        self.spills.push(spill);
        Ok(())
    }

    fn merge(&mut self) -> Result<()> {
        let mut runs = Vec::with_capacity(self.spills.len());
        for spill in &self.spills {
            let mut file: File = spill.reopen()?;
            file.seek(SeekFrom::Start(0))?;
            runs.push(FramedReader::new(BufReader::new(file)));
        }

        let mut heap = BinaryHeap::with_capacity(runs.len());
        for (run, reader) in runs.iter_mut().enumerate() {
            if let Some(pair) = reader.next_pair()? {
                heap.push(Head { pair, run });
            }
        }

        while let Some(Head { pair, run }) = heap.pop() {
            codec::write_record(&mut self.dest, &pair.key, &pair.value)?;
            if let Some(next) = runs[run].next_pair()? {
                heap.push(Head { pair: next, run });
            }
        }

        debug!(runs = runs.len(), "merged spills");
        Ok(())
    }
}

impl<W: Write> PairWriter for ExternalSorter<W> {
    fn write_pair(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.pending_bytes += key.len() + value.len() + RECORD_OVERHEAD;
        self.pending.push(RawPair::new(key, value));
        self.written += 1;
        if self.pending_bytes >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.spills.is_empty() {
            self.sort_pending();
            for pair in self.pending.drain(..) {
                codec::write_record(&mut self.dest, &pair.key, &pair.value)?;
            }
            self.pending_bytes = 0;
        } else {
            self.spill()?;
            self.merge()?;
        }
        self.dest.flush()?;

        debug!(pairs = self.written, spills = self.spills.len(), "sorter closed");
        for spill in self.spills.drain(..) {
            spill.close()?;
        }
        Ok(())
    }
}

/// Head record of one spill run. Ordered so the max-heap pops the smallest
/// key first, and for equal keys the earliest run.
struct Head {
    pair: RawPair,
    run: usize,
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .pair
            .key
            .cmp(&self.pair.key)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Head {}
