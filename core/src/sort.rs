/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! External-memory k-way merge sort over byte records.
//!
//! Records are either fixed-size (the caller knows every record is
//! exactly `R` bytes) or variable-size (each record is self-delimiting:
//! an 8-byte big-endian length prefix followed by the payload). Both
//! shapes are carried as plain `Vec<u8>` at the API boundary; the
//! [`RecordShape`] only affects how a block's byte buffer is sliced
//! back into records after a bulk read.
//!
//! The algorithm mirrors [`crate::bitseq`]'s neighbor in spirit to the
//! teacher's own external-merge utility
//! (`webgraph::utils::sort_pairs::KMergeIters`): a bounded queue hands
//! freshly-read blocks to sorting threads, each of which writes one
//! sorted run to a temp file, and a final k-way merge driven by a
//! `dary_heap::QuaternaryHeap` produces the output in comparator order.

use crate::error::{Error, Result};
use crossbeam_channel::bounded;
use dary_heap::QuaternaryHeap;
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Whether records are fixed-width or length-prefixed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordShape {
    Fixed(usize),
    Variable,
}

/// A strict weak order over record bodies (not including any length
/// prefix, which is framing rather than payload).
pub trait Comparator: Fn(&[u8], &[u8]) -> Ordering + Send + Sync {}
impl<T: Fn(&[u8], &[u8]) -> Ordering + Send + Sync> Comparator for T {}

/// Parameters governing the block/sort/merge pipeline.
#[derive(Clone, Debug)]
pub struct SortConfig {
    /// Total RAM budget in bytes; split as `M / (T + 2)` per block so
    /// that one block per consumer thread, one queued and one loading
    /// can coexist without exceeding the budget.
    pub ram_budget_bytes: usize,
    pub num_threads: usize,
    /// Fan-in of each merge round.
    pub merge_fanin: usize,
    pub shape: RecordShape,
}

impl SortConfig {
    pub fn new(ram_budget_bytes: usize, num_threads: usize, shape: RecordShape) -> Self {
        SortConfig {
            ram_budget_bytes,
            num_threads: num_threads.max(1),
            merge_fanin: 8,
            shape,
        }
    }

    fn block_byte_budget(&self) -> usize {
        (self.ram_budget_bytes / (self.num_threads + 2)).max(4096)
    }
}

/// A block of records packed into one flat buffer plus offsets.
struct Block {
    bytes: Vec<u8>,
    /// Byte ranges `[start, end)` into `bytes`, one per record, in the
    /// order records were read (i.e. unsorted).
    ranges: Vec<(usize, usize)>,
}

impl Block {
    fn record(&self, i: usize) -> &[u8] {
        let (s, e) = self.ranges[i];
        &self.bytes[s..e]
    }

    fn len(&self) -> usize {
        self.ranges.len()
    }
}

/// Reads records off `source` (length-prefixed bodies, as produced by
/// [`write_record`]) until the running byte footprint would exceed
/// `budget`, or the source is exhausted. Returns `None` at end of
/// input with nothing read.
fn read_block(
    source: &mut impl Iterator<Item = io::Result<Vec<u8>>>,
    budget: usize,
) -> io::Result<Option<Block>> {
    let mut bytes = Vec::new();
    let mut ranges = Vec::new();
    let mut footprint = 0usize;
    for item in source.by_ref() {
        let rec = item?;
        let start = bytes.len();
        footprint += rec.len() + std::mem::size_of::<(usize, usize)>();
        bytes.extend_from_slice(&rec);
        ranges.push((start, bytes.len()));
        if footprint >= budget {
            break;
        }
    }
    if ranges.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Block { bytes, ranges }))
    }
}

use std::io;

/// Sorts one block's offset array under `cmp` (the byte buffer itself
/// is never permuted) and writes the permuted, length-prefixed records
/// to a fresh temp file, returning its path.
fn sort_and_spill(
    block: Block,
    cmp: &impl Comparator,
    shape: RecordShape,
    dir: &Path,
    tag: usize,
) -> Result<PathBuf> {
    let mut order: Vec<usize> = (0..block.len()).collect();
    order.sort_by(|&a, &b| cmp(block.record(a), block.record(b)));
    let path = dir.join(format!("run-{tag:08}.bin"));
    let file = File::create(&path).map_err(Error::Io)?;
    let mut w = BufWriter::new(file);
    for idx in order {
        write_record(&mut w, shape, block.record(idx)).map_err(Error::Io)?;
    }
    w.flush().map_err(Error::Io)?;
    Ok(path)
}

/// Writes one record in `shape`'s framing: fixed-size records are
/// written bare (the reader already knows `R`), variable-size records
/// get an 8-byte big-endian length prefix.
fn write_record(w: &mut impl Write, shape: RecordShape, rec: &[u8]) -> io::Result<()> {
    if let RecordShape::Variable = shape {
        w.write_all(&(rec.len() as u64).to_be_bytes())?;
    }
    w.write_all(rec)
}

fn read_record(r: &mut impl Read, shape: RecordShape) -> io::Result<Option<Vec<u8>>> {
    match shape {
        RecordShape::Fixed(size) => {
            let mut buf = vec![0u8; size];
            match r.read_exact(&mut buf) {
                Ok(()) => Ok(Some(buf)),
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
                Err(e) => Err(e),
            }
        }
        RecordShape::Variable => {
            let mut len_buf = [0u8; 8];
            match r.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e),
            }
            let len = u64::from_be_bytes(len_buf) as usize;
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf)?;
            Ok(Some(buf))
        }
    }
}

/// An open run file, positioned to yield records in the order they
/// were written (which, for a sorted run, is comparator order).
struct RunReader {
    reader: BufReader<File>,
    shape: RecordShape,
}

impl RunReader {
    fn open(path: &Path, shape: RecordShape) -> io::Result<Self> {
        Ok(RunReader { reader: BufReader::new(File::open(path)?), shape })
    }

    fn next_record(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_record(&mut self.reader, self.shape)
    }
}

/// Heap entry for the k-way merge: the current head record of one run
/// plus the run's index (used only to break ties deterministically by
/// run order, per spec's "ties broken by run order across merges").
struct HeapItem {
    head: Vec<u8>,
    run: usize,
}

struct MergeHeap<'a, C: Comparator> {
    cmp: &'a C,
}

impl<'a, C: Comparator> MergeHeap<'a, C> {
    fn order(&self, a: &HeapItem, b: &HeapItem) -> Ordering {
        // dary_heap is a max-heap; we want the smallest record on top,
        // so invert the comparator result (ties broken by run index).
        match (self.cmp)(&a.head, &b.head) {
            Ordering::Equal => b.run.cmp(&a.run),
            other => other.reverse(),
        }
    }
}

/// Merges up to `merge_fanin` sorted run files into one new sorted run
/// file, using a priority queue keyed by `cmp`.
fn merge_runs(
    paths: &[PathBuf],
    cmp: &impl Comparator,
    shape: RecordShape,
    dir: &Path,
    tag: usize,
) -> Result<PathBuf> {
    struct Wrapper<'a, C: Comparator> {
        item: HeapItem,
        heap_cmp: &'a MergeHeap<'a, C>,
    }
    impl<'a, C: Comparator> PartialEq for Wrapper<'a, C> {
        fn eq(&self, other: &Self) -> bool {
            self.heap_cmp.order(&self.item, &other.item) == Ordering::Equal
        }
    }
    impl<'a, C: Comparator> Eq for Wrapper<'a, C> {}
    impl<'a, C: Comparator> PartialOrd for Wrapper<'a, C> {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp_to(other))
        }
    }
    impl<'a, C: Comparator> Wrapper<'a, C> {
        fn cmp_to(&self, other: &Self) -> Ordering {
            self.heap_cmp.order(&self.item, &other.item)
        }
    }
    impl<'a, C: Comparator> Ord for Wrapper<'a, C> {
        fn cmp(&self, other: &Self) -> Ordering {
            self.cmp_to(other)
        }
    }

    let heap_cmp = MergeHeap { cmp };
    let mut readers: Vec<RunReader> = paths
        .iter()
        .map(|p| RunReader::open(p, shape).map_err(Error::Io))
        .collect::<Result<_>>()?;
    let mut heap: QuaternaryHeap<Wrapper<'_, _>> = QuaternaryHeap::with_capacity(readers.len());
    for (run, reader) in readers.iter_mut().enumerate() {
        if let Some(head) = reader.next_record().map_err(Error::Io)? {
            heap.push(Wrapper { item: HeapItem { head, run }, heap_cmp: &heap_cmp });
        }
    }

    let out_path = dir.join(format!("merge-{tag:08}.bin"));
    let out_file = File::create(&out_path).map_err(Error::Io)?;
    let mut w = BufWriter::new(out_file);
    while let Some(top) = heap.pop() {
        write_record(&mut w, shape, &top.item.head).map_err(Error::Io)?;
        if let Some(next) = readers[top.item.run].next_record().map_err(Error::Io)? {
            heap.push(Wrapper {
                item: HeapItem { head: next, run: top.item.run },
                heap_cmp: &heap_cmp,
            });
        }
    }
    w.flush().map_err(Error::Io)?;
    for p in paths {
        let _ = std::fs::remove_file(p);
    }
    Ok(out_path)
}

/// Sorts `records` externally under `cmp`, spilling intermediate runs
/// into `temp_dir`, and returns the path to one final sorted run file.
///
/// On any I/O error, every temp file created so far by this call is
/// removed before the error propagates (spec §4.2's failure model).
pub fn external_sort(
    records: impl Iterator<Item = io::Result<Vec<u8>>>,
    cmp: impl Comparator,
    config: &SortConfig,
    temp_dir: &Path,
) -> Result<PathBuf> {
    let mut records = records;
    let budget = config.block_byte_budget();
    let mut run_paths = Vec::new();
    let mut tag = 0usize;

    let result = (|| -> Result<Vec<PathBuf>> {
        loop {
            let block = read_block(&mut records, budget).map_err(Error::Io)?;
            let Some(block) = block else { break };
            log::debug!("sort: block of {} records spilled", block.len());
            let path = sort_and_spill(block, &cmp, config.shape, temp_dir, tag)?;
            run_paths.push(path);
            tag += 1;
        }
        Ok(run_paths.clone())
    })();

    let mut run_paths = match result {
        Ok(paths) => paths,
        Err(e) => {
            for p in &run_paths {
                let _ = std::fs::remove_file(p);
            }
            return Err(e);
        }
    };

    if run_paths.is_empty() {
        let path = temp_dir.join(format!("merge-{tag:08}.bin"));
        File::create(&path).map_err(Error::Io)?;
        return Ok(path);
    }

    let mut merge_tag = tag;
    while run_paths.len() > 1 {
        let mut next_round = Vec::new();
        for chunk in run_paths.chunks(config.merge_fanin) {
            match merge_runs(chunk, &cmp, config.shape, temp_dir, merge_tag) {
                Ok(p) => next_round.push(p),
                Err(e) => {
                    for p in &run_paths {
                        let _ = std::fs::remove_file(p);
                    }
                    for p in &next_round {
                        let _ = std::fs::remove_file(p);
                    }
                    return Err(e);
                }
            }
            merge_tag += 1;
        }
        run_paths = next_round;
        log::debug!("sort: merge round produced {} run(s)", run_paths.len());
    }
    Ok(run_paths.into_iter().next().unwrap())
}

/// Iterates the length-prefixed records of a finished sorted run file.
pub struct SortedRunIter {
    reader: RunReader,
}

impl SortedRunIter {
    pub fn open(path: &Path, shape: RecordShape) -> Result<Self> {
        Ok(SortedRunIter { reader: RunReader::open(path, shape).map_err(Error::Io)? })
    }
}

impl Iterator for SortedRunIter {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.next_record() {
            Ok(Some(rec)) => Some(Ok(rec)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Drives the block phase concurrently: `num_threads` worker threads
/// pull blocks off a bounded (effectively single-slot) channel and
/// each spills its own sorted run. This is the parallel counterpart to
/// calling [`external_sort`] directly, used when the caller already
/// has the full iterator of records available up front and wants the
/// block+sort phase to overlap across threads (merge is still
/// sequential, as merge I/O is typically the bottleneck anyway).
pub fn external_sort_parallel(
    records: Vec<Vec<u8>>,
    cmp: impl Comparator + 'static,
    config: &SortConfig,
    temp_dir: &Path,
) -> Result<PathBuf> {
    let budget = config.block_byte_budget();
    let cmp = Arc::new(cmp);
    let (tx, rx) = bounded::<Block>(1);
    let mut iter = records.into_iter().map(Ok::<_, io::Error>);
    let producer_budget = budget;
    let temp_dir_owned = temp_dir.to_path_buf();

    let run_paths: Result<Vec<PathBuf>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..config.num_threads)
            .map(|worker| {
                let rx = rx.clone();
                let cmp = Arc::clone(&cmp);
                let dir = temp_dir_owned.clone();
                scope.spawn(move || -> Result<Vec<PathBuf>> {
                    let mut paths = Vec::new();
                    let mut tag = worker * 1_000_000;
                    while let Ok(block) = rx.recv() {
                        let path = sort_and_spill(block, cmp.as_ref(), config.shape, &dir, tag)?;
                        paths.push(path);
                        tag += 1;
                    }
                    Ok(paths)
                })
            })
            .collect();

        loop {
            match read_block(&mut iter, producer_budget) {
                Ok(Some(block)) => {
                    if tx.send(block).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    drop(tx);
                    for h in handles {
                        let _ = h.join();
                    }
                    return Err(Error::Io(e));
                }
            }
        }
        drop(tx);

        let mut all_paths = Vec::new();
        for h in handles {
            match h.join() {
                Ok(Ok(paths)) => all_paths.extend(paths),
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(Error::invariant("sort worker thread panicked")),
            }
        }
        Ok(all_paths)
    });

    let mut run_paths = run_paths?;
    if run_paths.is_empty() {
        let path = temp_dir.join("merge-empty.bin");
        File::create(&path).map_err(Error::Io)?;
        return Ok(path);
    }

    let mut merge_tag = usize::MAX / 2;
    while run_paths.len() > 1 {
        let mut next_round = Vec::new();
        for chunk in run_paths.chunks(config.merge_fanin) {
            next_round.push(merge_runs(chunk, cmp.as_ref(), config.shape, temp_dir, merge_tag)?);
            merge_tag += 1;
        }
        run_paths = next_round;
    }
    Ok(run_paths.into_iter().next().unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering as Ord_;

    fn byte_cmp(a: &[u8], b: &[u8]) -> Ord_ {
        a.cmp(b)
    }

    #[test]
    fn sorts_small_input_in_one_block() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<io::Result<Vec<u8>>> = vec![
            Ok(b"banana".to_vec()),
            Ok(b"apple".to_vec()),
            Ok(b"cherry".to_vec()),
        ];
        let config = SortConfig::new(1 << 20, 1, RecordShape::Variable);
        let path = external_sort(records.into_iter(), byte_cmp, &config, dir.path()).unwrap();
        let out: Vec<Vec<u8>> = SortedRunIter::open(&path, config.shape)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(out, vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]);
    }

    #[test]
    fn forces_multiple_blocks_and_merge_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut values: Vec<u32> = (0..500).rev().collect();
        let records: Vec<io::Result<Vec<u8>>> = values
            .drain(..)
            .map(|v| Ok(v.to_be_bytes().to_vec()))
            .collect();
        let mut config = SortConfig::new(2048, 1, RecordShape::Fixed(4));
        config.merge_fanin = 3;
        let path = external_sort(records.into_iter(), byte_cmp, &config, dir.path()).unwrap();
        let out: Vec<Vec<u8>> = SortedRunIter::open(&path, config.shape)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        let decoded: Vec<u32> = out
            .iter()
            .map(|b| u32::from_be_bytes(b[..4].try_into().unwrap()))
            .collect();
        let mut expected: Vec<u32> = (0..500).collect();
        expected.sort();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn empty_input_yields_empty_run() {
        let dir = tempfile::tempdir().unwrap();
        let records: Vec<io::Result<Vec<u8>>> = vec![];
        let config = SortConfig::new(1 << 20, 2, RecordShape::Variable);
        let path = external_sort(records.into_iter(), byte_cmp, &config, dir.path()).unwrap();
        let out: Vec<Vec<u8>> = SortedRunIter::open(&path, config.shape)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn parallel_variant_matches_sequential_result() {
        let dir = tempfile::tempdir().unwrap();
        let values: Vec<u32> = vec![9, 3, 7, 1, 8, 2, 6, 4, 5, 0];
        let records: Vec<Vec<u8>> = values.iter().map(|v| v.to_be_bytes().to_vec()).collect();
        let config = SortConfig::new(1 << 20, 4, RecordShape::Fixed(4));
        let path = external_sort_parallel(records, byte_cmp, &config, dir.path()).unwrap();
        let out: Vec<Vec<u8>> = SortedRunIter::open(&path, config.shape)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        let decoded: Vec<u32> = out
            .iter()
            .map(|b| u32::from_be_bytes(b[..4].try_into().unwrap()))
            .collect();
        assert_eq!(decoded, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }
}
