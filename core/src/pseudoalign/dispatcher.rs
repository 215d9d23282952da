/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parallel dispatcher (C9): a single producer thread slices a
//! [`SequenceSource`] into byte-bounded read batches and pushes them on
//! a byte-load-gated bounded queue for worker threads to drain.
//!
//! Grounded in `examples/original_source/ParallelBoundedQueue.hh`'s
//! condvar-gated byte-load queue; `crossbeam-channel` supplies the
//! blocking send/receive machinery, with an explicit `AtomicI64` load
//! counter reproducing the original's byte-load admission control
//! (count-based channel capacity alone would not match spec §4.9,
//! which gates on total queued bytes, not item count).

use crate::io::SequenceSource;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

/// A slice of consecutive reads packed into one contiguous buffer.
/// `read_starts` has one more entry than there are reads: the final
/// entry is a sentinel equal to `data.len()`.
#[derive(Clone)]
pub struct ReadBatch {
    pub first_read_id: u64,
    pub data: Vec<u8>,
    pub read_starts: Vec<u64>,
}

impl ReadBatch {
    fn empty() -> Self {
        ReadBatch { first_read_id: 0, data: Vec::new(), read_starts: vec![0] }
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.data.is_empty() && self.read_starts.len() <= 1
    }

    pub fn n_reads(&self) -> usize {
        self.read_starts.len().saturating_sub(1)
    }

    pub fn read(&self, i: usize) -> &[u8] {
        let start = self.read_starts[i] as usize;
        let end = self.read_starts[i + 1] as usize;
        &self.data[start..end]
    }

    fn byte_load(&self) -> i64 {
        self.data.len() as i64
    }
}

/// A bounded queue whose admission is governed by the summed byte
/// footprint of queued batches rather than their count (spec §4.9,
/// §5 "Suspension points").
pub struct ByteLoadQueue {
    inner: crossbeam_channel::Sender<ReadBatch>,
    receiver: crossbeam_channel::Receiver<ReadBatch>,
    load: AtomicI64,
    max_load: i64,
    not_full: Condvar,
    gate: Mutex<()>,
}

impl ByteLoadQueue {
    pub fn new(max_load: i64) -> Arc<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Arc::new(ByteLoadQueue {
            inner: tx,
            receiver: rx,
            load: AtomicI64::new(0),
            max_load,
            not_full: Condvar::new(),
            gate: Mutex::new(()),
        })
    }

    /// Blocks the caller while the queue's current byte load is at or
    /// above `max_load`, then enqueues `batch`.
    pub fn push(&self, batch: ReadBatch) {
        let load = batch.byte_load();
        let mut guard = self.gate.lock().unwrap();
        while {
            let current = self.load.load(Ordering::SeqCst);
            current > 0 && current >= self.max_load
        } {
            guard = self.not_full.wait(guard).unwrap();
        }
        drop(guard);
        self.load.fetch_add(load, Ordering::SeqCst);
        self.inner.send(batch).expect("dispatcher queue receiver dropped before producer finished");
    }

    /// Blocks until a batch is available (native `crossbeam-channel`
    /// blocking receive), then releases its byte load back to the
    /// queue and wakes any blocked producer.
    pub fn pop(&self) -> ReadBatch {
        let batch = self.receiver.recv().expect("dispatcher queue sender dropped before consumers finished");
        self.load.fetch_sub(batch.byte_load(), Ordering::SeqCst);
        let _guard = self.gate.lock().unwrap();
        self.not_full.notify_all();
        batch
    }
}

/// Drains `source` into batches no larger than `buffer_size` bytes and
/// pushes them on `queue`, followed by one zero-size end-of-stream
/// batch. Runs on the calling thread — callers spawn it as the single
/// producer thread (spec §4.9).
pub fn produce_batches(
    mut source: Box<dyn SequenceSource>,
    buffer_size: usize,
    queue: &ByteLoadQueue,
) -> crate::error::Result<()> {
    let mut next_read_id = 0u64;
    loop {
        let mut data = Vec::new();
        let mut read_starts = vec![0u64];
        let batch_first_id = next_read_id;
        while data.len() < buffer_size {
            match source.next_record()? {
                Some(mut record) => {
                    crate::io::normalize_bases(&mut record.seq);
                    data.extend_from_slice(&record.seq);
                    read_starts.push(data.len() as u64);
                    next_read_id += 1;
                }
                None => break,
            }
        }
        if read_starts.len() > 1 {
            queue.push(ReadBatch { first_read_id: batch_first_id, data, read_starts });
        } else {
            break;
        }
    }
    queue.push(ReadBatch::empty());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource {
        records: std::vec::IntoIter<Vec<u8>>,
    }

    impl SequenceSource for VecSource {
        fn next_record(&mut self) -> crate::error::Result<Option<crate::io::Record>> {
            Ok(self.records.next().map(|seq| crate::io::Record { seq }))
        }
    }

    #[test]
    fn batches_respect_byte_budget_and_terminate_with_sentinel() {
        let source = VecSource { records: vec![b"ACGTACGT".to_vec(), b"TTTT".to_vec(), b"GGGG".to_vec()].into_iter() };
        let queue = ByteLoadQueue::new(1 << 20);
        produce_batches(Box::new(source), 10, &queue).unwrap();

        let b1 = queue.pop();
        assert!(!b1.is_end_of_stream());
        assert_eq!(b1.n_reads(), 2);
        assert_eq!(b1.read(0), b"ACGTACGT");
        assert_eq!(b1.read(1), b"TTTT");

        let b2 = queue.pop();
        assert!(!b2.is_end_of_stream());
        assert_eq!(b2.n_reads(), 1);
        assert_eq!(b2.read(0), b"GGGG");

        let sentinel = queue.pop();
        assert!(sentinel.is_end_of_stream());
    }
}
