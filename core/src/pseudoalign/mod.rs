/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Parallel pseudoalignment pipeline: dispatcher (C9), worker (C10),
//! ordered output writer (C11), and the [`run`] entry point that wires
//! them together the way `examples/original_source/src/pseudoalign.cpp`'s
//! `call_pseudoalignment` does.

pub mod dispatcher;
pub mod worker;
pub mod writer;

pub use dispatcher::{produce_batches, ByteLoadQueue, ReadBatch};
pub use worker::{align_read, AlignConfig, AlignResult, CombineMode};
pub use writer::{AuxInfoWriter, OutputWriter};

use crate::colors::{ColorSetStore, CoreKmerMap};
use crate::error::Result;
use crate::io::SequenceSource;
use crate::sbwt::Sbwt;
use std::sync::Arc;

/// Everything a pseudoalignment run needs read-only access to, shared
/// across worker threads (spec §5, "The SBWT and color-set store are
/// read-only at query time and freely shared").
pub struct PseudoalignContext {
    pub sbwt: Sbwt,
    pub core_map: CoreKmerMap,
    pub store: ColorSetStore,
}

/// Runs one query file end to end: spawns the producer and `n_threads`
/// worker threads over [`ByteLoadQueue`], each writing through `writer`
/// (spec §4.9-§4.11), then joins everyone and applies the optional
/// sort-by-read-id pass.
#[allow(clippy::too_many_arguments)]
pub fn run(
    ctx: Arc<PseudoalignContext>,
    source: Box<dyn SequenceSource>,
    writer: Arc<dyn OutputWriter>,
    aux_writer: Option<Arc<AuxInfoWriter>>,
    config: AlignConfig,
    n_threads: usize,
    buffer_size: usize,
    sort_output_lines: bool,
    temp_dir: &std::path::Path,
    output_path: Option<&std::path::Path>,
) -> Result<()> {
    let queue = ByteLoadQueue::new((buffer_size * 4).max(1) as i64);

    let producer_queue = Arc::clone(&queue);
    let producer = std::thread::spawn(move || produce_batches(source, buffer_size, &producer_queue));

    let mut handles = Vec::with_capacity(n_threads.max(1));
    for _ in 0..n_threads.max(1) {
        let queue = Arc::clone(&queue);
        let ctx = Arc::clone(&ctx);
        let writer = Arc::clone(&writer);
        let aux_writer = aux_writer.clone();
        handles.push(std::thread::spawn(move || -> Result<()> {
            loop {
                let batch = queue.pop();
                if batch.is_end_of_stream() {
                    queue.push(batch);
                    break;
                }
                for i in 0..batch.n_reads() {
                    let read_id = batch.first_read_id + i as u64;
                    let result = align_read(&ctx.sbwt, &ctx.core_map, &ctx.store, batch.read(i), &config);
                    writer.write_line(read_id, &result.colors)?;
                    if let Some(aux) = &aux_writer {
                        aux.write_line(read_id, result.relevant_kmers, result.total_kmers)?;
                    }
                }
            }
            Ok(())
        }));
    }

    producer.join().expect("producer thread panicked")?;
    for h in handles {
        h.join().expect("worker thread panicked")?;
    }
    writer.finish()?;
    if let Some(aux) = &aux_writer {
        aux.finish()?;
    }

    if sort_output_lines {
        let path = output_path.expect("sort_output_lines requires a concrete output file, not stdout");
        writer::sort_output_lines_by_read_id(path, temp_dir)?;
    }
    Ok(())
}
