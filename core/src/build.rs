/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Build pipeline: wires C1-C8 together into one call from a list of
//! sequence files (and their colors) to a finished [`crate::index::ThemistoIndex`].
//!
//! Grounded in `examples/original_source/include/Themisto.hh`'s
//! `Themisto::construct`, which performs the same two passes this
//! module does: first the k-mer stream feeds the BOSS/SBWT build
//! (`construct_boss`), then a second pass over the same sequences
//! walks the finished SBWT to emit `(node, color)` pairs for the
//! color-set map.

use crate::boss::build_edge_set;
use crate::colors::{build_node_map, CoreKmerMap, ColorSetStore, DEFAULT_SAMPLING_DISTANCE};
use crate::error::{Error, Result};
use crate::index::ThemistoIndex;
use crate::io::SequenceSource;
use crate::kmer::Kmer;
use crate::sbwt::Sbwt;
use crate::sort::SortConfig;
use std::collections::HashSet;
use std::path::Path;

/// One input sequence file plus the color assigned to every sequence
/// it contains (spec §6: "color i is assigned to sequence i" when no
/// explicit color file is given, or a file-wide color under
/// `--file-colors`).
pub struct InputFile {
    pub path: std::path::PathBuf,
    /// `None` means "assign colors by running sequence index" (the
    /// default, one color per sequence); `Some` overrides every
    /// sequence in this file with one shared color (`--file-colors`).
    pub fixed_color: Option<u32>,
}

pub struct BuildOptions {
    pub k: usize,
    pub reverse_complements: bool,
    pub sampling_distance: usize,
    pub sort_config: SortConfig,
}

impl BuildOptions {
    pub fn new(k: usize, sort_config: SortConfig) -> Self {
        BuildOptions { k, reverse_complements: false, sampling_distance: DEFAULT_SAMPLING_DISTANCE, sort_config }
    }
}

fn sliding_kmers(seq: &[u8], len: usize) -> impl Iterator<Item = Kmer> + '_ {
    let n = if seq.len() >= len { seq.len() - len + 1 } else { 0 };
    (0..n).map(move |i| Kmer::from_ascii(&seq[i..i + len]))
}

/// Reads every sequence from `files` once, normalizing bases and
/// (optionally) emitting the reverse complement alongside the forward
/// strand, so both strands are represented in the BOSS graph when
/// `reverse_complements` is set (spec's `--reverse-complements` build
/// flag, as `Themisto::construct` does via `SeqIO::create_reverse_complement_files`).
fn for_each_sequence(
    files: &[InputFile],
    per_sequence_colors: Option<&[u32]>,
    reverse_complements: bool,
    mut visit: impl FnMut(u32, &[u8]),
) -> Result<()> {
    let mut seq_index = 0usize;
    for input in files {
        let mut reader = crate::io::open_reader(&input.path)?;
        while let Some(mut record) = reader.next_record()? {
            crate::io::normalize_bases(&mut record.seq);
            let color = input
                .fixed_color
                .or_else(|| per_sequence_colors.map(|c| c[seq_index]))
                .unwrap_or(seq_index as u32);
            visit(color, &record.seq);
            if reverse_complements {
                let rc = crate::kmer::reverse_complement(&record.seq);
                visit(color, &rc);
            }
            seq_index += 1;
        }
    }
    Ok(())
}

/// Pass 1: collects every (k+1)-mer across `files` and builds the
/// SBWT/BOSS from scratch.
fn build_sbwt(files: &[InputFile], per_sequence_colors: Option<&[u32]>, options: &BuildOptions, temp_dir: &Path) -> Result<Sbwt> {
    let k = options.k;
    log::info!("build: pass 1, collecting (k+1)-mers from {} file(s)", files.len());

    let mut all_kmers: Vec<Kmer> = Vec::new();
    for_each_sequence(files, per_sequence_colors, options.reverse_complements, |_color, seq| {
        all_kmers.extend(sliding_kmers(seq, k + 1));
    })?;

    if all_kmers.is_empty() {
        return Err(Error::malformed(
            None::<std::path::PathBuf>,
            "no (k+1)-mers could be extracted: every input sequence is shorter than k+1",
        ));
    }

    let boss = build_edge_set(k, all_kmers.into_iter(), &options.sort_config, temp_dir)?;
    log::info!("build: SBWT has {} nodes", boss.nodes.len());
    Sbwt::from_boss(&boss)
}

/// Pass 2: re-walks every sequence through an already-built `sbwt` to
/// produce the node-to-color-set map and color-set store. Shared by
/// [`build_index`] and [`build_colors_for_existing_sbwt`] (the
/// `--load-dbg` path, spec §6).
fn build_colors(sbwt: Sbwt, files: &[InputFile], per_sequence_colors: Option<&[u32]>, options: &BuildOptions, temp_dir: &Path) -> Result<ThemistoIndex> {
    let k = sbwt.k();
    log::info!("build: pass 2, mapping sequences to color-set node ranges");
    let mut pairs: Vec<(u64, u32)> = Vec::new();
    let mut sequence_ends: HashSet<u64> = HashSet::new();
    for_each_sequence(files, per_sequence_colors, options.reverse_complements, |color, seq| {
        if seq.len() < k {
            return;
        }
        let n = seq.len() - k + 1;
        for i in 0..n {
            if let Some(node) = sbwt.find_kmer(&seq[i..i + k]) {
                pairs.push((node as u64, color));
                if i == n - 1 {
                    sequence_ends.insert(node as u64);
                }
            }
        }
    })?;

    let (core_map, store): (CoreKmerMap, ColorSetStore) = build_node_map(
        &sbwt,
        pairs.into_iter(),
        &sequence_ends,
        options.sampling_distance,
        &options.sort_config,
        temp_dir,
    )?;

    Ok(ThemistoIndex { sbwt, core_map, store })
}

/// Builds a complete index from `files`: both passes, from scratch.
pub fn build_index(
    files: &[InputFile],
    per_sequence_colors: Option<&[u32]>,
    options: &BuildOptions,
    temp_dir: &Path,
) -> Result<ThemistoIndex> {
    let sbwt = build_sbwt(files, per_sequence_colors, options, temp_dir)?;
    build_colors(sbwt, files, per_sequence_colors, options, temp_dir)
}

/// `--load-dbg`: skips pass 1 entirely and builds the color-set map
/// against an SBWT loaded from a previous build's `prefix.tdbg`.
pub fn build_colors_for_existing_sbwt(
    sbwt: Sbwt,
    files: &[InputFile],
    per_sequence_colors: Option<&[u32]>,
    options: &BuildOptions,
    temp_dir: &Path,
) -> Result<ThemistoIndex> {
    build_colors(sbwt, files, per_sequence_colors, options, temp_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::RecordShape;
    use std::io::Write;

    fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for (header, seq) in records {
            writeln!(f, ">{header}\n{seq}").unwrap();
        }
        path
    }

    #[test]
    fn builds_index_with_default_one_color_per_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), "seqs.fasta", &[("r0", "ACGTACGT"), ("r1", "TTTTGGGG")]);
        let files = vec![InputFile { path, fixed_color: None }];
        let sort_config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        let options = BuildOptions::new(3, sort_config);
        let index = build_index(&files, None, &options, dir.path()).unwrap();

        assert_eq!(index.sbwt.k(), 3);
        let node = index.sbwt.find_kmer(b"ACG").unwrap();
        let id = index.core_map.color_set_id(&index.sbwt, node);
        assert_eq!(index.store.get(id).to_vec(), vec![0u32]);

        let node = index.sbwt.find_kmer(b"TTT").unwrap();
        let id = index.core_map.color_set_id(&index.sbwt, node);
        assert_eq!(index.store.get(id).to_vec(), vec![1u32]);
    }

    #[test]
    fn rejects_input_with_no_extractable_kmers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fasta(dir.path(), "seqs.fasta", &[("short", "AC")]);
        let files = vec![InputFile { path, fixed_color: None }];
        let sort_config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        let options = BuildOptions::new(3, sort_config);
        assert!(build_index(&files, None, &options, dir.path()).is_err());
    }
}
