/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Build-then-pseudoalign scenarios driven through the real file-based
//! pipeline (`build::build_index` and `pseudoalign::run`), rather than
//! the in-memory helpers the unit tests under `core/src` use.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use themisto_core::build::{build_index, BuildOptions, InputFile};
use themisto_core::index::ThemistoIndex;
use themisto_core::io::{open_reader, read_per_sequence_colors};
use themisto_core::kmer::Kmer;
use themisto_core::pseudoalign::writer::{AuxInfoWriter, RawFileWriter};
use themisto_core::pseudoalign::{run, AlignConfig, CombineMode, PseudoalignContext};
use themisto_core::sort::{RecordShape, SortConfig};

fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for (header, seq) in records {
        writeln!(f, ">{header}\n{seq}").unwrap();
    }
    path
}

fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{line}").unwrap();
    }
    path
}

fn sort_config() -> SortConfig {
    SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1))
}

fn build(files: &[InputFile], per_sequence_colors: Option<&[u32]>, k: usize, reverse_complements: bool, dir: &Path) -> ThemistoIndex {
    let mut options = BuildOptions::new(k, sort_config());
    options.reverse_complements = reverse_complements;
    build_index(files, per_sequence_colors, &options, dir).unwrap()
}

fn intersection_config() -> AlignConfig {
    AlignConfig {
        mode: CombineMode::Intersection,
        reverse_complements: false,
        ignore_unknown_kmers: true,
        relevant_kmers_fraction: 0.0,
        sort_hits: true,
    }
}

/// Runs `index` against every record in `query_path`, `n_threads`
/// workers at a time, and returns the output lines in file order.
fn run_query_with(index: ThemistoIndex, query_path: &Path, config: AlignConfig, n_threads: usize, sort_output_lines: bool, dir: &Path) -> Vec<String> {
    let ctx = Arc::new(PseudoalignContext { sbwt: index.sbwt, core_map: index.core_map, store: index.store });
    let out_path = dir.join("out.txt");
    let source = open_reader(query_path).unwrap();
    let writer = Arc::new(RawFileWriter::create(&out_path).unwrap());
    run(ctx, source, writer, None, config, n_threads, 1 << 16, sort_output_lines, dir, Some(&out_path)).unwrap();
    std::fs::read_to_string(&out_path).unwrap().lines().map(str::to_string).collect()
}

fn run_query(index: ThemistoIndex, query_path: &Path, config: AlignConfig, dir: &Path) -> Vec<String> {
    run_query_with(index, query_path, config, 1, false, dir)
}

// spec.md §8 scenario 1: one input sequence, one color, exact-match
// query resolves to that color.
#[test]
fn single_sequence_single_color_reports_that_color() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "ACGTACGTAC")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "ACGTACGTAC")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0 0"]);
}

// spec.md §8 scenario 2: no color file means color i is assigned to
// the i-th input sequence.
#[test]
fn sequence_index_is_the_default_color_when_no_color_file_is_given() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AACCGGTTA"), ("s1", "ACGTACGTG"), ("s2", "ATATGACATG")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AACCGGT")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0 0"]);
}

// spec.md §8 scenario 3: an explicit color file overrides the
// by-index default, and a reverse-complement copy built with
// --reverse-complements shares its forward strand's color.
#[test]
fn explicit_color_file_is_shared_by_the_reverse_complement_strand() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AACCGGTTA"), ("s1", "ACGTACGTG"), ("s2", "ATATGACATG")]);
    let colors_file = write_lines(dir.path(), "colors.txt", &["3", "1", "2"]);
    let colors = read_per_sequence_colors(&colors_file).unwrap();
    let index = build(&[InputFile { path: seqs, fixed_color: None }], Some(&colors), 6, true, dir.path());

    // Reverse complement of "AACCGGTTA".
    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "TAACCGGTT")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0 3"]);
}

// spec.md §8 scenario 4: threshold mode's ">=" tie-break includes a
// color whose count sits exactly at the fraction boundary.
#[test]
fn threshold_mode_includes_a_color_exactly_at_the_fraction_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AAAAA"), ("s1", "AAAAT")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 4, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AAAAT")]);
    let config = AlignConfig {
        mode: CombineMode::Threshold { fraction: 0.5 },
        reverse_complements: false,
        ignore_unknown_kmers: true,
        relevant_kmers_fraction: 0.0,
        sort_hits: false,
    };
    let lines = run_query(index, &query, config, dir.path());

    // "AAAA" is shared by both sequences (count 1 of 2, exactly 0.5);
    // "AAAT" belongs to s1 alone (count 2 of 2).
    assert_eq!(lines, vec!["0 0 1"]);
}

// spec.md §8 scenario 5: intersecting across k-mers from disjoint
// colors leaves nothing, reported as an id-only line.
#[test]
fn intersection_across_disjoint_colors_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AAAACCCC"), ("s1", "GGGGTTTT")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 4, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AAAACGGGG")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0"]);
}

// spec.md §8 scenario 6: --sort-hits reports color ids in ascending
// order regardless of the colors' insertion order.
#[test]
fn sort_hits_returns_colors_in_ascending_order() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "GGAAAAAAGG"), ("s1", "CCAAAAAACC"), ("s2", "TTAAAAAATT")]);
    let colors_file = write_lines(dir.path(), "colors.txt", &["2", "0", "1"]);
    let colors = read_per_sequence_colors(&colors_file).unwrap();
    let index = build(&[InputFile { path: seqs, fixed_color: None }], Some(&colors), 6, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AAAAAA")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0 0 1 2"]);
}

// Boundary: a read shorter than k has no k-mers at all, so it is
// reported with no colors rather than being rejected.
#[test]
fn read_shorter_than_k_reports_no_colors() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "ACGTACGTAC")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "ACG")]);
    let lines = run_query(index, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0"]);
}

// Boundary: --relevant-kmers-fraction gates a read out entirely when
// too few of its k-mers resolved to any color at all.
#[test]
fn relevant_kmers_fraction_gate_suppresses_low_coverage_reads() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AAAACCCC")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 4, false, dir.path());

    // Only the leading "AAAA" window resolves; the rest of the read
    // is unrelated sequence, so relevant/total is well under 0.5.
    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AAAAGGGGGGGG")]);
    let config = AlignConfig {
        mode: CombineMode::Threshold { fraction: 0.0 },
        reverse_complements: false,
        ignore_unknown_kmers: true,
        relevant_kmers_fraction: 0.5,
        sort_hits: true,
    };
    let lines = run_query(index, &query, config, dir.path());

    assert_eq!(lines, vec!["0"]);
}

// The auxiliary info file reports relevant/total k-mer counts per
// read, independent of the color-hit output file.
#[test]
fn auxiliary_info_file_reports_relevant_and_total_kmer_counts() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "ACGTACGTAC")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());
    let ctx = Arc::new(PseudoalignContext { sbwt: index.sbwt, core_map: index.core_map, store: index.store });

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "ACGTACGTAC")]);
    let out_path = dir.path().join("out.txt");
    let aux_path = dir.path().join("aux.txt");
    let source = open_reader(&query).unwrap();
    let writer = Arc::new(RawFileWriter::create(&out_path).unwrap());
    let aux = Arc::new(AuxInfoWriter::create(&aux_path).unwrap());
    run(ctx, source, writer, Some(aux), intersection_config(), 1, 1 << 16, false, dir.path(), Some(&out_path)).unwrap();

    assert_eq!(std::fs::read_to_string(&aux_path).unwrap(), "0 5 5\n");
}

// --sort-output-lines restores ascending read-id order across many
// reads even when several worker threads race to write them.
#[test]
fn sort_output_lines_restores_ascending_read_id_order_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "ACGTACGTACGTACGT")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());

    let headers: Vec<String> = (0..20).map(|i| format!("r{i}")).collect();
    let records: Vec<(&str, &str)> = headers.iter().map(|h| (h.as_str(), "ACGTACGTACGTACGT")).collect();
    let query = write_fasta(dir.path(), "query.fasta", &records);

    let lines = run_query_with(index, &query, intersection_config(), 4, true, dir.path());

    assert_eq!(lines.len(), 20);
    for (i, line) in lines.iter().enumerate() {
        let leading: u64 = line.split_whitespace().next().unwrap().parse().unwrap();
        assert_eq!(leading, i as u64);
    }
}

// Round trip: saving and reloading an index from disk answers queries
// identically to the freshly built one.
#[test]
fn saved_and_reloaded_index_answers_queries_identically() {
    let dir = tempfile::tempdir().unwrap();
    let seqs = write_fasta(dir.path(), "seqs.fasta", &[("s0", "AACCGGTTA"), ("s1", "ACGTACGTG")]);
    let index = build(&[InputFile { path: seqs, fixed_color: None }], None, 6, false, dir.path());

    let prefix = dir.path().join("idx");
    index.save(&prefix).unwrap();
    let reloaded = ThemistoIndex::load(&prefix).unwrap();

    let query = write_fasta(dir.path(), "query.fasta", &[("q0", "AACCGGT")]);
    let lines = run_query(reloaded, &query, intersection_config(), dir.path());

    assert_eq!(lines, vec!["0 0"]);
}
