/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Edge-set builder (C3): turns a stream of `(k+1)`-mers into the
//! sorted, dummy-padded node set that [`crate::sbwt`] compresses into
//! a Wheeler graph.
//!
//! Grounded in `examples/original_source/BOSS_builder.hh`, reworked
//! around this crate's own [`crate::sort::external_sort`] rather than
//! the original's `EM_sort.hh` driver.

use crate::error::{Error, Result};
use crate::kmer::Kmer;
use crate::sort::{external_sort, RecordShape, SortConfig, SortedRunIter};
use std::io;
use std::path::Path;

/// Per-node incoming/outgoing edge labels, packed into one byte: bits
/// 0-3 are incoming labels (one per character of Σ, in `A,C,G,T`
/// order), bits 4-7 are outgoing labels. A node whose length is less
/// than `k` is a dummy/padding node; for such nodes bit 0 (the "A"
/// incoming slot) doubles as the source-side `$` marker rather than a
/// real incoming `A` edge, exactly as spec §3 describes — the two
/// meanings are distinguished by the node's stored length, not by a
/// separate field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Edgeset(pub u8);

impl Edgeset {
    pub const EMPTY: Edgeset = Edgeset(0);

    pub fn with_out(c: u8) -> Self {
        Edgeset(1 << (4 + c))
    }

    pub fn with_in(c: u8) -> Self {
        Edgeset(1 << c)
    }

    pub fn or(self, other: Edgeset) -> Edgeset {
        Edgeset(self.0 | other.0)
    }

    pub fn has_out(self, c: u8) -> bool {
        self.0 & (1 << (4 + c)) != 0
    }

    pub fn has_in(self, c: u8) -> bool {
        self.0 & (1 << c) != 0
    }

    pub fn outdegree(self) -> u32 {
        (self.0 >> 4).count_ones()
    }

    pub fn indegree(self) -> u32 {
        (self.0 & 0x0F).count_ones()
    }

    /// Outgoing characters in ascending code order (required for
    /// Wheeler ordering of `L`).
    pub fn out_chars(self) -> impl Iterator<Item = u8> {
        (0..4).filter(move |&c| self.has_out(c))
    }
}

const RECORD_LEN: usize = crate::kmer::Kmer::SERIALIZED_SIZE + 1;

fn encode_record(kmer: &Kmer, edges: Edgeset) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_LEN);
    buf.extend_from_slice(&kmer.to_bytes());
    buf.push(edges.0);
    buf
}

fn decode_record(bytes: &[u8]) -> (Kmer, Edgeset) {
    let kmer = Kmer::from_bytes(&bytes[..Kmer::SERIALIZED_SIZE]);
    (kmer, Edgeset(bytes[Kmer::SERIALIZED_SIZE]))
}

fn kmer_record_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    let ka = Kmer::from_bytes(&a[..Kmer::SERIALIZED_SIZE]);
    let kb = Kmer::from_bytes(&b[..Kmer::SERIALIZED_SIZE]);
    ka.cmp(&kb)
}

/// Collapses consecutive equal-kmer records (the input must already be
/// colex-sorted by kmer) by OR-ing their edge-set bytes together.
fn collapse_sorted(iter: SortedRunIter) -> Result<Vec<(Kmer, Edgeset)>> {
    let mut out: Vec<(Kmer, Edgeset)> = Vec::new();
    for item in iter {
        let bytes = item.map_err(Error::Io)?;
        let (kmer, edges) = decode_record(&bytes);
        match out.last_mut() {
            Some((last_kmer, last_edges)) if *last_kmer == kmer => {
                *last_edges = last_edges.or(edges);
            }
            _ => out.push((kmer, edges)),
        }
    }
    Ok(out)
}

/// The raw output of the build phase: a colex-sorted, dummy-padded,
/// deduplicated sequence of `(node, edges)` pairs, one per distinct
/// BOSS node, ready for [`crate::sbwt::Sbwt::from_boss`] to compress.
pub struct BossNodes {
    pub nodes: Vec<(Kmer, Edgeset)>,
    pub k: usize,
}

/// Builds the sorted, dummy-padded BOSS node set from a stream of
/// `(k+1)`-mers (duplicates and, if the caller wants them indexed,
/// reverse complements are both expected to already be present in
/// `kmers`).
pub fn build_edge_set(
    k: usize,
    kmers: impl Iterator<Item = Kmer>,
    config: &SortConfig,
    temp_dir: &Path,
) -> Result<BossNodes> {
    let mut records: Vec<io::Result<Vec<u8>>> = Vec::new();
    for x in kmers {
        debug_assert_eq!(x.len(), k + 1);
        let prefix = {
            let mut p = x;
            p.drop_right();
            p
        };
        let suffix = {
            let mut s = x;
            s.drop_left();
            s
        };
        let out_label = x.last();
        let in_label = x.first();
        records.push(Ok(encode_record(&prefix, Edgeset::with_out(out_label))));
        records.push(Ok(encode_record(&suffix, Edgeset::with_in(in_label))));
    }

    log::info!("boss: {} edge records before sort", records.len());
    let fixed_shape = RecordShape::Fixed(RECORD_LEN);
    let sorted_path = external_sort(
        records.into_iter(),
        kmer_record_cmp,
        config,
        temp_dir,
    )?;
    let collapsed = collapse_sorted(SortedRunIter::open(&sorted_path, fixed_shape)?)?;
    let _ = std::fs::remove_file(&sorted_path);
    log::info!("boss: {} distinct nodes after first collapse", collapsed.len());

    if collapsed.is_empty() {
        // Degenerate input: explicitly insert the empty source node.
        return Ok(BossNodes { nodes: vec![(Kmer::new(), Edgeset::EMPTY)], k });
    }

    // Dummy padding: any node with no incoming edges needs its whole
    // chain of proper prefixes materialized, each marked with a "$"
    // predecessor and an outgoing edge to the next longer prefix.
    let mut padded: Vec<io::Result<Vec<u8>>> = collapsed
        .iter()
        .map(|(kmer, edges)| Ok(encode_record(kmer, *edges)))
        .collect();

    for (kmer, edges) in &collapsed {
        if edges.indegree() == 0 {
            // The node itself gets a genuine incoming edge from its
            // immediate (one-shorter) prefix, labeled with its own
            // last character.
            padded.push(Ok(encode_record(kmer, Edgeset::with_in(kmer.last()))));

            // Every strictly shorter prefix down to the empty k-mer
            // carries only a synthetic "$" in-mark (never a real
            // incoming label) plus a real outgoing edge to the next
            // longer prefix - spec §4.3's dummy chain.
            let mut v = *kmer;
            while v.len() > 0 {
                let next_char = v.last();
                v.drop_right();
                let out_edges = Edgeset::with_out(next_char).or(Edgeset::with_in(0));
                padded.push(Ok(encode_record(&v, out_edges)));
            }
        }
    }

    log::info!("boss: {} records after dummy padding", padded.len());
    let sorted_path2 = external_sort(padded.into_iter(), kmer_record_cmp, config, temp_dir)?;
    let mut nodes = collapse_sorted(SortedRunIter::open(&sorted_path2, fixed_shape)?)?;
    let _ = std::fs::remove_file(&sorted_path2);

    if nodes.first().map(|(k, _)| k.len()) != Some(0) {
        nodes.insert(0, (Kmer::new(), Edgeset::EMPTY));
    }

    log::info!("boss: {} final distinct nodes", nodes.len());
    Ok(BossNodes { nodes, k })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kmer::Kmer;

    fn kmer(s: &str) -> Kmer {
        Kmer::from_ascii(s.as_bytes())
    }

    #[test]
    fn edgeset_packs_in_and_out_independently() {
        let mut e = Edgeset::EMPTY;
        e = e.or(Edgeset::with_out(2));
        e = e.or(Edgeset::with_in(0));
        assert!(e.has_out(2));
        assert!(e.has_in(0));
        assert!(!e.has_out(0));
        assert_eq!(e.outdegree(), 1);
        assert_eq!(e.indegree(), 1);
    }

    #[test]
    fn build_edge_set_on_single_sequence_has_no_incoming_at_first_real_node() {
        // Sequence ACGTAC, k=3: (k+1)-mers are ACGT, CGTA, GTAC.
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(RECORD_LEN));
        let kmers = vec![kmer("ACGT"), kmer("CGTA"), kmer("GTAC")];
        let boss = build_edge_set(3, kmers.into_iter(), &config, dir.path()).unwrap();
        // Node 0 must be the empty source node.
        assert_eq!(boss.nodes[0].0.len(), 0);
        // Every node in the result is sorted colexicographically.
        for w in boss.nodes.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
        // The real 3-mer "ACG" should exist with indegree 0 (source of
        // the chain) and have had its full dummy prefix chain built.
        let acg = kmer("ACG");
        assert!(boss.nodes.iter().any(|(k, _)| *k == acg));
        let has_len2_dummy = boss.nodes.iter().any(|(k, _)| k.len() == 2);
        assert!(has_len2_dummy);
    }

    #[test]
    fn empty_input_yields_single_source_node() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(RECORD_LEN));
        let boss = build_edge_set(3, std::iter::empty(), &config, dir.path()).unwrap();
        assert_eq!(boss.nodes.len(), 1);
        assert_eq!(boss.nodes[0].0.len(), 0);
    }
}
