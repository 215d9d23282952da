/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The succinct Wheeler graph / SBWT (C4): `⟨L, In, Out, C, k⟩` as
//! defined in spec §3, with rank/select-backed k-mer search and
//! forward traversal.
//!
//! `L` (the out-label string) is represented as four parallel
//! rank/select bitvectors, one per character of Σ = {A,C,G,T} — the
//! small-alphabet specialization of a wavelet tree described in
//! `SPEC_FULL.md` §4.4 and grounded in
//! `examples/original_source/include/libwheeler/WheelerIndex.hh`.

use crate::bitseq::{BitVecBuilder, RankSelectBitVec};
use crate::boss::BossNodes;
use crate::error::{Error, Result};
use crate::kmer::{decode_base, encode_base, Kmer};
use std::io::{Read, Write};

pub mod backward;

/// A single out-label bitvector per character of Σ: `labels[c]` has a
/// `1` at position `p` in `L` iff the edge at Wheeler position `p` is
/// labeled `c`.
pub struct OutLabelString {
    per_char: [RankSelectBitVec; 4],
    len: usize,
}

impl OutLabelString {
    fn build(chars: &[u8], len: usize) -> Self {
        let mut builders: [BitVecBuilder; 4] = [
            BitVecBuilder::with_len(len),
            BitVecBuilder::with_len(len),
            BitVecBuilder::with_len(len),
            BitVecBuilder::with_len(len),
        ];
        for (i, &c) in chars.iter().enumerate() {
            builders[c as usize].set(i, true);
        }
        let per_char = builders.map(|b| RankSelectBitVec::new(b.finish()));
        OutLabelString { per_char, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn char_at(&self, pos: usize) -> u8 {
        for c in 0..4u8 {
            if self.per_char[c as usize].get(pos) {
                return c;
            }
        }
        unreachable!("every L position has exactly one label")
    }

    /// Number of occurrences of `c` in `L[0..pos)`.
    pub fn rank(&self, pos: usize, c: u8) -> usize {
        self.per_char[c as usize].rank1(pos)
    }

    /// Position of the `i`-th (0-indexed) occurrence of `c`.
    pub fn select(&self, i: usize, c: u8) -> usize {
        self.per_char[c as usize].select1(i)
    }

    fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        let len = self.len as u64;
        out.write_all(&len.to_le_bytes())?;
        for bv in &self.per_char {
            bv.write_to(out)?;
        }
        Ok(())
    }

    fn read_from(input: &mut impl Read) -> std::io::Result<Self> {
        let mut len_buf = [0u8; 8];
        input.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;
        let per_char = [
            RankSelectBitVec::read_from(input)?,
            RankSelectBitVec::read_from(input)?,
            RankSelectBitVec::read_from(input)?,
            RankSelectBitVec::read_from(input)?,
        ];
        Ok(OutLabelString { per_char, len })
    }
}

/// The succinct Wheeler graph: out-label string with rank/select,
/// in/out-degree unary bitvectors, and the `C` array.
pub struct Sbwt {
    l: OutLabelString,
    in_unary: RankSelectBitVec,
    out_unary: RankSelectBitVec,
    c: [i64; 256],
    k: usize,
    n_nodes: usize,
}

impl Sbwt {
    /// Builds the succinct index from [`BossNodes`] (C3's output):
    /// emits `In`/`Out` unary bitvectors and `L` in colex node order.
    pub fn from_boss(boss: &BossNodes) -> Result<Self> {
        let mut labels: Vec<u8> = Vec::new();

        // We don't know the final bitvector lengths up front (they
        // depend on total degree), so build growable vectors of bools
        // first and hand them to BitVecBuilder only once sized.
        let mut in_bits: Vec<bool> = Vec::new();
        let mut out_bits: Vec<bool> = Vec::new();

        for (_node, edges) in &boss.nodes {
            in_bits.push(true);
            for _ in 0..edges.indegree().saturating_sub(1) {
                in_bits.push(false);
            }
            if edges.indegree() == 0 {
                // A node with in-degree zero still needs its `1` to
                // mark the node boundary; spec: unary code is "1"
                // followed by indegree zeros, so indegree 0 yields a
                // lone "1" with zero trailing zeros - already handled
                // by the push(true) above with no extra zeros.
            }

            out_bits.push(true);
            for _ in 0..edges.outdegree() {
                out_bits.push(false);
            }
            for c in edges.out_chars() {
                labels.push(c);
            }
        }

        let mut in_unary = BitVecBuilder::with_len(in_bits.len());
        for (i, b) in in_bits.iter().enumerate() {
            in_unary.set(i, *b);
        }
        let mut out_unary = BitVecBuilder::with_len(out_bits.len());
        for (i, b) in out_bits.iter().enumerate() {
            out_unary.set(i, *b);
        }

        let n_nodes = boss.nodes.len();
        let mut c = [0i64; 256];
        {
            let mut cum = 0i64;
            for code in 0..4u8 {
                c[code as usize] = cum;
                let count = labels.iter().filter(|&&l| l == code).count() as i64;
                cum += count;
            }
            for code in 4..256 {
                c[code] = cum;
            }
        }

        let l = OutLabelString::build(&labels, labels.len());
        Ok(Sbwt {
            l,
            in_unary: RankSelectBitVec::new(in_unary.finish()),
            out_unary: RankSelectBitVec::new(out_unary.finish()),
            c,
            k: boss.k,
            n_nodes,
        })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    pub fn n_edges(&self) -> usize {
        self.l.len()
    }

    pub fn out_degree(&self, v: usize) -> usize {
        let p = self.out_unary.select1(v);
        let mut q = p + 1;
        let mut deg = 0;
        while q < self.out_unary.len() && !self.out_unary.get(q) {
            deg += 1;
            q += 1;
        }
        deg
    }

    pub fn in_degree(&self, v: usize) -> usize {
        let p = self.in_unary.select1(v);
        let mut q = p + 1;
        let mut deg = 0;
        while q < self.in_unary.len() && !self.in_unary.get(q) {
            deg += 1;
            q += 1;
        }
        deg
    }

    /// Positions in `L` of the outgoing edges of node `v`, as a
    /// half-open `[start, end)` range (end exclusive), or `None` if
    /// `v` has no outgoing edges.
    pub fn out_edge_range(&self, v: usize) -> Option<(usize, usize)> {
        let deg = self.out_degree(v);
        if deg == 0 {
            return None;
        }
        let p = self.out_unary.select1(v);
        let start = p - v;
        Some((start, start + deg))
    }

    pub fn in_edge_range(&self, v: usize) -> Option<(usize, usize)> {
        let deg = self.in_degree(v);
        if deg == 0 {
            return None;
        }
        let p = self.in_unary.select1(v);
        let start = p - v;
        Some((start, start + deg))
    }

    /// The label of `v`'s sole outgoing edge, or `None` if `v` has
    /// zero or more than one outgoing edge. Used by the node-to-color
    /// map (C8) to follow the unique forward chain out of a non-core
    /// node.
    pub fn sole_out_char(&self, v: usize) -> Option<u8> {
        let (start, end) = self.out_edge_range(v)?;
        if end - start == 1 {
            Some(self.l.char_at(start))
        } else {
            None
        }
    }

    /// Destination node of the outgoing edge from `v` labeled `c`, or
    /// `None` if no such edge exists.
    pub fn walk(&self, v: usize, c: u8) -> Option<usize> {
        let (start, end) = self.out_edge_range(v)?;
        let count_before = self.l.rank(start, c);
        let count_through = self.l.rank(end, c);
        if count_through <= count_before {
            return None;
        }
        let wheeler_rank = (self.c[c as usize] as usize) + count_before;
        let in_pos = self.in_unary.select0(wheeler_rank);
        Some(self.in_unary.rank1(in_pos))
    }

    /// Finds the node whose label is exactly `s` (`s.len()` must equal
    /// `k`), or `None`.
    pub fn find_kmer(&self, s: &[u8]) -> Option<usize> {
        let mut v = 0usize;
        for &ch in s {
            let c = encode_base(ch);
            v = self.walk(v, c)?;
        }
        Some(v)
    }

    /// Reconstructs the length-`k` (or shorter, for dummy nodes) label
    /// of node `v` by following `k` backward edges.
    pub fn node_label(&self, v: usize) -> Vec<u8> {
        let mut chars = Vec::with_capacity(self.k);
        let mut cur = v;
        for _ in 0..self.k {
            if self.in_degree(cur) == 0 {
                break;
            }
            let (in_start, _) = self.in_edge_range(cur).unwrap();
            let predecessor_edge_wheeler_pos = in_start;
            let label_code = self.label_of_in_edge(predecessor_edge_wheeler_pos);
            chars.push(decode_base(label_code));
            cur = self.predecessor(cur, predecessor_edge_wheeler_pos);
        }
        chars.reverse();
        chars
    }

    /// Finds which character labels the incoming edge landing at `In`
    /// position `in_pos` of node `cur`, by locating which `L` position
    /// maps to this node via `C` and matching colex rank.
    fn label_of_in_edge(&self, in_pos: usize) -> u8 {
        let wheeler_rank = self.in_unary.rank1(in_pos);
        for c in 0..4u8 {
            let lo = self.c[c as usize] as usize;
            let hi = if (c as usize) + 1 < 4 {
                self.c[c as usize + 1] as usize
            } else {
                self.l.len()
            };
            if wheeler_rank >= lo && wheeler_rank < hi {
                return c;
            }
        }
        0
    }

    fn predecessor(&self, _cur: usize, in_pos: usize) -> usize {
        let wheeler_rank = self.in_unary.rank1(in_pos);
        // wheeler_rank is the rank of this edge among all edges sorted
        // by label; its source node is the one whose out_edge_range
        // contains the L-position with that rank among same-label
        // edges. We recover it via L.select applied within the
        // character's own bucket.
        let c = self.label_of_in_edge(in_pos);
        let within_bucket = wheeler_rank - self.c[c as usize] as usize;
        let l_pos = self.l.select(within_bucket, c);
        // `l_pos` is an index into `L`; each position in `L` corresponds to
        // exactly one zero bit of `out_unary` (the unary "1 then outdegree
        // zeros" code), so the `l_pos`-th zero of `out_unary` is the
        // position this edge occupies there, and the node owning it is the
        // rank of ones strictly before that position.
        self.out_unary.rank1(self.out_unary.select0(l_pos))
    }

    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        self.l.write_to(out)?;
        self.in_unary.write_to(out)?;
        self.out_unary.write_to(out)?;
        for v in &self.c {
            out.write_all(&v.to_le_bytes())?;
        }
        out.write_all(&(self.k as i64).to_le_bytes())?;
        out.write_all(&(self.n_nodes as i64).to_le_bytes())?;
        Ok(())
    }

    pub fn read_from(input: &mut impl Read) -> std::io::Result<Self> {
        let l = OutLabelString::read_from(input)?;
        let in_unary = RankSelectBitVec::read_from(input)?;
        let out_unary = RankSelectBitVec::read_from(input)?;
        let mut c = [0i64; 256];
        for v in c.iter_mut() {
            let mut buf = [0u8; 8];
            input.read_exact(&mut buf)?;
            *v = i64::from_le_bytes(buf);
        }
        let mut buf8 = [0u8; 8];
        input.read_exact(&mut buf8)?;
        let k = i64::from_le_bytes(buf8) as usize;
        input.read_exact(&mut buf8)?;
        let n_nodes = i64::from_le_bytes(buf8) as usize;
        Ok(Sbwt { l, in_unary, out_unary, c, k, n_nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boss::build_edge_set;
    use crate::kmer::Kmer;
    use crate::sort::{RecordShape, SortConfig};

    fn build(seq: &[u8], k: usize) -> Sbwt {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        let kmers: Vec<Kmer> = (0..=seq.len() - k - 1).map(|i| Kmer::from_ascii(&seq[i..i + k + 1])).collect();
        let boss = build_edge_set(k, kmers.into_iter(), &config, dir.path()).unwrap();
        Sbwt::from_boss(&boss).unwrap()
    }

    #[test]
    fn find_kmer_locates_every_window_of_the_input() {
        let seq = b"ACGTACGGT";
        let k = 3;
        let sbwt = build(seq, k);
        for i in 0..=seq.len() - k {
            let window = &seq[i..i + k];
            let v = sbwt.find_kmer(window).unwrap_or_else(|| panic!("missing window {:?}", String::from_utf8_lossy(window)));
            assert_eq!(sbwt.node_label(v), window, "node_label mismatch for window {i}");
        }
    }

    #[test]
    fn find_kmer_rejects_an_absent_kmer() {
        let sbwt = build(b"ACGTACGGT", 3);
        assert!(sbwt.find_kmer(b"TTT").is_none());
    }

    #[test]
    fn walk_follows_the_same_path_as_find_kmer() {
        let seq = b"ACGTACGGT";
        let k = 3;
        let sbwt = build(seq, k);
        let mut v = sbwt.find_kmer(&seq[0..k]).unwrap();
        for i in k..seq.len() {
            let c = encode_base(seq[i]);
            v = sbwt.walk(v, c).unwrap_or_else(|| panic!("walk failed extending with {}", seq[i] as char));
            assert_eq!(sbwt.node_label(v), &seq[i + 1 - k..=i]);
        }
    }

    #[test]
    fn walk_on_a_nonexistent_edge_returns_none() {
        let sbwt = build(b"ACGTACGGT", 3);
        let v = sbwt.find_kmer(b"CGT").unwrap();
        // "CGT" occurs exactly once in the input, followed by 'A'; any
        // other extension has no outgoing edge from this node.
        assert_eq!(sbwt.out_degree(v), 1);
        assert!(sbwt.walk(v, encode_base(b'A')).is_some());
        assert!(sbwt.walk(v, encode_base(b'C')).is_none());
        assert!(sbwt.walk(v, encode_base(b'T')).is_none());
    }

    #[test]
    fn write_then_read_preserves_query_answers() {
        let seq = b"ACGTACGGT";
        let k = 3;
        let sbwt = build(seq, k);
        let mut buf = Vec::new();
        sbwt.write_to(&mut buf).unwrap();
        let restored = Sbwt::read_from(&mut &buf[..]).unwrap();

        assert_eq!(restored.k(), sbwt.k());
        assert_eq!(restored.n_nodes(), sbwt.n_nodes());
        for i in 0..=seq.len() - k {
            let window = &seq[i..i + k];
            assert_eq!(restored.find_kmer(window), sbwt.find_kmer(window));
        }
    }

    #[test]
    fn the_colex_smallest_node_has_no_incoming_edge() {
        // Node 0 is always the global source in colex order; spec §3
        // requires it have in-degree zero, which bounds its label
        // below `k` since `node_label` stops at the first in-degree-0
        // node it meets walking backward.
        let sbwt = build(b"ACGTACGGT", 3);
        assert_eq!(sbwt.in_degree(0), 0);
        assert!(sbwt.node_label(0).len() < sbwt.k());
    }
}
