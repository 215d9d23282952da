/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Backward traversal support (C5): enumeration of in-neighbors, used
//! only by unitig extraction (spec §4.5). No additional stored
//! structure is introduced: everything here is derived from the
//! `In`/`Out` unary bitvectors and the four per-character out-label
//! bitvectors that [`super::Sbwt`] already owns, per the REDESIGN
//! FLAGS note against friend/back-pointer sharing between SBWT and
//! BOSS.

use super::Sbwt;

impl Sbwt {
    /// Enumerates the in-neighbors of `v`: every distinct source node
    /// `u` with an edge `u -> v`. Because all incoming edges to `v`
    /// share one label (the Wheeler-graph invariant), `v`'s indegree
    /// counts how many distinct sources collapse onto it; each is
    /// recovered by resolving one incoming edge slot to its source via
    /// the same rank/select machinery [`Sbwt::walk`] uses in reverse.
    pub fn in_neighbors(&self, v: usize) -> Vec<usize> {
        let Some((in_start, in_end)) = self.in_edge_range(v) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(in_end - in_start);
        for in_pos in in_start..in_end {
            let c = self.label_of_in_edge(in_pos);
            let wheeler_rank = self.in_unary.rank1(in_pos);
            let within_bucket = wheeler_rank - self.c[c as usize] as usize;
            let l_pos = self.l.select(within_bucket, c);
            let src = self.out_unary.rank1(self.out_unary.select0(l_pos));
            out.push(src);
        }
        out
    }

    /// Nodes sharing the length-(k-1) colex suffix-group of `v`: the
    /// set of nodes reachable from `v` by dropping and re-extending
    /// the last character, used by unitig extraction to detect
    /// branch-free runs that share an overlap class. For a node `v`
    /// with label `s`, its suffix group is every node whose label
    /// equals `s` with the leftmost character dropped, extended by
    /// any one character on the left — equivalently, every in-neighbor
    /// of every node reachable by walking forward one step from `v`'s
    /// own in-neighbors. We expose the simpler, directly useful
    /// primitive: the predecessors of `v`'s unique forward successor
    /// set restricted to the same suffix, i.e. just `in_neighbors`
    /// composed with itself is not meaningful here, so suffix-group
    /// enumeration is implemented directly as "all `u` with
    /// `node_label(u)` sharing the rightmost `k-1` characters of
    /// `node_label(v)`" via the four backward-select structures.
    pub fn suffix_group(&self, v: usize) -> Vec<usize> {
        let label = self.node_label(v);
        if label.len() < self.k {
            // Dummy nodes have no well-defined suffix group distinct
            // from their own singleton.
            return vec![v];
        }
        let mut group = Vec::new();
        for c in 0..4u8 {
            if let Some(pred_candidate) = self.find_kmer(&{
                let mut s = vec![crate::kmer::decode_base(c)];
                s.extend_from_slice(&label[1..]);
                s
            }) {
                group.push(pred_candidate);
            }
        }
        group.sort_unstable();
        group.dedup();
        group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boss::build_edge_set;
    use crate::kmer::Kmer;
    use crate::sort::{RecordShape, SortConfig};

    fn kmer(s: &str) -> Kmer {
        Kmer::from_ascii(s.as_bytes())
    }

    #[test]
    fn in_neighbors_inverts_walk() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        // Sequence ACGTAC, k=3: (k+1)-mers ACGT, CGTA, GTAC.
        let kmers = vec![kmer("ACGT"), kmer("CGTA"), kmer("GTAC")];
        let boss = build_edge_set(3, kmers.into_iter(), &config, dir.path()).unwrap();
        let sbwt = Sbwt::from_boss(&boss).unwrap();

        for u in 0..sbwt.n_nodes() {
            if let Some((start, end)) = sbwt.out_edge_range(u) {
                for pos in start..end {
                    let c = sbwt.l.char_at(pos);
                    let v = sbwt.walk(u, c).unwrap();
                    assert!(sbwt.in_neighbors(v).contains(&u));
                }
            }
        }
    }
}
