/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Node-to-color-set map (C8): maps each non-dummy SBWT node to a
//! color-set id, sharing ids along colex runs via the *core k-mer*
//! sampling rule (spec §3/§4.8).
//!
//! Grounded in `examples/original_source/new_new_coloring.hh`'s
//! core-kmer marking pass, generalized here around this crate's own
//! [`crate::sbwt::Sbwt`] walk primitives and [`crate::sort::external_sort`]
//! rather than the original's in-place construction.

use crate::bitseq::{IntVec, RankSelectBitVec};
use crate::colors::store::{ColorSetStore, ColorSetStoreBuilder};
use crate::error::{Error, Result};
use crate::sbwt::Sbwt;
use crate::sort::{external_sort, RecordShape, SortConfig, SortedRunIter};
use std::io::{Read, Write};
use std::path::Path;

/// Default core-kmer sampling distance `D` (spec §4.8, REDESIGN FLAGS
/// open question (a): the shipped default samples every `D = 10`
/// forward steps).
pub const DEFAULT_SAMPLING_DISTANCE: usize = 10;

const RECORD_LEN: usize = 8 + 4;

fn encode_record(node_id: u64, color: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_LEN);
    buf.extend_from_slice(&node_id.to_be_bytes());
    buf.extend_from_slice(&color.to_be_bytes());
    buf
}

fn decode_record(bytes: &[u8]) -> (u64, u32) {
    let node_id = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let color = u32::from_be_bytes(bytes[8..12].try_into().unwrap());
    (node_id, color)
}

fn record_cmp(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    a[0..8].cmp(&b[0..8])
}

/// Maps every non-dummy SBWT node to a color-set id.
pub struct CoreKmerMap {
    core: RankSelectBitVec,
    ids: IntVec,
}

impl CoreKmerMap {
    /// Resolves the color-set id of node `v` by walking forward along
    /// its unique successor chain until a core node is reached (at
    /// most [`DEFAULT_SAMPLING_DISTANCE`] steps past the last forced
    /// sample, per spec's O(D) lookup bound).
    pub fn color_set_id(&self, sbwt: &Sbwt, v: usize) -> usize {
        let mut cur = v;
        loop {
            if self.core.get(cur) {
                let slot = self.core.rank1(cur);
                return self.ids.get(slot) as usize;
            }
            let c = sbwt
                .sole_out_char(cur)
                .expect("non-core node must have exactly one outgoing edge");
            cur = sbwt.walk(cur, c).expect("chain edge must exist");
        }
    }

    pub fn is_core(&self, v: usize) -> bool {
        self.core.get(v)
    }

    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        self.core.write_to(out)?;
        self.ids.write_to(out)?;
        Ok(())
    }

    pub fn read_from(input: &mut impl Read) -> std::io::Result<Self> {
        let core = RankSelectBitVec::read_from(input)?;
        let ids = IntVec::read_from(input)?;
        Ok(CoreKmerMap { core, ids })
    }
}

/// Builds the core-kmer map and the backing [`ColorSetStore`] from a
/// stream of `(node_id, color)` pairs (one pair per occurrence of a
/// node's k-mer label as a substring of a colored input sequence) plus
/// the set of node ids that are the last k-mer of some input sequence
/// (spec's "v is the last node of an input sequence" core condition).
pub fn build(
    sbwt: &Sbwt,
    pairs: impl Iterator<Item = (u64, u32)>,
    sequence_ends: &std::collections::HashSet<u64>,
    sampling_distance: usize,
    config: &SortConfig,
    temp_dir: &Path,
) -> Result<(CoreKmerMap, ColorSetStore)> {
    let n_nodes = sbwt.n_nodes();
    let records = pairs.map(|(n, c)| Ok(encode_record(n, c)));
    let sorted_path = external_sort(records, record_cmp, config, temp_dir)?;

    let mut color_sets: Vec<Option<Vec<u32>>> = vec![None; n_nodes];
    let mut cur_node: Option<u64> = None;
    let mut cur_colors: Vec<u32> = Vec::new();
    for item in SortedRunIter::open(&sorted_path, RecordShape::Fixed(RECORD_LEN))? {
        let bytes = item.map_err(Error::Io)?;
        let (node_id, color) = decode_record(&bytes);
        match cur_node {
            Some(n) if n == node_id => cur_colors.push(color),
            _ => {
                if let Some(n) = cur_node {
                    cur_colors.sort_unstable();
                    cur_colors.dedup();
                    color_sets[n as usize] = Some(std::mem::take(&mut cur_colors));
                }
                cur_node = Some(node_id);
                cur_colors.push(color);
            }
        }
    }
    if let Some(n) = cur_node {
        cur_colors.sort_unstable();
        cur_colors.dedup();
        color_sets[n as usize] = Some(cur_colors);
    }
    let _ = std::fs::remove_file(&sorted_path);

    log::info!("colors: {} distinct nodes have a color set", color_sets.iter().filter(|c| c.is_some()).count());

    // Pass 1: branching/terminal/color-change nodes and sequence ends
    // are unconditionally core.
    let mut core = vec![false; n_nodes];
    for v in 0..n_nodes {
        let Some(colors_v) = &color_sets[v] else { continue };
        if sequence_ends.contains(&(v as u64)) {
            core[v] = true;
            continue;
        }
        let out_deg = sbwt.out_degree(v);
        let in_deg = sbwt.in_degree(v);
        if out_deg != 1 || in_deg >= 2 {
            core[v] = true;
            continue;
        }
        let c = sbwt.sole_out_char(v).unwrap();
        let succ = sbwt.walk(v, c).unwrap();
        match &color_sets[succ] {
            Some(colors_succ) if colors_succ == colors_v => {}
            _ => core[v] = true,
        }
    }

    // Pass 2: cap every remaining non-core run at `sampling_distance`,
    // forcing a sample every D forward steps. Chains are simple
    // forward paths (a non-core node has in-degree <= 1 by
    // construction above); a chain may loop back on itself if the
    // underlying k-mers form a cycle, so we track visited nodes to
    // terminate.
    let mut visited = vec![false; n_nodes];
    for h in 0..n_nodes {
        if color_sets[h].is_none() || core[h] || visited[h] {
            continue;
        }
        let is_head = {
            let preds = sbwt.in_neighbors(h);
            preds.len() != 1 || core[preds[0]]
        };
        if !is_head {
            continue;
        }
        let mut v = h;
        let mut dist = 0usize;
        loop {
            visited[v] = true;
            dist += 1;
            if dist == sampling_distance {
                core[v] = true;
                dist = 0;
            }
            let c = sbwt.sole_out_char(v).expect("non-core chain node has a unique successor");
            let next = sbwt.walk(v, c).expect("chain edge must exist");
            if core[next] || visited[next] {
                break;
            }
            v = next;
        }
    }

    log::info!("colors: {} of {} nodes marked core", core.iter().filter(|&&b| b).count(), n_nodes);

    // Assign color-set ids, deduplicating identical sets across core
    // nodes, in increasing node-id order.
    let mut store_builder = ColorSetStoreBuilder::new();
    let mut dedup: std::collections::HashMap<Vec<u32>, usize> = std::collections::HashMap::new();
    let mut ids: Vec<u64> = Vec::new();
    for v in 0..n_nodes {
        if !core[v] {
            continue;
        }
        let colors = color_sets[v].clone().expect("core node always has a color set");
        let id = *dedup.entry(colors.clone()).or_insert_with(|| store_builder.add_set(&colors));
        ids.push(id as u64);
    }

    let core_bits = RankSelectBitVec::from_ones(n_nodes, (0..n_nodes).filter(|&v| core[v]));
    let ids_vec = IntVec::from_values(&ids);
    let store = store_builder.finalize();
    Ok((CoreKmerMap { core: core_bits, ids: ids_vec }, store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boss::build_edge_set;
    use crate::kmer::Kmer;
    use std::collections::HashSet;

    fn kmer(s: &str) -> Kmer {
        Kmer::from_ascii(s.as_bytes())
    }

    #[test]
    fn single_sequence_single_color_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        // Sequence ACGTAC, k=3.
        let seq = b"ACGTAC";
        let k = 3;
        let kmers: Vec<Kmer> = (0..=seq.len() - k - 1)
            .map(|i| Kmer::from_ascii(&seq[i..i + k + 1]))
            .collect();
        let boss = build_edge_set(k, kmers.into_iter(), &config, dir.path()).unwrap();
        let sbwt = Sbwt::from_boss(&boss).unwrap();

        let mut pairs = Vec::new();
        let mut ends = HashSet::new();
        for i in 0..=seq.len() - k {
            let node = sbwt.find_kmer(&seq[i..i + k]).unwrap();
            pairs.push((node as u64, 0u32));
            if i == seq.len() - k {
                ends.insert(node as u64);
            }
        }

        let sort_config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(12));
        let (map, store) = build(&sbwt, pairs.into_iter(), &ends, 10, &sort_config, dir.path()).unwrap();

        for i in 0..=seq.len() - k {
            let node = sbwt.find_kmer(&seq[i..i + k]).unwrap();
            let id = map.color_set_id(&sbwt, node);
            assert_eq!(store.get(id).to_vec(), vec![0u32]);
        }
    }
}
