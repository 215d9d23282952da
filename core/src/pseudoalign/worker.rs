/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Pseudoalignment worker (C10): resolves per-k-mer color-set ids
//! along a query, then combines them by intersection or threshold
//! voting (spec §4.10).
//!
//! Grounded in `examples/original_source/include/Themisto.hh`'s
//! `AlignerThread` (`do_intersections` for the reverse-complement
//! union-then-intersect combining rule, the count/threshold arm of
//! `PseudoAlignerVanilla`).

use crate::colors::{ColorSet, ColorSetStore, CoreKmerMap};
use crate::kmer::{encode_base, reverse_complement};
use crate::sbwt::Sbwt;
use std::collections::HashMap;

/// Combining mode (spec §4.10): intersection is threshold = 1.0.
#[derive(Clone, Copy, Debug)]
pub enum CombineMode {
    Intersection,
    Threshold { fraction: f64 },
}

/// Per-query alignment configuration, shared read-only across worker
/// threads.
#[derive(Clone, Copy)]
pub struct AlignConfig {
    pub mode: CombineMode,
    pub reverse_complements: bool,
    pub ignore_unknown_kmers: bool,
    pub relevant_kmers_fraction: f64,
    pub sort_hits: bool,
}

/// Full per-read outcome, including the auxiliary counts spec §6's
/// `--auxiliary-info-file` reports alongside the color line: the
/// number of "relevant" k-mers (matched, or every k-mer if
/// `--include-unknown-kmers`) and the total k-mer count `|Q|-k+1`.
/// "Relevant" is computed against the query's own k-mer positions
/// (forward, mirrored by reverse-complement matches when `--rc` is
/// set) rather than the doubled forward+rc id stream threshold mode
/// builds internally, so the denominator always matches spec's
/// `|Q|-k+1` regardless of combining mode (see DESIGN.md).
pub struct AlignResult {
    pub colors: Vec<u32>,
    pub relevant_kmers: usize,
    pub total_kmers: usize,
}

/// Resolves the color-set id touching each k-mer window of `seq`, in
/// left-to-right order, reusing forward `walk` steps and falling back
/// to a fresh `find_kmer` scan on a walk miss (spec §4.10 step 2-3).
fn resolve_ids(sbwt: &Sbwt, core_map: &CoreKmerMap, seq: &[u8], k: usize) -> Vec<Option<usize>> {
    if seq.len() < k {
        return Vec::new();
    }
    let n = seq.len() - k + 1;
    let mut ids = vec![None; n];
    let mut cur_node: Option<usize> = None;
    for i in 0..n {
        let node = match cur_node {
            Some(prev) => sbwt.walk(prev, encode_base(seq[i + k - 1])),
            None => None,
        }
        .or_else(|| sbwt.find_kmer(&seq[i..i + k]));
        cur_node = node;
        ids[i] = node.map(|v| core_map.color_set_id(sbwt, v));
    }
    ids
}

/// Collapses consecutive repeats of the same id, dropping `None`s,
/// matching spec §4.10's "distinct, consecutive color-set ids".
fn distinct_consecutive_runs(ids: &[Option<usize>]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    for &id in ids {
        let Some(id) = id else { continue };
        match runs.last_mut() {
            Some((last_id, len)) if *last_id == id => *len += 1,
            _ => runs.push((id, 1usize)),
        }
    }
    runs
}

fn combine_intersection(store: &ColorSetStore, ids: &[Option<usize>]) -> Vec<u32> {
    let runs = distinct_consecutive_runs(ids);
    let mut acc: Option<ColorSet> = None;
    for (id, _) in runs {
        let set = store.get(id).to_owned_set();
        acc = Some(match acc {
            None => set,
            Some(a) => ColorSet::intersect(&a, &set),
        });
        if let Some(a) = &acc {
            if a.size() == 0 {
                break;
            }
        }
    }
    acc.map(|s| s.to_vec()).unwrap_or_default()
}

/// Reverse-complement-aware intersection: for each forward query
/// position, unions the forward color set with the color set at the
/// mirrored position of the reverse-complement walk, then intersects
/// those unions across positions (spec §4.10).
fn combine_intersection_with_rc(
    store: &ColorSetStore,
    fwd_ids: &[Option<usize>],
    rc_ids: &[Option<usize>],
) -> Vec<u32> {
    let n = fwd_ids.len();
    let mut acc: Option<ColorSet> = None;
    for i in 0..n {
        let f = fwd_ids[i].map(|id| store.get(id).to_owned_set());
        let r = rc_ids[n - 1 - i].map(|id| store.get(id).to_owned_set());
        let combined = match (f, r) {
            (Some(a), Some(b)) => ColorSet::union(&a, &b),
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => continue,
        };
        acc = Some(match acc {
            None => combined,
            Some(a) => ColorSet::intersect(&a, &combined),
        });
        if let Some(a) = &acc {
            if a.size() == 0 {
                break;
            }
        }
    }
    acc.map(|s| s.to_vec()).unwrap_or_default()
}

fn combine_threshold(
    store: &ColorSetStore,
    ids: &[Option<usize>],
    fraction: f64,
    relevant: usize,
    total_kmers: usize,
    relevant_kmers_fraction: f64,
) -> Option<Vec<u32>> {
    if total_kmers == 0 || (relevant as f64) / (total_kmers as f64) < relevant_kmers_fraction {
        return None;
    }

    let runs = distinct_consecutive_runs(ids);
    let mut counts: HashMap<u32, u64> = HashMap::new();
    for (id, run_len) in runs {
        for c in store.get(id).to_vec() {
            *counts.entry(c).or_insert(0) += run_len as u64;
        }
    }
    let mut hits: Vec<u32> = counts
        .into_iter()
        .filter(|&(_, count)| (count as f64) / (relevant.max(1) as f64) >= fraction)
        .map(|(c, _)| c)
        .collect();
    hits.sort_unstable();
    Some(hits)
}

/// Aligns one read against the index, following spec §4.10/§4.11
/// exactly: a read shorter than `k` (or with no matching k-mers, under
/// threshold mode's relevance gate) is reported with no color ids,
/// which callers render as an id-only output line.
///
/// `relevant_kmers`/`total_kmers` in the returned [`AlignResult`] are
/// always computed against the query's own `|Q|-k+1` k-mer positions
/// (counting a position "relevant" if either its forward or mirrored
/// reverse-complement k-mer matched, when `--rc` is set) — never the
/// doubled forward+rc stream threshold mode folds together
/// internally, so the auxiliary info file's denominator matches spec
/// §6 regardless of combining mode.
pub fn align_read(
    sbwt: &Sbwt,
    core_map: &CoreKmerMap,
    store: &ColorSetStore,
    seq: &[u8],
    config: &AlignConfig,
) -> AlignResult {
    let k = sbwt.k();
    if seq.len() < k {
        return AlignResult { colors: Vec::new(), relevant_kmers: 0, total_kmers: 0 };
    }
    let fwd_ids = resolve_ids(sbwt, core_map, seq, k);
    let total_kmers = fwd_ids.len();

    let rc_ids = config.reverse_complements.then(|| {
        let rc_seq = reverse_complement(seq);
        resolve_ids(sbwt, core_map, &rc_seq, k)
    });

    let relevant_kmers = if config.ignore_unknown_kmers {
        (0..total_kmers)
            .filter(|&i| {
                fwd_ids[i].is_some()
                    || rc_ids.as_ref().is_some_and(|rc| rc[total_kmers - 1 - i].is_some())
            })
            .count()
    } else {
        total_kmers
    };

    let mut colors = match config.mode {
        CombineMode::Intersection => match &rc_ids {
            Some(rc_ids) => combine_intersection_with_rc(store, &fwd_ids, rc_ids),
            None => combine_intersection(store, &fwd_ids),
        },
        CombineMode::Threshold { fraction } => {
            let ids = match &rc_ids {
                Some(rc_ids) => merge_forward_and_rc_ids(&fwd_ids, rc_ids),
                None => fwd_ids,
            };
            combine_threshold(store, &ids, fraction, relevant_kmers, total_kmers, config.relevant_kmers_fraction)
                .unwrap_or_default()
        }
    };
    if config.sort_hits {
        colors.sort_unstable();
    }
    AlignResult { colors, relevant_kmers, total_kmers }
}

/// Threshold mode with reverse complements folds the forward and
/// mirrored-reverse id streams into one sequence of ids, one per
/// query position, before run-length counting — there is no
/// intersection step to union against, so each position simply
/// contributes whichever side(s) found a match.
fn merge_forward_and_rc_ids(
    fwd_ids: &[Option<usize>],
    rc_ids: &[Option<usize>],
) -> Vec<Option<usize>> {
    let n = fwd_ids.len();
    let mut merged = Vec::with_capacity(n * 2);
    for i in 0..n {
        merged.push(fwd_ids[i]);
        merged.push(rc_ids[n - 1 - i]);
    }
    merged
}
