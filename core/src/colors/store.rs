/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Color-set store (C7): concatenated storage for every distinct color
//! set the index holds, addressable by color-set id (spec §3/§4.7).
//!
//! Grounded in `examples/original_source/new_new_coloring.hh`'s
//! `New_Color_Set_Storage` (`add_set` / `prepare_for_queries` split
//! maps directly onto [`ColorSetStoreBuilder`] / [`ColorSetStoreBuilder::finalize`]).

use super::codec::ColorSet;
use crate::bitseq::{IntVec, RankSelectBitVec};
use std::io::{Read, Write};

/// Growable accumulator for color sets added in id order. `finalize`
/// packs everything into the immutable, width-minimal [`ColorSetStore`].
#[derive(Default)]
pub struct ColorSetStoreBuilder {
    b_bits: Vec<bool>,
    bs_offsets: Vec<u64>,
    d_values: Vec<u32>,
    ds_offsets: Vec<u64>,
    form: Vec<bool>,
}

impl ColorSetStoreBuilder {
    pub fn new() -> Self {
        ColorSetStoreBuilder {
            b_bits: Vec::new(),
            bs_offsets: vec![0],
            d_values: Vec::new(),
            ds_offsets: vec![0],
            form: Vec::new(),
        }
    }

    /// Encodes `sorted_distinct` and appends it to the store, returning
    /// its freshly assigned color-set id.
    pub fn add_set(&mut self, sorted_distinct: &[u32]) -> usize {
        let id = self.form.len();
        match ColorSet::encode(sorted_distinct) {
            ColorSet::Bitmap { words, len_bits } => {
                for i in 0..len_bits {
                    self.b_bits.push((words[i / 64] >> (i % 64)) & 1 == 1);
                }
                self.bs_offsets.push(self.b_bits.len() as u64);
                self.form.push(true);
            }
            ColorSet::Deltas(deltas) => {
                self.d_values.extend(deltas);
                self.ds_offsets.push(self.d_values.len() as u64);
                self.form.push(false);
            }
        }
        id
    }

    pub fn finalize(self) -> ColorSetStore {
        let n_sets = self.form.len();
        let b = RankSelectBitVec::from_ones(
            self.b_bits.len(),
            self.b_bits.iter().enumerate().filter(|(_, &bit)| bit).map(|(i, _)| i),
        );
        let bs = IntVec::from_values(&self.bs_offsets);
        let d = IntVec::from_values(&self.d_values.iter().map(|&x| x as u64).collect::<Vec<_>>());
        let ds = IntVec::from_values(&self.ds_offsets);
        let f = RankSelectBitVec::from_ones(
            n_sets,
            self.form.iter().enumerate().filter(|(_, &bit)| bit).map(|(i, _)| i),
        );
        ColorSetStore { b, bs, d, ds, f, n_sets }
    }
}

/// A borrowed view onto one stored color set, decoded lazily.
pub enum ColorSetView<'a> {
    Bitmap { b: &'a RankSelectBitVec, start: usize, len_bits: usize },
    Deltas { d: &'a IntVec, start: usize, len_elems: usize },
}

impl<'a> ColorSetView<'a> {
    pub fn size(&self) -> usize {
        match self {
            ColorSetView::Bitmap { b, start, len_bits } => {
                (0..*len_bits).filter(|&i| b.get(start + i)).count()
            }
            ColorSetView::Deltas { len_elems, .. } => *len_elems,
        }
    }

    pub fn contains(&self, c: u32) -> bool {
        match self {
            ColorSetView::Bitmap { b, start, len_bits } => {
                (c as usize) < *len_bits && b.get(start + c as usize)
            }
            ColorSetView::Deltas { d, start, len_elems } => {
                let mut sum = 0u32;
                for i in 0..*len_elems {
                    let gap = d.get(start + i) as u32;
                    sum = if i == 0 { gap } else { sum + gap };
                    if sum == c {
                        return true;
                    }
                    if sum > c {
                        return false;
                    }
                }
                false
            }
        }
    }

    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            ColorSetView::Bitmap { b, start, len_bits } => {
                (0..*len_bits as u32).filter(|&c| b.get(start + c as usize)).collect()
            }
            ColorSetView::Deltas { d, start, len_elems } => {
                let mut out = Vec::with_capacity(*len_elems);
                let mut sum = 0u32;
                for i in 0..*len_elems {
                    let gap = d.get(start + i) as u32;
                    sum = if i == 0 { gap } else { sum + gap };
                    out.push(sum);
                }
                out
            }
        }
    }

    /// Materializes an owned [`ColorSet`] from this view, so it can be
    /// fed into [`ColorSet::intersect`]/[`ColorSet::union`].
    pub fn to_owned_set(&self) -> ColorSet {
        match self {
            ColorSetView::Bitmap { b, start, len_bits } => {
                let mut words = vec![0u64; (*len_bits + 63) / 64];
                for i in 0..*len_bits {
                    if b.get(start + i) {
                        words[i / 64] |= 1u64 << (i % 64);
                    }
                }
                ColorSet::Bitmap { words, len_bits: *len_bits }
            }
            ColorSetView::Deltas { d, start, len_elems } => {
                let deltas: Vec<u32> = (0..*len_elems).map(|i| d.get(start + i) as u32).collect();
                ColorSet::Deltas(deltas)
            }
        }
    }
}

/// The immutable, serializable color-set store (spec §3/§6).
pub struct ColorSetStore {
    b: RankSelectBitVec,
    bs: IntVec,
    d: IntVec,
    ds: IntVec,
    f: RankSelectBitVec,
    n_sets: usize,
}

impl ColorSetStore {
    pub fn n_sets(&self) -> usize {
        self.n_sets
    }

    /// Returns a view onto color-set `id`, resolving its form via `F`
    /// and its storage slot via rank on `F` (spec §4.7).
    pub fn get(&self, id: usize) -> ColorSetView<'_> {
        debug_assert!(id < self.n_sets);
        let is_bitmap = self.f.get(id);
        if is_bitmap {
            let slot = self.f.rank1(id);
            let start = self.bs.get(slot) as usize;
            let end = self.bs.get(slot + 1) as usize;
            ColorSetView::Bitmap { b: &self.b, start, len_bits: end - start }
        } else {
            let slot = id - self.f.rank1(id);
            let start = self.ds.get(slot) as usize;
            let end = self.ds.get(slot + 1) as usize;
            ColorSetView::Deltas { d: &self.d, start, len_elems: end - start }
        }
    }

    pub fn write_to(&self, out: &mut impl Write) -> std::io::Result<()> {
        self.b.write_to(out)?;
        self.bs.write_to(out)?;
        self.d.write_to(out)?;
        self.ds.write_to(out)?;
        self.f.write_to(out)?;
        out.write_all(&(self.n_sets as u64).to_le_bytes())?;
        Ok(())
    }

    pub fn read_from(input: &mut impl Read) -> std::io::Result<Self> {
        let b = RankSelectBitVec::read_from(input)?;
        let bs = IntVec::read_from(input)?;
        let d = IntVec::read_from(input)?;
        let ds = IntVec::read_from(input)?;
        let f = RankSelectBitVec::read_from(input)?;
        let mut buf8 = [0u8; 8];
        input.read_exact(&mut buf8)?;
        let n_sets = u64::from_le_bytes(buf8) as usize;
        Ok(ColorSetStore { b, bs, d, ds, f, n_sets })
    }
}
