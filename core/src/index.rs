/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The finished index: SBWT (C4), node-to-color-set map (C8) and
//! color-set store (C7) bundled together, with the two-file on-disk
//! layout of spec §6 (`P.tdbg` / `P.tcolors`).

use crate::colors::{ColorSetStore, CoreKmerMap};
use crate::error::{Error, Result};
use crate::sbwt::Sbwt;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A complete, queryable Themisto index.
pub struct ThemistoIndex {
    pub sbwt: Sbwt,
    pub core_map: CoreKmerMap,
    pub store: ColorSetStore,
}

impl ThemistoIndex {
    fn tdbg_path(prefix: &Path) -> std::path::PathBuf {
        append_extension(prefix, "tdbg")
    }

    fn tcolors_path(prefix: &Path) -> std::path::PathBuf {
        append_extension(prefix, "tcolors")
    }

    /// Writes `prefix.tdbg` (the SBWT) and `prefix.tcolors` (the
    /// color-set store followed by the node map) as spec §6 lays out.
    pub fn save(&self, prefix: &Path) -> Result<()> {
        {
            let file = std::fs::File::create(Self::tdbg_path(prefix)).map_err(Error::Io)?;
            let mut out = BufWriter::new(file);
            self.sbwt.write_to(&mut out).map_err(Error::Io)?;
        }
        {
            let file = std::fs::File::create(Self::tcolors_path(prefix)).map_err(Error::Io)?;
            let mut out = BufWriter::new(file);
            self.store.write_to(&mut out).map_err(Error::Io)?;
            self.core_map.write_to(&mut out).map_err(Error::Io)?;
        }
        Ok(())
    }

    pub fn load(prefix: &Path) -> Result<Self> {
        let sbwt = {
            let file = std::fs::File::open(Self::tdbg_path(prefix)).map_err(Error::Io)?;
            let mut input = BufReader::new(file);
            Sbwt::read_from(&mut input).map_err(Error::Io)?
        };
        let (store, core_map) = {
            let file = std::fs::File::open(Self::tcolors_path(prefix)).map_err(Error::Io)?;
            let mut input = BufReader::new(file);
            let store = ColorSetStore::read_from(&mut input).map_err(Error::Io)?;
            let core_map = CoreKmerMap::read_from(&mut input).map_err(Error::Io)?;
            (store, core_map)
        };
        Ok(ThemistoIndex { sbwt, core_map, store })
    }

    /// Reports the on-disk bit size of every major structure, for the
    /// `stats` subcommand (spec §6).
    pub fn stats(&self) -> IndexStats {
        let mut tdbg = Vec::new();
        let _ = self.sbwt.write_to(&mut tdbg);
        let mut tcolors = Vec::new();
        let _ = self.store.write_to(&mut tcolors);
        let mut core_map_bytes = Vec::new();
        let _ = self.core_map.write_to(&mut core_map_bytes);
        IndexStats {
            n_nodes: self.sbwt.n_nodes(),
            n_color_sets: self.store.n_sets(),
            sbwt_bits: tdbg.len() * 8,
            color_store_bits: tcolors.len() * 8,
            node_map_bits: core_map_bytes.len() * 8,
        }
    }
}

pub struct IndexStats {
    pub n_nodes: usize,
    pub n_color_sets: usize,
    pub sbwt_bits: usize,
    pub color_store_bits: usize,
    pub node_map_bits: usize,
}

fn append_extension(prefix: &Path, ext: &str) -> std::path::PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    std::path::PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boss::build_edge_set;
    use crate::colors::build_node_map;
    use crate::kmer::Kmer;
    use crate::sort::{RecordShape, SortConfig};

    #[test]
    fn saves_and_loads_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(Kmer::SERIALIZED_SIZE + 1));
        let seq = b"ACGTAC";
        let k = 3;
        let kmers: Vec<Kmer> = (0..=seq.len() - k - 1).map(|i| Kmer::from_ascii(&seq[i..i + k + 1])).collect();
        let boss = build_edge_set(k, kmers.into_iter(), &config, dir.path()).unwrap();
        let sbwt = Sbwt::from_boss(&boss).unwrap();

        let mut pairs = Vec::new();
        let mut ends = std::collections::HashSet::new();
        for i in 0..=seq.len() - k {
            let node = sbwt.find_kmer(&seq[i..i + k]).unwrap();
            pairs.push((node as u64, 0u32));
            if i == seq.len() - k {
                ends.insert(node as u64);
            }
        }
        let sort_config = SortConfig::new(1 << 20, 1, RecordShape::Fixed(12));
        let (core_map, store) = build_node_map(&sbwt, pairs.into_iter(), &ends, 10, &sort_config, dir.path()).unwrap();
        let index = ThemistoIndex { sbwt, core_map, store };

        let prefix = dir.path().join("P");
        index.save(&prefix).unwrap();
        assert!(prefix.with_extension("tdbg").exists() || dir.path().join("P.tdbg").exists());

        let loaded = ThemistoIndex::load(&prefix).unwrap();
        assert_eq!(loaded.sbwt.n_nodes(), index.sbwt.n_nodes());
        assert_eq!(loaded.store.n_sets(), index.store.n_sets());
        let node = loaded.sbwt.find_kmer(b"ACG").unwrap();
        let id = loaded.core_map.color_set_id(&loaded.sbwt, node);
        assert_eq!(loaded.store.get(id).to_vec(), vec![0u32]);
    }
}
