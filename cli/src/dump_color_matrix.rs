/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! `themisto dump-color-matrix`: emits one row per non-dummy node,
//! either sparse (`kmer color_id*`) or dense (`kmer` then a `0`/`1`
//! row over every color present in the index), per spec §6.
//!
//! Grounded in `examples/original_source/tests/test_CLI.hh`'s
//! `dump-color-matrix` invocations (`-i`, `-o`, `--sparse`).

use crate::GlobalArgs;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use themisto_core::index::ThemistoIndex;

#[derive(Parser, Debug)]
#[command(name = "dump-color-matrix")]
pub struct CliArgs {
    /// The index prefix given to `build`'s `-o`.
    #[arg(short = 'i', long = "index-prefix")]
    pub index_prefix: PathBuf,

    /// Output filename.
    #[arg(short = 'o', long = "out-file")]
    pub out_file: PathBuf,

    /// Print `kmer color_id*` rows instead of a dense `0`/`1` matrix.
    #[arg(long)]
    pub sparse: bool,
}

pub fn main(global: GlobalArgs, args: CliArgs) -> Result<()> {
    if global.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }
    let index = ThemistoIndex::load(&args.index_prefix)?;
    let k = index.sbwt.k();

    let out = std::fs::File::create(&args.out_file).with_context(|| format!("could not create {}", args.out_file.display()))?;
    let mut out = BufWriter::new(out);

    let n_colors = if args.sparse {
        0
    } else {
        (0..index.store.n_sets()).map(|id| index.store.get(id).to_vec().into_iter().max().unwrap_or(0)).max().map(|m| m as usize + 1).unwrap_or(0)
    };

    for v in 0..index.sbwt.n_nodes() {
        let label = index.sbwt.node_label(v);
        if label.len() != k {
            continue; // dummy node, not a real k-mer
        }
        let id = index.core_map.color_set_id(&index.sbwt, v);
        let colors = index.store.get(id);
        write!(out, "{}", String::from_utf8_lossy(&label))?;
        if args.sparse {
            for c in colors.to_vec() {
                write!(out, " {c}")?;
            }
        } else {
            let present = colors.to_vec();
            let mut row = vec![b'0'; n_colors];
            for c in present {
                row[c as usize] = b'1';
            }
            out.write_all(b" ")?;
            out.write_all(&row)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}
