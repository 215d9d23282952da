/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! `themisto stats`: prints the size in bits of every major on-disk
//! structure of an index (spec §6).

use crate::GlobalArgs;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use themisto_core::index::ThemistoIndex;

#[derive(Parser, Debug)]
#[command(name = "stats")]
pub struct CliArgs {
    /// The index prefix given to `build`'s `-o`.
    #[arg(short = 'i', long = "index-prefix")]
    pub index_prefix: PathBuf,

    /// Print the report as JSON instead of plain lines.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatsReport {
    n_nodes: usize,
    n_color_sets: usize,
    sbwt_bits: usize,
    color_store_bits: usize,
    node_map_bits: usize,
    total_bits: usize,
}

pub fn main(global: GlobalArgs, args: CliArgs) -> Result<()> {
    if global.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }
    let index = ThemistoIndex::load(&args.index_prefix)?;
    let stats = index.stats();
    let report = StatsReport {
        n_nodes: stats.n_nodes,
        n_color_sets: stats.n_color_sets,
        sbwt_bits: stats.sbwt_bits,
        color_store_bits: stats.color_store_bits,
        node_map_bits: stats.node_map_bits,
        total_bits: stats.sbwt_bits + stats.color_store_bits + stats.node_map_bits,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("n_nodes: {}", report.n_nodes);
        println!("n_color_sets: {}", report.n_color_sets);
        println!("sbwt_bits: {}", report.sbwt_bits);
        println!("color_store_bits: {}", report.color_store_bits);
        println!("node_map_bits: {}", report.node_map_bits);
        println!("total_bits: {}", report.total_bits);
    }
    Ok(())
}
