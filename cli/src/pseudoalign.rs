/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! `themisto pseudoalign`: aligns query sequences against a previously
//! built index (spec §4.9-§4.11, §6).
//!
//! Grounded in `examples/original_source/src/pseudoalign_main.cpp`'s
//! `cxxopts` option table for the exact names (`-q`/`--query-file`,
//! `--query-file-list`, `-o`/`--out-file`, `--out-file-list`,
//! `--auxiliary-info-file`, `-i`/`--index-prefix`, `--temp-dir`,
//! `--gzip-output`, `--sort-output-lines`, `--sort-hits`, `--threshold`,
//! `--include-unknown-kmers`, `--relevant-kmers-fraction`,
//! `-t`/`--n-threads`, `--rc`, `--buffer-size-megas`).

use crate::GlobalArgs;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use themisto_core::index::ThemistoIndex;
use themisto_core::io::open_reader;
use themisto_core::pseudoalign::{AlignConfig, CombineMode, PseudoalignContext};
use themisto_core::pseudoalign::writer::{AuxInfoWriter, GzipWriter, OutputWriter, RawFileWriter, StdoutWriter};

#[derive(Parser, Debug)]
#[command(name = "pseudoalign")]
pub struct CliArgs {
    /// The index prefix given to `build`'s `-o`.
    #[arg(short = 'i', long = "index-prefix")]
    pub index_prefix: PathBuf,

    /// Directory for temporary files (used by `--sort-output-lines`).
    #[arg(long = "temp-dir")]
    pub temp_dir: PathBuf,

    /// A single query sequence file.
    #[arg(short = 'q', long = "query-file")]
    pub query_file: Option<PathBuf>,

    /// A file listing one query filename per line.
    #[arg(long = "query-file-list")]
    pub query_file_list: Option<PathBuf>,

    /// Output filename. Prints to stdout if omitted (and exactly one
    /// query file is given).
    #[arg(short = 'o', long = "out-file")]
    pub out_file: Option<PathBuf>,

    /// A file listing one output filename per line, matching
    /// `--query-file-list` 1:1.
    #[arg(long = "out-file-list")]
    pub out_file_list: Option<PathBuf>,

    /// Writes, per read, "read_id relevant_kmers total_kmers" to this file.
    #[arg(long = "auxiliary-info-file")]
    pub auxiliary_info_file: Option<PathBuf>,

    /// Include reverse-complement matches.
    #[arg(long = "rc")]
    pub rc: bool,

    /// Compress output files with gzip.
    #[arg(long = "gzip-output")]
    pub gzip_output: bool,

    /// Sort output lines by read id after alignment completes.
    #[arg(long = "sort-output-lines")]
    pub sort_output_lines: bool,

    /// Sort the color ids within each output line.
    #[arg(long = "sort-hits")]
    pub sort_hits: bool,

    /// Fraction of a read's k-mers that must share a color for it to
    /// be reported. 1.0 uses the specialized intersection algorithm.
    #[arg(long = "threshold", default_value_t = 1.0)]
    pub threshold: f64,

    /// Count k-mers absent from the index towards the total, instead
    /// of excluding them.
    #[arg(long = "include-unknown-kmers")]
    pub include_unknown_kmers: bool,

    /// Minimum fraction of a read's k-mers that must have at least one
    /// color for the read to be reported at all.
    #[arg(long = "relevant-kmers-fraction", default_value_t = 0.0)]
    pub relevant_kmers_fraction: f64,

    /// Number of worker threads.
    #[arg(short = 't', long = "n-threads", default_value_t = 1)]
    pub n_threads: usize,

    /// Size, in megabytes, of each worker's input buffer.
    #[arg(long = "buffer-size-megas", default_value_t = 8.0)]
    pub buffer_size_megas: f64,
}

fn read_list(path: &Path) -> Result<Vec<PathBuf>> {
    let file = File::open(path).with_context(|| format!("could not open {}", path.display()))?;
    BufReader::new(file)
        .lines()
        .filter(|l| l.as_ref().map(|s| !s.trim().is_empty()).unwrap_or(true))
        .map(|l| l.map(PathBuf::from).map_err(Into::into))
        .collect()
}

pub fn main(global: GlobalArgs, args: CliArgs) -> Result<()> {
    if global.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }
    std::fs::create_dir_all(&args.temp_dir).with_context(|| format!("could not create temp-dir {}", args.temp_dir.display()))?;

    let query_files = match (&args.query_file, &args.query_file_list) {
        (Some(q), None) => vec![q.clone()],
        (None, Some(list)) => read_list(list)?,
        (Some(_), Some(_)) => bail!("give only one of -q/--query-file and --query-file-list"),
        (None, None) => bail!("one of -q/--query-file or --query-file-list is required"),
    };

    let out_files: Vec<Option<PathBuf>> = match (&args.out_file, &args.out_file_list) {
        (Some(o), None) => {
            if query_files.len() > 1 {
                bail!("can't print results for multiple query files to one output file; use --out-file-list");
            }
            vec![Some(o.clone())]
        }
        (None, Some(list)) => read_list(list)?.into_iter().map(Some).collect(),
        (Some(_), Some(_)) => bail!("give only one of -o/--out-file and --out-file-list"),
        (None, None) => {
            if query_files.len() > 1 {
                bail!("can't print results for multiple query files to stdout; supply --out-file-list");
            }
            vec![None]
        }
    };
    if out_files.len() != query_files.len() {
        bail!("number of query files ({}) and out files ({}) do not match", query_files.len(), out_files.len());
    }
    if args.sort_output_lines && out_files.iter().any(|f| f.is_none()) {
        bail!("--sort-output-lines requires an output file, not stdout");
    }
    if args.auxiliary_info_file.is_some() && query_files.len() > 1 {
        bail!("--auxiliary-info-file only supports a single query file, since read ids are not unique across query files");
    }

    log::info!("loading index {}", args.index_prefix.display());
    let index = ThemistoIndex::load(&args.index_prefix)?;
    let ctx = Arc::new(PseudoalignContext { sbwt: index.sbwt, core_map: index.core_map, store: index.store });

    let mode = if args.threshold >= 1.0 {
        CombineMode::Intersection
    } else {
        CombineMode::Threshold { fraction: args.threshold }
    };
    let config = AlignConfig {
        mode,
        reverse_complements: args.rc,
        ignore_unknown_kmers: !args.include_unknown_kmers,
        relevant_kmers_fraction: args.relevant_kmers_fraction,
        sort_hits: args.sort_hits,
    };
    let buffer_size = ((args.buffer_size_megas * (1 << 20) as f64) as usize).max(1);

    let aux_writer = args
        .auxiliary_info_file
        .as_deref()
        .map(AuxInfoWriter::create)
        .transpose()?
        .map(Arc::new);

    for (query_path, out_path) in query_files.iter().zip(out_files.iter()) {
        log::info!("aligning {}", query_path.display());
        let source = open_reader(query_path)?;
        let writer: Arc<dyn OutputWriter> = match (out_path, args.gzip_output) {
            (Some(path), true) => Arc::new(GzipWriter::create(path)?),
            (Some(path), false) => Arc::new(RawFileWriter::create(path)?),
            (None, _) => Arc::new(StdoutWriter::new()),
        };
        themisto_core::pseudoalign::run(
            Arc::clone(&ctx),
            source,
            writer,
            aux_writer.clone(),
            config,
            args.n_threads.max(1),
            buffer_size,
            args.sort_output_lines,
            &args.temp_dir,
            out_path.as_deref(),
        )?;
    }

    Ok(())
}
