/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! `themisto build`: constructs a `P.tdbg`/`P.tcolors` index pair from
//! a set of sequence files (spec §6).
//!
//! Grounded in `examples/original_source/tests/test_CLI.hh`'s
//! `build_index_main` invocations for the exact option names (`-k`,
//! `-i`, `-o`, `--temp-dir`, `-c`/`--color-file`, `--file-colors`,
//! `--reverse-complements`, `--no-colors`, `--load-dbg`); `-i` and
//! `-c` accept multiple occurrences here rather than the original's
//! file-of-filenames indirection (see `DESIGN.md`).

use crate::GlobalArgs;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use themisto_core::build::{build_colors_for_existing_sbwt, build_index, BuildOptions, InputFile};
use themisto_core::colors::DEFAULT_SAMPLING_DISTANCE;
use themisto_core::io::read_per_sequence_colors;
use themisto_core::kmer::KMER_MAX_LEN;
use themisto_core::sbwt::Sbwt;
use themisto_core::sort::{RecordShape, SortConfig};

#[derive(Parser, Debug)]
#[command(name = "build")]
pub struct CliArgs {
    /// k-mer length (the size of a de Bruijn graph node label).
    #[arg(short = 'k', long)]
    pub k: usize,

    /// Input sequence file(s) (FASTA/FASTQ, optionally gzipped). Give
    /// `-i` more than once for multiple files.
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Output index prefix: writes `<prefix>.tdbg` and `<prefix>.tcolors`.
    #[arg(short = 'o', long)]
    pub output: PathBuf,

    /// Directory for temporary files used during external-memory sorting.
    #[arg(long = "temp-dir")]
    pub temp_dir: PathBuf,

    /// One integer color per sequence (in the order sequences appear
    /// across all `-i` files), line-delimited.
    #[arg(short = 'c', long = "color-file")]
    pub color_file: Option<PathBuf>,

    /// Assigns every sequence in the `n`-th `-i` file the color `n`,
    /// instead of one color per sequence.
    #[arg(long = "file-colors")]
    pub file_colors: bool,

    /// Also index the reverse complement of every input sequence.
    #[arg(long = "reverse-complements")]
    pub reverse_complements: bool,

    /// Build the SBWT only, without a color-set index.
    #[arg(long = "no-colors")]
    pub no_colors: bool,

    /// Skip building the SBWT and load it from `<output>.tdbg` (which
    /// must already exist from a previous build), building only the
    /// color-set index.
    #[arg(long = "load-dbg")]
    pub load_dbg: bool,

    /// Number of threads for external-memory sorting.
    #[arg(short = 't', long = "n-threads", default_value_t = num_cpus::get())]
    pub n_threads: usize,

    /// RAM budget (megabytes) for the external-memory sort passes.
    #[arg(long = "mem-megas", default_value_t = 1024)]
    pub mem_megas: usize,
}

pub fn main(global: GlobalArgs, args: CliArgs) -> Result<()> {
    if global.verbose {
        log::set_max_level(log::LevelFilter::Debug);
    }
    if args.no_colors && args.color_file.is_some() {
        bail!("must not give both --no-colors and --color-file");
    }
    if args.no_colors && args.file_colors {
        bail!("must not give both --no-colors and --file-colors");
    }
    if args.k == 0 || args.k + 1 > KMER_MAX_LEN {
        bail!("k must be in 1..={}", KMER_MAX_LEN - 1);
    }
    std::fs::create_dir_all(&args.temp_dir)
        .with_context(|| format!("could not create temp-dir {}", args.temp_dir.display()))?;

    // `--no-colors` still builds a color-set index (ThemistoIndex has
    // no colorless variant), but collapses every sequence onto one
    // shared color so the color-set structures carry no information
    // (see DESIGN.md).
    let input_files: Vec<InputFile> = args
        .input
        .iter()
        .enumerate()
        .map(|(i, path)| InputFile {
            path: path.clone(),
            fixed_color: if args.no_colors {
                Some(0)
            } else if args.file_colors {
                Some(i as u32)
            } else {
                None
            },
        })
        .collect();

    let per_sequence_colors = match &args.color_file {
        Some(path) if !args.file_colors => Some(read_per_sequence_colors(path)?),
        _ => None,
    };

    let shape = RecordShape::Fixed(themisto_core::kmer::Kmer::SERIALIZED_SIZE + 1);
    let sort_config = SortConfig::new(args.mem_megas * (1 << 20), args.n_threads, shape);
    let mut options = BuildOptions::new(args.k, sort_config);
    options.reverse_complements = args.reverse_complements;
    options.sampling_distance = DEFAULT_SAMPLING_DISTANCE;

    log::info!("building index at prefix {}", args.output.display());
    let index = if args.load_dbg {
        let tdbg_path = append_extension(&args.output, "tdbg");
        let file = std::fs::File::open(&tdbg_path).with_context(|| format!("--load-dbg: could not open {}", tdbg_path.display()))?;
        let mut reader = std::io::BufReader::new(file);
        let sbwt = Sbwt::read_from(&mut reader).with_context(|| format!("--load-dbg: could not parse {}", tdbg_path.display()))?;
        build_colors_for_existing_sbwt(sbwt, &input_files, per_sequence_colors.as_deref(), &options, &args.temp_dir)?
    } else {
        build_index(&input_files, per_sequence_colors.as_deref(), &options, &args.temp_dir)?
    };

    index.save(&args.output)?;
    log::info!("wrote {} node(s), {} color set(s)", index.sbwt.n_nodes(), index.store.n_sets());
    Ok(())
}

fn append_extension(prefix: &std::path::Path, ext: &str) -> PathBuf {
    let mut s = prefix.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}
