/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! `themisto`: command-line interface over `themisto-core`.
//!
//! Grounded in `examples/vigna-webgraph-rs/cli/src/{main,lib}.rs`'s
//! split between a thin `main.rs` and a `lib.rs` that owns the
//! top-level [`clap::Parser`], logger initialization and dispatch —
//! and in `cli/src/build/mod.rs`'s per-subcommand module layout, one
//! file per leaf command with its own `CliArgs` and `main`.

use anyhow::Result;
use clap::{Parser, Subcommand};

pub mod build;
pub mod dump_color_matrix;
pub mod pseudoalign;
pub mod stats;

/// Arguments shared by every subcommand.
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalArgs {
    /// More verbose progress reporting into stderr (equivalent to
    /// `RUST_LOG=debug`, which still takes precedence if set).
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// Builds a colored de Bruijn graph index from a set of sequence files.
    Build(build::CliArgs),
    /// Pseudoaligns query sequences against a previously built index.
    Pseudoalign(pseudoalign::CliArgs),
    /// Dumps one color row per k-mer of the index.
    DumpColorMatrix(dump_color_matrix::CliArgs),
    /// Prints the size in bits of each on-disk structure.
    Stats(stats::CliArgs),
    /// Generates shell completions. Use with `source <(themisto completions bash)`.
    Completions(CompletionsArgs),
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Parser, Debug)]
#[command(name = "themisto", version, about = "A colored de Bruijn graph (cDBG) index: build and pseudoalign.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: SubCommands,
    #[clap(flatten)]
    pub args: GlobalArgs,
}

/// Initializes `env_logger` with `RUST_LOG` honored and an `info`
/// default filter.
pub fn init_env_logger() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    Ok(())
}

/// The entry point of the command-line interface.
pub fn cli_main<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let start = std::time::Instant::now();
    let cli = Cli::parse_from(args);
    match cli.command {
        SubCommands::Build(args) => build::main(cli.args, args)?,
        SubCommands::Pseudoalign(args) => pseudoalign::main(cli.args, args)?,
        SubCommands::DumpColorMatrix(args) => dump_color_matrix::main(cli.args, args)?,
        SubCommands::Stats(args) => stats::main(cli.args, args)?,
        SubCommands::Completions(args) => {
            use clap::CommandFactory;
            clap_complete::generate(args.shell, &mut Cli::command(), "themisto", &mut std::io::stdout());
        }
    }
    log::info!("done in {:.3}s", start.elapsed().as_secs_f64());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_build_subcommand() {
        let cli = Cli::parse_from(["themisto", "build", "-k", "31", "-i", "a.fasta", "-o", "idx", "--temp-dir", "tmp"]);
        match cli.command {
            SubCommands::Build(a) => assert_eq!(a.k, 31),
            _ => panic!("expected Build"),
        }
    }

    #[test]
    fn parses_pseudoalign_subcommand() {
        let cli = Cli::parse_from(["themisto", "pseudoalign", "-i", "idx", "--temp-dir", "tmp", "-q", "q.fasta", "-o", "out.txt"]);
        matches!(cli.command, SubCommands::Pseudoalign(_));
    }
}
