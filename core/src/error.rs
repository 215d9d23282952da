/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Error kinds shared across the build and query pipelines.
//!
//! Four kinds, matching the taxonomy the index build/query pipeline
//! actually distinguishes: malformed input, I/O failure, an internal
//! invariant violation, and a bad combination of configuration flags.
//! Per-read malformed content during pseudoalignment is *not* reported
//! through this type: a malformed read degrades to an empty color list
//! and processing continues (see [`crate::pseudoalign::worker`]).

use std::path::PathBuf;

/// Errors that can unwind out of `themisto-core` to a caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input sequence or color file could not be parsed.
    #[error("malformed input in {path:?}: {reason}")]
    Malformed { path: Option<PathBuf>, reason: String },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated (bit-layout assertion, k-mer
    /// length bound, color-set id out of range, ...). These are bugs,
    /// not user errors, but we still surface them as a normal `Result`
    /// so the CLI can report them and exit cleanly rather than panic
    /// mid-write with temp files left behind.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// Two or more configuration flags are mutually incompatible.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn malformed(path: impl Into<Option<PathBuf>>, reason: impl Into<String>) -> Self {
        Error::Malformed { path: path.into(), reason: reason.into() }
    }

    pub fn invariant(reason: impl Into<String>) -> Self {
        Error::Invariant(reason.into())
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
