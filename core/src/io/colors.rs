/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Color-file parsing (ambient, spec §6 "color assignment"): the
//! `-c`/`--colors-file` one-color-per-sequence format, and the
//! `--file-colors` variant where every sequence in one input file
//! shares a single color (grounded in `examples/original_source/include/input_reading.hh`'s
//! `read_colorfile`/`parse_color_file` pair).

use crate::error::{Error, Result};
use std::io::BufRead;
use std::path::Path;

/// Reads one integer color id per line, returned in file order — used
/// for `--colors-file`, one line per input sequence.
pub fn read_per_sequence_colors(path: &Path) -> Result<Vec<u32>> {
    let file = std::fs::File::open(path).map_err(Error::Io)?;
    let reader = std::io::BufReader::new(file);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(Error::Io)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let color: u32 = trimmed.parse().map_err(|_| {
            Error::malformed(
                Some(path.to_path_buf()),
                format!("line {}: expected an integer color id, got {trimmed:?}", lineno + 1),
            )
        })?;
        out.push(color);
    }
    Ok(out)
}

/// Reads the `--file-colors` mapping: each line is `<fasta/fastq path>
/// <color id>`, and every sequence inside that file is assigned that
/// one color. Returns `(path, color)` pairs in file order.
pub fn read_file_colors_list(path: &Path) -> Result<Vec<(std::path::PathBuf, u32)>> {
    let file = std::fs::File::open(path).map_err(Error::Io)?;
    let reader = std::io::BufReader::new(file);
    let mut out = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(Error::Io)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.split_whitespace();
        let (Some(file_field), Some(color_field)) = (parts.next(), parts.next()) else {
            return Err(Error::malformed(
                Some(path.to_path_buf()),
                format!("line {}: expected '<file> <color>'", lineno + 1),
            ));
        };
        let color: u32 = color_field.parse().map_err(|_| {
            Error::malformed(
                Some(path.to_path_buf()),
                format!("line {}: expected an integer color id, got {color_field:?}", lineno + 1),
            )
        })?;
        out.push((std::path::PathBuf::from(file_field), color));
    }
    Ok(out)
}
