/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Input parsing: sequence sources and color-assignment files.

pub mod colors;
pub mod seq;

pub use colors::{read_file_colors_list, read_per_sequence_colors};
pub use seq::{detect_format, normalize_bases, open_reader, Record, SeqFormat, SequenceSource};
