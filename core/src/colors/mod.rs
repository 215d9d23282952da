/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Color-set machinery: the per-set codec (C6), the concatenated store
//! (C7), and the node-to-color-set map (C8).

pub mod codec;
pub mod node_map;
pub mod store;

pub use codec::ColorSet;
pub use node_map::{build as build_node_map, CoreKmerMap, DEFAULT_SAMPLING_DISTANCE};
pub use store::{ColorSetStore, ColorSetStoreBuilder, ColorSetView};
