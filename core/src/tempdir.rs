/*
 * SPDX-FileCopyrightText: 2023 Inria
 * SPDX-FileCopyrightText: 2023 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Temporary-file management (ambient, spec §6's `--temp-dir`):
//! allocates uniquely named scratch files rooted at one directory for
//! the lifetime of a build or query run, and removes anything left
//! behind on drop.
//!
//! Grounded in `examples/original_source/include/globals.hh`'s
//! process-wide `get_temp_file_manager()` (`create_filename(prefix,
//! suffix)`, `set_dir`), reworked here as an owned, non-global value
//! built on [`tempfile::Builder`] rather than a singleton.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates scratch file paths under a single root directory and
/// deletes the whole root on drop, unless told to [`keep`](Self::keep)
/// it (e.g. so a caller can inspect intermediate sort runs after a
/// failure).
pub struct TempFileManager {
    root: PathBuf,
    counter: AtomicU64,
    owns_root: bool,
    keep: bool,
}

impl TempFileManager {
    /// Creates a fresh uniquely named subdirectory under `parent`
    /// (which must already exist) and roots all allocations there.
    pub fn new_in(parent: &Path) -> std::io::Result<Self> {
        let root = tempfile::Builder::new()
            .prefix("themisto-")
            .tempdir_in(parent)?
            .into_path();
        Ok(TempFileManager { root, counter: AtomicU64::new(0), owns_root: true, keep: false })
    }

    /// Roots allocations directly at `root` without creating or owning
    /// a new directory (used when the CLI already manages its own
    /// `--temp-dir`'s lifetime).
    pub fn at(root: PathBuf) -> Self {
        TempFileManager { root, counter: AtomicU64::new(0), owns_root: false, keep: false }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Suppresses the directory removal normally performed on drop.
    pub fn keep(&mut self) {
        self.keep = true;
    }

    /// Returns a path for a new scratch file; does not create the
    /// file itself. `prefix`/`suffix` are cosmetic, matching the
    /// original's `create_filename(prefix, suffix)` signature.
    pub fn create_filename(&self, prefix: &str, suffix: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!("{prefix}{n}{suffix}"))
    }
}

impl Drop for TempFileManager {
    fn drop(&mut self) {
        if self.owns_root && !self.keep {
            let _ = std::fs::remove_dir_all(&self.root);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_filenames_are_unique_and_under_root() {
        let parent = tempfile::tempdir().unwrap();
        let mgr = TempFileManager::new_in(parent.path()).unwrap();
        let a = mgr.create_filename("run-", ".bin");
        let b = mgr.create_filename("run-", ".bin");
        assert_ne!(a, b);
        assert!(a.starts_with(mgr.root()));
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("run-"));
        assert!(a.file_name().unwrap().to_str().unwrap().ends_with(".bin"));
    }

    #[test]
    fn root_directory_is_removed_on_drop_by_default() {
        let parent = tempfile::tempdir().unwrap();
        let root_path;
        {
            let mgr = TempFileManager::new_in(parent.path()).unwrap();
            root_path = mgr.root().to_path_buf();
            std::fs::write(mgr.create_filename("x", ".tmp"), b"data").unwrap();
            assert!(root_path.exists());
        }
        assert!(!root_path.exists());
    }

    #[test]
    fn keep_suppresses_removal_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let root_path;
        {
            let mut mgr = TempFileManager::new_in(parent.path()).unwrap();
            mgr.keep();
            root_path = mgr.root().to_path_buf();
        }
        assert!(root_path.exists());
        std::fs::remove_dir_all(&root_path).unwrap();
    }
}
