// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State filesystem capability set (spec.md §4.C "Snapshot drivers").
//!
//! A state-cache entry is a PostgreSQL data directory on disk. Cloning one
//! into a fresh instance directory is the hot path of the whole engine, so
//! the driver is pluggable: plain recursive copy always works, copy-on-write
//! (`cp --reflink` + `btrfs subvolume delete`) is far cheaper when the
//! backing filesystem supports it.

mod cow;
mod plain_copy;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use cow::CowStateFs;
pub use plain_copy::PlainCopyStateFs;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeStateFs, StateFsCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateFsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot clone state: {0}")]
    Clone(String),
    #[error("cannot remove state: {0}")]
    Remove(String),
}

/// Identifies which cloning strategy a driver implements, surfaced in
/// diagnostics and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFsKind {
    PlainCopy,
    Cow,
}

#[async_trait]
pub trait StateFs: Send + Sync + 'static {
    fn kind(&self) -> StateFsKind;

    /// Create `dir` (and parents) if absent. Idempotent.
    async fn ensure_base_dir(&self, dir: &Path) -> Result<(), StateFsError>;

    /// Clone the state directory at `source` into `dest`, which must not
    /// already exist. On failure, `dest` must not be left as a usable
    /// partial clone (spec.md §4.C: a clone error must not consume the
    /// cache entry).
    async fn clone_into(&self, source: &Path, dest: &Path) -> Result<(), StateFsError>;

    /// Remove a state directory entirely.
    async fn remove(&self, dir: &Path) -> Result<(), StateFsError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
