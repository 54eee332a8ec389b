// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Copy-on-write [`StateFs`] driver for btrfs-style filesystems.
//!
//! `clone_into` uses `cp --reflink=always` so the clone shares blocks with
//! its source until either side is written to; `remove` prefers
//! `btrfs subvolume delete` and falls back to a plain recursive remove for
//! paths that were never promoted to a subvolume (e.g. a state directory
//! created before the filesystem supported it).

use super::{StateFs, StateFsError, StateFsKind};
use crate::subprocess::{run_with_timeout, DEFAULT_CLONE_TIMEOUT};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;

pub struct CowStateFs;

impl Default for CowStateFs {
    fn default() -> Self {
        Self::new()
    }
}

impl CowStateFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateFs for CowStateFs {
    fn kind(&self) -> StateFsKind {
        StateFsKind::Cow
    }

    async fn ensure_base_dir(&self, dir: &Path) -> Result<(), StateFsError> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    async fn clone_into(&self, source: &Path, dest: &Path) -> Result<(), StateFsError> {
        if dest.exists() {
            return Err(StateFsError::Clone(format!(
                "destination {dest:?} already exists"
            )));
        }
        let parent = dest
            .parent()
            .ok_or_else(|| StateFsError::Clone(format!("{dest:?} has no parent directory")))?;
        tokio::fs::create_dir_all(parent).await?;

        let mut cmd = Command::new("cp");
        cmd.args(["--reflink=always", "-a"]);
        cmd.arg(source);
        cmd.arg(dest);
        let output = run_with_timeout(cmd, DEFAULT_CLONE_TIMEOUT, "cp --reflink")
            .await
            .map_err(StateFsError::Clone)?;
        if !output.status.success() {
            let _ = tokio::fs::remove_dir_all(dest).await;
            return Err(StateFsError::Clone(format!(
                "cp --reflink {source:?} -> {dest:?}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn remove(&self, dir: &Path) -> Result<(), StateFsError> {
        if !dir.exists() {
            return Ok(());
        }

        let mut subvol_delete = Command::new("btrfs");
        subvol_delete.args(["subvolume", "delete"]);
        subvol_delete.arg(dir);
        match run_with_timeout(subvol_delete, DEFAULT_CLONE_TIMEOUT, "btrfs subvolume delete")
            .await
        {
            Ok(output) if output.status.success() => return Ok(()),
            _ => {}
        }

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateFsError::Remove(format!("removing {dir:?}: {e}"))),
        }
    }
}

#[cfg(test)]
#[path = "cow_tests.rs"]
mod tests;
