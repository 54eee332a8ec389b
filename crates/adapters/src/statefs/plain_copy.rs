// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recursive-copy [`StateFs`] driver. Portable fallback when the backing
//! filesystem offers no copy-on-write primitive.

use super::{StateFs, StateFsError, StateFsKind};
use async_trait::async_trait;
use std::path::Path;

#[derive(Default)]
pub struct PlainCopyStateFs;

impl PlainCopyStateFs {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StateFs for PlainCopyStateFs {
    fn kind(&self) -> StateFsKind {
        StateFsKind::PlainCopy
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

        if let Err(e) = copy_dir_recursive(source, dest).await {
            let _ = tokio::fs::remove_dir_all(dest).await;
            return Err(StateFsError::Clone(format!(
                "copying {source:?} to {dest:?}: {e}"
            )));
        }
        Ok(())
    }

    async fn remove(&self, dir: &Path) -> Result<(), StateFsError> {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateFsError::Remove(format!("removing {dir:?}: {e}"))),
        }
    }
}

#[async_recursion::async_recursion]
async fn copy_dir_recursive(source: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let mut entries = tokio::fs::read_dir(source).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&from, &to).await?;
        } else if file_type.is_symlink() {
            let target = tokio::fs::read_link(&from).await?;
            tokio::fs::symlink(target, &to).await?;
        } else {
            tokio::fs::copy(&from, &to).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "plain_copy_tests.rs"]
mod tests;
