// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`StateFs`] for engine tests: records calls, can be configured
//! to fail `clone_into`, and otherwise performs a real recursive copy on
//! tempdir-backed paths so callers can assert on the resulting tree.

use super::{StateFs, StateFsError, StateFsKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum StateFsCall {
    EnsureBaseDir(PathBuf),
    CloneInto { source: PathBuf, dest: PathBuf },
    Remove(PathBuf),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<StateFsCall>,
    clone_fails: bool,
    drop_pg_version_on_next_clone: bool,
}

pub struct FakeStateFs {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeStateFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStateFs {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn calls(&self) -> Vec<StateFsCall> {
        self.state.lock().calls.clone()
    }

    pub fn fail_clone(&self) {
        self.state.lock().clone_fails = true;
    }

    /// Make the next `clone_into` land without `PG_VERSION` in `dest`, as a
    /// partial/corrupt copy-on-write clone would. Consumed after one call;
    /// subsequent clones are unaffected.
    pub fn drop_pg_version_on_next_clone(&self) {
        self.state.lock().drop_pg_version_on_next_clone = true;
    }
}

#[async_trait]
impl StateFs for FakeStateFs {
    fn kind(&self) -> StateFsKind {
        StateFsKind::PlainCopy
    }

    async fn ensure_base_dir(&self, dir: &Path) -> Result<(), StateFsError> {
        self.state
            .lock()
            .calls
            .push(StateFsCall::EnsureBaseDir(dir.to_path_buf()));
        tokio::fs::create_dir_all(dir).await?;
        Ok(())
    }

    async fn clone_into(&self, source: &Path, dest: &Path) -> Result<(), StateFsError> {
        self.state.lock().calls.push(StateFsCall::CloneInto {
            source: source.to_path_buf(),
            dest: dest.to_path_buf(),
        });
        if self.state.lock().clone_fails {
            return Err(StateFsError::Clone(format!(
                "fake clone failure: {source:?} -> {dest:?}"
            )));
        }
        if dest.exists() {
            return Err(StateFsError::Clone(format!(
                "destination {dest:?} already exists"
            )));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        copy_dir(source, dest).await?;

        let drop_pg_version = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.drop_pg_version_on_next_clone)
        };
        if drop_pg_version {
            let pg_version = dest.join("PG_VERSION");
            match tokio::fs::remove_file(&pg_version).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn remove(&self, dir: &Path) -> Result<(), StateFsError> {
        self.state.lock().calls.push(StateFsCall::Remove(dir.to_path_buf()));
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StateFsError::Remove(e.to_string())),
        }
    }
}

#[async_recursion::async_recursion]
async fn copy_dir(source: &Path, dest: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dest).await?;
    let mut entries = tokio::fs::read_dir(source).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir(&from, &to).await?;
        } else {
            tokio::fs::copy(&from, &to).await?;
        }
    }
    Ok(())
}
