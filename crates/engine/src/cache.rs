// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State cache (spec.md §4.C): maps `(image-id, state-id)` to a persistent
//! state directory, validates presence, invalidates dirty entries, and
//! serializes rebuilds of the same output state ID behind a per-state
//! advisory build lock.

use crate::config::OrchestratorConfig;
use crate::error::EngineError;
use fs2::FileExt;
use sqlrs_adapters::{StateFs, StateFsKind};
use sqlrs_storage::MetadataStore;
use sqlrs_core::StateEntry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of probing the cache for a state ID (spec.md §4.C "Lookup").
pub enum CacheLookup {
    Hit(StateEntry),
    Miss,
    /// The metadata record exists but the on-disk directory fails the
    /// presence check (`postmaster.pid` present or `PG_VERSION` missing).
    Dirty(StateEntry),
}

fn driver_tag(kind: StateFsKind) -> &'static str {
    match kind {
        StateFsKind::PlainCopy => "plain",
        StateFsKind::Cow => "cow",
    }
}

async fn state_dir_is_present(dir: &Path) -> Result<bool, EngineError> {
    let has_pg_version = tokio::fs::try_exists(dir.join("PG_VERSION"))
        .await
        .map_err(|e| EngineError::internal_with_source("cannot check state cache", e))?;
    if !has_pg_version {
        return Ok(false);
    }
    let has_postmaster_pid = tokio::fs::try_exists(dir.join("postmaster.pid"))
        .await
        .map_err(|e| EngineError::internal_with_source("cannot check state cache", e))?;
    Ok(!has_postmaster_pid)
}

/// An exclusive advisory lock on `<state-dir>/.build.lock-<driver>`, held
/// for the duration of a state rebuild (spec.md §4.C "Build lock"). Released
/// on drop.
pub struct BuildLock {
    path: PathBuf,
    file: Option<std::fs::File>,
}

impl BuildLock {
    fn acquire_blocking(path: PathBuf) -> Result<Self, EngineError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| EngineError::internal_with_source("cannot acquire state build lock", e))?;
        file.lock_exclusive()
            .map_err(|e| EngineError::internal_with_source("cannot acquire state build lock", e))?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// The content-addressed state cache (spec.md §4.C).
pub struct StateCache {
    config: OrchestratorConfig,
    metadata: Arc<MetadataStore>,
    statefs: Arc<dyn StateFs>,
}

impl StateCache {
    pub fn new(
        config: OrchestratorConfig,
        metadata: Arc<MetadataStore>,
        statefs: Arc<dyn StateFs>,
    ) -> Self {
        Self {
            config,
            metadata,
            statefs,
        }
    }

    /// `<state-store>/engines/<image-id>/states/<state-id>/` (spec.md §6
    /// "State store layout").
    pub fn state_dir(&self, image_id: &str, state_id: &str) -> PathBuf {
        self.config
            .states_root()
            .join(sanitize_image_id(image_id))
            .join("states")
            .join(state_id)
    }

    pub async fn lookup(&self, state_id: &str) -> Result<CacheLookup, EngineError> {
        let Some(entry) = self.metadata.get_state(state_id) else {
            return Ok(CacheLookup::Miss);
        };
        let dir = self.state_dir(&entry.image_id, state_id);
        if state_dir_is_present(&dir).await? {
            Ok(CacheLookup::Hit(entry))
        } else {
            Ok(CacheLookup::Dirty(entry))
        }
    }

    /// Delete a dirty or stale entry's metadata record and on-disk directory
    /// (spec.md §4.C: "the StateEntry is deleted, the directory contents
    /// are removed ... and the step falls through to rebuild").
    pub async fn invalidate(&self, state_id: &str) -> Result<(), EngineError> {
        let Some(entry) = self.metadata.get_state(state_id) else {
            return Ok(());
        };
        let dir = self.state_dir(&entry.image_id, state_id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            self.statefs
                .remove(&dir)
                .await
                .map_err(|e| EngineError::internal_with_source("cannot invalidate state cache", e))?;
        }
        self.metadata.remove_state(state_id)?;
        info!(state_id, "state cache entry invalidated");
        Ok(())
    }

    pub fn put(&self, entry: StateEntry) -> Result<(), EngineError> {
        self.metadata.put_state(entry).map_err(EngineError::from)
    }

    /// Reclaim `state_id`'s on-disk directory and metadata record once no
    /// instance references it any longer (spec.md §3 "deleted when
    /// invalidated or trimmed", §4.G). A no-op if the entry is already gone
    /// or still referenced — callers are expected to have just decremented
    /// the ref count via [`MetadataStore::adjust_ref_count`].
    pub async fn remove_if_unreferenced(&self, state_id: &str) -> Result<(), EngineError> {
        let Some(entry) = self.metadata.get_state(state_id) else {
            return Ok(());
        };
        if entry.ref_count != 0 {
            return Ok(());
        }
        let dir = self.state_dir(&entry.image_id, state_id);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            self.statefs
                .remove(&dir)
                .await
                .map_err(|e| EngineError::internal_with_source("cannot reclaim unreferenced state", e))?;
        }
        self.metadata.remove_state(state_id)?;
        info!(state_id, "unreferenced state reclaimed");
        Ok(())
    }

    /// Acquire the exclusive build lock for `state_id`, creating the state
    /// directory if it doesn't yet exist. Honors `cancel` since the
    /// underlying lock acquisition has no timeout of its own (spec.md §5
    /// "Timeouts").
    pub async fn acquire_build_lock(
        &self,
        image_id: &str,
        state_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BuildLock, EngineError> {
        let dir = self.state_dir(image_id, state_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot acquire state build lock", e))?;

        let tag = driver_tag(self.statefs.kind());
        let lock_path = dir.join(format!(".build.lock-{tag}"));

        let blocking_path = lock_path.clone();
        let lock_task = tokio::task::spawn_blocking(move || BuildLock::acquire_blocking(blocking_path));

        tokio::select! {
            joined = lock_task => {
                match joined {
                    Ok(result) => {
                        if result.is_ok() {
                            info!(state_id, path = %lock_path.display(), "state build lock acquired");
                        }
                        result
                    }
                    Err(e) => Err(EngineError::internal_with_source(
                        "cannot acquire state build lock",
                        e,
                    )),
                }
            }
            _ = cancel.cancelled() => {
                warn!(state_id, "build lock acquisition cancelled");
                Err(EngineError::Cancelled)
            }
        }
    }
}

/// Image references may contain `/` and `:` (repo/tag) and `@sha256:...`
/// digests; collapse them to a filesystem-safe directory component.
fn sanitize_image_id(image_id: &str) -> String {
    image_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
