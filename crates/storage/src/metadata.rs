// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata store for persisted state/instance records (spec.md §3, §4.C).
//!
//! Unlike the queue store, this store holds no event timeline: state and
//! instance records change rarely (once per state materialization, once per
//! instance start/stop), so every mutation is persisted by atomically
//! rewriting the whole file — the same tmp+fsync+rename pattern [`crate::Snapshot`]
//! uses for queue checkpoints, just without a WAL in front of it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlrs_core::{InstanceEntry, InstanceId, StateEntry};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("state not found: {0}")]
    StateNotFound(String),
    #[error("instance not found: {0}")]
    InstanceNotFound(String),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct MetadataFile {
    states: HashMap<String, StateEntry>,
    instances: HashMap<String, InstanceEntry>,
}

/// Durable store of [`StateEntry`] and [`InstanceEntry`] records, backed by a
/// single JSON file rewritten atomically on every mutation.
pub struct MetadataStore {
    path: PathBuf,
    inner: Mutex<MetadataFile>,
}

impl MetadataStore {
    /// Open (or create) the metadata store at `path`. A corrupt file is
    /// rotated to `.bak` and the store starts empty, matching snapshot
    /// recovery (spec.md §4.E "Corruption handling").
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MetadataError> {
        let path = path.into();
        let file = load_or_default(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(file),
        })
    }

    pub fn get_state(&self, state_id: &str) -> Option<StateEntry> {
        self.inner.lock().states.get(state_id).cloned()
    }

    pub fn list_states(&self) -> Vec<StateEntry> {
        self.inner.lock().states.values().cloned().collect()
    }

    pub fn put_state(&self, entry: StateEntry) -> Result<(), MetadataError> {
        let mut guard = self.inner.lock();
        guard.states.insert(entry.state_id.clone(), entry);
        persist(&self.path, &guard)
    }

    pub fn remove_state(&self, state_id: &str) -> Result<(), MetadataError> {
        let mut guard = self.inner.lock();
        guard.states.remove(state_id);
        persist(&self.path, &guard)
    }

    /// Adjust `state_id`'s reference count by `delta`, clamped at zero, and
    /// return the resulting count.
    pub fn adjust_ref_count(&self, state_id: &str, delta: i64) -> Result<u32, MetadataError> {
        let mut guard = self.inner.lock();
        let entry = guard
            .states
            .get_mut(state_id)
            .ok_or_else(|| MetadataError::StateNotFound(state_id.to_string()))?;
        entry.ref_count = (i64::from(entry.ref_count) + delta).max(0) as u32;
        let count = entry.ref_count;
        persist(&self.path, &guard)?;
        Ok(count)
    }

    pub fn get_instance(&self, instance_id: &InstanceId) -> Option<InstanceEntry> {
        self.inner.lock().instances.get(instance_id.as_str()).cloned()
    }

    pub fn list_instances(&self) -> Vec<InstanceEntry> {
        self.inner.lock().instances.values().cloned().collect()
    }

    pub fn put_instance(&self, entry: InstanceEntry) -> Result<(), MetadataError> {
        let mut guard = self.inner.lock();
        guard
            .instances
            .insert(entry.instance_id.as_str().to_string(), entry);
        persist(&self.path, &guard)
    }

    pub fn remove_instance(&self, instance_id: &InstanceId) -> Result<(), MetadataError> {
        let mut guard = self.inner.lock();
        guard.instances.remove(instance_id.as_str());
        persist(&self.path, &guard)
    }

    /// States with a zero reference count, ordered however the backing map
    /// iterates — candidates for retention trimming (spec.md §4.G).
    pub fn unreferenced_states(&self) -> Vec<StateEntry> {
        self.inner
            .lock()
            .states
            .values()
            .filter(|s| s.ref_count == 0)
            .cloned()
            .collect()
    }
}

fn load_or_default(path: &Path) -> Result<MetadataFile, MetadataError> {
    if !path.exists() {
        return Ok(MetadataFile::default());
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    match serde_json::from_reader(reader) {
        Ok(data) => Ok(data),
        Err(e) => {
            let bak_path = crate::snapshot::rotate_bak_path(path);
            warn!(
                error = %e,
                path = %path.display(),
                bak = %bak_path.display(),
                "corrupt metadata store, moving to .bak and starting fresh",
            );
            fs::rename(path, &bak_path)?;
            Ok(MetadataFile::default())
        }
    }
}

fn persist(path: &Path, data: &MetadataFile) -> Result<(), MetadataError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, data)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
