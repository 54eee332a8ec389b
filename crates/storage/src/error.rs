// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by the queue store and its underlying WAL/snapshot layers.

use crate::snapshot::SnapshotError;
use crate::wal::WalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("write-ahead log error: {0}")]
    Wal(#[from] WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("task not found: {job_id}/{task_id}")]
    TaskNotFound { job_id: String, task_id: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("state store not ready: {0}")]
    NotReady(String),
}
