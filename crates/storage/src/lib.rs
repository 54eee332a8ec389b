// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlrs-storage: the queue store (spec.md §4.E) — serializable job/task/
//! event operations over a durable, WAL-backed materialized state, plus the
//! event bus and background checkpointer that back it — and the metadata
//! store of persisted state/instance records (spec.md §3, §4.C).

mod checkpoint;
mod error;
mod event_bus;
mod metadata;
mod queue_op;
mod snapshot;
mod state;
mod store;
mod wal;

pub use checkpoint::{
    load_snapshot, CheckpointError, CheckpointHandle, CheckpointResult, CheckpointWriter,
    Checkpointer, FsCheckpointWriter,
};
pub use error::StorageError;
pub use event_bus::EventBus;
pub use metadata::{MetadataError, MetadataStore};
pub use queue_op::QueueOp;
pub use snapshot::{Snapshot, SnapshotError};
pub use state::MaterializedState;
pub use store::{QueueStore, WalQueueStore};
pub use wal::{Wal, WalEntry, WalError};
