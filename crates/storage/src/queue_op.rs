// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The mutation log entries replayed to rebuild [`crate::MaterializedState`].
//!
//! The public queue store operations (`CreateJob`, `UpdateTask`, ...) each
//! append exactly one `QueueOp` to the WAL before applying it in memory, so
//! replaying the WAL from an empty state reproduces the store exactly.

use serde::{Deserialize, Serialize};
use sqlrs_core::{Event, Job, JobId, Task};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueueOp {
    JobCreated { job: Job },
    JobUpdated { job: Job },
    TasksReplaced { job_id: JobId, tasks: Vec<Task> },
    TaskUpdated { task: Task },
    EventAppended { job_id: JobId, event: Event },
    JobDeleted { job_id: JobId },
}
