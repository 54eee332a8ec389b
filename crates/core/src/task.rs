// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task records: the ordered, per-job steps the execution engine drives.

use crate::error_code::ErrorDetail;
use crate::job::JobId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a task within its job.
    pub struct TaskId;
}

/// Task type (spec.md §3 "Task").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    ResolveImage,
    StateExecute,
    PrepareInstance,
}

/// Shares the job lifecycle's terminal/non-terminal split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Whether transitioning from `self` to `next` is a legal state-machine
    /// edge per spec.md §8 invariant 4. No terminal status may transition
    /// anywhere else, `Running` only moves to a terminal status, and
    /// `Queued` may move to `Running` or be cancelled directly.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Queued, Running) => true,
            (Queued, Cancelled) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

/// What a task consumes as input: either a resolved image or a prior state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRefKind {
    Image,
    State,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRef {
    pub kind: InputRefKind,
    pub id: String,
}

/// Liquibase changeset identity, attached to a `state_execute` task planned
/// from `updateSQL` output (spec.md §4.A, §4.B).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetMeta {
    pub changeset_id: String,
    pub author: String,
    pub file: String,
}

/// One step of a job's plan, as persisted by the queue store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub job_id: JobId,
    pub task_id: TaskId,
    /// Zero-based position in the job's ordered task list.
    pub position: u32,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_state_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changeset: Option<ChangesetMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_image_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub cached: bool,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
