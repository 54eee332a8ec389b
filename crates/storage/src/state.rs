// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The in-memory materialization of the queue store: jobs, their tasks, and
//! their event streams, rebuilt by replaying [`QueueOp`] entries in order.

use crate::queue_op::QueueOp;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sqlrs_core::{Event, Job, Task};

/// The full, serializable state a snapshot captures and a WAL replays into.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: IndexMap<String, Job>,
    /// Per-job task list, kept in plan order (matches `Task::position`).
    pub tasks: IndexMap<String, Vec<Task>>,
    /// Per-job event log, dense and strictly increasing by offset.
    pub events: IndexMap<String, Vec<Event>>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one op, mutating state exactly the way the queue store did when
    /// it first performed the corresponding operation.
    pub fn apply(&mut self, op: &QueueOp) {
        match op {
            QueueOp::JobCreated { job } | QueueOp::JobUpdated { job } => {
                self.jobs
                    .insert(job.job_id.as_str().to_string(), job.clone());
            }
            QueueOp::TasksReplaced { job_id, tasks } => {
                self.tasks
                    .insert(job_id.as_str().to_string(), tasks.clone());
            }
            QueueOp::TaskUpdated { task } => {
                let list = self
                    .tasks
                    .entry(task.job_id.as_str().to_string())
                    .or_default();
                if let Some(existing) = list.iter_mut().find(|t| t.task_id == task.task_id) {
                    *existing = task.clone();
                } else {
                    list.push(task.clone());
                }
            }
            QueueOp::EventAppended { job_id, event } => {
                self.events
                    .entry(job_id.as_str().to_string())
                    .or_default()
                    .push(event.clone());
            }
            QueueOp::JobDeleted { job_id } => {
                self.jobs.shift_remove(job_id.as_str());
                self.tasks.shift_remove(job_id.as_str());
                self.events.shift_remove(job_id.as_str());
            }
        }
    }

    pub fn event_count(&self, job_id: &str) -> u64 {
        self.events.get(job_id).map_or(0, |e| e.len() as u64)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
