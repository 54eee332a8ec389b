// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-job, append-only event stream (spec.md §3, §4.E, §8).

use crate::error_code::ErrorDetail;
use crate::job::{JobResult, JobStatus};
use crate::task::{TaskKind, TaskStatus};
use serde::{Deserialize, Serialize};

/// An update about a task's status, carried by a `task` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_state_id: Option<String>,
    #[serde(default)]
    pub cached: bool,
}

/// The typed payload carried by an [`Event`], tagged by `type` on the wire
/// (spec.md §3: "type ∈ {status, task, log, result, error}").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Status { status: JobStatus },
    Task { task: TaskUpdate },
    Log { line: String },
    Result { result: JobResult },
    Error { error: ErrorDetail },
}

impl EventPayload {
    /// Whether replaying this event again (as a heartbeat) would be
    /// observably identical other than its timestamp.
    pub fn is_heartbeat_eligible(&self) -> bool {
        matches!(self, EventPayload::Task { .. } | EventPayload::Log { .. })
    }
}

/// One entry in a job's ordered event log. Offsets are dense and strictly
/// increasing per job (spec.md §3 invariant, §8 invariant 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub offset: u64,
    pub timestamp: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(offset: u64, timestamp: u64, payload: EventPayload) -> Self {
        Self {
            offset,
            timestamp,
            payload,
        }
    }

    /// A heartbeat re-emission of this event at a fresh timestamp, with the
    /// offset left for the caller to assign (spec.md §4.E).
    pub fn heartbeat_at(&self, offset: u64, timestamp: u64) -> Option<Event> {
        if self.payload.is_heartbeat_eligible() {
            Some(Event::new(offset, timestamp, self.payload.clone()))
        } else {
            None
        }
    }

    pub fn is_terminal_status(&self) -> bool {
        matches!(
            &self.payload,
            EventPayload::Status { status } if status.is_terminal()
        )
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
