// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job records: the top-level unit of work tracked by the queue store.

use crate::error_code::ErrorDetail;
use crate::request::PrepareKind;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies a submitted job.
    pub struct JobId;
}

/// A job's lifecycle status. Terminal statuses are `Succeeded`, `Failed`,
/// and `Cancelled`; `Queued` and `Running` are non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// The successful result of a job: the final DSN plus the state it points
/// to, reported once as the `result` event and stored on the job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub dsn: String,
    pub state_id: String,
    pub instance_id: String,
}

/// A job as persisted by the queue store (spec.md §3 "Job").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub status: JobStatus,
    pub kind: PrepareKind,
    /// Resolved (digest-qualified) image ID once known; `None` until the
    /// `resolve_image` task (if any) completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub plan_only: bool,
    /// Serialized `Request` JSON, the source of truth `Recover()` rebuilds
    /// the `PreparedRequest` from.
    pub request_json: String,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// SHA-256 over `{kind, resolved-image, content-digest, plan_only}`,
    /// used for retention grouping and dedup (spec.md §4.B).
    pub signature: String,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
