// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal job bookkeeping (spec.md §4.D steps 5-6, §8 invariant 3): record
//! the job's final status and result/error, emit the matching `result` or
//! `error` event followed by exactly one terminal `status` event, then run
//! retention trimming (spec.md §4.G).

use crate::error::EngineError;
use crate::service::Orchestrator;
use sqlrs_core::{Clock, EventPayload, IdGen, Job, JobResult, JobStatus};
use tracing::{info, warn};

impl<C: Clock, I: IdGen> Orchestrator<C, I> {
    pub(crate) async fn finalize_success(
        &self,
        job: &mut Job,
        result: Option<JobResult>,
    ) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        job.status = JobStatus::Succeeded;
        job.finished_at = Some(now);
        job.result = result.clone();
        self.queue.update_job(job.clone()).await?;

        if let Some(result) = result {
            self.queue
                .append_event(
                    job.job_id.as_str(),
                    EventPayload::Result { result },
                    self.clock.epoch_ms(),
                )
                .await?;
        }
        self.queue
            .append_event(
                job.job_id.as_str(),
                EventPayload::Status {
                    status: JobStatus::Succeeded,
                },
                self.clock.epoch_ms(),
            )
            .await?;

        info!(job_id = %job.job_id, "job succeeded");
        self.trim_retention(&job.signature).await;
        Ok(())
    }

    pub(crate) async fn finalize_failure(
        &self,
        job: &mut Job,
        err: EngineError,
    ) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        let status = if matches!(err, EngineError::Cancelled) {
            JobStatus::Cancelled
        } else {
            JobStatus::Failed
        };
        let detail = err.to_detail();

        job.status = status;
        job.finished_at = Some(now);
        job.error = Some(detail.clone());
        self.queue.update_job(job.clone()).await?;

        self.queue
            .append_event(
                job.job_id.as_str(),
                EventPayload::Error { error: detail },
                self.clock.epoch_ms(),
            )
            .await?;
        self.queue
            .append_event(
                job.job_id.as_str(),
                EventPayload::Status { status },
                self.clock.epoch_ms(),
            )
            .await?;

        warn!(job_id = %job.job_id, status = ?status, error = %err, "job did not succeed");
        Ok(())
    }
}

#[cfg(test)]
#[path = "finalize_tests.rs"]
mod tests;
