// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The prepare orchestrator (spec.md §1, §4): normalizes and plans incoming
//! requests, drives each job's tasks to completion against an injected
//! capability set, recovers in-flight jobs across restarts, and enforces
//! retention and deletion policy.

use crate::cache::StateCache;
use crate::config::{OrchestratorConfig, RunMode};
use crate::error::EngineError;
use parking_lot::Mutex;
use sqlrs_adapters::{LiquibaseRunner, PsqlRunner, RuntimeAdapter, StateFs};
use sqlrs_core::{Clock, IdGen, Job, JobId, JobStatus, PreparedRequest, Request};
use sqlrs_storage::{MetadataStore, QueueStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Returned by [`Orchestrator::submit`]: enough for a caller to poll status
/// or stream events without re-deriving URL shapes itself (spec.md §6
/// "Submit").
#[derive(Debug, Clone)]
pub struct SubmitResult {
    pub job_id: JobId,
    pub status_url: String,
    pub events_url: String,
}

/// Outcome of a [`Orchestrator::delete`] call (spec.md §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    WouldDelete,
    Blocked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    pub force: bool,
    pub dry_run: bool,
}

/// Bundles a job's reconstructed request together with its normalized form
/// and resolved image, threaded through the per-task execution helpers in
/// `runner.rs` so they don't each take five separate parameters.
pub(crate) struct JobCtx<'a> {
    pub job_id: JobId,
    pub request: &'a Request,
    pub prepared: &'a PreparedRequest,
    pub resolved_image: &'a str,
}

/// The prepare orchestrator. Cheap to clone — every field is an `Arc` or a
/// small value type — so a clone can be handed to a spawned task per job.
#[derive(Clone)]
pub struct Orchestrator<C: Clock, I: IdGen> {
    pub(crate) config: OrchestratorConfig,
    pub(crate) queue: Arc<dyn QueueStore>,
    pub(crate) cache: Arc<StateCache>,
    pub(crate) metadata: Arc<MetadataStore>,
    pub(crate) statefs: Arc<dyn StateFs>,
    pub(crate) runtime: Arc<dyn RuntimeAdapter>,
    pub(crate) psql_runner: Arc<dyn PsqlRunner>,
    pub(crate) liquibase_runner: Arc<dyn LiquibaseRunner>,
    pub(crate) clock: C,
    pub(crate) id_gen: I,
    pub(crate) running: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

#[allow(clippy::too_many_arguments)]
impl<C: Clock, I: IdGen> Orchestrator<C, I> {
    pub fn new(
        config: OrchestratorConfig,
        queue: Arc<dyn QueueStore>,
        metadata: Arc<MetadataStore>,
        statefs: Arc<dyn StateFs>,
        runtime: Arc<dyn RuntimeAdapter>,
        psql_runner: Arc<dyn PsqlRunner>,
        liquibase_runner: Arc<dyn LiquibaseRunner>,
        clock: C,
        id_gen: I,
    ) -> Self {
        let cache = Arc::new(StateCache::new(
            config.clone(),
            metadata.clone(),
            statefs.clone(),
        ));
        Self {
            config,
            queue,
            cache,
            metadata,
            statefs,
            runtime,
            psql_runner,
            liquibase_runner,
            clock,
            id_gen,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Submit a new job: normalize the request, persist its record, and
    /// dispatch its run loop (spec.md §4.D step 0, §6 "Submit").
    pub async fn submit(&self, request: Request) -> Result<SubmitResult, EngineError> {
        self.ensure_state_store_ready().await?;

        let (prepared, _locks) = sqlrs_normalize::normalize(&request, None)?;
        let effective_image = prepared.effective_image().to_string();
        let signature = crate::plan::compute_job_signature(
            prepared.kind,
            &effective_image,
            &prepared.content_digest,
            prepared.plan_only,
        );

        let id = self.id_gen.next();
        if id.is_empty() {
            return Err(EngineError::internal("cannot generate job id"));
        }
        let job_id = JobId::new(id);

        let now = self.clock.epoch_ms();
        let request_json = serde_json::to_string(&request)
            .map_err(|e| EngineError::internal_with_source("cannot persist job record", e))?;
        let image_id = PreparedRequest::image_is_digested(&prepared.image_ref)
            .then(|| prepared.image_ref.clone());

        let job = sqlrs_core::Job {
            job_id: job_id.clone(),
            status: JobStatus::Queued,
            kind: prepared.kind,
            image_id,
            plan_only: prepared.plan_only,
            request_json,
            created_at: now,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            signature,
        };

        self.queue.create_job(job).await?;
        self.queue
            .append_event(
                job_id.as_str(),
                sqlrs_core::EventPayload::Status {
                    status: JobStatus::Queued,
                },
                now,
            )
            .await?;

        info!(job_id = %job_id, kind = %prepared.kind, "job submitted");

        let status_url = format!("/jobs/{job_id}");
        let events_url = format!("/jobs/{job_id}/events");
        self.dispatch(job_id.clone()).await;

        Ok(SubmitResult {
            job_id,
            status_url,
            events_url,
        })
    }

    /// Resume every non-terminal job's run loop after a restart (spec.md
    /// §4.D "Recovery"). Returns the number of jobs resumed.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let mut resumed = 0;
        for status in [JobStatus::Queued, JobStatus::Running] {
            for job in self.queue.list_jobs_by_status(status).await? {
                info!(job_id = %job.job_id, status = ?job.status, "recovering job");
                self.dispatch(job.job_id.clone()).await;
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// `Delete(job, {force, dry_run})` (spec.md §4.G). A job already gone is
    /// reported as `Deleted` (delete is idempotent).
    pub async fn delete(
        &self,
        job_id: &str,
        options: DeleteOptions,
    ) -> Result<DeleteOutcome, EngineError> {
        let job = match self.queue.get_job(job_id).await? {
            Some(job) => job,
            None => return Ok(DeleteOutcome::Deleted),
        };

        if !job.is_terminal() && !options.force {
            return Ok(DeleteOutcome::Blocked);
        }

        if options.dry_run {
            return Ok(DeleteOutcome::WouldDelete);
        }

        if !job.is_terminal() {
            if let Some(cancel) = self.running.lock().get(job_id).cloned() {
                cancel.cancel();
            }
            self.wait_for_terminal(job_id).await?;
        }

        // Re-fetch: the cancelled run loop may have just recorded the job's
        // terminal result (and thus its instance/state) between the checks
        // above and here.
        let job = self.queue.get_job(job_id).await?.unwrap_or(job);
        self.purge_job(&job).await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn ensure_state_store_ready(&self) -> Result<(), EngineError> {
        self.queue.list_jobs().await?;
        Ok(())
    }

    async fn wait_for_terminal(&self, job_id: &str) -> Result<(), EngineError> {
        loop {
            match self.queue.get_job(job_id).await? {
                None => return Ok(()),
                Some(job) if job.is_terminal() => return Ok(()),
                Some(_) => {}
            }
            let count = self.queue.count_events(job_id).await?;
            let cancel = CancellationToken::new();
            self.queue.wait_for_event(job_id, count, &cancel).await?;
        }
    }

    /// Remove a job and reclaim the resources it alone was keeping alive
    /// (spec.md §3 "Lifecycles": states are "ref-counted by instances, and
    /// deleted when invalidated or trimmed"; instances "live until
    /// explicitly deleted"). If the job succeeded and produced an instance,
    /// that instance's record is removed, the state it was cloned from loses
    /// one reference, and — if that was the state's last reference — the
    /// state's on-disk directory and metadata record are reclaimed too.
    pub(crate) async fn purge_job(&self, job: &Job) -> Result<(), EngineError> {
        if let Some(result) = &job.result {
            let instance_id = sqlrs_core::InstanceId::new(result.instance_id.clone());
            self.metadata.remove_instance(&instance_id)?;
            match self.metadata.adjust_ref_count(&result.state_id, -1) {
                Ok(_) => self.cache.remove_if_unreferenced(&result.state_id).await?,
                Err(sqlrs_storage::MetadataError::StateNotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.statefs
            .remove(&self.config.job_dir(job.job_id.as_str()))
            .await
            .map_err(|e| EngineError::internal_with_source("cannot remove job directory", e))?;
        self.queue.delete_job(job.job_id.as_str()).await?;
        Ok(())
    }

    /// Test-only accessors onto the orchestrator's injected collaborators,
    /// so scenario tests can assert on persisted state without re-deriving
    /// their own queue/metadata/cache handles.
    #[cfg(test)]
    pub(crate) fn queue_for_test(&self) -> &Arc<dyn QueueStore> {
        &self.queue
    }

    #[cfg(test)]
    pub(crate) fn metadata_for_test(&self) -> &MetadataStore {
        &self.metadata
    }

    #[cfg(test)]
    pub(crate) fn cache_for_test(&self) -> &StateCache {
        &self.cache
    }

    async fn dispatch(&self, job_id: JobId) {
        let cancel = CancellationToken::new();
        self.running
            .lock()
            .insert(job_id.as_str().to_string(), cancel.clone());

        match self.config.run_mode {
            RunMode::Sync => self.drive_job(job_id, cancel).await,
            RunMode::Async => {
                let this = self.clone();
                tokio::spawn(async move {
                    this.drive_job(job_id, cancel).await;
                });
            }
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
