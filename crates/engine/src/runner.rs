// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job run loop (spec.md §4.D): reconstruct the request, resolve the
//! image, load-or-plan the task list, then drive each task to a terminal
//! status in order, emitting `task`/`log`/`result`/`error`/`status` events
//! and heartbeats as it goes.

use crate::cache::CacheLookup;
use crate::error::EngineError;
use crate::event_log::spawn_log_forwarder;
use crate::heartbeat::Heartbeat;
use crate::mount::{plan_psql_mount, PsqlMountPlan};
use crate::service::{JobCtx, Orchestrator};
use sqlrs_adapters::{
    Instance, LiquibaseInvocation, LogSink, Mount, PsqlInvocation, RuntimeAdapter, StartSpec,
};
use sqlrs_core::{
    ChangesetMeta, Clock, EventPayload, IdGen, InputRefKind, InstanceEntry, Job, JobId, JobResult,
    JobStatus, PrepareKind, PreparedRequest, Request, StateEntry, Task, TaskKind, TaskStatus,
    TaskUpdate,
};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{error, info_span, warn, Instrument};

/// What a task produced on success, folded back into the task record and
/// (for `prepare_instance`) the job's final result.
enum TaskOutcome {
    ResolveImage,
    StateExecute { output_state_id: String, cached: bool },
    PrepareInstance(Option<JobResult>),
}

fn task_update(task: &Task) -> TaskUpdate {
    TaskUpdate {
        task_id: task.task_id.as_str().to_string(),
        kind: task.kind,
        status: task.status,
        output_state_id: task.output_state_id.clone(),
        cached: task.cached,
    }
}

impl<C: Clock, I: IdGen> Orchestrator<C, I> {
    pub(crate) async fn drive_job(&self, job_id: JobId, cancel: CancellationToken) {
        let span = info_span!("job", job_id = %job_id);
        async {
            if let Err(e) = self.run_job(&job_id, &cancel).await {
                error!(error = %e, "job runner exited without recording a terminal status");
            }
        }
        .instrument(span)
        .await;
        self.running.lock().remove(job_id.as_str());
    }

    async fn run_job(&self, job_id: &JobId, cancel: &CancellationToken) -> Result<(), EngineError> {
        let mut job = match self.queue.get_job(job_id.as_str()).await? {
            Some(job) => job,
            None => return Ok(()),
        };
        if job.is_terminal() {
            return Ok(());
        }

        match self.execute_job(&mut job, cancel).await {
            Ok(result) => self.finalize_success(&mut job, result).await,
            Err(err) => {
                let err = err.reclassify_cancellation(cancel.is_cancelled());
                self.finalize_failure(&mut job, err).await
            }
        }
    }

    async fn execute_job(
        &self,
        job: &mut Job,
        cancel: &CancellationToken,
    ) -> Result<Option<JobResult>, EngineError> {
        let request: Request = serde_json::from_str(&job.request_json)
            .map_err(|e| EngineError::internal_with_source("cannot reconstruct job request", e))?;
        let (prepared, _locks) = sqlrs_normalize::normalize(&request, None)?;

        if job.status == JobStatus::Queued {
            job.status = JobStatus::Running;
            job.started_at.get_or_insert(self.clock.epoch_ms());
            self.queue.update_job(job.clone()).await?;
            self.queue
                .append_event(
                    job.job_id.as_str(),
                    EventPayload::Status {
                        status: JobStatus::Running,
                    },
                    self.clock.epoch_ms(),
                )
                .await?;
        }

        let resolved_image = self.ensure_resolved_image(job, &prepared).await?;
        let mut tasks = self.load_or_plan(job, &prepared, &resolved_image).await?;

        let ctx = JobCtx {
            job_id: job.job_id.clone(),
            request: &request,
            prepared: &prepared,
            resolved_image: &resolved_image,
        };

        let mut final_state_id: Option<String> = None;
        let mut job_result: Option<JobResult> = None;

        for idx in 0..tasks.len() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let task = tasks[idx].clone();
            if task.is_terminal() {
                match task.status {
                    TaskStatus::Succeeded => {
                        if task.kind == TaskKind::StateExecute {
                            final_state_id = task.output_state_id.clone();
                        }
                        continue;
                    }
                    _ => {
                        let detail = task
                            .error
                            .clone()
                            .unwrap_or_else(|| sqlrs_core::ErrorDetail::internal("task failed"));
                        return Err(EngineError::from_detail(detail));
                    }
                }
            }

            let mut running_task = task.clone();
            running_task.status = TaskStatus::Running;
            running_task.started_at = Some(self.clock.epoch_ms());
            self.queue.update_task(running_task.clone()).await?;
            let event = self
                .queue
                .append_event(
                    job.job_id.as_str(),
                    EventPayload::Task {
                        task: task_update(&running_task),
                    },
                    self.clock.epoch_ms(),
                )
                .await?;
            let heartbeat = Heartbeat::spawn(
                self.queue.clone(),
                self.clock.clone(),
                job.job_id.clone(),
                event,
                self.config.heartbeat_interval,
            );

            let outcome = self
                .execute_task(&ctx, &running_task, final_state_id.as_deref(), cancel)
                .await;

            if let Some(hb) = heartbeat {
                hb.stop().await;
            }

            let success = match outcome {
                Ok(o) => o,
                Err(err) => {
                    let err = err.reclassify_cancellation(cancel.is_cancelled());
                    running_task.status = if matches!(err, EngineError::Cancelled) {
                        TaskStatus::Cancelled
                    } else {
                        TaskStatus::Failed
                    };
                    running_task.finished_at = Some(self.clock.epoch_ms());
                    running_task.error = Some(err.to_detail());
                    self.queue.update_task(running_task.clone()).await?;
                    self.queue
                        .append_event(
                            job.job_id.as_str(),
                            EventPayload::Task {
                                task: task_update(&running_task),
                            },
                            self.clock.epoch_ms(),
                        )
                        .await?;
                    return Err(err);
                }
            };

            match success {
                TaskOutcome::ResolveImage => {}
                TaskOutcome::StateExecute {
                    output_state_id,
                    cached,
                } => {
                    running_task.output_state_id = Some(output_state_id.clone());
                    running_task.cached = cached;
                    final_state_id = Some(output_state_id);
                }
                TaskOutcome::PrepareInstance(result) => {
                    job_result = result;
                }
            }
            running_task.status = TaskStatus::Succeeded;
            running_task.finished_at = Some(self.clock.epoch_ms());
            self.queue.update_task(running_task.clone()).await?;
            self.queue
                .append_event(
                    job.job_id.as_str(),
                    EventPayload::Task {
                        task: task_update(&running_task),
                    },
                    self.clock.epoch_ms(),
                )
                .await?;
            tasks[idx] = running_task;
        }

        Ok(job_result)
    }

    async fn ensure_resolved_image(
        &self,
        job: &mut Job,
        prepared: &PreparedRequest,
    ) -> Result<String, EngineError> {
        if let Some(id) = &job.image_id {
            return Ok(id.clone());
        }

        let resolved = if PreparedRequest::image_is_digested(&prepared.image_ref) {
            prepared.image_ref.clone()
        } else {
            let (sink, handle) =
                spawn_log_forwarder(self.queue.clone(), self.clock.clone(), job.job_id.clone());
            let result = self.runtime.resolve_image(&prepared.image_ref, Some(&sink)).await;
            drop(sink);
            let _ = handle.await;
            let resolved = result.map_err(|e| EngineError::internal_with_source("cannot resolve image", e))?;
            if resolved.is_empty() {
                return Err(EngineError::internal("cannot resolve image"));
            }
            resolved
        };

        job.image_id = Some(resolved.clone());
        job.signature = crate::plan::compute_job_signature(
            job.kind,
            &resolved,
            &prepared.content_digest,
            job.plan_only,
        );
        self.queue.update_job(job.clone()).await?;
        Ok(resolved)
    }

    async fn load_or_plan(
        &self,
        job: &Job,
        prepared: &PreparedRequest,
        resolved_image: &str,
    ) -> Result<Vec<Task>, EngineError> {
        let mut tasks = self.queue.list_tasks(job.job_id.as_str()).await?;

        if !tasks.is_empty() {
            for task in tasks.iter_mut() {
                if task.status == TaskStatus::Running {
                    task.status = TaskStatus::Queued;
                    task.started_at = None;
                    self.queue.update_task(task.clone()).await?;
                }
            }
            if self.plan_is_valid(&tasks).await? {
                return Ok(tasks);
            }
        }

        let changesets = self.plan_changesets(prepared).await?;
        let built = crate::plan::build_plan(
            &job.job_id,
            prepared,
            resolved_image,
            &changesets,
            &self.id_gen,
        );
        self.queue
            .replace_tasks(job.job_id.as_str(), built.clone())
            .await?;
        Ok(built)
    }

    /// A previously-planned task list is only still valid if every succeeded
    /// `state_execute` step's output state is still present in the cache —
    /// otherwise the chain it built on is gone and the whole plan must be
    /// rebuilt from scratch (spec.md §4.D "Recovery").
    async fn plan_is_valid(&self, tasks: &[Task]) -> Result<bool, EngineError> {
        for task in tasks {
            if task.kind == TaskKind::StateExecute && task.status == TaskStatus::Succeeded {
                if let Some(state_id) = &task.output_state_id {
                    if matches!(self.cache.lookup(state_id).await?, CacheLookup::Miss) {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    async fn plan_changesets(
        &self,
        prepared: &PreparedRequest,
    ) -> Result<Vec<ChangesetMeta>, EngineError> {
        if prepared.kind != PrepareKind::Liquibase {
            return Ok(Vec::new());
        }
        let args = sqlrs_normalize::liquibase::build_update_sql_args(&prepared.normalized_args);
        let invocation = LiquibaseInvocation {
            executable: prepared
                .liquibase_exec
                .clone()
                .unwrap_or_else(|| "liquibase".to_string()),
            exec_mode: prepared.liquibase_exec_mode,
            work_dir: prepared.work_dir.clone(),
            env: prepared.liquibase_env.clone(),
            args,
        };
        let output = self
            .liquibase_runner
            .run(&invocation, None)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot plan liquibase changesets", e))?;
        let changesets = sqlrs_normalize::liquibase::parse_changesets(&output)?;
        Ok(changesets)
    }

    async fn execute_task(
        &self,
        ctx: &JobCtx<'_>,
        task: &Task,
        final_state_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TaskOutcome, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match task.kind {
            TaskKind::ResolveImage => Ok(TaskOutcome::ResolveImage),
            TaskKind::StateExecute => {
                let (output_state_id, cached) =
                    self.execute_state_task(ctx, task, cancel).await?;
                Ok(TaskOutcome::StateExecute {
                    output_state_id,
                    cached,
                })
            }
            TaskKind::PrepareInstance => {
                let result = self
                    .execute_prepare_instance(ctx, final_state_id, cancel)
                    .await?;
                Ok(TaskOutcome::PrepareInstance(result))
            }
        }
    }

    fn ensure_runtime_dir_safe(&self, runtime_dir: &Path) -> Result<(), EngineError> {
        if runtime_dir.starts_with(self.config.states_root()) {
            return Err(EngineError::internal(
                "runtime directory must not be nested inside a state directory",
            ));
        }
        Ok(())
    }

    async fn execute_state_task(
        &self,
        ctx: &JobCtx<'_>,
        task: &Task,
        cancel: &CancellationToken,
    ) -> Result<(String, bool), EngineError> {
        let output_state_id = task
            .output_state_id
            .clone()
            .ok_or_else(|| EngineError::internal("state_execute task is missing its output state id"))?;

        if ctx.job_plan_only() {
            let cached = matches!(self.cache.lookup(&output_state_id).await?, CacheLookup::Hit(_));
            return Ok((output_state_id, cached));
        }

        match self.cache.lookup(&output_state_id).await? {
            CacheLookup::Hit(_) => return Ok((output_state_id, true)),
            CacheLookup::Dirty(_) => self.cache.invalidate(&output_state_id).await?,
            CacheLookup::Miss => {}
        }

        let lock = self
            .cache
            .acquire_build_lock(ctx.resolved_image, &output_state_id, cancel)
            .await?;

        if let CacheLookup::Hit(_) = self.cache.lookup(&output_state_id).await? {
            drop(lock);
            return Ok((output_state_id, true));
        }

        let runtime_dir = self.config.job_runtime_dir(task.job_id.as_str());
        self.ensure_runtime_dir_safe(&runtime_dir)?;
        self.statefs
            .remove(&runtime_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;

        let input = task
            .input
            .as_ref()
            .ok_or_else(|| EngineError::internal("state_execute task is missing its input reference"))?;

        match input.kind {
            InputRefKind::Image => {
                self.statefs
                    .ensure_base_dir(&runtime_dir)
                    .await
                    .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;
                self.runtime
                    .init_base(&input.id, &runtime_dir, None)
                    .await
                    .map_err(|e| {
                        EngineError::internal_with_source("cannot initialize base data directory", e)
                    })?;
            }
            InputRefKind::State => {
                self.clone_parent_state(&input.id, &runtime_dir).await?;
            }
        }

        let mount_plan = if ctx.prepared.kind == PrepareKind::Psql {
            Some(plan_psql_mount(ctx.prepared)?)
        } else {
            None
        };

        let mounts: Vec<Mount> = mount_plan
            .as_ref()
            .and_then(|m| m.mount.clone())
            .into_iter()
            .collect();

        let instance = self
            .runtime
            .start(StartSpec {
                image: ctx.resolved_image.to_string(),
                data_dir: runtime_dir.clone(),
                mounts,
            })
            .await
            .map_err(|e| EngineError::internal_with_source("cannot start runtime instance", e))?;

        if let Err(e) = self
            .runtime
            .wait_for_ready(&instance.id, self.config.readiness_timeout)
            .await
        {
            let _ = self.runtime.stop(&instance.id).await;
            drop(lock);
            return Err(EngineError::internal_with_source(
                "runtime instance did not become ready",
                e,
            ));
        }

        let run_result = self
            .run_state_tool(ctx, task, &instance, mount_plan.as_ref())
            .await;

        let _ = self.runtime.stop(&instance.id).await;
        if let Err(err) = run_result {
            drop(lock);
            return Err(err);
        }

        let state_dir = self.cache.state_dir(ctx.resolved_image, &output_state_id);
        if let Some(parent) = state_dir.parent() {
            self.statefs
                .ensure_base_dir(parent)
                .await
                .map_err(|e| EngineError::internal_with_source("cannot snapshot state", e))?;
        }
        self.statefs
            .remove(&state_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot snapshot state", e))?;
        self.statefs
            .clone_into(&runtime_dir, &state_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot snapshot state", e))?;

        let size_bytes = dir_size(&state_dir).await.unwrap_or(0);
        let entry = StateEntry {
            state_id: output_state_id.clone(),
            parent_state_id: match input.kind {
                InputRefKind::State => Some(input.id.clone()),
                InputRefKind::Image => None,
            },
            image_id: ctx.resolved_image.to_string(),
            prepare_kind: ctx.prepared.kind,
            normalized_args: ctx.prepared.canonical_args.clone(),
            created_at: self.clock.epoch_ms(),
            size_bytes,
            ref_count: 0,
        };
        self.cache.put(entry)?;

        self.statefs
            .remove(&runtime_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;

        drop(lock);
        Ok((output_state_id, false))
    }

    async fn clone_parent_state(
        &self,
        parent_state_id: &str,
        runtime_dir: &Path,
    ) -> Result<(), EngineError> {
        let parent_entry = self
            .metadata
            .get_state(parent_state_id)
            .ok_or_else(|| EngineError::internal("cannot clone state"))?;
        let parent_dir = self.cache.state_dir(&parent_entry.image_id, parent_state_id);

        self.statefs
            .clone_into(&parent_dir, runtime_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;

        if runtime_dir_is_dirty(runtime_dir).await? {
            warn!(runtime_dir = %runtime_dir.display(), "cloned runtime dir came up dirty, retrying once");
            self.statefs
                .remove(runtime_dir)
                .await
                .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;
            self.statefs
                .clone_into(&parent_dir, runtime_dir)
                .await
                .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;
            if runtime_dir_is_dirty(runtime_dir).await? {
                return Err(EngineError::internal("runtime data dir is dirty"));
            }
        }
        Ok(())
    }

    async fn run_state_tool(
        &self,
        ctx: &JobCtx<'_>,
        task: &Task,
        instance: &Instance,
        mount_plan: Option<&PsqlMountPlan>,
    ) -> Result<(), EngineError> {
        let (sink, handle) =
            spawn_log_forwarder(self.queue.clone(), self.clock.clone(), task.job_id.clone());
        let result = match ctx.prepared.kind {
            PrepareKind::Psql => {
                self.run_psql(ctx, mount_plan, &instance.id, Some(&sink)).await
            }
            PrepareKind::Liquibase => self.run_liquibase(ctx, instance, Some(&sink)).await,
        };
        drop(sink);
        let _ = handle.await;
        result
    }

    async fn run_psql(
        &self,
        ctx: &JobCtx<'_>,
        mount_plan: Option<&PsqlMountPlan>,
        instance_id: &str,
        sink: Option<&dyn LogSink>,
    ) -> Result<(), EngineError> {
        let (args, workdir) = match mount_plan {
            Some(plan) => (plan.args.clone(), plan.workdir.clone()),
            None => (ctx.prepared.normalized_args.clone(), None),
        };
        let invocation = PsqlInvocation {
            instance_id: instance_id.to_string(),
            args,
            workdir,
            stdin: ctx.request.psql_stdin.clone(),
        };
        let output = self
            .psql_runner
            .run(&*self.runtime, &invocation, sink)
            .await
            .map_err(|e| EngineError::internal_with_source("psql execution failed", e))?;
        if !output.success {
            return Err(EngineError::internal(format!(
                "psql exited with a failure status: {}",
                output.stderr
            )));
        }
        Ok(())
    }

    async fn run_liquibase(
        &self,
        ctx: &JobCtx<'_>,
        instance: &Instance,
        sink: Option<&dyn LogSink>,
    ) -> Result<(), EngineError> {
        let args = sqlrs_normalize::liquibase::build_update_count_args(&ctx.prepared.normalized_args, 1);
        let mut env = ctx.prepared.liquibase_env.clone();
        env.entry("SQLRS_DB_HOST".to_string())
            .or_insert_with(|| instance.host.clone());
        env.entry("SQLRS_DB_PORT".to_string())
            .or_insert_with(|| instance.port.to_string());

        let invocation = LiquibaseInvocation {
            executable: ctx
                .prepared
                .liquibase_exec
                .clone()
                .unwrap_or_else(|| "liquibase".to_string()),
            exec_mode: ctx.prepared.liquibase_exec_mode,
            work_dir: ctx.prepared.work_dir.clone(),
            env,
            args,
        };
        self.liquibase_runner
            .run(&invocation, sink)
            .await
            .map_err(|e| EngineError::internal_with_source("liquibase execution failed", e))?;
        Ok(())
    }

    async fn execute_prepare_instance(
        &self,
        ctx: &JobCtx<'_>,
        final_state_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<JobResult>, EngineError> {
        if ctx.job_plan_only() || cancel.is_cancelled() {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            return Ok(None);
        }

        let state_id = final_state_id
            .ok_or_else(|| EngineError::internal("cannot prepare an instance without a final state"))?;
        self.metadata
            .get_state(state_id)
            .ok_or_else(|| EngineError::internal("cannot clone state"))?;

        let runtime_dir = self.config.job_runtime_dir(ctx.job_id.as_str());
        self.ensure_runtime_dir_safe(&runtime_dir)?;
        self.statefs
            .remove(&runtime_dir)
            .await
            .map_err(|e| EngineError::internal_with_source("cannot clone state", e))?;
        self.clone_parent_state(state_id, &runtime_dir).await?;

        let instance = self
            .runtime
            .start(StartSpec {
                image: ctx.resolved_image.to_string(),
                data_dir: runtime_dir.clone(),
                mounts: Vec::new(),
            })
            .await
            .map_err(|e| EngineError::internal_with_source("cannot start runtime instance", e))?;

        if let Err(e) = self
            .runtime
            .wait_for_ready(&instance.id, self.config.readiness_timeout)
            .await
        {
            let _ = self.runtime.stop(&instance.id).await;
            return Err(EngineError::internal_with_source(
                "runtime instance did not become ready",
                e,
            ));
        }

        if instance.host.is_empty() || instance.port == 0 {
            let _ = self.runtime.stop(&instance.id).await;
            return Err(EngineError::internal(
                "runtime instance is missing connection info",
            ));
        }

        let instance_id_raw = self.id_gen.next();
        if instance_id_raw.is_empty() {
            let _ = self.runtime.stop(&instance.id).await;
            return Err(EngineError::internal("cannot generate instance id"));
        }
        let instance_id = sqlrs_core::InstanceId::new(instance_id_raw);

        self.metadata.adjust_ref_count(state_id, 1)?;
        let entry = InstanceEntry {
            instance_id: instance_id.clone(),
            state_id: state_id.to_string(),
            container_id: instance.id.clone(),
            runtime_dir: runtime_dir.to_string_lossy().into_owned(),
            host: instance.host.clone(),
            port: instance.port,
        };
        let dsn = entry.dsn();
        self.metadata.put_instance(entry)?;

        Ok(Some(JobResult {
            dsn,
            state_id: state_id.to_string(),
            instance_id: instance_id.as_str().to_string(),
        }))
    }
}

async fn runtime_dir_is_dirty(dir: &Path) -> Result<bool, EngineError> {
    let has_postmaster_pid = tokio::fs::try_exists(dir.join("postmaster.pid"))
        .await
        .map_err(|e| EngineError::internal_with_source("cannot inspect runtime PG_VERSION", e))?;
    let has_pg_version = tokio::fs::try_exists(dir.join("PG_VERSION"))
        .await
        .map_err(|e| EngineError::internal_with_source("cannot inspect runtime PG_VERSION", e))?;
    Ok(has_postmaster_pid || !has_pg_version)
}

async fn dir_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(e) => e,
            Err(_) => continue,
        };
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}

impl<'a> JobCtx<'a> {
    fn job_plan_only(&self) -> bool {
        self.prepared.plan_only
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
