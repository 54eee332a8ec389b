//! Scenario-level tests for the run loop (spec.md §8 S1-S6), exercised
//! through [`Orchestrator::submit`] against the in-memory fakes.

use crate::service::DeleteOptions;
use crate::test_support::Harness;
use sqlrs_adapters::ExecOutput;
use sqlrs_core::{JobStatus, LiquibaseExecMode, PrepareKind, Request, TaskKind, TaskStatus};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

fn psql_request(image: &str, args: Vec<&str>) -> Request {
    Request {
        kind: PrepareKind::Psql,
        image_id: image.to_string(),
        plan_only: false,
        psql_args: args.into_iter().map(str::to_string).collect(),
        psql_stdin: None,
        liquibase_args: Vec::new(),
        liquibase_exec: None,
        liquibase_exec_mode: None,
        work_dir: None,
        liquibase_env: HashMap::new(),
    }
}

fn liquibase_request(image: &str, changelog: &str) -> Request {
    Request {
        kind: PrepareKind::Liquibase,
        image_id: image.to_string(),
        plan_only: false,
        psql_args: Vec::new(),
        psql_stdin: None,
        liquibase_args: vec![format!("--changelog-file={changelog}"), "update".to_string()],
        liquibase_exec: None,
        liquibase_exec_mode: Some(LiquibaseExecMode::Native),
        work_dir: None,
        liquibase_env: HashMap::new(),
    }
}

/// S1 — psql simple execute: resolve_image + state_execute + planning +
/// prepare_instance all succeed, one StateEntry, one InstanceEntry, a
/// `result` event carrying the DSN.
#[tokio::test]
async fn s1_psql_simple_execute_succeeds_end_to_end() {
    let h = Harness::new();
    let request = psql_request("postgres:16", vec!["-c", "select 1"]);

    let submitted = h.orchestrator.submit(request).await.unwrap();
    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(job.status, JobStatus::Succeeded);
    let result = job.result.expect("job should carry a result");
    assert!(result.dsn.starts_with("postgres://sqlrs:postgres@"));

    let tasks = h
        .orchestrator
        .queue_for_test()
        .list_tasks(submitted.job_id.as_str())
        .await
        .unwrap();
    // resolve_image (unqualified ref) + state_execute + prepare_instance
    assert_eq!(tasks.len(), 3);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Succeeded));
    assert_eq!(tasks[0].kind, TaskKind::ResolveImage);
    assert_eq!(tasks[1].kind, TaskKind::StateExecute);
    assert_eq!(tasks[2].kind, TaskKind::PrepareInstance);

    assert_eq!(h.orchestrator.metadata_for_test().list_states().len(), 1);
    assert_eq!(h.orchestrator.metadata_for_test().list_instances().len(), 1);

    let events = h
        .orchestrator
        .queue_for_test()
        .list_events_since(submitted.job_id.as_str(), 0)
        .await
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e.payload, sqlrs_core::EventPayload::Task { .. })));
    assert!(matches!(
        events.last().unwrap().payload,
        sqlrs_core::EventPayload::Status {
            status: JobStatus::Succeeded
        }
    ));
    assert!(events
        .iter()
        .any(|e| matches!(e.payload, sqlrs_core::EventPayload::Result { .. })));
}

/// S2 — psql plan-only re-submission against a pre-populated cache entry is
/// pure: the task reports `cached=true` and no new state/instance records
/// are written.
#[tokio::test]
async fn s2_psql_plan_only_is_pure_on_a_cache_hit() {
    let h = Harness::new();
    let image = "postgres@sha256:cafef00d";

    // First pass (not plan-only) builds the real state.
    let first = psql_request(image, vec!["-c", "select 1"]);
    h.orchestrator.submit(first).await.unwrap();
    let states_after_first = h.orchestrator.metadata_for_test().list_states().len();
    assert_eq!(states_after_first, 1);
    let instances_after_first = h.orchestrator.metadata_for_test().list_instances().len();

    // Second pass, plan_only=true, same request -> same output state id.
    let mut second = psql_request(image, vec!["-c", "select 1"]);
    second.plan_only = true;
    let submitted = h.orchestrator.submit(second).await.unwrap();

    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.plan_only);
    assert!(job.result.is_none());

    let tasks = h
        .orchestrator
        .queue_for_test()
        .list_tasks(submitted.job_id.as_str())
        .await
        .unwrap();
    let state_task = tasks
        .iter()
        .find(|t| t.kind == TaskKind::StateExecute)
        .unwrap();
    assert!(state_task.cached);

    assert_eq!(
        h.orchestrator.metadata_for_test().list_states().len(),
        states_after_first,
        "plan-only must not write a new StateEntry"
    );
    assert_eq!(
        h.orchestrator.metadata_for_test().list_instances().len(),
        instances_after_first,
        "plan-only must not write a new InstanceEntry"
    );
}

/// S3 — a two-changeset Liquibase plan produces two `state_execute` tasks
/// chained state-to-state, each tagged with its changeset id/author.
#[tokio::test]
async fn s3_liquibase_two_changesets_chain_state_to_state() {
    let h = Harness::new();
    h.liquibase.push_response(
        "-- Changeset changelog.xml::1::dev\nCREATE TABLE t(id INT);\n\
         -- Changeset changelog.xml::2::dev\nALTER TABLE t ADD COLUMN n TEXT;\n",
    );

    let request = liquibase_request("postgres@sha256:cafef00d", "changelog.xml");
    let submitted = h.orchestrator.submit(request).await.unwrap();

    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let tasks = h
        .orchestrator
        .queue_for_test()
        .list_tasks(submitted.job_id.as_str())
        .await
        .unwrap();
    // No resolve_image (already digested) + 2 state_execute + prepare_instance.
    assert_eq!(tasks.len(), 3);

    let state_tasks: Vec<_> = tasks
        .iter()
        .filter(|t| t.kind == TaskKind::StateExecute)
        .collect();
    assert_eq!(state_tasks.len(), 2);

    let ids: Vec<&str> = state_tasks
        .iter()
        .map(|t| t.changeset.as_ref().unwrap().changeset_id.as_str())
        .collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(state_tasks.iter().all(|t| t.changeset.as_ref().unwrap().author == "dev"));

    let first_output = state_tasks[0].output_state_id.clone().unwrap();
    let second_input = state_tasks[1].input.as_ref().unwrap();
    assert_eq!(second_input.id, first_output);

    let final_state_id = tasks
        .iter()
        .find(|t| t.kind == TaskKind::PrepareInstance)
        .unwrap()
        .input
        .as_ref()
        .unwrap()
        .id
        .clone();
    assert_eq!(final_state_id, state_tasks[1].output_state_id.clone().unwrap());
}

/// S4 — a cached state directory missing `PG_VERSION`/carrying
/// `postmaster.pid` is invalidated exactly once and rebuilt transparently.
#[tokio::test]
async fn s4_dirty_cached_state_is_invalidated_and_rebuilt() {
    let h = Harness::new();
    let image = "postgres@sha256:cafef00d";
    let request = psql_request(image, vec!["-c", "select 1"]);

    // Precompute the output state id the same way the plan builder will.
    let (prepared, _locks) = sqlrs_normalize::normalize(&request, None).unwrap();
    let task_hash = crate::plan::compute_task_hash(
        prepared.kind,
        &prepared.canonical_args,
        &prepared.content_digest,
        image,
        None,
    );
    let state_id = crate::plan::compute_state_id(
        sqlrs_core::InputRefKind::Image,
        image,
        &task_hash,
    );

    h.orchestrator
        .metadata_for_test()
        .put_state(sqlrs_core::StateEntry {
            state_id: state_id.clone(),
            parent_state_id: None,
            image_id: image.to_string(),
            prepare_kind: PrepareKind::Psql,
            normalized_args: prepared.canonical_args.clone(),
            created_at: 0,
            size_bytes: 0,
            ref_count: 0,
        })
        .unwrap();
    let state_dir = h.orchestrator.cache_for_test().state_dir(image, &state_id);
    tokio::fs::create_dir_all(&state_dir).await.unwrap();
    tokio::fs::write(state_dir.join("postmaster.pid"), "123")
        .await
        .unwrap();

    let submitted = h.orchestrator.submit(request).await.unwrap();
    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    // Rebuilt clean: PG_VERSION now present, no postmaster.pid.
    assert!(state_dir.join("PG_VERSION").exists());
    assert!(!state_dir.join("postmaster.pid").exists());

    let tasks = h
        .orchestrator
        .queue_for_test()
        .list_tasks(submitted.job_id.as_str())
        .await
        .unwrap();
    let state_task = tasks
        .iter()
        .find(|t| t.kind == TaskKind::StateExecute)
        .unwrap();
    assert!(!state_task.cached, "a dirty entry must be rebuilt, not served as a hit");
}

/// S5 — cancellation while a task is blocked acquiring the state build
/// lock surfaces as a `cancelled` terminal task/job status, not an
/// internal error (spec.md §5 "Cancellation semantics").
#[tokio::test]
async fn s5_cancellation_during_build_lock_acquisition_is_reported_as_cancelled() {
    let h = Harness::new_async();
    let image = "postgres@sha256:cafef00d";
    let request = psql_request(image, vec!["-c", "select 1"]);

    let (prepared, _locks) = sqlrs_normalize::normalize(&request, None).unwrap();
    let task_hash = crate::plan::compute_task_hash(
        prepared.kind,
        &prepared.canonical_args,
        &prepared.content_digest,
        image,
        None,
    );
    let state_id = crate::plan::compute_state_id(sqlrs_core::InputRefKind::Image, image, &task_hash);

    // Hold the build lock for the output state before submitting, so the
    // job's own acquisition call blocks until either the lock frees or its
    // context is cancelled.
    let holder_cancel = CancellationToken::new();
    let _held_lock = h
        .orchestrator
        .cache_for_test()
        .acquire_build_lock(image, &state_id, &holder_cancel)
        .await
        .unwrap();

    let submitted = h.orchestrator.submit(request).await.unwrap();

    let outcome = h
        .orchestrator
        .delete(
            submitted.job_id.as_str(),
            DeleteOptions {
                force: true,
                dry_run: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome, crate::service::DeleteOutcome::Deleted);

    // delete() already waited for the run loop to exit before purging, and
    // purge_job removes the job record along with it — deletion itself is
    // evidence the job reached a terminal status in response to cancellation
    // rather than hanging on the held lock.
    assert!(h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .is_none());
}

/// S6 — retention trimming keeps only the newest `maxIdentical` succeeded
/// jobs for a signature and removes the rest from the queue store.
#[tokio::test]
async fn s6_retention_trim_keeps_only_the_newest_n_succeeded_jobs() {
    let h = Harness::with_jobs_max_identical(2);

    let image = "postgres@sha256:cafef00d";
    let mut job_ids = Vec::new();
    for _ in 0..3 {
        let request = psql_request(image, vec!["-c", "select 1"]);
        let submitted = h.orchestrator.submit(request).await.unwrap();
        job_ids.push(submitted.job_id);
        h.clock.advance_ms(1_000);
    }

    let mut remaining = 0;
    for job_id in &job_ids {
        if h
            .orchestrator
            .queue_for_test()
            .get_job(job_id.as_str())
            .await
            .unwrap()
            .is_some()
        {
            remaining += 1;
        }
    }
    assert_eq!(remaining, 2, "only the newest 2 of 3 identical jobs should survive");

    // The oldest submitted job must be the one that's gone.
    assert!(h
        .orchestrator
        .queue_for_test()
        .get_job(job_ids[0].as_str())
        .await
        .unwrap()
        .is_none());

    // All three identical submissions share one cached output state, each
    // with its own instance; trimming the oldest job removes only its
    // instance and drops the shared state's ref count by one — the state
    // itself survives since the two surviving jobs' instances still
    // reference it (spec.md §3 "Lifecycles").
    assert_eq!(h.orchestrator.metadata_for_test().list_instances().len(), 2);
    let states = h.orchestrator.metadata_for_test().list_states();
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].ref_count, 2);
}

/// S7 — a post-clone runtime dir that lands without `PG_VERSION` (a
/// partial/corrupt copy-on-write clone) is detected as dirty by runtime
/// startup, cleaned, and retried once, exactly as a `postmaster.pid`-dirty
/// runtime dir would be (spec.md §4.D "Runtime startup", §8 boundary
/// behavior "A cached state whose runtime mount is dirty post-clone is
/// rebuilt without invalidation"). Unlike S4, the *state cache entry* is
/// never touched: this is the runtime-dir validation path, not the
/// state-cache's own dirty/invalidate path.
#[tokio::test]
async fn s7_post_clone_dirty_runtime_dir_is_cleaned_and_retried_without_invalidating_the_cache() {
    let h = Harness::new();
    let image = "postgres@sha256:cafef00d";
    let request = psql_request(image, vec!["-c", "select 1"]);

    // Pre-populate a valid cached state (present, PG_VERSION, no
    // postmaster.pid) so `state_execute` is a cache hit and the only
    // `clone_into` call in this run is `prepare_instance`'s clone of the
    // final state into the job's runtime dir.
    let (prepared, _locks) = sqlrs_normalize::normalize(&request, None).unwrap();
    let task_hash = crate::plan::compute_task_hash(
        prepared.kind,
        &prepared.canonical_args,
        &prepared.content_digest,
        image,
        None,
    );
    let state_id = crate::plan::compute_state_id(sqlrs_core::InputRefKind::Image, image, &task_hash);

    h.orchestrator
        .metadata_for_test()
        .put_state(sqlrs_core::StateEntry {
            state_id: state_id.clone(),
            parent_state_id: None,
            image_id: image.to_string(),
            prepare_kind: PrepareKind::Psql,
            normalized_args: prepared.canonical_args.clone(),
            created_at: 0,
            size_bytes: 0,
            ref_count: 0,
        })
        .unwrap();
    let state_dir = h.orchestrator.cache_for_test().state_dir(image, &state_id);
    tokio::fs::create_dir_all(&state_dir).await.unwrap();
    tokio::fs::write(state_dir.join("PG_VERSION"), "16\n").await.unwrap();

    h.statefs.drop_pg_version_on_next_clone();

    let submitted = h.orchestrator.submit(request).await.unwrap();
    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let tasks = h
        .orchestrator
        .queue_for_test()
        .list_tasks(submitted.job_id.as_str())
        .await
        .unwrap();
    let state_task = tasks
        .iter()
        .find(|t| t.kind == TaskKind::StateExecute)
        .unwrap();
    assert!(
        state_task.cached,
        "the state cache hit must stand: only the runtime-dir clone was dirty"
    );

    let cached_entry = h
        .orchestrator
        .metadata_for_test()
        .get_state(&state_id)
        .expect("state entry must still be present");
    assert_eq!(
        cached_entry.created_at, 0,
        "a dirty post-clone runtime dir must not invalidate/rebuild the state cache entry"
    );
    assert!(state_dir.join("PG_VERSION").exists());

    let clone_count = h
        .statefs
        .calls()
        .iter()
        .filter(|c| matches!(c, sqlrs_adapters::StateFsCall::CloneInto { source, .. } if source == &state_dir))
        .count();
    assert_eq!(
        clone_count, 2,
        "the dirty clone must be cleaned and retried exactly once"
    );
}

/// A psql job with file arguments gets its common script directory mounted
/// and its `-f` paths rewritten to the in-container mount point.
#[tokio::test]
async fn psql_with_file_args_rewrites_paths_under_the_container_mount() {
    let h = Harness::new();
    let script = h.write_script("seed.sql", "select 1;\n");
    let request = psql_request(
        "postgres@sha256:cafef00d",
        vec!["-f", script.to_str().unwrap()],
    );

    h.psql.set_response(ExecOutput {
        stdout: String::new(),
        stderr: String::new(),
        success: true,
    });

    let submitted = h.orchestrator.submit(request).await.unwrap();
    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Succeeded);

    let calls = h.psql.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].args.iter().any(|a| a.starts_with("/sqlrs/scripts")));
}

/// A psql invocation whose runner reports a failing exit status fails the
/// task and the job, without panicking the run loop.
#[tokio::test]
async fn psql_non_zero_exit_fails_the_job() {
    let h = Harness::new();
    h.psql.fail();

    let request = psql_request("postgres@sha256:cafef00d", vec!["-c", "select 1"]);
    let submitted = h.orchestrator.submit(request).await.unwrap();

    let job = h
        .orchestrator
        .queue_for_test()
        .get_job(submitted.job_id.as_str())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(
        job.error.unwrap().code,
        sqlrs_core::ErrorCode::InternalError
    );
}
