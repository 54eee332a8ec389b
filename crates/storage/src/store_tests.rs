// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sqlrs_core::{
    EventPayload, InputRef, InputRefKind, Job, JobId, JobStatus, PrepareKind, Task, TaskId,
    TaskKind, TaskStatus,
};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn job(id: &str, signature: &str) -> Job {
    Job {
        job_id: JobId::new(id),
        status: JobStatus::Queued,
        kind: PrepareKind::Psql,
        image_id: None,
        plan_only: false,
        request_json: "{}".to_string(),
        created_at: 0,
        started_at: None,
        finished_at: None,
        result: None,
        error: None,
        signature: signature.to_string(),
    }
}

fn task(job_id: &str, task_id: &str) -> Task {
    Task {
        job_id: JobId::new(job_id),
        task_id: TaskId::new(task_id),
        position: 0,
        kind: TaskKind::StateExecute,
        status: TaskStatus::Queued,
        input: Some(InputRef {
            kind: InputRefKind::Image,
            id: "image-1@sha256:abc".to_string(),
        }),
        output_state_id: None,
        changeset: None,
        resolved_image_id: None,
        started_at: None,
        finished_at: None,
        error: None,
        cached: false,
    }
}

fn open_store() -> (tempfile::TempDir, WalQueueStore) {
    let dir = tempdir().expect("tempdir");
    let store = WalQueueStore::open(&dir.path().join("queue.wal"), None).expect("open store");
    (dir, store)
}

#[tokio::test]
async fn create_and_get_job_round_trips() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    let fetched = store.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(fetched.job_id, JobId::new("job-1"));
    assert_eq!(fetched.status, JobStatus::Queued);
}

#[tokio::test]
async fn update_job_replaces_record() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    let mut updated = job("job-1", "sig-a");
    updated.status = JobStatus::Running;
    store.update_job(updated).await.unwrap();
    let fetched = store.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(fetched.status, JobStatus::Running);
}

#[tokio::test]
async fn list_jobs_by_status_and_signature_filter_correctly() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    store.create_job(job("job-2", "sig-a")).await.unwrap();
    let mut job3 = job("job-3", "sig-b");
    job3.status = JobStatus::Succeeded;
    store.create_job(job3).await.unwrap();

    let queued = store.list_jobs_by_status(JobStatus::Queued).await.unwrap();
    assert_eq!(queued.len(), 2);

    let sig_a = store.list_jobs_by_signature("sig-a").await.unwrap();
    assert_eq!(sig_a.len(), 2);
    let sig_b = store.list_jobs_by_signature("sig-b").await.unwrap();
    assert_eq!(sig_b.len(), 1);
}

#[tokio::test]
async fn delete_job_removes_job_tasks_and_events() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    store
        .replace_tasks("job-1", vec![task("job-1", "t1")])
        .await
        .unwrap();
    store
        .append_event("job-1", EventPayload::Log { line: "x".into() }, 0)
        .await
        .unwrap();

    store.delete_job("job-1").await.unwrap();

    assert!(store.get_job("job-1").await.unwrap().is_none());
    assert!(store.list_tasks("job-1").await.unwrap().is_empty());
    assert!(store.list_events_since("job-1", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn replace_tasks_then_update_task_mutates_in_place() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    store
        .replace_tasks("job-1", vec![task("job-1", "t1")])
        .await
        .unwrap();

    let mut t = task("job-1", "t1");
    t.status = TaskStatus::Succeeded;
    store.update_task(t).await.unwrap();

    let tasks = store.list_tasks("job-1").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Succeeded);
}

#[tokio::test]
async fn append_event_assigns_dense_increasing_offsets() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    let e0 = store
        .append_event("job-1", EventPayload::Log { line: "a".into() }, 1)
        .await
        .unwrap();
    let e1 = store
        .append_event("job-1", EventPayload::Log { line: "b".into() }, 2)
        .await
        .unwrap();
    assert_eq!(e0.offset, 0);
    assert_eq!(e1.offset, 1);
    assert_eq!(store.count_events("job-1").await.unwrap(), 2);
}

#[tokio::test]
async fn list_events_since_returns_only_newer_offsets() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    for i in 0..3 {
        store
            .append_event("job-1", EventPayload::Log { line: format!("{i}") }, i)
            .await
            .unwrap();
    }
    let since1 = store.list_events_since("job-1", 1).await.unwrap();
    assert_eq!(since1.len(), 2);
    assert_eq!(since1[0].offset, 1);
}

#[tokio::test]
async fn wait_for_event_resolves_immediately_when_already_past_offset() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();
    store
        .append_event("job-1", EventPayload::Log { line: "a".into() }, 0)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        store.wait_for_event("job-1", 0, &cancel),
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn wait_for_event_wakes_on_append_from_another_task() {
    let (dir, store) = open_store();
    let store = std::sync::Arc::new(store);
    store.create_job(job("job-1", "sig-a")).await.unwrap();

    let waiter_store = store.clone();
    let cancel = CancellationToken::new();
    let waiter_cancel = cancel.clone();
    let waiter = tokio::spawn(async move {
        waiter_store
            .wait_for_event("job-1", 0, &waiter_cancel)
            .await
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    store
        .append_event("job-1", EventPayload::Log { line: "a".into() }, 0)
        .await
        .unwrap();

    let result = tokio::time::timeout(std::time::Duration::from_millis(500), waiter)
        .await
        .expect("waiter did not resolve")
        .expect("waiter task panicked");
    assert!(result.is_ok());
    drop(dir);
}

#[tokio::test]
async fn wait_for_event_resolves_when_job_reaches_terminal_status() {
    let (_dir, store) = open_store();
    let mut j = job("job-1", "sig-a");
    j.status = JobStatus::Succeeded;
    store.create_job(j).await.unwrap();

    let cancel = CancellationToken::new();
    let result = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        store.wait_for_event("job-1", 0, &cancel),
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn wait_for_event_returns_cancelled_error_on_cancel() {
    let (_dir, store) = open_store();
    store.create_job(job("job-1", "sig-a")).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = store.wait_for_event("job-1", 0, &cancel).await;
    assert!(matches!(result, Err(StorageError::Cancelled)));
}

#[tokio::test]
async fn reopening_store_replays_wal_into_identical_state() {
    let dir = tempdir().expect("tempdir");
    let wal_path = dir.path().join("queue.wal");
    {
        let store = WalQueueStore::open(&wal_path, None).expect("open store");
        store.create_job(job("job-1", "sig-a")).await.unwrap();
        store
            .replace_tasks("job-1", vec![task("job-1", "t1")])
            .await
            .unwrap();
        store
            .append_event("job-1", EventPayload::Log { line: "a".into() }, 0)
            .await
            .unwrap();
    }

    let reopened = WalQueueStore::open(&wal_path, None).expect("reopen store");
    let fetched = reopened.get_job("job-1").await.unwrap().unwrap();
    assert_eq!(fetched.job_id, JobId::new("job-1"));
    assert_eq!(reopened.list_tasks("job-1").await.unwrap().len(), 1);
    assert_eq!(reopened.count_events("job-1").await.unwrap(), 1);
}
