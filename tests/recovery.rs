//! Cross-process crash-recovery specs (spec.md §4.D "Recovery", §8
//! "Recover-after-crash"), exercised entirely through `sqlrs-engine`'s
//! public API against a fresh [`Orchestrator`] per "process" so a restart is
//! a real re-open of the on-disk queue/metadata stores rather than reuse of
//! an in-memory handle.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use sqlrs_adapters::{FakeLiquibaseRunner, FakePsqlRunner, FakeRuntimeAdapter, FakeStateFs};
use sqlrs_core::{FakeClock, Job, JobId, JobStatus, PrepareKind, Request, SequentialIdGen};
use sqlrs_engine::{Orchestrator, OrchestratorConfig, RunMode};
use sqlrs_storage::{MetadataStore, QueueStore, WalQueueStore};
use std::collections::HashMap;
use std::sync::Arc;

type TestOrchestrator = Orchestrator<FakeClock, SequentialIdGen>;

struct Process {
    dir: tempfile::TempDir,
    runtime: Arc<FakeRuntimeAdapter>,
    statefs: Arc<FakeStateFs>,
    psql: Arc<FakePsqlRunner>,
    liquibase: Arc<FakeLiquibaseRunner>,
}

impl Process {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            runtime: Arc::new(FakeRuntimeAdapter::new()),
            statefs: Arc::new(FakeStateFs::new()),
            psql: Arc::new(FakePsqlRunner::new()),
            liquibase: Arc::new(FakeLiquibaseRunner::new()),
        }
    }

    fn wal_path(&self) -> std::path::PathBuf {
        self.dir.path().join("queue.wal")
    }

    /// Open a fresh `Orchestrator` against this process's on-disk store,
    /// simulating either the initial boot or a restart after a crash: the
    /// queue/metadata stores are re-opened from their files on disk rather
    /// than handed a live in-memory reference.
    fn open(&self, run_mode: RunMode) -> TestOrchestrator {
        let config = OrchestratorConfig::new(self.dir.path()).with_run_mode(run_mode);
        let queue =
            Arc::new(WalQueueStore::open(&self.wal_path(), None).expect("open wal"));
        let metadata = Arc::new(
            MetadataStore::open(self.dir.path().join("metadata.json")).expect("open metadata"),
        );
        Orchestrator::new(
            config,
            queue,
            metadata,
            self.statefs.clone(),
            self.runtime.clone(),
            self.psql.clone(),
            self.liquibase.clone(),
            FakeClock::new(1_000),
            SequentialIdGen::new("job"),
        )
    }
}

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

/// A job submitted and run to completion in one "process" leaves nothing
/// for a second, freshly-opened `Orchestrator`'s `recover()` to resume.
#[tokio::test]
async fn recover_is_a_noop_after_an_uninterrupted_run() {
    let process = Process::new();

    {
        let orchestrator = process.open(RunMode::Sync);
        let request = psql_request("postgres@sha256:cafef00d", vec!["-c", "select 1"]);
        orchestrator.submit(request).await.unwrap();
    }

    {
        let orchestrator = process.open(RunMode::Sync);
        let resumed = orchestrator.recover().await.unwrap();
        assert_eq!(resumed, 0);
    }
}

/// The scenario recovery exists for: a job record persisted as `Queued` with
/// no run loop ever having touched it (the process died immediately after
/// `CreateJob`, before dispatch). A freshly opened `Orchestrator` against the
/// same on-disk store discovers it via `list_jobs_by_status` and drives it
/// to the same terminal outcome an uninterrupted run would reach (spec.md §8
/// "Recover-after-crash").
#[tokio::test]
async fn recover_discovers_and_completes_an_orphaned_queued_job() {
    let process = Process::new();
    let request = psql_request("postgres@sha256:cafef00d", vec!["-c", "select 1"]);
    let (prepared, _locks) = sqlrs_normalize::normalize(&request, None).unwrap();
    let signature = sqlrs_engine::compute_job_signature(
        prepared.kind,
        prepared.effective_image(),
        &prepared.content_digest,
        prepared.plan_only,
    );
    let request_json = serde_json::to_string(&request).unwrap();

    // Seed the on-disk queue directly with a `Queued` job record, the exact
    // durable state a crash between `CreateJob` and dispatch would leave
    // behind, then drop the store handle before any process ever reads it.
    {
        let queue = WalQueueStore::open(&process.wal_path(), None).unwrap();
        let job = Job {
            job_id: JobId::new("job-orphaned-1".to_string()),
            status: JobStatus::Queued,
            kind: prepared.kind,
            image_id: None,
            plan_only: false,
            request_json,
            created_at: 0,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            signature,
        };
        QueueStore::create_job(&queue, job).await.unwrap();
    }

    let orchestrator = process.open(RunMode::Sync);
    let resumed = orchestrator.recover().await.unwrap();
    assert_eq!(resumed, 1);

    let queue = WalQueueStore::open(&process.wal_path(), None).unwrap();
    let job = QueueStore::get_job(&queue, "job-orphaned-1")
        .await
        .unwrap()
        .expect("recovered job should persist");
    assert_eq!(job.status, JobStatus::Succeeded);
    assert!(job.result.is_some());
}

/// A non-terminal job whose request JSON is absent or malformed fails with
/// an internal error during recovery rather than panicking the loop (spec.md
/// §4.D "Recovery": "if the request JSON is absent, fail the job with a
/// descriptive error").
#[tokio::test]
async fn recover_fails_a_job_with_unparseable_request_json() {
    let process = Process::new();

    {
        let queue = WalQueueStore::open(&process.wal_path(), None).unwrap();
        let job = Job {
            job_id: JobId::new("job-corrupt-1".to_string()),
            status: JobStatus::Queued,
            kind: PrepareKind::Psql,
            image_id: None,
            plan_only: false,
            request_json: "not valid json".to_string(),
            created_at: 0,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            signature: "sig-corrupt".to_string(),
        };
        QueueStore::create_job(&queue, job).await.unwrap();
    }

    let orchestrator = process.open(RunMode::Sync);
    let resumed = orchestrator.recover().await.unwrap();
    assert_eq!(resumed, 1);

    let queue = WalQueueStore::open(&process.wal_path(), None).unwrap();
    let job = QueueStore::get_job(&queue, "job-corrupt-1")
        .await
        .unwrap()
        .expect("job record should still exist");
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.is_some());
}
