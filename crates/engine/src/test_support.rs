// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture for the engine's own integration-style tests: an
//! [`Orchestrator`] wired to the in-memory fakes from `sqlrs-adapters`, a
//! real (tempdir-backed) [`WalQueueStore`]/[`MetadataStore`] pair, and a
//! [`FakeClock`]/[`SequentialIdGen`] for deterministic ids and timestamps.

use crate::config::{OrchestratorConfig, RunMode};
use crate::service::Orchestrator;
use sqlrs_adapters::{FakeLiquibaseRunner, FakePsqlRunner, FakeRuntimeAdapter, FakeStateFs};
use sqlrs_core::{FakeClock, SequentialIdGen};
use sqlrs_storage::{MetadataStore, WalQueueStore};
use std::sync::Arc;

pub(crate) type TestOrchestrator = Orchestrator<FakeClock, SequentialIdGen>;

pub(crate) struct Harness {
    pub dir: tempfile::TempDir,
    pub orchestrator: TestOrchestrator,
    pub runtime: Arc<FakeRuntimeAdapter>,
    pub statefs: Arc<FakeStateFs>,
    pub psql: Arc<FakePsqlRunner>,
    pub liquibase: Arc<FakeLiquibaseRunner>,
    pub clock: FakeClock,
}

impl Harness {
    /// Build a harness running its jobs synchronously (`RunMode::Sync`):
    /// `submit()` only returns once the job has reached a terminal status,
    /// which is what every scenario test except cancellation wants.
    pub fn new() -> Self {
        Self::with_run_mode(RunMode::Sync)
    }

    /// Build a harness that dispatches jobs onto a spawned task
    /// (`RunMode::Async`), for tests that need to act on a job (e.g.
    /// cancel it) while its run loop is still in flight.
    pub fn new_async() -> Self {
        Self::with_run_mode(RunMode::Async)
    }

    /// Build a synchronous harness with a non-default retention policy, for
    /// tests asserting on `jobs.maxIdentical` trimming behavior.
    pub fn with_jobs_max_identical(n: usize) -> Self {
        Self::build(RunMode::Sync, n)
    }

    fn with_run_mode(run_mode: RunMode) -> Self {
        Self::build(run_mode, 5)
    }

    fn build(run_mode: RunMode, jobs_max_identical: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = OrchestratorConfig::new(dir.path())
            .with_run_mode(run_mode)
            .with_jobs_max_identical(jobs_max_identical);

        let queue = Arc::new(
            WalQueueStore::open(&dir.path().join("queue.wal"), None).expect("open wal"),
        );
        let metadata =
            Arc::new(MetadataStore::open(dir.path().join("metadata.json")).expect("open metadata"));
        let statefs = Arc::new(FakeStateFs::new());
        let runtime = Arc::new(FakeRuntimeAdapter::new());
        let psql = Arc::new(FakePsqlRunner::new());
        let liquibase = Arc::new(FakeLiquibaseRunner::new());
        let clock = FakeClock::new(1_000);
        let id_gen = SequentialIdGen::new("job");

        let orchestrator = Orchestrator::new(
            config,
            queue,
            metadata,
            statefs.clone(),
            runtime.clone(),
            psql.clone(),
            liquibase.clone(),
            clock.clone(),
            id_gen,
        );

        Self {
            dir,
            orchestrator,
            runtime,
            statefs,
            psql,
            liquibase,
            clock,
        }
    }

    /// Write a psql script file under the harness tempdir and return its
    /// absolute path, for requests exercising `-f`.
    pub fn write_script(&self, name: &str, contents: &str) -> std::path::PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).expect("write script");
        path
    }
}
