// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed options bundle the orchestrator consumes (spec.md §1, §6;
//! SPEC_FULL.md ambient stack §C). The core never reads environment
//! variables or config files directly — callers build this and pass it in.

use std::path::PathBuf;
use std::time::Duration;

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(200);
const MAX_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_JOBS_MAX_IDENTICAL: usize = 5;
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a job's run loop executes (spec.md §5 "Scheduling model").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Drive the loop on the caller's task, returning only once the job
    /// reaches a terminal status. What test harnesses want.
    Sync,
    /// Hand the loop off to a spawned task and return as soon as the job is
    /// persisted. What a production service wants.
    Async,
}

/// Orchestrator-wide configuration (spec.md §6 "Config keys consumed").
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root of the on-disk state store (spec.md §6 "State store layout").
    pub state_store_root: PathBuf,
    /// `orchestrator.jobs.maxIdentical`: keep the newest N succeeded jobs per
    /// signature; 0 disables retention trimming (spec.md §4.G).
    pub jobs_max_identical: usize,
    /// Heartbeat re-emission cadence, clamped to [200ms, 1s] (spec.md §4.E, §5).
    pub heartbeat_interval: Duration,
    /// Bound on `RuntimeAdapter::wait_for_ready` (spec.md §5 "Timeouts").
    pub readiness_timeout: Duration,
    /// Sync (test harnesses) vs async (production) run-loop dispatch.
    pub run_mode: RunMode,
}

impl OrchestratorConfig {
    pub fn new(state_store_root: impl Into<PathBuf>) -> Self {
        Self {
            state_store_root: state_store_root.into(),
            jobs_max_identical: DEFAULT_JOBS_MAX_IDENTICAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            run_mode: RunMode::Async,
        }
    }

    pub fn with_run_mode(mut self, run_mode: RunMode) -> Self {
        self.run_mode = run_mode;
        self
    }

    pub fn with_jobs_max_identical(mut self, n: usize) -> Self {
        self.jobs_max_identical = n;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = clamp_heartbeat(interval);
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Convenience constructor for callers that keep `orchestrator.jobs.maxIdentical`
    /// style dotted keys in the environment. The orchestrator itself never calls
    /// this; it only consumes the typed bundle (SPEC_FULL.md ambient stack §C).
    pub fn from_env(state_store_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(state_store_root);
        if let Some(n) = env_usize("ORCHESTRATOR_JOBS_MAX_IDENTICAL") {
            config.jobs_max_identical = n;
        }
        if let Some(ms) = env_u64("ORCHESTRATOR_HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval = clamp_heartbeat(Duration::from_millis(ms));
        }
        if let Some(ms) = env_u64("ORCHESTRATOR_READINESS_TIMEOUT_MS") {
            config.readiness_timeout = Duration::from_millis(ms);
        }
        config
    }

    pub fn states_root(&self) -> PathBuf {
        self.state_store_root.join("engines")
    }

    pub fn jobs_root(&self) -> PathBuf {
        self.state_store_root.join("jobs")
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_root().join(job_id)
    }

    pub fn job_runtime_dir(&self, job_id: &str) -> PathBuf {
        self.job_dir(job_id).join("runtime")
    }
}

fn clamp_heartbeat(interval: Duration) -> Duration {
    interval.clamp(MIN_HEARTBEAT_INTERVAL, MAX_HEARTBEAT_INTERVAL)
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok()?.parse().ok()
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.parse().ok()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
