// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention trimming (spec.md §4.G, §8 invariant 6): after a job succeeds,
//! keep only the newest `jobs_max_identical` succeeded jobs per signature
//! and delete the rest — job record, tasks, events, and job directory.
//! `maxIdentical = 0` disables trimming entirely.

use crate::service::Orchestrator;
use sqlrs_core::{Clock, IdGen, Job, JobStatus};
use std::collections::HashMap;
use tracing::warn;

/// Descending sort key: `finished_at`, falling back to `created_at` for jobs
/// that somehow lack one (spec.md §4.G "sort by finished_at (fallback
/// created_at) descending").
fn sort_key(job: &Job) -> u64 {
    job.finished_at.unwrap_or(job.created_at)
}

impl<C: Clock, I: IdGen> Orchestrator<C, I> {
    /// Run the retention policy for `signature`'s group after a job with
    /// that signature just succeeded. Delete failures are logged and do not
    /// abort trimming the remaining candidates, nor fail the caller's job
    /// (spec.md §4.G, §7 "Retention-trim deletion failures").
    pub(crate) async fn trim_retention(&self, signature: &str) {
        if self.config.jobs_max_identical == 0 {
            return;
        }

        let jobs = match self.queue.list_jobs_by_signature(signature).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(signature, error = %e, "retention trim could not list jobs by signature");
                return;
            }
        };

        let mut succeeded: Vec<Job> = jobs
            .into_iter()
            .filter(|j| j.status == JobStatus::Succeeded)
            .collect();
        if succeeded.len() <= self.config.jobs_max_identical {
            return;
        }

        succeeded.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
        for stale in succeeded.into_iter().skip(self.config.jobs_max_identical) {
            let job_id = stale.job_id.clone();
            if let Err(e) = self.purge_job(&stale).await {
                warn!(job_id = %job_id, error = %e, "retention trim failed to delete job");
            }
        }
    }
}

/// Grouping helper exposed for tests that want to assert on the policy
/// independent of a live queue store.
#[cfg(test)]
pub(crate) fn group_by_signature(jobs: Vec<Job>) -> HashMap<String, Vec<Job>> {
    let mut groups: HashMap<String, Vec<Job>> = HashMap::new();
    for job in jobs {
        groups.entry(job.signature.clone()).or_default().push(job);
    }
    groups
}

#[cfg(test)]
#[path = "retention_tests.rs"]
mod tests;
