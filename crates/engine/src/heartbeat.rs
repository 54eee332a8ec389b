// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat emitter (spec.md §4.E, §9 Open Questions): for a `running`
//! `state_execute` task, the last `task`/`log` event is re-emitted on a
//! fixed cadence until the caller stops it. Preserves the exact observed
//! semantics spec.md §9 calls out: the last `running` event repeats
//! unconditionally until a new transition is observed, never suppressed
//! early.

use sqlrs_core::{Clock, Event, JobId};
use sqlrs_storage::QueueStore;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A background re-emission loop for one job's heartbeat-eligible event.
/// Dropping this without calling [`Heartbeat::stop`] still cancels the
/// background task, just without waiting for it to exit.
pub struct Heartbeat {
    cancel: CancellationToken,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Heartbeat {
    /// Start re-emitting `last_event`'s payload every `interval` until
    /// [`Heartbeat::stop`] is called or the job is dropped. Returns `None`
    /// when `last_event` isn't heartbeat-eligible — callers should only
    /// invoke this with the most recent `task`/`log` event for a task that
    /// is still `running` (spec.md §4.E: "No heartbeat is emitted when no
    /// prior event exists").
    pub fn spawn<C: Clock>(
        queue: Arc<dyn QueueStore>,
        clock: C,
        job_id: JobId,
        last_event: Event,
        interval: Duration,
    ) -> Option<Self> {
        // `heartbeat_at` is also the eligibility gate: it returns `None` for
        // anything other than a `task`/`log` event, so there's exactly one
        // place (`Event::heartbeat_at`) that decides what's heartbeat-eligible.
        last_event.heartbeat_at(last_event.offset, last_event.timestamp)?;

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = task_cancel.cancelled() => break,
                }
                let now = clock.epoch_ms();
                // The real offset is assigned by the store on append;
                // `heartbeat_at`'s offset argument here is a placeholder,
                // discarded in favor of the payload it carries.
                let Some(templated) = last_event.heartbeat_at(0, now) else {
                    break;
                };
                let result = queue
                    .append_event(job_id.as_str(), templated.payload, now)
                    .await;
                if let Err(e) = result {
                    debug!(job_id = %job_id, error = %e, "heartbeat emission stopped after store error");
                    break;
                }
            }
        });

        Some(Self {
            cancel,
            handle: Some(handle),
        })
    }

    /// Stop re-emission and wait for the background task to exit (spec.md
    /// §4.E: heartbeats stop once the task leaves `running` or the job
    /// reaches a terminal status).
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
