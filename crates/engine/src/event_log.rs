// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridges [`LogSink::line`] — called synchronously from inside the async
//! subprocess reader loop in `sqlrs_adapters::subprocess` — onto the async
//! event store. The sink can't await a store call directly, so it forwards
//! onto an unbounded channel that a background task drains into
//! `QueueStore::append_event`, the same shape the runtime watcher uses to
//! turn callback-driven output into store writes.

use sqlrs_adapters::LogSink;
use sqlrs_core::{Clock, EventPayload, JobId};
use sqlrs_storage::QueueStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ChannelLogSink {
    tx: mpsc::UnboundedSender<String>,
}

impl LogSink for ChannelLogSink {
    fn line(&self, line: &str) {
        // Dropped only once the forwarder has already been told to stop;
        // losing a line past that point is harmless.
        let _ = self.tx.send(line.to_string());
    }
}

/// Start forwarding lines into `queue`'s event stream for `job_id`. Drop the
/// returned sink to signal end-of-output, then await the join handle to make
/// sure every line was persisted before moving on to the next step.
pub fn spawn_log_forwarder<C: Clock>(
    queue: Arc<dyn QueueStore>,
    clock: C,
    job_id: JobId,
) -> (ChannelLogSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let now = clock.epoch_ms();
            let result = queue
                .append_event(job_id.as_str(), EventPayload::Log { line }, now)
                .await;
            if let Err(e) = result {
                debug!(job_id = %job_id, error = %e, "log event forwarding stopped after store error");
                break;
            }
        }
    });
    (ChannelLogSink { tx }, handle)
}

#[cfg(test)]
#[path = "event_log_tests.rs"]
mod tests;
