// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide, job-keyed notification fan-out (spec.md §4.E).
//!
//! `AppendEvent` calls `notify(job_id)`; `WaitForEvent` subscribes, then
//! re-checks the event count to close the race where an append lands
//! between the caller's last check and its subscription.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
pub struct EventBus {
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake every current subscriber for `job_id`. Non-blocking and
    /// best-effort: a `Notify` with no waiters simply buffers one permit.
    pub fn notify(&self, job_id: &str) {
        if let Some(notify) = self.waiters.lock().get(job_id) {
            notify.notify_waiters();
        }
    }

    fn subscribe(&self, job_id: &str) -> Arc<Notify> {
        self.waiters
            .lock()
            .entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Returns a future that resolves the next time `job_id` is notified.
    /// Callers must subscribe *before* re-checking their predicate (e.g.
    /// `CountEvents`) to avoid missing a notification that fires in between.
    pub fn subscribe_notified(&self, job_id: &str) -> impl std::future::Future<Output = ()> {
        let notify = self.subscribe(job_id);
        async move { notify.notified().await }
    }

    /// Drop the waiter slot for a job once it reaches a terminal status and
    /// no longer needs notifications, bounding memory growth.
    pub fn remove(&self, job_id: &str) {
        self.waiters.lock().remove(job_id);
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
