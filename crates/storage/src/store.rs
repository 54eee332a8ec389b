// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The queue store: serializable job/task/event operations over a durable
//! WAL-backed [`MaterializedState`], plus the event bus wiring for
//! `WaitForEvent` (spec.md §4.E).

use crate::event_bus::EventBus;
use crate::queue_op::QueueOp;
use crate::state::MaterializedState;
use crate::wal::Wal;
use crate::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use sqlrs_core::{Event, EventPayload, Job, JobStatus, Task};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// The capability set the execution engine consumes for persistence
/// (spec.md §4.E). Every method is atomic with respect to the others.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn create_job(&self, job: Job) -> Result<(), StorageError>;
    async fn update_job(&self, job: Job) -> Result<(), StorageError>;
    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StorageError>;
    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError>;
    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StorageError>;
    async fn list_jobs_by_signature(&self, signature: &str) -> Result<Vec<Job>, StorageError>;
    async fn delete_job(&self, job_id: &str) -> Result<(), StorageError>;

    async fn replace_tasks(&self, job_id: &str, tasks: Vec<Task>) -> Result<(), StorageError>;
    async fn list_tasks(&self, job_id: &str) -> Result<Vec<Task>, StorageError>;
    async fn update_task(&self, task: Task) -> Result<(), StorageError>;

    /// Appends an event at the next offset for `job_id` and returns it.
    async fn append_event(
        &self,
        job_id: &str,
        payload: EventPayload,
        timestamp: u64,
    ) -> Result<Event, StorageError>;
    async fn list_events_since(&self, job_id: &str, offset: u64) -> Result<Vec<Event>, StorageError>;
    async fn count_events(&self, job_id: &str) -> Result<u64, StorageError>;

    /// Blocks until `count_events(job_id) > offset`, the job reaches a
    /// terminal status, or `cancel` fires.
    async fn wait_for_event(
        &self,
        job_id: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError>;
}

struct Inner {
    wal: Wal,
    state: MaterializedState,
}

/// WAL-backed [`QueueStore`]. Holds the entire materialized state in memory,
/// guarded by a single mutex (spec.md §5: "single connection, serialized
/// writes; read scans allowed concurrent" — reads take the same lock here
/// since the state lives in memory and the critical section is cheap).
pub struct WalQueueStore {
    inner: Mutex<Inner>,
    bus: EventBus,
}

impl WalQueueStore {
    /// Open (or create) the WAL at `wal_path`, optionally seeded from a
    /// prior snapshot's materialized state and sequence number.
    pub fn open(
        wal_path: &Path,
        seed: Option<(u64, MaterializedState)>,
    ) -> Result<Self, StorageError> {
        let (processed_seq, mut state) = match seed {
            Some((seq, state)) => (seq, state),
            None => (0, MaterializedState::new()),
        };

        let mut wal = Wal::open(wal_path, processed_seq)?;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply(&entry.op);
            wal.mark_processed(entry.seq);
        }

        Ok(Self {
            inner: Mutex::new(Inner { wal, state }),
            bus: EventBus::new(),
        })
    }

    fn commit(&self, inner: &mut Inner, op: QueueOp) -> Result<(), StorageError> {
        inner.wal.append(&op)?;
        inner.wal.flush()?;
        inner.state.apply(&op);
        Ok(())
    }

    /// Snapshot the current state and WAL sequence, for checkpointing.
    pub fn snapshot_state(&self) -> (u64, MaterializedState) {
        let inner = self.inner.lock();
        (inner.wal.processed_seq(), inner.state.clone())
    }

    /// Truncate the WAL up to `seq`, called after a checkpoint completes.
    pub fn truncate_wal(&self, seq: u64) -> Result<(), StorageError> {
        self.inner.lock().wal.truncate_before(seq)?;
        Ok(())
    }
}

#[async_trait]
impl QueueStore for WalQueueStore {
    async fn create_job(&self, job: Job) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, QueueOp::JobCreated { job })
    }

    async fn update_job(&self, job: Job) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, QueueOp::JobUpdated { job })
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        Ok(self.inner.lock().state.jobs.get(job_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError> {
        Ok(self.inner.lock().state.jobs.values().cloned().collect())
    }

    async fn list_jobs_by_status(&self, status: JobStatus) -> Result<Vec<Job>, StorageError> {
        Ok(self
            .inner
            .lock()
            .state
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect())
    }

    async fn list_jobs_by_signature(&self, signature: &str) -> Result<Vec<Job>, StorageError> {
        Ok(self
            .inner
            .lock()
            .state
            .jobs
            .values()
            .filter(|j| j.signature == signature)
            .cloned()
            .collect())
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), StorageError> {
        {
            let mut inner = self.inner.lock();
            self.commit(
                &mut inner,
                QueueOp::JobDeleted {
                    job_id: sqlrs_core::JobId::new(job_id),
                },
            )?;
        }
        self.bus.remove(job_id);
        Ok(())
    }

    async fn replace_tasks(&self, job_id: &str, tasks: Vec<Task>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.commit(
            &mut inner,
            QueueOp::TasksReplaced {
                job_id: sqlrs_core::JobId::new(job_id),
                tasks,
            },
        )
    }

    async fn list_tasks(&self, job_id: &str) -> Result<Vec<Task>, StorageError> {
        Ok(self
            .inner
            .lock()
            .state
            .tasks
            .get(job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update_task(&self, task: Task) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.commit(&mut inner, QueueOp::TaskUpdated { task })
    }

    async fn append_event(
        &self,
        job_id: &str,
        payload: EventPayload,
        timestamp: u64,
    ) -> Result<Event, StorageError> {
        let event = {
            let mut inner = self.inner.lock();
            let offset = inner.state.event_count(job_id);
            let event = Event::new(offset, timestamp, payload);
            self.commit(
                &mut inner,
                QueueOp::EventAppended {
                    job_id: sqlrs_core::JobId::new(job_id),
                    event: event.clone(),
                },
            )?;
            event
        };
        self.bus.notify(job_id);
        Ok(event)
    }

    async fn list_events_since(&self, job_id: &str, offset: u64) -> Result<Vec<Event>, StorageError> {
        Ok(self
            .inner
            .lock()
            .state
            .events
            .get(job_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.offset >= offset)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn count_events(&self, job_id: &str) -> Result<u64, StorageError> {
        Ok(self.inner.lock().state.event_count(job_id))
    }

    async fn wait_for_event(
        &self,
        job_id: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        loop {
            let notified = self.bus.subscribe_notified(job_id);

            let (count, terminal) = {
                let inner = self.inner.lock();
                let count = inner.state.event_count(job_id);
                let terminal = inner
                    .state
                    .jobs
                    .get(job_id)
                    .map_or(true, |j| j.is_terminal());
                (count, terminal)
            };

            if count > offset || terminal {
                return Ok(());
            }

            tokio::select! {
                _ = notified => continue,
                _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            }
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
