// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sqlrs_core::{Job, JobId, JobStatus, PrepareKind};
use tempfile::tempdir;

fn job_op(id: &str) -> QueueOp {
    QueueOp::JobCreated {
        job: Job {
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
            signature: "sig".to_string(),
        },
    }
}

#[test]
fn append_and_flush_makes_entries_durable() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).expect("open wal");

    let seq = wal.append(&job_op("job-1")).expect("append");
    assert_eq!(seq, 1);
    wal.flush().expect("flush");

    let entries = wal.entries_after(0).expect("entries_after");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].seq, 1);
}

#[test]
fn reopening_wal_preserves_write_sequence() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).expect("open wal");
        wal.append(&job_op("job-1")).expect("append");
        wal.append(&job_op("job-2")).expect("append");
        wal.flush().expect("flush");
    }

    let wal = Wal::open(&path, 0).expect("reopen wal");
    assert_eq!(wal.write_seq(), 2);
}

#[test]
fn next_unprocessed_returns_entries_in_order_then_none() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).expect("open wal");

    wal.append(&job_op("job-1")).expect("append");
    wal.append(&job_op("job-2")).expect("append");

    let first = wal.next_unprocessed().expect("next").expect("some entry");
    assert_eq!(first.seq, 1);
    wal.mark_processed(first.seq);

    let second = wal.next_unprocessed().expect("next").expect("some entry");
    assert_eq!(second.seq, 2);
    wal.mark_processed(second.seq);

    assert!(wal.next_unprocessed().expect("next").is_none());
}

#[test]
fn truncate_before_drops_processed_entries() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wal.jsonl");
    let mut wal = Wal::open(&path, 0).expect("open wal");

    wal.append(&job_op("job-1")).expect("append");
    wal.append(&job_op("job-2")).expect("append");
    wal.append(&job_op("job-3")).expect("append");
    wal.flush().expect("flush");
    wal.mark_processed(2);

    wal.truncate_before(3).expect("truncate");

    let remaining = wal.entries_after(0).expect("entries_after");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].seq, 3);
}

#[test]
fn corrupt_trailing_entry_is_rotated_to_bak_on_open() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("wal.jsonl");

    {
        let mut wal = Wal::open(&path, 0).expect("open wal");
        wal.append(&job_op("job-1")).expect("append");
        wal.flush().expect("flush");
    }

    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .expect("reopen for corruption");
        file.write_all(b"not valid json\n").expect("write garbage");
    }

    let wal = Wal::open(&path, 0).expect("open survives corruption");
    assert_eq!(wal.write_seq(), 1);
    assert!(dir.path().join("wal.bak").exists());
}
