// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn legal_transitions_are_exactly_the_documented_set() {
    assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Running));
    assert!(TaskStatus::Queued.can_transition_to(TaskStatus::Cancelled));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Succeeded));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Failed));
    assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
}

#[test]
fn no_terminal_status_transitions_anywhere() {
    for terminal in [
        TaskStatus::Succeeded,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ] {
        for next in [
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            assert!(!terminal.can_transition_to(next), "{terminal:?} -> {next:?}");
        }
    }
}

#[test]
fn queued_cannot_jump_straight_to_succeeded_or_failed() {
    assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Succeeded));
    assert!(!TaskStatus::Queued.can_transition_to(TaskStatus::Failed));
}

#[test]
fn task_round_trips_through_json_with_changeset_metadata() {
    let task = Task {
        job_id: JobId::new("job-1"),
        task_id: TaskId::new("task-1"),
        position: 1,
        kind: TaskKind::StateExecute,
        status: TaskStatus::Succeeded,
        input: Some(InputRef {
            kind: InputRefKind::State,
            id: "state-a".to_string(),
        }),
        output_state_id: Some("state-b".to_string()),
        changeset: Some(ChangesetMeta {
            changeset_id: "2".to_string(),
            author: "dev".to_string(),
            file: "changelog.xml".to_string(),
        }),
        resolved_image_id: None,
        started_at: Some(10),
        finished_at: Some(20),
        error: None,
        cached: false,
    };
    let encoded = serde_json::to_string(&task).expect("serialize task");
    let decoded: Task = serde_json::from_str(&encoded).expect("deserialize task");
    assert_eq!(decoded.output_state_id, task.output_state_id);
    assert_eq!(decoded.changeset.unwrap().changeset_id, "2");
}
