// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity & plan builder (spec.md §4.B): job signatures, per-task hashes,
//! state IDs, and the ordered task list assembled from a [`PreparedRequest`].

use serde_json::json;
use sha2::{Digest, Sha256};
use sqlrs_core::{
    ChangesetMeta, IdGen, InputRef, InputRefKind, JobId, PrepareKind, PreparedRequest, Task,
    TaskId, TaskKind, TaskStatus,
};

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 over canonical JSON of `{kind, resolved-image, content-digest,
/// plan_only}`, used for retention grouping and dedup (spec.md §4.B).
pub fn compute_job_signature(
    kind: PrepareKind,
    resolved_image: &str,
    content_digest: &str,
    plan_only: bool,
) -> String {
    let canonical = json!({
        "kind": kind.as_str(),
        "resolved_image": resolved_image,
        "content_digest": content_digest,
        "plan_only": plan_only,
    });
    sha256_hex(canonical.to_string().as_bytes())
}

/// SHA-256 over `{kind, normalized-args-string, content-digest,
/// resolved-image}`, plus the changeset id+author for a Liquibase step
/// (spec.md §4.B).
pub fn compute_task_hash(
    kind: PrepareKind,
    canonical_args: &str,
    content_digest: &str,
    resolved_image: &str,
    changeset: Option<&ChangesetMeta>,
) -> String {
    let mut canonical = json!({
        "kind": kind.as_str(),
        "normalized_args": canonical_args,
        "content_digest": content_digest,
        "resolved_image": resolved_image,
    });
    if let Some(changeset) = changeset {
        canonical["changeset_id"] = json!(changeset.changeset_id);
        canonical["author"] = json!(changeset.author);
    }
    sha256_hex(canonical.to_string().as_bytes())
}

/// `hex(SHA-256(input-kind || "|" || input-id || "|" || task-hash))`
/// (spec.md §3 invariants, §4.B).
pub fn compute_state_id(input_kind: InputRefKind, input_id: &str, task_hash: &str) -> String {
    let kind_tag = match input_kind {
        InputRefKind::Image => "image",
        InputRefKind::State => "state",
    };
    sha256_hex(format!("{kind_tag}|{input_id}|{task_hash}").as_bytes())
}

/// Assemble the ordered task list for a job (spec.md §4.B "Plan shape"):
/// an optional leading `resolve_image`, one `state_execute` per logical step
/// (one for psql, one per Liquibase changeset), and a trailing
/// `prepare_instance`.
///
/// `resolved_image` must already be known (the caller resolves it, §4.D step
/// 2, before planning); whether a `resolve_image` task is *emitted* is
/// decided from `prepared.image_ref` as originally given.
pub fn build_plan(
    job_id: &JobId,
    prepared: &PreparedRequest,
    resolved_image: &str,
    changesets: &[ChangesetMeta],
    id_gen: &impl IdGen,
) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut position: u32 = 0;

    if !PreparedRequest::image_is_digested(&prepared.image_ref) {
        tasks.push(new_task(
            job_id,
            id_gen,
            position,
            TaskKind::ResolveImage,
            None,
            None,
            None,
        ));
        position += 1;
    }

    let steps: Vec<Option<&ChangesetMeta>> = if prepared.kind == PrepareKind::Liquibase {
        changesets.iter().map(Some).collect()
    } else {
        vec![None]
    };

    let mut prior_state_id: Option<String> = None;
    for changeset in steps {
        let task_hash = compute_task_hash(
            prepared.kind,
            &prepared.canonical_args,
            &prepared.content_digest,
            resolved_image,
            changeset,
        );
        let (input_kind, input_id) = match &prior_state_id {
            Some(state_id) => (InputRefKind::State, state_id.clone()),
            None => (InputRefKind::Image, resolved_image.to_string()),
        };
        let output_state_id = compute_state_id(input_kind, &input_id, &task_hash);

        tasks.push(new_task(
            job_id,
            id_gen,
            position,
            TaskKind::StateExecute,
            Some(InputRef {
                kind: input_kind,
                id: input_id,
            }),
            Some(output_state_id.clone()),
            changeset.cloned(),
        ));
        position += 1;
        prior_state_id = Some(output_state_id);
    }

    tasks.push(new_task(
        job_id,
        id_gen,
        position,
        TaskKind::PrepareInstance,
        prior_state_id.map(|id| InputRef {
            kind: InputRefKind::State,
            id,
        }),
        None,
        None,
    ));

    tasks
}

#[allow(clippy::too_many_arguments)]
fn new_task(
    job_id: &JobId,
    id_gen: &impl IdGen,
    position: u32,
    kind: TaskKind,
    input: Option<InputRef>,
    output_state_id: Option<String>,
    changeset: Option<ChangesetMeta>,
) -> Task {
    Task {
        job_id: job_id.clone(),
        task_id: TaskId::new(id_gen.next()),
        position,
        kind,
        status: TaskStatus::Queued,
        input,
        output_state_id,
        changeset,
        resolved_image_id: None,
        started_at: None,
        finished_at: None,
        error: None,
        cached: false,
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
