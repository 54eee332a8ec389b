// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sqlrs-normalize: request normalization and fingerprinting (spec.md §4.A).
//!
//! Turns a caller-supplied [`Request`] into a [`PreparedRequest`] the plan
//! builder consumes: validated, defaulted psql/Liquibase arguments, a
//! content digest suitable for cache keying, and the bundle of script-file
//! locks that must stay held from digesting through execution.

pub mod digest;
pub mod error;
pub mod liquibase;
pub mod lock;
pub mod psql;
pub mod wsl;

pub use digest::{compute_content_digest, DigestInput};
pub use error::NormalizeError;
pub use lock::ScriptLocks;
pub use psql::{normalize_psql, PendingInput, PsqlNormalized};
pub use wsl::{map_path, RealWslPlatform, WslPlatform};

use sha2::{Digest as _, Sha256};
use sqlrs_core::{InputHash, InputKind, LiquibaseExecMode, PrepareKind, PreparedRequest, Request};
use std::path::Path;

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Normalize `request` into a [`PreparedRequest`], returning the live
/// [`ScriptLocks`] bundle alongside it so the caller can hand it off to the
/// execution phase unbroken (spec.md §9 "Arena / ownership").
///
/// `cwd` is the working directory psql's top-level `\i`/`\include`
/// directives resolve relative to; Liquibase ignores it (its working
/// directory comes from `request.work_dir`).
pub fn normalize(
    request: &Request,
    cwd: Option<&Path>,
) -> Result<(PreparedRequest, ScriptLocks), NormalizeError> {
    match request.kind {
        PrepareKind::Psql => normalize_psql_request(request, cwd),
        PrepareKind::Liquibase => normalize_liquibase_request(request),
    }
}

fn normalize_psql_request(
    request: &Request,
    cwd: Option<&Path>,
) -> Result<(PreparedRequest, ScriptLocks), NormalizeError> {
    let parsed = psql::normalize_psql(&request.psql_args, request.psql_stdin.as_deref())?;

    let mut locks =
        ScriptLocks::acquire(&parsed.file_paths).map_err(|source| NormalizeError::Io {
            path: parsed
                .file_paths
                .first()
                .cloned()
                .unwrap_or_default(),
            source,
        })?;

    let digest_inputs: Vec<DigestInput<'_>> = parsed
        .inputs
        .iter()
        .map(|pending| match pending {
            PendingInput::Command(s) => DigestInput::Command(s.as_str()),
            PendingInput::Stdin => DigestInput::Stdin(request.psql_stdin.as_deref().unwrap_or("")),
            PendingInput::File(path) => DigestInput::File(path.as_path()),
        })
        .collect();
    let content_digest = compute_content_digest(&digest_inputs, cwd, &mut locks)?;

    let mut input_hashes = Vec::with_capacity(parsed.inputs.len());
    for pending in &parsed.inputs {
        let hash = match pending {
            PendingInput::Command(s) => InputHash {
                kind: InputKind::Command,
                path: None,
                digest: sha256_hex(s.as_bytes()),
            },
            PendingInput::Stdin => InputHash {
                kind: InputKind::Stdin,
                path: None,
                digest: sha256_hex(request.psql_stdin.as_deref().unwrap_or("").as_bytes()),
            },
            PendingInput::File(path) => {
                let bytes = locks.read(path).map_err(|source| NormalizeError::Io {
                    path: path.clone(),
                    source,
                })?;
                InputHash {
                    kind: InputKind::File,
                    path: Some(path.clone()),
                    digest: sha256_hex(&bytes),
                }
            }
        };
        input_hashes.push(hash);
    }

    let prepared = PreparedRequest {
        kind: PrepareKind::Psql,
        image_ref: request.image_id.clone(),
        resolved_image: None,
        plan_only: request.plan_only,
        normalized_args: parsed.normalized_args,
        canonical_args: parsed.canonical_args,
        input_hashes,
        lock_paths: parsed.file_paths,
        content_digest,
        work_dir: None,
        liquibase_exec: None,
        liquibase_exec_mode: LiquibaseExecMode::Auto,
        liquibase_env: Default::default(),
    };

    Ok((prepared, locks))
}

fn normalize_liquibase_request(
    request: &Request,
) -> Result<(PreparedRequest, ScriptLocks), NormalizeError> {
    let changelog = liquibase::validate_liquibase_args(&request.liquibase_args)?;
    let absolute_changelog = liquibase::as_absolute(request.work_dir.as_deref(), &changelog);

    let lock_paths = if absolute_changelog.exists() {
        vec![absolute_changelog.clone()]
    } else {
        Vec::new()
    };
    let locks = ScriptLocks::acquire(&lock_paths).map_err(|source| NormalizeError::Io {
        path: absolute_changelog.clone(),
        source,
    })?;

    let canonical_args = liquibase::canonical_args(&request.liquibase_args);
    let content_digest = sha256_hex(canonical_args.as_bytes());

    let prepared = PreparedRequest {
        kind: PrepareKind::Liquibase,
        image_ref: request.image_id.clone(),
        resolved_image: None,
        plan_only: request.plan_only,
        normalized_args: request.liquibase_args.clone(),
        canonical_args,
        input_hashes: Vec::new(),
        lock_paths,
        content_digest,
        work_dir: request.work_dir.clone(),
        liquibase_exec: request.liquibase_exec.clone(),
        liquibase_exec_mode: request.liquibase_exec_mode.unwrap_or(LiquibaseExecMode::Auto),
        liquibase_env: request.liquibase_env.clone(),
    };

    Ok((prepared, locks))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
