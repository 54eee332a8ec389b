// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The caller-facing request and its normalized, in-memory derivative.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// The kind of preparation a [`Request`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepareKind {
    Psql,
    #[serde(rename = "lb")]
    Liquibase,
}

impl PrepareKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrepareKind::Psql => "psql",
            PrepareKind::Liquibase => "lb",
        }
    }
}

impl std::fmt::Display for PrepareKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution mode for invoking an external Liquibase executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquibaseExecMode {
    Auto,
    WindowsBat,
    Native,
}

impl Default for LiquibaseExecMode {
    fn default() -> Self {
        LiquibaseExecMode::Auto
    }
}

/// The caller-supplied request, as received by `Submit`.
///
/// All fields required unless noted (see spec.md §6 for the external wire
/// shape this mirrors).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub kind: PrepareKind,
    pub image_id: String,
    #[serde(default)]
    pub plan_only: bool,

    // psql-only
    #[serde(default)]
    pub psql_args: Vec<String>,
    #[serde(default)]
    pub psql_stdin: Option<String>,

    // liquibase-only
    #[serde(default)]
    pub liquibase_args: Vec<String>,
    #[serde(default)]
    pub liquibase_exec: Option<String>,
    #[serde(default)]
    pub liquibase_exec_mode: Option<LiquibaseExecMode>,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default)]
    pub liquibase_env: HashMap<String, String>,
}

/// Tag on an [`InputHash`] identifying what kind of byte stream was hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Command,
    Stdin,
    File,
}

/// A single SHA-256 digest recorded while normalizing a request, tagged with
/// what it was computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputHash {
    pub kind: InputKind,
    /// Origin path for `File` inputs; `None` for `Command`/`Stdin`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub digest: String,
}

/// The normalized, in-memory form of a [`Request`], produced by the argument
/// normalizer (spec.md §4.A) and consumed by the plan builder (§4.B).
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub kind: PrepareKind,
    /// Image reference as given, or already digest-qualified.
    pub image_ref: String,
    /// Resolved, digest-qualified image reference, if known up front.
    pub resolved_image: Option<String>,
    pub plan_only: bool,

    /// Normalized argument list (after defaults like `-X` / `ON_ERROR_STOP=1`
    /// have been applied).
    pub normalized_args: Vec<String>,
    /// Canonical, whitespace-joined form of `normalized_args` used in hashing.
    pub canonical_args: String,

    pub input_hashes: Vec<InputHash>,
    /// Absolute paths that must be lock-acquired during digesting and
    /// execution (script files touched directly or via `\i`/`\include`).
    pub lock_paths: Vec<PathBuf>,

    /// Logical content digest over all inputs (§4.A "Content digest").
    pub content_digest: String,

    pub work_dir: Option<PathBuf>,
    pub liquibase_exec: Option<String>,
    pub liquibase_exec_mode: LiquibaseExecMode,
    pub liquibase_env: HashMap<String, String>,
}

impl PreparedRequest {
    /// The image reference downstream hashing should use: the resolved
    /// (digest-qualified) image if known, else the raw reference.
    pub fn effective_image(&self) -> &str {
        self.resolved_image.as_deref().unwrap_or(&self.image_ref)
    }

    /// True when `image_ref` already carries a `@sha256:` digest suffix.
    pub fn image_is_digested(image_ref: &str) -> bool {
        image_ref.contains("@sha256:")
    }
}
