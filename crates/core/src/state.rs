// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata-store records for the content-addressed state cache and the
//! running instances cloned from it (spec.md §3, §4.C).

use crate::request::PrepareKind;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifies an instance cloned from a [`StateEntry`].
    pub struct InstanceId;
}

/// A persisted, content-addressed Postgres data directory.
///
/// A `StateEntry` is only valid when the corresponding on-disk directory
/// exists, contains `PG_VERSION`, and contains no `postmaster.pid`
/// (spec.md §3 invariant); that check is performed by the state cache, not
/// by this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    /// Hex-encoded `SHA-256(input-kind || input-id || task-hash)`.
    pub state_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_state_id: Option<String>,
    /// Digest-qualified image ID this state's chain is rooted at.
    pub image_id: String,
    pub prepare_kind: PrepareKind,
    pub normalized_args: String,
    pub created_at: u64,
    pub size_bytes: u64,
    pub ref_count: u32,
}

impl StateEntry {
    pub fn is_root(&self) -> bool {
        self.parent_state_id.is_none()
    }
}

/// A running container cloned from a [`StateEntry`] (spec.md §3 "InstanceEntry").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceEntry {
    pub instance_id: InstanceId,
    pub state_id: String,
    pub container_id: String,
    pub runtime_dir: String,
    pub host: String,
    pub port: u16,
}

impl InstanceEntry {
    /// The DSN for this instance under the fixed super-role `sqlrs`/`postgres`
    /// (spec.md §4.D "Connection info").
    pub fn dsn(&self) -> String {
        format!(
            "postgres://sqlrs:postgres@{}:{}",
            self.host, self.port
        )
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
