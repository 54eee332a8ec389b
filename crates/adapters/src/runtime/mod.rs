// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container runtime adapter capability set (spec.md §4.F).

mod docker;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use docker::DockerRuntimeAdapter;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeRuntimeAdapter, RuntimeCall};

use crate::log_sink::LogSink;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("cannot initialize base data directory: {0}")]
    InitBase(String),
    #[error("cannot resolve image: {0}")]
    ResolveImage(String),
    #[error("cannot start runtime instance: {0}")]
    Start(String),
    #[error("cannot stop runtime instance: {0}")]
    Stop(String),
    #[error("exec failed: {0}")]
    Exec(String),
    #[error("runtime instance did not become ready: {0}")]
    NotReady(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// A started container instance.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub host: String,
    pub port: u16,
}

/// A bind mount applied when starting a container.
#[derive(Debug, Clone)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

/// Inputs to [`RuntimeAdapter::start`].
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub image: String,
    pub data_dir: PathBuf,
    pub mounts: Vec<Mount>,
}

/// Inputs to [`RuntimeAdapter::exec`].
#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

/// Capability set the execution engine drives a container runtime through
/// (spec.md §4.F). Log sinks let implementations stream image-pull or
/// readiness progress out as `log` events.
#[async_trait]
pub trait RuntimeAdapter: Send + Sync + 'static {
    /// Idempotent: writes `PG_VERSION` on success; skipped if already
    /// present in `data_dir`.
    async fn init_base(
        &self,
        image: &str,
        data_dir: &Path,
        sink: Option<&dyn LogSink>,
    ) -> Result<(), RuntimeError>;

    /// Resolve `image` to a digest-qualified reference. An empty result is
    /// an error (spec.md §4.F).
    async fn resolve_image(
        &self,
        image: &str,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, RuntimeError>;

    async fn start(&self, spec: StartSpec) -> Result<Instance, RuntimeError>;

    async fn stop(&self, instance_id: &str) -> Result<(), RuntimeError>;

    /// `sink`, when set, streams merged stdout+stderr line-by-line as the
    /// process runs (spec.md §4.D "Subprocess streaming"); the full output
    /// is still returned either way.
    async fn exec(
        &self,
        instance_id: &str,
        spec: ExecSpec,
        sink: Option<&dyn LogSink>,
    ) -> Result<ExecOutput, RuntimeError>;

    async fn wait_for_ready(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<(), RuntimeError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
