// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! psql runner (spec.md §1, §4.D "psql in-container invocation").
//!
//! psql itself always runs inside the target container via
//! [`RuntimeAdapter::exec`]; this capability exists as its own seam (rather
//! than engine code calling `exec` directly) so the execution engine can be
//! tested against a runner that never touches a real runtime.

use crate::log_sink::LogSink;
use crate::runtime::{ExecOutput, ExecSpec, RuntimeAdapter, RuntimeError};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PsqlRunnerError {
    #[error("psql exec failed: {0}")]
    Exec(#[from] RuntimeError),
}

/// A single in-container psql invocation.
#[derive(Debug, Clone, Default)]
pub struct PsqlInvocation {
    pub instance_id: String,
    /// Already container-relative `-f`/`--file` arguments and other
    /// normalized flags (spec.md §4.A normalization).
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub stdin: Option<String>,
}

#[async_trait]
pub trait PsqlRunner: Send + Sync + 'static {
    async fn run(
        &self,
        runtime: &dyn RuntimeAdapter,
        invocation: &PsqlInvocation,
        sink: Option<&dyn LogSink>,
    ) -> Result<ExecOutput, PsqlRunnerError>;
}

/// Drives psql through [`RuntimeAdapter::exec`] with a fixed `psql` argv0.
#[derive(Default)]
pub struct ContainerPsqlRunner;

impl ContainerPsqlRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PsqlRunner for ContainerPsqlRunner {
    async fn run(
        &self,
        runtime: &dyn RuntimeAdapter,
        invocation: &PsqlInvocation,
        sink: Option<&dyn LogSink>,
    ) -> Result<ExecOutput, PsqlRunnerError> {
        let mut cmd = vec!["psql".to_string()];
        cmd.extend(invocation.args.iter().cloned());

        let spec = ExecSpec {
            cmd,
            env: Default::default(),
            workdir: invocation.workdir.clone(),
            stdin: invocation.stdin.clone(),
        };
        let output = runtime.exec(&invocation.instance_id, spec, sink).await?;
        Ok(output)
    }
}

#[cfg(test)]
#[path = "psql_runner_tests.rs"]
mod tests;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakePsqlRunner, PsqlRunnerCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct PsqlRunnerCall {
        pub instance_id: String,
        pub args: Vec<String>,
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<PsqlRunnerCall>,
        fails: bool,
        response: Option<ExecOutput>,
    }

    /// In-memory [`PsqlRunner`] for engine tests: never touches a runtime,
    /// records every invocation, and can be configured to fail or return a
    /// canned [`ExecOutput`].
    #[derive(Default)]
    pub struct FakePsqlRunner {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakePsqlRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<PsqlRunnerCall> {
            self.state.lock().calls.clone()
        }

        pub fn fail(&self) {
            self.state.lock().fails = true;
        }

        pub fn set_response(&self, output: ExecOutput) {
            self.state.lock().response = Some(output);
        }
    }

    #[async_trait]
    impl PsqlRunner for FakePsqlRunner {
        async fn run(
            &self,
            _runtime: &dyn RuntimeAdapter,
            invocation: &PsqlInvocation,
            sink: Option<&dyn LogSink>,
        ) -> Result<ExecOutput, PsqlRunnerError> {
            let mut state = self.state.lock();
            state.calls.push(PsqlRunnerCall {
                instance_id: invocation.instance_id.clone(),
                args: invocation.args.clone(),
            });
            if state.fails {
                return Err(PsqlRunnerError::Exec(RuntimeError::Exec(
                    "fake psql failure".to_string(),
                )));
            }
            let output = state.response.clone().unwrap_or(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                success: true,
            });
            if let Some(sink) = sink {
                for line in output.stdout.lines() {
                    sink.line(line);
                }
            }
            Ok(output)
        }
    }
}
