// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liquibase runner (spec.md §1, §4.A, §4.D "Liquibase execution").
//!
//! Used twice per job: once at plan time with `updateSQL` substituted for
//! the real command to enumerate pending changesets (spec.md §4.A), and
//! once per `state_execute` task to apply a single changeset for real.

use crate::log_sink::LogSink;
use crate::subprocess::{run_streamed, DEFAULT_LIQUIBASE_TIMEOUT};
use async_trait::async_trait;
use sqlrs_core::LiquibaseExecMode;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum LiquibaseRunnerError {
    #[error("liquibase invocation failed: {0}")]
    Spawn(String),
    #[error("liquibase exited with a failure status: {0}")]
    NonZeroExit(String),
    #[error("liquibase invocation timed out")]
    Timeout,
}

/// Everything needed to shell out to an external Liquibase invocation.
#[derive(Debug, Clone)]
pub struct LiquibaseInvocation {
    pub executable: String,
    pub exec_mode: LiquibaseExecMode,
    pub work_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub args: Vec<String>,
}

#[async_trait]
pub trait LiquibaseRunner: Send + Sync + 'static {
    /// Runs `invocation` to completion and returns its combined stdout+stderr
    /// transcript. Callers substitute `updateSQL` into `invocation.args` for
    /// plan discovery, or the real command keyword for execution.
    async fn run(
        &self,
        invocation: &LiquibaseInvocation,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, LiquibaseRunnerError>;
}

/// Shells out to the configured Liquibase executable (spec.md §4.D).
///
/// `windows-bat`, or a `.bat`/`.cmd` executable under `auto`, rewrites the
/// command to `cmd.exe /c [cd /d <wd> &&] call <exe> <args...>`; otherwise
/// the executable runs directly with its working directory set.
#[derive(Default)]
pub struct ProcessLiquibaseRunner;

impl ProcessLiquibaseRunner {
    pub fn new() -> Self {
        Self
    }
}

fn looks_like_bat(executable: &str) -> bool {
    let lower = executable.to_ascii_lowercase();
    lower.ends_with(".bat") || lower.ends_with(".cmd")
}

fn build_command(invocation: &LiquibaseInvocation) -> Command {
    let use_bat = match invocation.exec_mode {
        LiquibaseExecMode::WindowsBat => true,
        LiquibaseExecMode::Native => false,
        LiquibaseExecMode::Auto => looks_like_bat(&invocation.executable),
    };

    if use_bat {
        let mut cmd = Command::new("cmd.exe");
        cmd.arg("/c");
        let mut script = String::new();
        if let Some(wd) = &invocation.work_dir {
            script.push_str(&format!("cd /d {} && ", wd.display()));
        }
        script.push_str(&format!("call {}", invocation.executable));
        for arg in &invocation.args {
            script.push(' ');
            script.push_str(arg);
        }
        cmd.arg(script);
        cmd.envs(&invocation.env);
        cmd
    } else {
        let mut cmd = Command::new(&invocation.executable);
        cmd.args(&invocation.args);
        if let Some(wd) = &invocation.work_dir {
            cmd.current_dir(wd);
        }
        cmd.envs(&invocation.env);
        cmd
    }
}

#[async_trait]
impl LiquibaseRunner for ProcessLiquibaseRunner {
    async fn run(
        &self,
        invocation: &LiquibaseInvocation,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, LiquibaseRunnerError> {
        let cmd = build_command(invocation);
        let (status, combined) = tokio::time::timeout(DEFAULT_LIQUIBASE_TIMEOUT, run_streamed(cmd, sink))
            .await
            .map_err(|_| LiquibaseRunnerError::Timeout)?
            .map_err(|e| LiquibaseRunnerError::Spawn(e.to_string()))?;

        if !status.success() {
            return Err(LiquibaseRunnerError::NonZeroExit(format!(
                "liquibase exited with {status}: {combined}"
            )));
        }
        Ok(combined)
    }
}

#[cfg(test)]
#[path = "liquibase_runner_tests.rs"]
mod tests;

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeLiquibaseRunner, LiquibaseRunnerCall};

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub struct LiquibaseRunnerCall {
        pub args: Vec<String>,
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<LiquibaseRunnerCall>,
        fails: bool,
        responses: Vec<String>,
    }

    /// In-memory [`LiquibaseRunner`]. Responses are consumed in FIFO order
    /// so a test can script one response for the `updateSQL` plan call and
    /// another for each subsequent per-changeset execute call.
    #[derive(Default)]
    pub struct FakeLiquibaseRunner {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeLiquibaseRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<LiquibaseRunnerCall> {
            self.state.lock().calls.clone()
        }

        pub fn fail(&self) {
            self.state.lock().fails = true;
        }

        /// Queue a response to be returned, in order, by successive `run` calls.
        pub fn push_response(&self, output: impl Into<String>) {
            self.state.lock().responses.push(output.into());
        }
    }

    #[async_trait]
    impl LiquibaseRunner for FakeLiquibaseRunner {
        async fn run(
            &self,
            invocation: &LiquibaseInvocation,
            sink: Option<&dyn LogSink>,
        ) -> Result<String, LiquibaseRunnerError> {
            let mut state = self.state.lock();
            state.calls.push(LiquibaseRunnerCall {
                args: invocation.args.clone(),
            });
            if state.fails {
                return Err(LiquibaseRunnerError::NonZeroExit(
                    "fake liquibase failure".to_string(),
                ));
            }
            let output = if state.responses.is_empty() {
                String::new()
            } else {
                state.responses.remove(0)
            };
            if let Some(sink) = sink {
                for line in output.lines() {
                    sink.line(line);
                }
            }
            Ok(output)
        }
    }
}
