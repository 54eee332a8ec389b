// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`RuntimeAdapter`] for tests (spec.md §4.F). Records every call
//! so tests can assert on call order and arguments, and lets individual
//! operations be configured to fail.

use super::{ExecOutput, ExecSpec, Instance, RuntimeAdapter, RuntimeError, StartSpec};
use crate::log_sink::LogSink;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub enum RuntimeCall {
    InitBase { image: String, data_dir: PathBuf },
    ResolveImage { image: String },
    Start { image: String },
    Stop { instance_id: String },
    Exec { instance_id: String, cmd: Vec<String> },
    WaitForReady { instance_id: String },
}

#[derive(Default)]
struct FakeState {
    calls: Vec<RuntimeCall>,
    resolve_fails: bool,
    start_fails: bool,
    exec_fails: bool,
    ready_fails: bool,
    resolved_image: Option<String>,
    exec_response: Option<ExecOutput>,
    instances: HashMap<String, Instance>,
}

pub struct FakeRuntimeAdapter {
    state: Arc<Mutex<FakeState>>,
    next_instance: AtomicU32,
}

impl Default for FakeRuntimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntimeAdapter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState::default())),
            next_instance: AtomicU32::new(1),
        }
    }

    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.state.lock().calls.clone()
    }

    pub fn fail_resolve(&self) {
        self.state.lock().resolve_fails = true;
    }

    pub fn fail_start(&self) {
        self.state.lock().start_fails = true;
    }

    pub fn fail_exec(&self) {
        self.state.lock().exec_fails = true;
    }

    pub fn fail_ready(&self) {
        self.state.lock().ready_fails = true;
    }

    pub fn set_resolved_image(&self, image: impl Into<String>) {
        self.state.lock().resolved_image = Some(image.into());
    }

    pub fn set_exec_response(&self, output: ExecOutput) {
        self.state.lock().exec_response = Some(output);
    }
}

#[async_trait]
impl RuntimeAdapter for FakeRuntimeAdapter {
    async fn init_base(
        &self,
        image: &str,
        data_dir: &std::path::Path,
        _sink: Option<&dyn LogSink>,
    ) -> Result<(), RuntimeError> {
        self.state.lock().calls.push(RuntimeCall::InitBase {
            image: image.to_string(),
            data_dir: data_dir.to_path_buf(),
        });
        // Stand in for the real adapter's `initdb` run: drop the marker file
        // the state cache's presence check looks for, so a fake-driven state
        // built from an image input is a real cache hit on the next lookup.
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| RuntimeError::InitBase(e.to_string()))?;
        tokio::fs::write(data_dir.join("PG_VERSION"), "16\n")
            .await
            .map_err(|e| RuntimeError::InitBase(e.to_string()))?;
        Ok(())
    }

    async fn resolve_image(
        &self,
        image: &str,
        _sink: Option<&dyn LogSink>,
    ) -> Result<String, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::ResolveImage {
            image: image.to_string(),
        });
        if state.resolve_fails {
            return Err(RuntimeError::ResolveImage(format!("cannot resolve {image}")));
        }
        Ok(state
            .resolved_image
            .clone()
            .unwrap_or_else(|| format!("{image}@sha256:fake")))
    }

    async fn start(&self, spec: StartSpec) -> Result<Instance, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Start {
            image: spec.image.clone(),
        });
        if state.start_fails {
            return Err(RuntimeError::Start(format!("cannot start {}", spec.image)));
        }
        let n = self.next_instance.fetch_add(1, Ordering::SeqCst);
        let instance = Instance {
            id: format!("fake-instance-{n}"),
            host: "127.0.0.1".to_string(),
            port: 10000 + n as u16,
        };
        state.instances.insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn stop(&self, instance_id: &str) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Stop {
            instance_id: instance_id.to_string(),
        });
        state.instances.remove(instance_id);
        Ok(())
    }

    async fn exec(
        &self,
        instance_id: &str,
        spec: ExecSpec,
        _sink: Option<&dyn LogSink>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::Exec {
            instance_id: instance_id.to_string(),
            cmd: spec.cmd.clone(),
        });
        if state.exec_fails {
            return Err(RuntimeError::Exec(format!("exec failed on {instance_id}")));
        }
        Ok(state.exec_response.clone().unwrap_or(ExecOutput {
            stdout: String::new(),
            stderr: String::new(),
            success: true,
        }))
    }

    async fn wait_for_ready(
        &self,
        instance_id: &str,
        _timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state.lock();
        state.calls.push(RuntimeCall::WaitForReady {
            instance_id: instance_id.to_string(),
        });
        if state.ready_fails {
            return Err(RuntimeError::NotReady(format!(
                "{instance_id} never became ready"
            )));
        }
        Ok(())
    }
}
