// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Docker CLI-backed [`RuntimeAdapter`] (spec.md §4.F).
//!
//! Every operation shells out to the `docker` binary on `PATH` rather than
//! linking against the Docker Engine API, mirroring how the rest of this
//! crate drives external tools as subprocesses.

use super::{ExecOutput, ExecSpec, Instance, Mount, RuntimeAdapter, RuntimeError, StartSpec};
use crate::log_sink::LogSink;
use crate::subprocess::{
    run_streamed, run_streamed_with_stdin, run_with_timeout, DEFAULT_CONTROL_TIMEOUT,
    DEFAULT_EXEC_TIMEOUT, DEFAULT_START_TIMEOUT,
};
use async_trait::async_trait;
use std::net::TcpListener;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;

pub struct DockerRuntimeAdapter {
    binary: String,
}

impl Default for DockerRuntimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntimeAdapter {
    pub fn new() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }

    /// Override the `docker` executable, e.g. for `podman` compatibility.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self) -> Command {
        Command::new(&self.binary)
    }
}

#[async_trait]
impl RuntimeAdapter for DockerRuntimeAdapter {
    async fn init_base(
        &self,
        image: &str,
        data_dir: &Path,
        sink: Option<&dyn LogSink>,
    ) -> Result<(), RuntimeError> {
        if data_dir.join("PG_VERSION").exists() {
            return Ok(());
        }
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| RuntimeError::InitBase(format!("cannot create {data_dir:?}: {e}")))?;

        let mut cmd = self.command();
        cmd.args([
            "run",
            "--rm",
            "-v",
            &format!("{}:/var/lib/postgresql/data", data_dir.display()),
            "-e",
            "POSTGRES_PASSWORD=sqlrs",
            image,
            "true",
        ]);
        let (status, _combined) = run_streamed(cmd, sink)
            .await
            .map_err(|e| RuntimeError::InitBase(e.to_string()))?;
        if !status.success() {
            return Err(RuntimeError::InitBase(format!(
                "docker run exited with {status}"
            )));
        }
        Ok(())
    }

    async fn resolve_image(
        &self,
        image: &str,
        sink: Option<&dyn LogSink>,
    ) -> Result<String, RuntimeError> {
        let mut pull = self.command();
        pull.args(["pull", "--quiet", image]);
        let (status, _combined) = run_streamed(pull, sink)
            .await
            .map_err(|e| RuntimeError::ResolveImage(e.to_string()))?;
        if !status.success() {
            return Err(RuntimeError::ResolveImage(format!(
                "docker pull {image} exited with {status}"
            )));
        }

        let mut inspect = self.command();
        inspect.args(["inspect", "--format", "{{index .RepoDigests 0}}", image]);
        let output = run_with_timeout(inspect, DEFAULT_CONTROL_TIMEOUT, "docker inspect")
            .await
            .map_err(RuntimeError::ResolveImage)?;
        if !output.status.success() {
            return Err(RuntimeError::ResolveImage(format!(
                "docker inspect {image}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let resolved = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if resolved.is_empty() {
            return Err(RuntimeError::ResolveImage(format!(
                "docker inspect returned no digest for {image}"
            )));
        }
        Ok(resolved)
    }

    async fn start(&self, spec: StartSpec) -> Result<Instance, RuntimeError> {
        let port = pick_free_port().map_err(|e| RuntimeError::Start(e.to_string()))?;

        let mut cmd = self.command();
        cmd.args(["run", "-d", "-p", &format!("{port}:5432")]);
        for mount in &spec.mounts {
            cmd.arg("-v");
            cmd.arg(mount_arg(mount));
        }
        cmd.args([
            "-v",
            &format!("{}:/var/lib/postgresql/data", spec.data_dir.display()),
            "-e",
            "POSTGRES_PASSWORD=sqlrs",
            &spec.image,
        ]);

        let output = run_with_timeout(cmd, DEFAULT_START_TIMEOUT, "docker run")
            .await
            .map_err(RuntimeError::Start)?;
        if !output.status.success() {
            return Err(RuntimeError::Start(format!(
                "docker run: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Instance {
            id: container_id,
            host: "127.0.0.1".to_string(),
            port,
        })
    }

    async fn stop(&self, instance_id: &str) -> Result<(), RuntimeError> {
        let mut cmd = self.command();
        cmd.args(["rm", "-f", instance_id]);
        let output = run_with_timeout(cmd, DEFAULT_CONTROL_TIMEOUT, "docker rm")
            .await
            .map_err(RuntimeError::Stop)?;
        if !output.status.success() {
            return Err(RuntimeError::Stop(format!(
                "docker rm {instance_id}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn exec(
        &self,
        instance_id: &str,
        spec: ExecSpec,
        sink: Option<&dyn LogSink>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut cmd = self.command();
        cmd.arg("exec");
        if spec.stdin.is_some() {
            cmd.arg("-i");
        }
        for (key, value) in &spec.env {
            cmd.arg("-e");
            cmd.arg(format!("{key}={value}"));
        }
        if let Some(workdir) = &spec.workdir {
            cmd.arg("-w");
            cmd.arg(workdir);
        }
        cmd.arg(instance_id);
        cmd.args(&spec.cmd);

        // Merged stdout+stderr, scanned line-by-line so a sink can stream
        // progress (spec.md §4.D, §9); no double-emit, one pass feeds both
        // the sink and the returned buffer.
        let (status, combined) = tokio::time::timeout(
            DEFAULT_EXEC_TIMEOUT,
            run_streamed_with_stdin(cmd, spec.stdin.as_deref(), sink),
        )
        .await
        .map_err(|_| RuntimeError::Exec("exec timed out".to_string()))?
        .map_err(|e| RuntimeError::Exec(e.to_string()))?;

        Ok(ExecOutput {
            stdout: combined,
            stderr: String::new(),
            success: status.success(),
        })
    }

    async fn wait_for_ready(
        &self,
        instance_id: &str,
        timeout: Duration,
    ) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut cmd = self.command();
            cmd.args(["exec", instance_id, "pg_isready", "-U", "postgres"]);
            let output = run_with_timeout(cmd, DEFAULT_CONTROL_TIMEOUT, "pg_isready")
                .await
                .map_err(RuntimeError::NotReady)?;
            if output.status.success() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::NotReady(format!(
                    "{instance_id} did not become ready within {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }
}

fn mount_arg(mount: &Mount) -> String {
    let mode = if mount.read_only { "ro" } else { "rw" };
    format!(
        "{}:{}:{}",
        mount.host_path.display(),
        mount.container_path.display(),
        mode
    )
}

fn pick_free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
