// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution helpers shared by the runtime, state filesystem, and
//! Liquibase runner adapters.

use crate::log_sink::LogSink;
use std::io;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Default timeout for short, synchronous container control-plane calls
/// (`docker inspect`, `docker stop`, ...).
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for starting a container.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for an in-container `exec` call (psql / pg_isready).
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Default timeout for an external Liquibase invocation.
pub const DEFAULT_LIQUIBASE_TIMEOUT: Duration = Duration::from_secs(900);

/// Default timeout for a state-directory clone or snapshot operation.
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Large enough to tolerate verbose Liquibase/psql output without
/// reallocating line-by-line (spec.md §9 "Subprocess log streaming").
const STREAM_BUFFER_CAPACITY: usize = 1024 * 1024;

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting timeout
/// expiration into a descriptive error message. The child process is killed
/// automatically if the timeout elapses (via the tokio `Child` drop impl).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{description} failed: {io_err}")),
        Err(_elapsed) => Err(format!(
            "{description} timed out after {}s",
            timeout.as_secs()
        )),
    }
}

/// Run a subprocess with merged stdout+stderr, scanned line-by-line.
///
/// Each non-empty line is forwarded to `sink` (if installed) as it arrives,
/// and also accumulated into the returned buffer — the engine must not
/// double-emit, so streaming and final capture share this single pass
/// (spec.md §4.D, §9).
pub async fn run_streamed(
    mut cmd: Command,
    sink: Option<&dyn LogSink>,
) -> io::Result<(ExitStatus, String)> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    #[allow(clippy::expect_used)]
    let stdout = child
        .stdout
        .take()
        .expect("stdout is piped by run_streamed");
    #[allow(clippy::expect_used)]
    let stderr = child
        .stderr
        .take()
        .expect("stderr is piped by run_streamed");

    let mut out_lines = BufReader::with_capacity(STREAM_BUFFER_CAPACITY, stdout).lines();
    let mut err_lines = BufReader::with_capacity(STREAM_BUFFER_CAPACITY, stderr).lines();

    let mut combined = String::new();
    let mut out_done = false;
    let mut err_done = false;

    while !out_done || !err_done {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => {
                match line? {
                    Some(line) => emit_line(&mut combined, &line, sink),
                    None => out_done = true,
                }
            }
            line = err_lines.next_line(), if !err_done => {
                match line? {
                    Some(line) => emit_line(&mut combined, &line, sink),
                    None => err_done = true,
                }
            }
        }
    }

    let status = child.wait().await?;
    Ok((status, combined))
}

/// Like [`run_streamed`], but writes `stdin` (if any) to the child before
/// reading its output. Used by in-container `exec` calls that pipe a script
/// over stdin (spec.md §4.D "psql in-container invocation").
pub async fn run_streamed_with_stdin(
    mut cmd: Command,
    stdin: Option<&str>,
    sink: Option<&dyn LogSink>,
) -> io::Result<(ExitStatus, String)> {
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }

    let mut child = cmd.spawn()?;

    if let Some(stdin) = stdin {
        use tokio::io::AsyncWriteExt;
        #[allow(clippy::expect_used)]
        let mut child_stdin = child
            .stdin
            .take()
            .expect("stdin is piped when stdin is Some");
        child_stdin.write_all(stdin.as_bytes()).await?;
        drop(child_stdin);
    }

    #[allow(clippy::expect_used)]
    let stdout = child
        .stdout
        .take()
        .expect("stdout is piped by run_streamed_with_stdin");
    #[allow(clippy::expect_used)]
    let stderr = child
        .stderr
        .take()
        .expect("stderr is piped by run_streamed_with_stdin");

    let mut out_lines = BufReader::with_capacity(STREAM_BUFFER_CAPACITY, stdout).lines();
    let mut err_lines = BufReader::with_capacity(STREAM_BUFFER_CAPACITY, stderr).lines();

    let mut combined = String::new();
    let mut out_done = false;
    let mut err_done = false;

    while !out_done || !err_done {
        tokio::select! {
            line = out_lines.next_line(), if !out_done => {
                match line? {
                    Some(line) => emit_line(&mut combined, &line, sink),
                    None => out_done = true,
                }
            }
            line = err_lines.next_line(), if !err_done => {
                match line? {
                    Some(line) => emit_line(&mut combined, &line, sink),
                    None => err_done = true,
                }
            }
        }
    }

    let status = child.wait().await?;
    Ok((status, combined))
}

fn emit_line(combined: &mut String, line: &str, sink: Option<&dyn LogSink>) {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if let Some(sink) = sink {
        if !line.is_empty() {
            sink.line(line);
        }
    }
    combined.push_str(line);
    combined.push('\n');
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
