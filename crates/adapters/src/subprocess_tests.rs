use super::*;
use crate::log_sink::FnLogSink;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::process::Command;

#[tokio::test]
async fn run_with_timeout_success() {
    let mut cmd = Command::new("echo");
    cmd.arg("hello");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "echo")
        .await
        .unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[tokio::test]
async fn run_with_timeout_nonzero_exit_is_not_an_error() {
    let cmd = Command::new("false");
    let output = run_with_timeout(cmd, Duration::from_secs(5), "false")
        .await
        .unwrap();
    assert!(!output.status.success());
}

#[tokio::test]
async fn run_with_timeout_io_error() {
    let cmd = Command::new("/nonexistent/binary");
    let result = run_with_timeout(cmd, Duration::from_secs(5), "nonexistent").await;
    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(err.starts_with("nonexistent failed:"), "got: {err}");
}

#[tokio::test]
async fn run_with_timeout_timeout_elapsed() {
    let mut cmd = Command::new("sleep");
    cmd.arg("10");
    let result = run_with_timeout(cmd, Duration::from_millis(100), "test sleep").await;
    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(err.contains("timed out"), "got: {err}");
    assert!(err.contains("test sleep"), "got: {err}");
}

#[tokio::test]
async fn run_streamed_captures_stdout_and_stderr_combined() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "echo out-line; echo err-line 1>&2"]);
    let (status, combined) = run_streamed(cmd, None).await.unwrap();
    assert!(status.success());
    assert!(combined.contains("out-line"));
    assert!(combined.contains("err-line"));
}

#[tokio::test]
async fn run_streamed_forwards_each_non_empty_line_to_the_sink() {
    let received: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = received.clone();
    let sink = FnLogSink::new(move |line: &str| captured.lock().push(line.to_string()));

    let mut cmd = Command::new("sh");
    cmd.args(["-c", "printf 'one\\ntwo\\n\\nthree\\n'"]);
    let (status, combined) = run_streamed(cmd, Some(&sink)).await.unwrap();

    assert!(status.success());
    assert_eq!(*received.lock(), vec!["one", "two", "three"]);
    assert_eq!(combined, "one\ntwo\n\nthree\n");
}

#[tokio::test]
async fn run_streamed_strips_trailing_carriage_return() {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", "printf 'line\\r\\n'"]);
    let (_status, combined) = run_streamed(cmd, None).await.unwrap();
    assert_eq!(combined, "line\n");
}

#[tokio::test]
async fn run_streamed_reports_nonzero_exit_status() {
    let cmd = Command::new("false");
    let (status, _combined) = run_streamed(cmd, None).await.unwrap();
    assert!(!status.success());
}
