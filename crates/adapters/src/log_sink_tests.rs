use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn fn_log_sink_forwards_lines_to_the_closure() {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = lines.clone();
    let sink = FnLogSink::new(move |line: &str| captured.lock().push(line.to_string()));

    sink.line("first");
    sink.line("second");

    assert_eq!(*lines.lock(), vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn shared_log_sink_is_object_safe_and_cloneable() {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let captured = lines.clone();
    let sink: SharedLogSink = Arc::new(FnLogSink::new(move |line: &str| {
        captured.lock().push(line.to_string())
    }));

    let sink_clone = sink.clone();
    sink_clone.line("via clone");

    assert_eq!(*lines.lock(), vec!["via clone".to_string()]);
}
