// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log sink threaded through subprocess and runtime calls so individual
//! output lines can be streamed out as `log` events while the full output is
//! still captured for the final return value (spec.md §4.D "Subprocess
//! streaming", §9).

use std::sync::Arc;

/// Receives one streamed line at a time. Installed per-task by the engine;
/// absent when nobody is subscribed to live output.
pub trait LogSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Adapts a closure into a [`LogSink`] without a bespoke type per call site.
pub struct FnLogSink<F>(F);

impl<F: Fn(&str) + Send + Sync> FnLogSink<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F: Fn(&str) + Send + Sync> LogSink for FnLogSink<F> {
    fn line(&self, line: &str) {
        (self.0)(line)
    }
}

pub type SharedLogSink = Arc<dyn LogSink>;

#[cfg(test)]
#[path = "log_sink_tests.rs"]
mod tests;
