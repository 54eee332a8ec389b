// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stable, matchable error taxonomy surfaced across the public API.

use serde::{Deserialize, Serialize};

/// One of the three visible error kinds (spec.md §6, §7).
///
/// Message text stays free-form (the `details` field on whatever error type
/// carries this code); the code itself is what callers and tests match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidArgument,
    Cancelled,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A terminal, JSON-serializable error record attached to a job or task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Returns `true` when `message` looks like cancellation occurring under a
/// different guise than the sentinel `cancelled` code — e.g. a subprocess
/// that observed context cancellation but reports its own wording.
///
/// Every call site that wraps a subprocess or store error after a context
/// cancellation should route through this instead of re-deriving the
/// heuristic locally (spec.md §5, §7).
pub fn classify_cancellation(was_cancelled: bool, message: &str) -> Option<ErrorCode> {
    if was_cancelled || message.to_ascii_lowercase().contains("cancel") {
        Some(ErrorCode::Cancelled)
    } else {
        None
    }
}

#[cfg(test)]
#[path = "error_code_tests.rs"]
mod tests;
