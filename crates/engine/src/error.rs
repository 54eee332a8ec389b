// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator's error type and the cancellation-classification helper
//! every call site that wraps a subprocess or store error routes through
//! (spec.md §5, §7).

use sqlrs_core::{ErrorCode, ErrorDetail};
use thiserror::Error;

/// Errors surfaced by the execution engine. Every variant carries (or maps
/// cleanly to) one of the three visible error kinds from spec.md §6/§7.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl EngineError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        EngineError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Reconstruct an [`EngineError`] from a previously-recorded
    /// [`ErrorDetail`] (e.g. a terminal task's stored error), preserving its
    /// code rather than collapsing everything to `Internal` (spec.md §4.D:
    /// "`failed` or `cancelled`, fail the job").
    pub fn from_detail(detail: ErrorDetail) -> Self {
        match detail.code {
            ErrorCode::InvalidArgument => EngineError::InvalidArgument(detail.message),
            ErrorCode::Cancelled => EngineError::Cancelled,
            ErrorCode::InternalError => EngineError::Internal {
                message: detail.message,
                source: None,
            },
        }
    }

    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        EngineError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            EngineError::Cancelled => ErrorCode::Cancelled,
            EngineError::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// The stable, test-matched message this error surfaces as, independent
    /// of whatever `source` is wrapped underneath (spec.md §6 error
    /// taxonomy: "Details field carries the originating low-level message").
    pub fn to_detail(&self) -> ErrorDetail {
        let message = match self {
            EngineError::InvalidArgument(m) => m.clone(),
            EngineError::Cancelled => "cancelled".to_string(),
            EngineError::Internal { message, .. } => message.clone(),
        };
        let mut detail = ErrorDetail::new(self.code(), message);
        if let EngineError::Internal {
            source: Some(source),
            ..
        } = self
        {
            detail = detail.with_details(source.to_string());
        }
        detail
    }

    /// Re-code `self` to `Cancelled` if `was_cancelled` is true or the
    /// wrapped message looks like cancellation under another guise (spec.md
    /// §5 "a runner that returns ... after observing ctx.Done() must still
    /// produce a `cancelled` task result").
    pub fn reclassify_cancellation(self, was_cancelled: bool) -> Self {
        let message = match &self {
            EngineError::InvalidArgument(m) => m.clone(),
            EngineError::Cancelled => return self,
            EngineError::Internal { message, .. } => message.clone(),
        };
        match sqlrs_core::classify_cancellation(was_cancelled, &message) {
            Some(ErrorCode::Cancelled) => EngineError::Cancelled,
            _ => self,
        }
    }
}

impl From<sqlrs_storage::StorageError> for EngineError {
    fn from(e: sqlrs_storage::StorageError) -> Self {
        match e {
            sqlrs_storage::StorageError::Cancelled => EngineError::Cancelled,
            sqlrs_storage::StorageError::NotReady(m) => {
                EngineError::internal(format!("state store not ready: {m}"))
            }
            other => EngineError::internal_with_source("queue store error", other),
        }
    }
}

impl From<sqlrs_storage::MetadataError> for EngineError {
    fn from(e: sqlrs_storage::MetadataError) -> Self {
        EngineError::internal_with_source("metadata store error", e)
    }
}

impl From<sqlrs_normalize::NormalizeError> for EngineError {
    fn from(e: sqlrs_normalize::NormalizeError) -> Self {
        if e.is_validation() {
            EngineError::InvalidArgument(e.to_string())
        } else {
            EngineError::internal_with_source("cannot normalize request", e)
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
