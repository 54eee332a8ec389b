// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Errors surfaced by argument normalization (spec.md §4.A).

use sqlrs_core::ErrorDetail;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while normalizing a request into a [`crate::PreparedArgs`].
///
/// Every variant here is a validation failure the caller should surface
/// synchronously from `Submit` with code `invalid_argument`, except
/// [`NormalizeError::Io`], which is an unexpected filesystem failure and
/// maps to `internal_error`.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("positional arguments are not allowed")]
    PositionalArgument(String),
    #[error("connection-override flag is not allowed: {0}")]
    ConnectionOverrideFlag(String),
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("ON_ERROR_STOP must be set to 1, got: {0}")]
    InvalidOnErrorStop(String),
    #[error("-f - requires stdin to be provided")]
    StdinFileWithoutStdin,
    #[error("stdin was provided but no -f - argument was given")]
    StdinWithoutStdinFile,
    #[error("-f path must be absolute: {0}")]
    NonAbsoluteFilePath(String),
    #[error("empty include path")]
    EmptyIncludePath,
    #[error("no working directory available for relative \\i include")]
    MissingWorkingDirectory,
    #[error("recursive include detected: {0}")]
    RecursiveInclude(String),
    #[error("include file not found: {0}")]
    MissingIncludeFile(PathBuf),
    #[error("no changelog file could be identified in liquibase arguments")]
    MissingChangelog,
    #[error("no pending changesets")]
    NoPendingChangesets,
    #[error("malformed changeset delimiter: {0}")]
    MalformedChangesetDelimiter(String),
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NormalizeError {
    /// Whether this failure is a caller input mistake (`invalid_argument`)
    /// as opposed to an unexpected environment failure (`internal_error`).
    pub fn is_validation(&self) -> bool {
        !matches!(self, NormalizeError::Io { .. })
    }

    pub fn to_error_detail(&self) -> ErrorDetail {
        if self.is_validation() {
            ErrorDetail::invalid_argument(self.to_string())
        } else {
            ErrorDetail::internal(self.to_string())
        }
    }
}
