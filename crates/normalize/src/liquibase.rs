// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Liquibase argument validation and changeset-plan parsing (spec.md §4.A).
//!
//! Arguments are validated but not parsed for semantics beyond identifying
//! the changelog file (used for path locking and WSL path mapping) and the
//! command keyword; the actual plan comes from replaying the external
//! runner's `updateSQL` dry run and parsing its `-- Changeset` delimiters.

use crate::error::NormalizeError;
use sqlrs_core::ChangesetMeta;
use std::path::{Path, PathBuf};

const CHANGELOG_FLAGS: &[&str] = &["changelog-file", "changeLogFile", "changelogFile"];

/// The changelog file path referenced by a Liquibase argument list, if any.
pub fn extract_changelog_path(args: &[String]) -> Option<PathBuf> {
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if let Some(rest) = arg.strip_prefix("--") {
            if let Some((name, value)) = rest.split_once('=') {
                if CHANGELOG_FLAGS.contains(&name) {
                    return Some(PathBuf::from(value));
                }
            } else if CHANGELOG_FLAGS.contains(&rest) {
                if let Some(value) = args.get(i + 1) {
                    return Some(PathBuf::from(value));
                }
            }
        }
        i += 1;
    }
    None
}

/// The first non-flag token, i.e. the Liquibase command keyword
/// (`update`, `updateSQL`, `rollback`, ...).
pub fn extract_command_keyword(args: &[String]) -> Option<String> {
    args.iter().find(|a| !a.starts_with('-')).cloned()
}

/// Rewrite `args` to run a dry-run `updateSQL` in place of the real command
/// keyword, for plan discovery (spec.md §4.A, §4.D "Load-or-plan tasks").
pub fn build_update_sql_args(args: &[String]) -> Vec<String> {
    let mut out = args.to_vec();
    if let Some(pos) = out.iter().position(|a| !a.starts_with('-')) {
        out[pos] = "updateSQL".to_string();
    } else {
        out.push("updateSQL".to_string());
    }
    out
}

/// Rewrite `args` to apply exactly `count` pending changeset(s) in place of
/// the real command keyword (spec.md §4.D "state_execute"). One
/// `state_execute` task applies one changeset, so the run loop always calls
/// this with `count = 1`; the parameter exists because `updateCount` is the
/// literal Liquibase verb for "apply the next N pending changesets" — there
/// is no "apply exactly changeset X" flag to target one by identity.
pub fn build_update_count_args(args: &[String], count: u32) -> Vec<String> {
    let mut out = args.to_vec();
    if let Some(pos) = out.iter().position(|a| !a.starts_with('-')) {
        out[pos] = "updateCount".to_string();
        out.insert(pos + 1, count.to_string());
    } else {
        out.push("updateCount".to_string());
        out.push(count.to_string());
    }
    out
}

/// Parse `-- Changeset <file>::<id>::<author>` delimiters out of a
/// `updateSQL` dry-run transcript, one [`ChangesetMeta`] per delimited
/// block in document order.
///
/// An output with zero delimiters is `no pending changesets` — including
/// on a post-crash re-plan, where an empty transcript must be treated the
/// same way rather than as a crash (spec.md §9 Open Questions).
pub fn parse_changesets(output: &str) -> Result<Vec<ChangesetMeta>, NormalizeError> {
    let mut changesets = Vec::new();
    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("-- Changeset ") {
            let parts: Vec<&str> = rest.splitn(3, "::").collect();
            if parts.len() != 3 {
                return Err(NormalizeError::MalformedChangesetDelimiter(rest.to_string()));
            }
            changesets.push(ChangesetMeta {
                file: parts[0].trim().to_string(),
                changeset_id: parts[1].trim().to_string(),
                author: parts[2].trim().to_string(),
            });
        }
    }
    if changesets.is_empty() {
        return Err(NormalizeError::NoPendingChangesets);
    }
    Ok(changesets)
}

/// Validate a Liquibase argument list well enough to identify a changelog,
/// without interpreting the rest. Empty argument lists are rejected: there
/// is no command keyword to run.
pub fn validate_liquibase_args(args: &[String]) -> Result<PathBuf, NormalizeError> {
    extract_changelog_path(args).ok_or(NormalizeError::MissingChangelog)
}

/// Canonical argument string used in task hashing (spec.md §4.B).
pub fn canonical_args(args: &[String]) -> String {
    args.join(" ")
}

pub fn as_absolute(work_dir: Option<&Path>, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else if let Some(wd) = work_dir {
        wd.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
#[path = "liquibase_tests.rs"]
mod tests;
