// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Logical content digest over psql inputs, with recursive `\i`/`\include`/
//! `\ir`/`\include_relative` expansion (spec.md §4.A "Content digest",
//! §9 "Cyclic / graph-like data").
//!
//! Two trees with identical effective SQL but different include-style
//! produce the same digest: every expanded include is wrapped in the same
//! sentinel lines as the top-level input boundary, so the hash is
//! independent of which directive pulled it in.

use crate::error::NormalizeError;
use crate::lock::ScriptLocks;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The sentinel line separating logical inputs and wrapping expanded
/// includes (spec.md §4.A).
pub const INPUT_BOUNDARY: &str = "-- sqlrs: input-boundary";

/// One logical input to the content digest: either a `-c` command, the
/// supplied stdin, or an `-f` script file.
pub enum DigestInput<'a> {
    Command(&'a str),
    Stdin(&'a str),
    File(&'a Path),
}

/// Compute the logical content digest over `inputs`, in order.
///
/// `working_dir` is the directory `\i`/`\include` resolve relative to
/// (regardless of nesting depth); `\ir`/`\include_relative` always resolve
/// relative to the directory of the file containing the directive.
pub fn compute_content_digest(
    inputs: &[DigestInput<'_>],
    working_dir: Option<&Path>,
    locks: &mut ScriptLocks,
) -> Result<String, NormalizeError> {
    let mut active = HashSet::new();
    let mut parts = Vec::with_capacity(inputs.len());

    for input in inputs {
        let (text, current_dir): (String, Option<PathBuf>) = match input {
            DigestInput::Command(s) => (s.to_string(), working_dir.map(Path::to_path_buf)),
            DigestInput::Stdin(s) => (s.to_string(), working_dir.map(Path::to_path_buf)),
            DigestInput::File(path) => {
                let bytes = locks
                    .read(path)
                    .map_err(|source| NormalizeError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?;
                (
                    String::from_utf8_lossy(&bytes).into_owned(),
                    path.parent().map(Path::to_path_buf),
                )
            }
        };
        let expanded = expand_text(&text, current_dir.as_deref(), working_dir, &mut active, locks)?;
        parts.push(expanded);
    }

    let joined = parts.join(&format!("\n{INPUT_BOUNDARY}\n"));
    let digest = Sha256::digest(joined.as_bytes());
    Ok(format!("{:x}", digest))
}

fn expand_text(
    text: &str,
    current_dir: Option<&Path>,
    working_dir: Option<&Path>,
    active: &mut HashSet<PathBuf>,
    locks: &mut ScriptLocks,
) -> Result<String, NormalizeError> {
    let mut out = String::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(raw_path) = strip_directive(trimmed, &["\\ir ", "\\include_relative "]) {
            if raw_path.is_empty() {
                return Err(NormalizeError::EmptyIncludePath);
            }
            let base = current_dir.ok_or(NormalizeError::MissingWorkingDirectory)?;
            let resolved = resolve_relative(base, raw_path);
            out.push_str(&expand_include(&resolved, working_dir, active, locks)?);
        } else if let Some(raw_path) = strip_directive(trimmed, &["\\i ", "\\include "]) {
            if raw_path.is_empty() {
                return Err(NormalizeError::EmptyIncludePath);
            }
            let resolved = if Path::new(raw_path).is_absolute() {
                PathBuf::from(raw_path)
            } else {
                let wd = working_dir.ok_or(NormalizeError::MissingWorkingDirectory)?;
                resolve_relative(wd, raw_path)
            };
            out.push_str(&expand_include(&resolved, working_dir, active, locks)?);
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

fn strip_directive<'a>(line: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    for prefix in prefixes {
        if let Some(rest) = line.strip_prefix(prefix) {
            return Some(rest.trim());
        }
    }
    None
}

fn resolve_relative(base: &Path, raw: &str) -> PathBuf {
    if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        base.join(raw)
    }
}

fn expand_include(
    path: &Path,
    working_dir: Option<&Path>,
    active: &mut HashSet<PathBuf>,
    locks: &mut ScriptLocks,
) -> Result<String, NormalizeError> {
    if !path.exists() {
        return Err(NormalizeError::MissingIncludeFile(path.to_path_buf()));
    }
    let key = path.to_path_buf();
    if active.contains(&key) {
        return Err(NormalizeError::RecursiveInclude(path.display().to_string()));
    }

    active.insert(key.clone());
    let bytes = locks.read(path).map_err(|source| NormalizeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let new_dir = path.parent().map(Path::to_path_buf);
    let expanded = expand_text(&text, new_dir.as_deref(), working_dir, active, locks)?;
    active.remove(&key);

    Ok(format!("{INPUT_BOUNDARY}\n{expanded}\n{INPUT_BOUNDARY}\n"))
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
