// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! psql argument validation and normalization (spec.md §4.A).

use crate::error::NormalizeError;
use std::path::{Path, PathBuf};

const CONNECTION_SHORT_FLAGS: &[char] = &['h', 'p', 'U', 'd'];
const CONNECTION_LONG_FLAGS: &[&str] =
    &["host", "port", "username", "dbname", "database"];

/// One recognized input awaiting a digest, in the order it was encountered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingInput {
    Command(String),
    Stdin,
    File(PathBuf),
}

/// The result of validating and normalizing a psql argument list.
#[derive(Debug, Clone)]
pub struct PsqlNormalized {
    pub normalized_args: Vec<String>,
    pub canonical_args: String,
    pub inputs: Vec<PendingInput>,
    /// Absolute paths referenced by `-f`, excluding the `-` stdin sentinel.
    pub file_paths: Vec<PathBuf>,
    /// True if any `-f -` (read script from stdin) was given.
    pub reads_stdin_file: bool,
}

/// Validate and normalize a psql argument list (spec.md §4.A).
///
/// Rejects positional arguments, connection-override flags, malformed
/// `-v`/`-f`/`-c` values, non-`1` `ON_ERROR_STOP` assignments, and
/// stdin/`-f -` mismatches. Appends `-X` and `-v ON_ERROR_STOP=1` when not
/// already present.
pub fn normalize_psql(
    args: &[String],
    stdin: Option<&str>,
) -> Result<PsqlNormalized, NormalizeError> {
    let mut normalized = Vec::new();
    let mut inputs = Vec::new();
    let mut file_paths = Vec::new();
    let mut has_x = false;
    let mut on_error_stop_set = false;
    let mut reads_stdin_file = false;

    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();

        if let Some(rest) = arg.strip_prefix("--") {
            let (name, inline) = split_long(rest);
            if CONNECTION_LONG_FLAGS.contains(&name) {
                return Err(NormalizeError::ConnectionOverrideFlag(arg.to_string()));
            }
            match name {
                "set" | "variable" => {
                    let value = take_value(args, &mut i, arg, inline)?;
                    check_on_error_stop(&value, &mut on_error_stop_set)?;
                    push_arg_with_value(&mut normalized, "--set", inline, &value);
                }
                "file" => {
                    let value = take_value(args, &mut i, arg, inline)?;
                    record_file(&value, &mut inputs, &mut file_paths, &mut reads_stdin_file)?;
                    push_arg_with_value(&mut normalized, "--file", inline, &value);
                }
                "command" => {
                    let value = take_value(args, &mut i, arg, inline)?;
                    inputs.push(PendingInput::Command(value.clone()));
                    push_arg_with_value(&mut normalized, "--command", inline, &value);
                }
                _ => normalized.push(arg.to_string()),
            }
        } else if arg == "-X" {
            has_x = true;
            normalized.push(arg.to_string());
        } else if let Some(flag_char) = short_flag_char(arg) {
            if CONNECTION_SHORT_FLAGS.contains(&flag_char) {
                return Err(NormalizeError::ConnectionOverrideFlag(arg.to_string()));
            }
            match flag_char {
                'v' => {
                    let value = take_short_value(args, &mut i, arg)?;
                    check_on_error_stop(&value, &mut on_error_stop_set)?;
                    normalized.push("-v".to_string());
                    normalized.push(value);
                }
                'f' => {
                    let value = take_short_value(args, &mut i, arg)?;
                    record_file(&value, &mut inputs, &mut file_paths, &mut reads_stdin_file)?;
                    normalized.push("-f".to_string());
                    normalized.push(value);
                }
                'c' => {
                    let value = take_short_value(args, &mut i, arg)?;
                    inputs.push(PendingInput::Command(value.clone()));
                    normalized.push("-c".to_string());
                    normalized.push(value);
                }
                _ => normalized.push(arg.to_string()),
            }
        } else {
            return Err(NormalizeError::PositionalArgument(arg.to_string()));
        }

        i += 1;
    }

    if reads_stdin_file && stdin.is_none() {
        return Err(NormalizeError::StdinFileWithoutStdin);
    }
    if stdin.is_some() && !reads_stdin_file {
        return Err(NormalizeError::StdinWithoutStdinFile);
    }
    if stdin.is_some() {
        inputs.push(PendingInput::Stdin);
    }

    if !has_x {
        normalized.push("-X".to_string());
    }
    if !on_error_stop_set {
        normalized.push("-v".to_string());
        normalized.push("ON_ERROR_STOP=1".to_string());
    }

    let canonical_args = normalized.join(" ");

    Ok(PsqlNormalized {
        normalized_args: normalized,
        canonical_args,
        inputs,
        file_paths,
        reads_stdin_file,
    })
}

fn short_flag_char(arg: &str) -> Option<char> {
    let mut chars = arg.chars();
    if chars.next() != Some('-') {
        return None;
    }
    chars.next()
}

fn split_long(rest: &str) -> (&str, Option<&str>) {
    match rest.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (rest, None),
    }
}

/// Append a long-flag/value pair to `normalized` as argv would expect it: a
/// single `flag=value` token when the flag was given inline, otherwise two
/// separate tokens (never one string with an embedded space).
fn push_arg_with_value(normalized: &mut Vec<String>, flag: &str, inline: Option<&str>, value: &str) {
    if inline.is_some() {
        normalized.push(format!("{flag}={value}"));
    } else {
        normalized.push(flag.to_string());
        normalized.push(value.to_string());
    }
}

fn take_value(
    args: &[String],
    i: &mut usize,
    arg: &str,
    inline: Option<&str>,
) -> Result<String, NormalizeError> {
    if let Some(v) = inline {
        return Ok(v.to_string());
    }
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| NormalizeError::MissingValue(arg.to_string()))
}

fn take_short_value(args: &[String], i: &mut usize, arg: &str) -> Result<String, NormalizeError> {
    if arg.len() > 2 {
        return Ok(arg[2..].to_string());
    }
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| NormalizeError::MissingValue(arg.to_string()))
}

fn check_on_error_stop(value: &str, seen: &mut bool) -> Result<(), NormalizeError> {
    if let Some(assigned) = value.strip_prefix("ON_ERROR_STOP=") {
        if assigned != "1" {
            return Err(NormalizeError::InvalidOnErrorStop(assigned.to_string()));
        }
        *seen = true;
    }
    Ok(())
}

fn record_file(
    value: &str,
    inputs: &mut Vec<PendingInput>,
    file_paths: &mut Vec<PathBuf>,
    reads_stdin_file: &mut bool,
) -> Result<(), NormalizeError> {
    if value == "-" {
        *reads_stdin_file = true;
        return Ok(());
    }
    let path = Path::new(value);
    if !path.is_absolute() {
        return Err(NormalizeError::NonAbsoluteFilePath(value.to_string()));
    }
    inputs.push(PendingInput::File(path.to_path_buf()));
    file_paths.push(path.to_path_buf());
    Ok(())
}

#[cfg(test)]
#[path = "psql_tests.rs"]
mod tests;
