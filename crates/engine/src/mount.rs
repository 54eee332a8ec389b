// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! psql script mount planning (spec.md §4.D "psql in-container invocation"):
//! the scripts referenced by `-f`/`--file` live on the host, so the engine
//! mounts their common ancestor directory read-only into the container and
//! rewrites the argv to reference the container-side path instead.

use crate::error::EngineError;
use sqlrs_adapters::Mount;
use sqlrs_core::PreparedRequest;
use std::path::{Component, Path, PathBuf};

/// Where the host's script directory is mounted inside the container.
pub const CONTAINER_SCRIPTS_DIR: &str = "/sqlrs/scripts";

/// The bind mount (if any `-f` files are referenced) and the container-
/// relative argv/workdir to invoke psql with.
#[derive(Debug, Clone)]
pub struct PsqlMountPlan {
    pub mount: Option<Mount>,
    pub args: Vec<String>,
    pub workdir: Option<PathBuf>,
}

/// Compute the mount and rewritten argv for `prepared` (spec.md §4.A/§4.D).
/// A request with no file arguments (`-c`/stdin only) needs no mount at all.
pub fn plan_psql_mount(prepared: &PreparedRequest) -> Result<PsqlMountPlan, EngineError> {
    if prepared.lock_paths.is_empty() {
        return Ok(PsqlMountPlan {
            mount: None,
            args: prepared.normalized_args.clone(),
            workdir: None,
        });
    }

    let common = common_ancestor(&prepared.lock_paths).ok_or_else(|| {
        EngineError::internal("cannot compute a common mount root for psql script files")
    })?;

    let args = rewrite_file_args(&prepared.normalized_args, &common)?;
    let first_container_path = mapped_container_path(&prepared.lock_paths[0], &common)?;
    let workdir = first_container_path.parent().map(Path::to_path_buf);

    Ok(PsqlMountPlan {
        mount: Some(Mount {
            host_path: common,
            container_path: PathBuf::from(CONTAINER_SCRIPTS_DIR),
            read_only: true,
        }),
        args,
        workdir,
    })
}

fn rewrite_file_args(args: &[String], common: &Path) -> Result<Vec<String>, EngineError> {
    let mut out = Vec::with_capacity(args.len());
    let mut i = 0;
    while i < args.len() {
        let arg = args[i].as_str();
        if arg == "-f" || arg == "--file" {
            out.push(arg.to_string());
            let value = args.get(i + 1).ok_or_else(|| {
                EngineError::internal(format!("{arg} argument is missing its value"))
            })?;
            out.push(rewrite_value(value, common)?);
            i += 2;
            continue;
        }
        if let Some(value) = arg.strip_prefix("--file=") {
            out.push(format!("--file={}", rewrite_value(value, common)?));
            i += 1;
            continue;
        }
        out.push(arg.to_string());
        i += 1;
    }
    Ok(out)
}

fn rewrite_value(value: &str, common: &Path) -> Result<String, EngineError> {
    if value == "-" {
        return Ok(value.to_string());
    }
    Ok(mapped_container_path(Path::new(value), common)?
        .display()
        .to_string())
}

fn mapped_container_path(path: &Path, common: &Path) -> Result<PathBuf, EngineError> {
    let rel = path.strip_prefix(common).map_err(|_| {
        EngineError::internal(format!(
            "psql script path {} falls outside the common mount root {}",
            path.display(),
            common.display()
        ))
    })?;
    Ok(Path::new(CONTAINER_SCRIPTS_DIR).join(rel))
}

/// The deepest directory that is an ancestor of every file's parent
/// directory. Computed over parents (not the files themselves) so the
/// result is always a directory, even for a single file.
fn common_ancestor(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut dirs = paths
        .iter()
        .map(|p| p.parent().unwrap_or_else(|| Path::new("/")));
    let first = dirs.next()?;
    let mut common: Vec<Component> = first.components().collect();
    for dir in dirs {
        let comps: Vec<Component> = dir.components().collect();
        let len = common
            .iter()
            .zip(comps.iter())
            .take_while(|(a, b)| a == b)
            .count();
        common.truncate(len);
    }
    if common.is_empty() {
        None
    } else {
        Some(common.into_iter().collect())
    }
}

#[cfg(test)]
#[path = "mount_tests.rs"]
mod tests;
