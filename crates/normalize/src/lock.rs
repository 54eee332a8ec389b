// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared advisory locks held on script files across digesting and
//! execution (spec.md §4.A "Script file locking", §9 "Arena / ownership").
//!
//! The top-level paths passed to `acquire` are deduplicated, sorted, and
//! locked in that stable order. Files discovered only through include
//! expansion (`\i`/`\include`/`\ir`/`\include_relative`) aren't known at
//! `acquire` time, so `read` locks them lazily, in sorted position, the
//! first time they're touched — every script file content digest computation
//! reads ends up shared-locked, not just the ones named on the command line.
//! Each lock is released exactly once, on every exit path (including early
//! return via `?`), by relying on `Drop`.

use fs2::FileExt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// One shared-locked script file handle.
pub struct LockedFile {
    path: PathBuf,
    file: Option<File>,
}

impl LockedFile {
    fn open_and_lock(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        file.lock_shared()?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file's full contents, reusing the locked handle by seeking
    /// to the start. Falls back to a plain path read if the handle was
    /// externally closed out from under us (spec.md §4.A).
    pub fn read(&mut self) -> io::Result<Vec<u8>> {
        if let Some(file) = self.file.as_mut() {
            if file.seek(SeekFrom::Start(0)).is_ok() {
                let mut buf = Vec::new();
                if file.read_to_end(&mut buf).is_ok() {
                    return Ok(buf);
                }
            }
        }
        std::fs::read(&self.path)
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
    }
}

/// A bundle of shared locks over every script path a request touches,
/// acquired once by the digest computation and handed off to the execution
/// phase so the locks span both (spec.md §9).
pub struct ScriptLocks {
    locks: Vec<LockedFile>,
}

impl ScriptLocks {
    /// Deduplicate, sort, and shared-lock every path in `paths`, in that
    /// stable order.
    pub fn acquire(paths: &[PathBuf]) -> io::Result<Self> {
        let mut sorted: Vec<PathBuf> = paths.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut locks = Vec::with_capacity(sorted.len());
        for path in &sorted {
            locks.push(LockedFile::open_and_lock(path)?);
        }
        Ok(Self { locks })
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.locks.iter().map(|l| l.path())
    }

    /// Read `path`'s contents via its locked handle. If `path` isn't already
    /// part of the acquired set — e.g. a file reached only through a
    /// recursively-expanded `\i`/`\include`/`\ir`/`\include_relative`
    /// directive, discovered after the initial `acquire()` call — it is
    /// locked first, in sorted position, so every touched script file ends
    /// up shared-locked before it is read (spec.md §4.A).
    pub fn read(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        let idx = match self.locks.iter().position(|l| l.path() == path) {
            Some(idx) => idx,
            None => {
                let locked = LockedFile::open_and_lock(path)?;
                let idx = self.locks.partition_point(|l| l.path() < path);
                self.locks.insert(idx, locked);
                idx
            }
        };
        self.locks[idx].read()
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
