// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WSL path mapping for Liquibase invocations (spec.md §4.A).
//!
//! When a Windows-style path is supplied to a Liquibase invocation on
//! Linux-under-Windows, translate it to a POSIX mount path; otherwise
//! return the cleaned path unchanged.

use std::path::{Path, PathBuf};

/// Platform capability the WSL path mapper consumes, injected so tests can
/// simulate being inside (or outside) WSL without touching `/proc/version`.
pub trait WslPlatform {
    fn is_wsl(&self) -> bool;
    /// Translate a Windows-style absolute path (`C:\Users\x`) to its POSIX
    /// WSL mount equivalent (`/mnt/c/Users/x`). `None` if `path` is not a
    /// recognizable Windows path.
    fn to_posix_mount_path(&self, path: &Path) -> Option<PathBuf>;
}

/// Detects WSL via `/proc/version` and maps drive-letter paths to
/// `/mnt/<drive>/...`, matching the layout `wslpath` produces.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealWslPlatform;

impl WslPlatform for RealWslPlatform {
    fn is_wsl(&self) -> bool {
        std::fs::read_to_string("/proc/version")
            .map(|v| v.to_ascii_lowercase().contains("microsoft"))
            .unwrap_or(false)
    }

    fn to_posix_mount_path(&self, path: &Path) -> Option<PathBuf> {
        windows_drive_path_to_mount(path)
    }
}

fn windows_drive_path_to_mount(path: &Path) -> Option<PathBuf> {
    let raw = path.to_str()?;
    let bytes = raw.as_bytes();
    if bytes.len() < 2 || bytes[1] != b':' {
        return None;
    }
    let drive = (bytes[0] as char).to_ascii_lowercase();
    let rest = raw[2..].replace('\\', "/");
    Some(PathBuf::from(format!("/mnt/{drive}{rest}")))
}

/// Map `path` through WSL if we're running under it and `path` looks like a
/// Windows path; otherwise return it unchanged.
pub fn map_path(platform: &dyn WslPlatform, path: &Path) -> PathBuf {
    if platform.is_wsl() {
        if let Some(mapped) = platform.to_posix_mount_path(path) {
            return mapped;
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
#[path = "wsl_tests.rs"]
mod tests;
