use super::*;
use std::path::PathBuf;

struct FakePlatform {
    wsl: bool,
}

impl WslPlatform for FakePlatform {
    fn is_wsl(&self) -> bool {
        self.wsl
    }

    fn to_posix_mount_path(&self, path: &Path) -> Option<PathBuf> {
        windows_drive_path_to_mount(path)
    }
}

#[test]
fn maps_windows_drive_path_under_wsl() {
    let platform = FakePlatform { wsl: true };
    let mapped = map_path(&platform, Path::new(r"C:\Users\sqlrs\changelog.xml"));
    assert_eq!(mapped, PathBuf::from("/mnt/c/Users/sqlrs/changelog.xml"));
}

#[test]
fn lowercases_drive_letter() {
    let platform = FakePlatform { wsl: true };
    let mapped = map_path(&platform, Path::new(r"D:\data\changelog.xml"));
    assert_eq!(mapped, PathBuf::from("/mnt/d/data/changelog.xml"));
}

#[test]
fn leaves_posix_path_unchanged_under_wsl() {
    let platform = FakePlatform { wsl: true };
    let mapped = map_path(&platform, Path::new("/home/sqlrs/changelog.xml"));
    assert_eq!(mapped, PathBuf::from("/home/sqlrs/changelog.xml"));
}

#[test]
fn leaves_windows_path_unchanged_outside_wsl() {
    let platform = FakePlatform { wsl: false };
    let mapped = map_path(&platform, Path::new(r"C:\Users\sqlrs\changelog.xml"));
    assert_eq!(mapped, PathBuf::from(r"C:\Users\sqlrs\changelog.xml"));
}

#[test]
fn real_platform_detects_non_wsl_when_proc_version_absent_marker() {
    let platform = RealWslPlatform;
    let _ = platform.is_wsl();
}
