//! Sysfs attribute access and directory discovery
//!
//! Several kernel directories carry an instance suffix that changes between
//! boots or kernel versions (`bone_capemgr.9`, `ocp.3`, `pwm_test_P9_14.15`),
//! so they are located by prefix rather than by fixed path.

use crate::error::{Error, IoContext, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Find the first directory directly under `root` whose name starts with `prefix`
pub fn find_prefixed_dir(root: &Path, prefix: &str) -> Result<PathBuf> {
    let mut matches: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.into_path())
        .collect();

    // directory order is filesystem-dependent
    matches.sort();
    matches.into_iter().next().ok_or_else(|| Error::PathNotFound {
        root: root.to_path_buf(),
        prefix: prefix.to_string(),
    })
}

/// Read an attribute as text
pub fn read_attr(path: &Path) -> Result<String> {
    fs::read_to_string(path).at(path)
}

/// Write an attribute
///
/// The file must already exist: sysfs attributes are never created by
/// userspace, so a missing file is reported instead of silently created.
pub fn write_attr(path: &Path, value: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .at(path)?;
    file.write_all(value.as_bytes()).at(path)
}
