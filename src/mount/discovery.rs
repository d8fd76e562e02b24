//! Union-mount discovery: find the control file above a directory, confirm the
//! mount through its version attribute, and read the branch list.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::config::MountConfig;
use crate::core::errors::{BalanceError, Result};
use crate::core::paths::trim_trailing_slash;
use crate::platform::pal::{AttrLookup, AttributeReader};

/// A validated union mount and where `dir` sits inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub mount_point: PathBuf,
    pub control_file: PathBuf,
    /// Branch roots in the order the mount lists them.
    pub branches: Vec<PathBuf>,
    /// `dir` relative to the mount point; empty at the mount root.
    pub relative: PathBuf,
}

/// Walk from `dir` up to and including `/`, returning the first `name` found.
#[must_use]
pub fn find_control_file(dir: &Path, name: &str) -> Option<PathBuf> {
    dir.ancestors()
        .map(|ancestor| ancestor.join(name))
        .find(|candidate| fs::symlink_metadata(candidate).is_ok())
}

/// Locate and validate the mount containing `dir` (expected absolute and
/// canonical).
pub fn discover(
    dir: &Path,
    reader: &dyn AttributeReader,
    config: &MountConfig,
) -> Result<MountInfo> {
    let not_a_mount = |details: String| BalanceError::NotAUnionMount {
        path: dir.to_path_buf(),
        details,
    };

    let control_file = find_control_file(dir, &config.control_file).ok_or_else(|| {
        not_a_mount(format!(
            "no {} control file in it or any parent directory",
            config.control_file
        ))
    })?;

    match reader.get(&control_file, &config.version_attr) {
        Ok(AttrLookup::Found(_)) => {}
        Ok(AttrLookup::NotFound) => {
            return Err(not_a_mount(format!(
                "{} has no {} attribute",
                control_file.display(),
                config.version_attr
            )));
        }
        Ok(AttrLookup::NotSupported) => {
            return Err(not_a_mount(format!(
                "extended attributes are not supported on {}",
                control_file.display()
            )));
        }
        Err(err) => return Err(not_a_mount(err.to_string())),
    }

    let lookup = reader
        .get(&control_file, &config.branches_attr)
        .map_err(|err| not_a_mount(err.to_string()))?;
    let raw = match lookup {
        AttrLookup::Found(value) => value,
        AttrLookup::NotFound | AttrLookup::NotSupported => {
            return Err(not_a_mount(format!(
                "{} does not list its branches ({})",
                control_file.display(),
                config.branches_attr
            )));
        }
    };
    let branches = parse_branches(&raw);
    if branches.is_empty() {
        return Err(not_a_mount("branch list is empty".to_string()));
    }

    let mount_point = control_file
        .parent()
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
    let relative = dir
        .strip_prefix(&mount_point)
        .map_or_else(|_| PathBuf::new(), Path::to_path_buf);

    Ok(MountInfo {
        mount_point,
        control_file,
        branches,
        relative,
    })
}

/// Split a `:`-separated branch list, dropping empty entries and any `=MODE`
/// suffix (`/mnt/a=RW` → `/mnt/a`).
#[must_use]
pub fn parse_branches(raw: &[u8]) -> Vec<PathBuf> {
    raw.trim_ascii()
        .split(|b| *b == b':')
        .map(strip_mode)
        .filter(|entry| !entry.is_empty())
        .map(|entry| trim_trailing_slash(&bytes_to_path(entry)))
        .collect()
}

/// Remove a trailing `=MODE` where MODE looks like a mode (`RW`, `RO`, `NC`,
/// optionally followed by `,minfreespace`).
fn strip_mode(entry: &[u8]) -> &[u8] {
    match entry.iter().rposition(|b| *b == b'=') {
        Some(idx)
            if idx + 1 < entry.len()
                && entry[idx + 1..]
                    .iter()
                    .all(|b| b.is_ascii_alphanumeric() || *b == b',') =>
        {
            &entry[..idx]
        }
        _ => entry,
    }
}

#[cfg(unix)]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    use std::os::unix::ffi::OsStrExt;
    PathBuf::from(std::ffi::OsStr::from_bytes(bytes))
}

#[cfg(not(unix))]
fn bytes_to_path(bytes: &[u8]) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(bytes).into_owned())
}
