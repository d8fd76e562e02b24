//! PAL traits and implementations: capacity queries and extended attributes.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{BalanceError, Result};

/// Filesystem capacity for one branch root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    /// Bytes an unprivileged writer may still use.
    pub available_bytes: u64,
}

impl FsStats {
    /// Available space as a fraction of total capacity, `None` when the
    /// filesystem reports zero capacity.
    #[must_use]
    pub fn free_fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.available_bytes as f64 / self.total_bytes as f64)
    }
}

/// Outcome of reading one extended attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrLookup {
    Found(Vec<u8>),
    /// The file exists but carries no attribute of that name.
    NotFound,
    /// The filesystem does not support extended attributes at all.
    NotSupported,
}

/// Capacity queries used by the free-space prober.
pub trait Platform: Send + Sync {
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
}

/// Extended-attribute reads used by mount discovery.
///
/// Generic I/O failures (missing file, permission denied) are errors; absence
/// of the attribute and lack of filesystem support are distinguished outcomes.
pub trait AttributeReader: Send + Sync {
    fn get(&self, path: &Path, name: &str) -> Result<AttrLookup>;
}

/// Linux implementation: `statvfs` via nix, attributes via the `xattr` crate.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| BalanceError::CapacityQuery {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = u64::from(stat.fragment_size());
        Ok(FsStats {
            total_bytes: u64::from(stat.blocks()).saturating_mul(fragment),
            available_bytes: u64::from(stat.blocks_available()).saturating_mul(fragment),
        })
    }
}

#[cfg(unix)]
impl AttributeReader for LinuxPlatform {
    fn get(&self, path: &Path, name: &str) -> Result<AttrLookup> {
        match xattr::get(path, name) {
            Ok(Some(value)) => Ok(AttrLookup::Found(value)),
            Ok(None) => Ok(AttrLookup::NotFound),
            Err(err) if is_unsupported(&err) => Ok(AttrLookup::NotSupported),
            Err(err) => Err(BalanceError::Attribute {
                path: path.to_path_buf(),
                name: name.to_string(),
                details: err.to_string(),
            }),
        }
    }
}

#[cfg(unix)]
fn is_unsupported(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ENOTSUP as i32)
        || err.kind() == std::io::ErrorKind::Unsupported
}

/// In-memory implementation for deterministic tests.
///
/// Capacities sit behind a lock so a test move executor can shift bytes
/// between branches while the balancer is running.
#[derive(Debug, Clone, Default)]
pub struct MockPlatform {
    stats: Arc<RwLock<HashMap<PathBuf, FsStats>>>,
    attrs: Arc<RwLock<HashMap<(PathBuf, String), AttrLookup>>>,
    failing: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a branch with `available` of `total` bytes free.
    #[must_use]
    pub fn with_branch(self, path: impl Into<PathBuf>, available: u64, total: u64) -> Self {
        self.set_capacity(path, available, total);
        self
    }

    /// Register an attribute answer for `path`.
    #[must_use]
    pub fn with_attr(self, path: impl Into<PathBuf>, name: &str, lookup: AttrLookup) -> Self {
        self.attrs
            .write()
            .insert((path.into(), name.to_string()), lookup);
        self
    }

    pub fn set_capacity(&self, path: impl Into<PathBuf>, available: u64, total: u64) {
        self.stats.write().insert(
            path.into(),
            FsStats {
                total_bytes: total,
                available_bytes: available,
            },
        );
    }

    /// Move `bytes` of used space from `from` to `to`, as a completed file move would.
    pub fn transfer(&self, from: &Path, to: &Path, bytes: u64) {
        let mut stats = self.stats.write();
        if let Some(src) = stats.get_mut(from) {
            src.available_bytes = src.available_bytes.saturating_add(bytes).min(src.total_bytes);
        }
        if let Some(dst) = stats.get_mut(to) {
            dst.available_bytes = dst.available_bytes.saturating_sub(bytes);
        }
    }

    /// Make every later capacity query for `path` fail.
    pub fn fail_branch(&self, path: impl Into<PathBuf>) {
        self.failing.write().push(path.into());
    }
}

impl Platform for MockPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        if self.failing.read().iter().any(|p| p == path) {
            return Err(BalanceError::CapacityQuery {
                path: path.to_path_buf(),
                details: "mock branch unreachable".to_string(),
            });
        }
        self.stats
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| BalanceError::CapacityQuery {
                path: path.to_path_buf(),
                details: "mock stats not found".to_string(),
            })
    }
}

impl AttributeReader for MockPlatform {
    fn get(&self, path: &Path, name: &str) -> Result<AttrLookup> {
        if let Some(answer) = self
            .attrs
            .read()
            .get(&(path.to_path_buf(), name.to_string()))
        {
            return Ok(answer.clone());
        }
        if path.exists() {
            Ok(AttrLookup::NotFound)
        } else {
            Err(BalanceError::Attribute {
                path: path.to_path_buf(),
                name: name.to_string(),
                details: "no such file".to_string(),
            })
        }
    }
}

/// Detect the active platform implementation.
pub fn detect_platform() -> Result<Arc<LinuxPlatform>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(unix))]
    {
        Err(BalanceError::UnsupportedPlatform {
            details: "statvfs and extended attributes require a Unix host".to_string(),
        })
    }
}
