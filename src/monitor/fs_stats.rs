//! Free-space prober: per-branch capacity sampling and the convergence test.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::core::errors::{BalanceError, Result};
use crate::platform::pal::Platform;

/// One branch's capacity at sampling time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFree {
    pub branch: PathBuf,
    pub available_bytes: u64,
    pub total_bytes: u64,
    pub free_fraction: f64,
}

/// Branches sorted ascending by free fraction: fullest first, emptiest last.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BranchSample {
    entries: Vec<BranchFree>,
}

impl BranchSample {
    /// Build a sample from unordered entries. The sort is stable, so equal
    /// fractions keep their input order.
    #[must_use]
    pub fn from_entries(mut entries: Vec<BranchFree>) -> Self {
        entries.sort_by(|a, b| a.free_fraction.total_cmp(&b.free_fraction));
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[BranchFree] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Branch with the smallest free fraction.
    #[must_use]
    pub fn fullest(&self) -> Option<&BranchFree> {
        self.entries.first()
    }

    /// Branch with the largest free fraction.
    #[must_use]
    pub fn emptiest(&self) -> Option<&BranchFree> {
        self.entries.last()
    }

    /// Difference between the largest and smallest free fraction.
    #[must_use]
    pub fn spread(&self) -> f64 {
        match (self.fullest(), self.emptiest()) {
            (Some(low), Some(high)) => high.free_fraction - low.free_fraction,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn within_range(&self, tolerance: f64) -> bool {
        within_range(&self.entries, tolerance)
    }
}

/// True when fewer than two branches exist or the ascending sample's
/// last-minus-first fraction is at most `tolerance`.
#[must_use]
pub fn within_range(sample: &[BranchFree], tolerance: f64) -> bool {
    match sample {
        [] | [_] => true,
        [first, .., last] => last.free_fraction - first.free_fraction <= tolerance,
    }
}

/// Samples free space across a fixed set of branch roots.
///
/// Every call queries the platform afresh; nothing is cached between samples
/// because each move changes the picture.
pub struct FreeSpaceProber {
    platform: Arc<dyn Platform>,
}

impl FreeSpaceProber {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// Query every branch and return them sorted by free fraction.
    ///
    /// Any unreachable or zero-capacity branch fails the whole sample.
    pub fn sample(&self, branches: &[PathBuf]) -> Result<BranchSample> {
        let mut entries = Vec::with_capacity(branches.len());
        for branch in branches {
            entries.push(self.probe(branch)?);
        }
        Ok(BranchSample::from_entries(entries))
    }

    fn probe(&self, branch: &Path) -> Result<BranchFree> {
        let stats = self.platform.fs_stats(branch)?;
        let free_fraction = stats
            .free_fraction()
            .ok_or_else(|| BalanceError::CapacityQuery {
                path: branch.to_path_buf(),
                details: "filesystem reports zero total capacity".to_string(),
            })?;
        Ok(BranchFree {
            branch: branch.to_path_buf(),
            available_bytes: stats.available_bytes,
            total_bytes: stats.total_bytes,
            free_fraction,
        })
    }
}
