//! File eligibility: name/path globs, size bounds, hardlink exclusion, and the
//! policy applied when a file's metadata cannot be read.

#![allow(missing_docs)]

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::{BalanceError, Result};
use crate::scanner::patterns::{IncludeExclude, path_text};

/// What to do when a file's metadata cannot be read during a search.
///
/// `Skip` and `Warn` both treat the file as ineligible and keep searching, so
/// "could not be checked" and "did not match" look the same to the caller
/// unless warnings are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataErrorPolicy {
    #[default]
    Skip,
    Warn,
    Abort,
}

impl std::str::FromStr for MetadataErrorPolicy {
    type Err = BalanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "warn" => Ok(Self::Warn),
            "abort" => Ok(Self::Abort),
            other => Err(BalanceError::InvalidConfig {
                details: format!("unknown metadata error policy {other:?} (skip|warn|abort)"),
            }),
        }
    }
}

/// Immutable selection criteria for files that may be moved.
#[derive(Debug, Clone)]
pub struct FilterCriteria {
    pub names: IncludeExclude,
    pub paths: IncludeExclude,
    /// Smallest admissible size in bytes; 0 disables the bound.
    pub min_size: u64,
    /// Largest admissible size in bytes; 0 disables the bound.
    pub max_size: u64,
    pub exclude_hardlinks: bool,
    pub on_metadata_error: MetadataErrorPolicy,
}

impl FilterCriteria {
    /// Criteria that admit every regular file.
    pub fn admit_all() -> Result<Self> {
        Ok(Self {
            names: IncludeExclude::compile::<&str>(&[], &[])?,
            paths: IncludeExclude::compile::<&str>(&[], &[])?,
            min_size: 0,
            max_size: 0,
            exclude_hardlinks: false,
            on_metadata_error: MetadataErrorPolicy::Skip,
        })
    }
}

/// The metadata facts eligibility depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFacts {
    pub size: u64,
    pub link_count: u64,
}

impl FileFacts {
    #[must_use]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        #[cfg(unix)]
        let link_count = {
            use std::os::unix::fs::MetadataExt;
            meta.nlink()
        };
        #[cfg(not(unix))]
        let link_count = 1;
        Self {
            size: meta.len(),
            link_count,
        }
    }
}

/// Why a file was not selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Name,
    Path,
    TooSmall,
    TooLarge,
    Hardlinked,
}

/// Result of checking one file against the criteria.
#[derive(Debug)]
pub enum Eligibility {
    Eligible(FileFacts),
    Rejected(RejectReason),
    /// Metadata could not be read; the policy decides what this means.
    Unreadable(io::Error),
}

/// Check one file. Name and path globs are tested first so metadata is only
/// fetched (via `facts`) for files that pass them.
pub fn evaluate<F>(
    criteria: &FilterCriteria,
    file_name: &str,
    full_path: &Path,
    facts: F,
) -> Eligibility
where
    F: FnOnce() -> io::Result<FileFacts>,
{
    if !criteria.names.admits(file_name) {
        return Eligibility::Rejected(RejectReason::Name);
    }
    if !criteria.paths.admits(&path_text(full_path)) {
        return Eligibility::Rejected(RejectReason::Path);
    }
    let facts = match facts() {
        Ok(facts) => facts,
        Err(err) => return Eligibility::Unreadable(err),
    };
    if criteria.exclude_hardlinks && facts.link_count > 1 {
        return Eligibility::Rejected(RejectReason::Hardlinked);
    }
    if criteria.min_size != 0 && facts.size < criteria.min_size {
        return Eligibility::Rejected(RejectReason::TooSmall);
    }
    if criteria.max_size != 0 && facts.size > criteria.max_size {
        return Eligibility::Rejected(RejectReason::TooLarge);
    }
    Eligibility::Eligible(facts)
}

/// Resolve an [`Eligibility`] under a [`MetadataErrorPolicy`].
///
/// Returns `Ok(Some(facts))` for a selectable file, `Ok(None)` to keep
/// searching, and an error only under [`MetadataErrorPolicy::Abort`]. `warn`
/// receives the message for unreadable files under `Warn`.
pub fn resolve(
    eligibility: Eligibility,
    policy: MetadataErrorPolicy,
    full_path: &Path,
    warn: &mut dyn FnMut(&str),
) -> Result<Option<FileFacts>> {
    match eligibility {
        Eligibility::Eligible(facts) => Ok(Some(facts)),
        Eligibility::Rejected(_) => Ok(None),
        Eligibility::Unreadable(err) => match policy {
            MetadataErrorPolicy::Skip => Ok(None),
            MetadataErrorPolicy::Warn => {
                warn(&format!(
                    "skipping {}: cannot read metadata: {err}",
                    full_path.display()
                ));
                Ok(None)
            }
            MetadataErrorPolicy::Abort => Err(BalanceError::io(full_path, err)),
        },
    }
}
