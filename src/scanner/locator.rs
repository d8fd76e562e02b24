//! Eligible-file locator: top-down search of one branch's subtree for the
//! first file passing the [`FilterCriteria`].
//!
//! A directory's files are considered before any of its subdirectories, and
//! subdirectories are visited depth-first in listing order. Symlinks are never
//! followed and never returned.

#![allow(missing_docs)]

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::balancer::signals::InterruptFlag;
use crate::core::errors::{BalanceError, Result};
use crate::core::paths::join_relative;
use crate::scanner::filters::{Eligibility, FileFacts, FilterCriteria, evaluate, resolve};

/// A file selected for moving, as seen at discovery time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCandidate {
    /// Path relative to the branch root it was found under.
    pub relative_path: PathBuf,
    pub size: u64,
    pub link_count: u64,
}

/// Searches branch subtrees with fixed criteria.
#[derive(Debug, Clone)]
pub struct Locator {
    criteria: FilterCriteria,
    interrupt: Option<InterruptFlag>,
}

impl Locator {
    #[must_use]
    pub fn new(criteria: FilterCriteria) -> Self {
        Self {
            criteria,
            interrupt: None,
        }
    }

    /// Poll `flag` between directories and stop with
    /// [`BalanceError::Interrupted`] once it is raised.
    #[must_use]
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Find the first eligible file under `branch_root/relative`.
    ///
    /// Returns `Ok(None)` when the subtree is exhausted or does not exist on
    /// this branch. Unreadable directories and files are handled by the
    /// criteria's metadata-error policy; `warn` receives its warnings.
    pub fn locate(
        &self,
        branch_root: &Path,
        relative: &Path,
        warn: &mut dyn FnMut(&str),
    ) -> Result<Option<FileCandidate>> {
        let base = join_relative(branch_root, relative);
        match fs::metadata(&base) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(None),
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                self.unreadable(&base, err, warn)?;
                return Ok(None);
            }
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            if self.interrupted() {
                return Err(BalanceError::Interrupted);
            }

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                // Removed since it was listed.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    self.unreadable(&dir, err, warn)?;
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry_result in entries {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(err) => {
                        self.unreadable(&dir, err, warn)?;
                        continue;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type() {
                    Ok(ft) => ft,
                    Err(err) => {
                        self.unreadable(&path, err, warn)?;
                        continue;
                    }
                };
                if file_type.is_dir() {
                    subdirs.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }

                let name = entry.file_name();
                let eligibility = evaluate(&self.criteria, &name.to_string_lossy(), &path, || {
                    fs::symlink_metadata(&path).map(|meta| FileFacts::from_metadata(&meta))
                });
                if let Some(facts) =
                    resolve(eligibility, self.criteria.on_metadata_error, &path, warn)?
                {
                    let relative_path = path
                        .strip_prefix(branch_root)
                        .map_or_else(|_| path.clone(), Path::to_path_buf);
                    return Ok(Some(FileCandidate {
                        relative_path,
                        size: facts.size,
                        link_count: facts.link_count,
                    }));
                }
            }

            // Reverse so the first-listed subdirectory is popped first.
            stack.extend(subdirs.into_iter().rev());
        }

        Ok(None)
    }

    fn interrupted(&self) -> bool {
        self.interrupt.as_ref().is_some_and(InterruptFlag::is_raised)
    }

    fn unreadable(&self, path: &Path, err: io::Error, warn: &mut dyn FnMut(&str)) -> Result<()> {
        resolve(
            Eligibility::Unreadable(err),
            self.criteria.on_metadata_error,
            path,
            warn,
        )
        .map(|_| ())
    }
}
