//! Move executors: the external operation that relocates one file between branches.

#![allow(missing_docs)]

pub mod options;
pub mod rsync;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::errors::Result;

/// Relocates a single file from one branch root to another.
///
/// Implementations preserve the file's relative path under the destination
/// and remove the source only after a verified transfer. The returned value is
/// the tool's exit status; zero is success. No retries.
pub trait MoveExecutor {
    fn relocate(&self, source_root: &Path, dest_root: &Path, relative: &Path) -> Result<i32>;

    /// Human-readable form of the command `relocate` would run, if any.
    fn describe(&self, _source_root: &Path, _dest_root: &Path, _relative: &Path) -> Option<String> {
        None
    }
}

/// One recorded `relocate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub source_root: PathBuf,
    pub dest_root: PathBuf,
    pub relative: PathBuf,
}

/// Executor that moves nothing: records calls and replays scripted statuses
/// (zero once the script runs out).
#[derive(Debug, Default)]
pub struct RecordingMover {
    calls: Mutex<Vec<MoveCall>>,
    statuses: Mutex<VecDeque<i32>>,
}

impl RecordingMover {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_statuses(statuses: impl IntoIterator<Item = i32>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(statuses.into_iter().collect()),
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<MoveCall> {
        self.calls.lock().clone()
    }
}

impl MoveExecutor for RecordingMover {
    fn relocate(&self, source_root: &Path, dest_root: &Path, relative: &Path) -> Result<i32> {
        self.calls.lock().push(MoveCall {
            source_root: source_root.to_path_buf(),
            dest_root: dest_root.to_path_buf(),
            relative: relative.to_path_buf(),
        });
        Ok(self.statuses.lock().pop_front().unwrap_or(0))
    }
}
