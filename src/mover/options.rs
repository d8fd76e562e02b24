//! Declarative description of what a file move must preserve.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// Behaviour requested from the move tool. Every option defaults to on.
///
/// The executor translates these into tool flags; the move itself always runs
/// in archive mode (recursion, permissions, times, owner, group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MoveOptions {
    /// Copy symlinks as symlinks.
    pub preserve_links: bool,
    pub preserve_hardlinks: bool,
    pub preserve_acls: bool,
    pub preserve_xattrs: bool,
    /// Keep file names from being split or expanded by the remote shell.
    pub safe_arg_passing: bool,
    /// Device files and special files (FIFOs, sockets).
    pub preserve_device_files: bool,
    /// Recreate the file's relative directory chain under the destination.
    pub relative_paths: bool,
    /// Delete the source once the transfer is verified.
    pub remove_source_files: bool,
    pub show_progress: bool,
}

impl Default for MoveOptions {
    fn default() -> Self {
        Self {
            preserve_links: true,
            preserve_hardlinks: true,
            preserve_acls: true,
            preserve_xattrs: true,
            safe_arg_passing: true,
            preserve_device_files: true,
            relative_paths: true,
            remove_source_files: true,
            show_progress: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let opts = MoveOptions::default();
        assert!(opts.preserve_links && opts.preserve_hardlinks && opts.preserve_acls);
        assert!(opts.preserve_xattrs && opts.safe_arg_passing && opts.preserve_device_files);
        assert!(opts.relative_paths && opts.remove_source_files && opts.show_progress);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let opts: MoveOptions =
            toml::from_str("show_progress = false\npreserve_acls = false").unwrap();
        assert!(!opts.show_progress);
        assert!(!opts.preserve_acls);
        assert!(opts.remove_source_files);
        assert!(opts.relative_paths);
    }
}
