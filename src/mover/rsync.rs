//! rsync-backed move executor.

#![allow(missing_docs)]

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::core::errors::{BalanceError, Result};
use crate::mover::MoveExecutor;
use crate::mover::options::MoveOptions;

pub const DEFAULT_PROGRAM: &str = "rsync";

/// Runs one rsync per file and reports its exit status.
#[derive(Debug, Clone)]
pub struct RsyncExecutor {
    program: String,
    extra_args: Vec<String>,
    options: MoveOptions,
}

impl Default for RsyncExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM, MoveOptions::default())
    }
}

impl RsyncExecutor {
    #[must_use]
    pub fn new(program: impl Into<String>, options: MoveOptions) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            options,
        }
    }

    /// Arguments inserted after the option flags, before the paths.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn options(&self) -> &MoveOptions {
        &self.options
    }

    /// Full argument vector (without the program) for moving `relative`.
    ///
    /// In relative mode the source carries a `/./` pivot so rsync recreates
    /// only the part after it under the destination root. Otherwise the
    /// destination is the file's parent directory, created with `--mkpath`.
    #[must_use]
    pub fn arguments(
        &self,
        source_root: &Path,
        dest_root: &Path,
        relative: &Path,
    ) -> Vec<OsString> {
        let opts = &self.options;
        let mut args: Vec<OsString> = vec!["--archive".into()];
        let flags: [(bool, &[&str]); 8] = [
            (opts.preserve_links, &["--links"]),
            (opts.preserve_hardlinks, &["--hard-links"]),
            (opts.preserve_acls, &["--acls"]),
            (opts.preserve_xattrs, &["--xattrs"]),
            (opts.safe_arg_passing, &["--protect-args"]),
            (opts.preserve_device_files, &["--devices", "--specials"]),
            (opts.remove_source_files, &["--remove-source-files"]),
            (opts.show_progress, &["--progress"]),
        ];
        for (enabled, names) in flags {
            if enabled {
                args.extend(names.iter().map(OsString::from));
            }
        }
        args.extend(self.extra_args.iter().map(OsString::from));

        if opts.relative_paths {
            args.push("--relative".into());
            args.push(pivot(source_root, relative));
            args.push(as_directory(dest_root));
        } else {
            args.push("--mkpath".into());
            args.push(source_root.join(relative).into_os_string());
            let parent = relative.parent().map_or_else(PathBuf::new, Path::to_path_buf);
            args.push(as_directory(&dest_root.join(parent)));
        }
        args
    }

    /// The command as a single shell-quoted line, for display.
    #[must_use]
    pub fn command_line(&self, source_root: &Path, dest_root: &Path, relative: &Path) -> String {
        std::iter::once(OsStr::new(&self.program).to_os_string())
            .chain(self.arguments(source_root, dest_root, relative))
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl MoveExecutor for RsyncExecutor {
    fn relocate(&self, source_root: &Path, dest_root: &Path, relative: &Path) -> Result<i32> {
        let status = Command::new(&self.program)
            .args(self.arguments(source_root, dest_root, relative))
            .status()
            .map_err(|source| BalanceError::MoveSpawn {
                program: self.program.clone(),
                source,
            })?;
        Ok(status_code(status))
    }

    fn describe(&self, source_root: &Path, dest_root: &Path, relative: &Path) -> Option<String> {
        Some(self.command_line(source_root, dest_root, relative))
    }
}

/// Exit code of a finished process; a signal death maps to `128 + signal`.
#[must_use]
pub fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// `root/./relative`, without doubling a trailing slash on `root`.
fn pivot(root: &Path, relative: &Path) -> OsString {
    let mut arg = as_directory(root);
    arg.push("./");
    arg.push(relative);
    arg
}

/// `path` with exactly one trailing `/`.
fn as_directory(path: &Path) -> OsString {
    let mut arg = path.as_os_str().to_os_string();
    if !arg.to_string_lossy().ends_with('/') {
        arg.push("/");
    }
    arg
}

/// Quote `arg` for POSIX shells; plain words are left alone.
#[must_use]
pub fn shell_quote(arg: &OsStr) -> String {
    let text = arg.to_string_lossy();
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        text.into_owned()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn default_options_translate_to_full_flag_set() {
        let args = text(&RsyncExecutor::default().arguments(
            Path::new("/mnt/a"),
            Path::new("/mnt/b"),
            Path::new("media/x.mkv"),
        ));
        assert_eq!(
            args,
            vec![
                "--archive",
                "--links",
                "--hard-links",
                "--acls",
                "--xattrs",
                "--protect-args",
                "--devices",
                "--specials",
                "--remove-source-files",
                "--progress",
                "--relative",
                "/mnt/a/./media/x.mkv",
                "/mnt/b/",
            ]
        );
    }

    #[test]
    fn disabled_options_drop_their_flags() {
        let options = MoveOptions {
            preserve_acls: false,
            preserve_device_files: false,
            show_progress: false,
            ..MoveOptions::default()
        };
        let args = text(&RsyncExecutor::new("rsync", options).arguments(
            Path::new("/a"),
            Path::new("/b"),
            Path::new("f"),
        ));
        assert!(args.contains(&"--archive".to_string()));
        assert!(!args.contains(&"--acls".to_string()));
        assert!(!args.contains(&"--devices".to_string()));
        assert!(!args.contains(&"--progress".to_string()));
        assert!(args.contains(&"--xattrs".to_string()));
    }

    #[test]
    fn non_relative_mode_targets_parent_directory() {
        let options = MoveOptions {
            relative_paths: false,
            ..MoveOptions::default()
        };
        let args = text(&RsyncExecutor::new("rsync", options).arguments(
            Path::new("/mnt/a/"),
            Path::new("/mnt/b"),
            Path::new("media/show/x.mkv"),
        ));
        let tail = &args[args.len() - 3..];
        assert_eq!(tail, ["--mkpath", "/mnt/a/media/show/x.mkv", "/mnt/b/media/show/"]);
        assert!(!args.contains(&"--relative".to_string()));
    }

    #[test]
    fn trailing_slash_on_root_is_not_doubled() {
        let args = text(&RsyncExecutor::default().arguments(
            Path::new("/mnt/a/"),
            Path::new("/mnt/b/"),
            Path::new("f"),
        ));
        let tail = &args[args.len() - 2..];
        assert_eq!(tail, ["/mnt/a/./f", "/mnt/b/"]);
    }

    #[test]
    fn extra_args_precede_paths() {
        let exec = RsyncExecutor::default().with_extra_args(vec!["--bwlimit=10M".to_string()]);
        let args = text(&exec.arguments(Path::new("/a"), Path::new("/b"), Path::new("f")));
        let pos = args.iter().position(|a| a == "--bwlimit=10M").unwrap();
        let rel = args.iter().position(|a| a == "--relative").unwrap();
        assert!(pos < rel);
    }

    #[test]
    fn command_line_quotes_awkward_names() {
        let line = RsyncExecutor::default().command_line(
            Path::new("/mnt/a"),
            Path::new("/mnt/b"),
            Path::new("it's a file.mkv"),
        );
        assert!(line.starts_with("rsync --archive"));
        assert!(line.ends_with(r"'/mnt/a/./it'\''s a file.mkv' /mnt/b/"));
    }

    #[test]
    fn shell_quote_leaves_plain_words() {
        assert_eq!(shell_quote(OsStr::new("/mnt/a/./x.mkv")), "/mnt/a/./x.mkv");
        assert_eq!(shell_quote(OsStr::new("")), "''");
        assert_eq!(shell_quote(OsStr::new("a b")), "'a b'");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let exec = RsyncExecutor::new("/nonexistent/bbal-rsync", MoveOptions::default());
        let err = exec
            .relocate(Path::new("/a"), Path::new("/b"), Path::new("f"))
            .unwrap_err();
        assert_eq!(err.code(), "BAL-2201");
    }

    #[cfg(unix)]
    #[test]
    fn exit_codes_pass_through() {
        let exec = RsyncExecutor::new("false", MoveOptions::default());
        let code = exec
            .relocate(Path::new("/a"), Path::new("/b"), Path::new("f"))
            .unwrap();
        assert_eq!(code, 1);
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_maps_to_128_plus_signal() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(status_code(ExitStatus::from_raw(3 << 8)), 3);
    }
}
