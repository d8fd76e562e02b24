use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_bbal") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "bbal.exe" } else { "bbal" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve bbal binary path for integration test"),
    }
}

/// Run `bbal` with `home` as `$HOME` and every outer `BBAL_*` variable
/// cleared, so no user config or activity log leaks into the case.
pub fn run_bbal(home: &Path, args: &[&str]) -> CmdResult {
    let mut command = Command::new(resolve_bin_path());
    command.args(args).env("HOME", home).env("RUST_BACKTRACE", "1");
    for (key, _) in std::env::vars_os() {
        if key.to_string_lossy().starts_with("BBAL_") {
            command.env_remove(&key);
        }
    }
    let output = command.output().expect("execute bbal command");

    CmdResult {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}
