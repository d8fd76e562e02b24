//! Activity log: append-only JSON Lines record of balance runs.
//!
//! One self-contained object per line, assembled in memory and written with a
//! single `write_all` so a concurrent `tail -f` never sees a partial record.
//!
//! Writes degrade instead of failing the run:
//! 1. primary file
//! 2. fallback file, when configured
//! 3. stderr with a `[BAL-JSONL]` prefix
//! 4. discard

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{BalanceError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Events recorded during a balance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BalanceStart,
    FileMove,
    MoveFailed,
    Converged,
    NoCandidate,
    SameBranch,
    Interrupted,
    Planned,
    Error,
}

/// A single activity record. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: Option<EventType>,
    pub severity: Option<Severity>,
    /// File path relative to the branch roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest_branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Max minus min free fraction when the event was recorded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moves: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_moved: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// New entry stamped with the current UTC time.
    #[must_use]
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: utc_now(),
            event: Some(event),
            severity: Some(severity),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: &Path) -> Self {
        self.path = Some(path.display().to_string());
        self
    }

    #[must_use]
    pub fn with_branches(mut self, source: &Path, dest: &Path) -> Self {
        self.source_branch = Some(source.display().to_string());
        self.dest_branch = Some(dest.display().to_string());
        self
    }

    #[must_use]
    pub fn with_error(mut self, err: &BalanceError) -> Self {
        self.error_code = Some(err.code().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sink {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this many bytes.
    pub max_size_bytes: u64,
    /// Rotated generations kept as `<path>.1` … `<path>.N`.
    pub max_rotated_files: u32,
}

impl JsonlConfig {
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: None,
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
        }
    }
}

/// Append-only writer with size-based rotation and the degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<BufWriter<File>>,
    sink: Sink,
    bytes_written: u64,
}

impl JsonlWriter {
    /// Open the log. Never fails; an unusable path degrades to the next sink.
    #[must_use]
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            sink: Sink::Discard,
            bytes_written: 0,
        };
        match open_append(&writer.config.path) {
            Ok((file, size)) => writer.attach(file, size, Sink::Primary),
            Err(_) => writer.open_fallback(),
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(mut line) => {
                line.push('\n');
                self.write_line(&line);
            }
            Err(e) => {
                let _ = writeln!(io::stderr(), "[BAL-JSONL] serialize error: {e}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }

    /// Current sink: `primary`, `fallback`, `stderr` or `discard`.
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self.sink {
            Sink::Primary => "primary",
            Sink::Fallback => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    fn attach(&mut self, file: File, size: u64, sink: Sink) {
        self.file = Some(BufWriter::new(file));
        self.bytes_written = size;
        self.sink = sink;
    }

    fn open_fallback(&mut self) {
        self.file = None;
        let opened = self
            .config
            .fallback_path
            .clone()
            .and_then(|fb| open_append(&fb).ok().map(|opened| (fb, opened)));
        if let Some((fb, (file, size))) = opened {
            let _ = writeln!(
                io::stderr(),
                "[BAL-JSONL] activity log unavailable, using fallback {}",
                fb.display()
            );
            self.attach(file, size, Sink::Fallback);
        } else {
            let _ = writeln!(io::stderr(), "[BAL-JSONL] activity log unavailable, using stderr");
            self.sink = Sink::Stderr;
        }
    }

    fn degrade(&mut self) {
        match self.sink {
            Sink::Primary => self.open_fallback(),
            Sink::Fallback => {
                self.file = None;
                self.sink = Sink::Stderr;
            }
            Sink::Stderr | Sink::Discard => {
                self.file = None;
                self.sink = Sink::Discard;
            }
        }
    }

    fn current_path(&self) -> Option<PathBuf> {
        match self.sink {
            Sink::Primary => Some(self.config.path.clone()),
            Sink::Fallback => self.config.fallback_path.clone(),
            Sink::Stderr | Sink::Discard => None,
        }
    }

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if self.bytes_written > 0 && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }
        loop {
            match self.sink {
                Sink::Primary | Sink::Fallback => {
                    let written = self
                        .file
                        .as_mut()
                        .is_some_and(|file| file.write_all(line.as_bytes()).is_ok());
                    if written {
                        self.bytes_written += len;
                        return;
                    }
                    self.degrade();
                }
                Sink::Stderr => {
                    if write!(io::stderr(), "[BAL-JSONL] {line}").is_err() {
                        self.degrade();
                    }
                    return;
                }
                Sink::Discard => return,
            }
        }
    }

    /// Shift `<path>.N-1` → `<path>.N` … current → `<path>.1`, then reopen.
    fn rotate(&mut self) {
        let Some(base) = self.current_path() else {
            return;
        };
        self.flush();
        self.file = None;

        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for generation in (1..keep).rev() {
                let _ = fs::rename(
                    rotated_name(&base, generation),
                    rotated_name(&base, generation + 1),
                );
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        match open_append(&base) {
            Ok((file, size)) => {
                let sink = self.sink;
                self.attach(file, size, sink);
            }
            Err(_) => self.degrade(),
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Open or create `path` for appending, creating parent directories.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| BalanceError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| BalanceError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

fn utc_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
