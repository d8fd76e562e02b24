//! Console output for `bbal`: human text or one JSON object per line.
//!
//! Paths are printed as UTF-8 with undecodable bytes rendered as `\xNN`.
//! Every line is flushed as soon as it is written.

use std::io::{self, Write};
use std::path::Path;

use colored::Colorize;
use serde_json::{Value, json};

use branch_balancer::balancer::engine::{BalanceReport, MovePlan, Outcome};
use branch_balancer::balancer::report::BalanceReporter;
use branch_balancer::core::units::format_bytes;
use branch_balancer::monitor::fs_stats::BranchSample;
use branch_balancer::mount::discovery::MountInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

pub struct Console<W: Write> {
    out: W,
    mode: OutputMode,
    verbosity: Verbosity,
}

impl Console<io::Stdout> {
    pub fn stdout(mode: OutputMode, verbosity: Verbosity) -> Self {
        Self::new(io::stdout(), mode, verbosity)
    }
}

impl<W: Write> Console<W> {
    pub const fn new(out: W, mode: OutputMode, verbosity: Verbosity) -> Self {
        Self {
            out,
            mode,
            verbosity,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn mount(&mut self, mount: &MountInfo) -> io::Result<()> {
        match self.mode {
            OutputMode::Json => self.json(&json!({
                "event": "mount",
                "mount_point": display(&mount.mount_point),
                "relative": display(&mount.relative),
                "branches": mount.branches.iter().map(|b| display(b)).collect::<Vec<_>>(),
            })),
            OutputMode::Human if self.verbosity == Verbosity::Verbose => {
                self.line(&format!("mount: {}", display(&mount.mount_point)))?;
                for branch in &mount.branches {
                    self.line(&format!("  branch: {}", display(branch)))?;
                }
                Ok(())
            }
            OutputMode::Human => Ok(()),
        }
    }

    /// Print the terminal state, the run summary and the branch table.
    pub fn finish(&mut self, report: &BalanceReport, tolerance_pct: f64) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            let payload = json!({
                "event": "finished",
                "outcome": outcome_json(&report.outcome),
                "moves": report.moves,
                "bytes_moved": report.bytes_moved,
                "converged": report.outcome == Outcome::Converged,
                "branches": report.final_sample.as_ref().map(sample_json),
            });
            return self.json(&payload);
        }

        match &report.outcome {
            Outcome::Converged => {}
            Outcome::NoFileFound => {
                self.line(&"Could not find file to transfer: exiting...".yellow().to_string())?;
            }
            Outcome::SameBranch { .. } => {
                self.line(&"Source drive == target drive: exiting...".yellow().to_string())?;
            }
            Outcome::MoveFailed { code, .. } => {
                self.line(&format!("ERROR - exited with exit code: {code}").red().to_string())?;
            }
            Outcome::Interrupted => {
                return self.line("exiting: CTRL-C pressed");
            }
            Outcome::Planned { .. } => {
                self.line("dry run: no files were moved")?;
            }
        }

        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        if report.moves > 0 {
            self.line(&format!(
                "moved {} file{} ({})",
                report.moves,
                if report.moves == 1 { "" } else { "s" },
                format_bytes(report.bytes_moved)
            ))?;
        }
        if let Some(sample) = &report.final_sample {
            let headline = if report.outcome == Outcome::Converged {
                format!("Branches within {tolerance_pct}% range:")
            } else {
                format!(
                    "Branches (spread {:.2}%, target {tolerance_pct}%):",
                    sample.spread() * 100.0
                )
            };
            self.line(&headline.bold().to_string())?;
            for entry in sample.entries() {
                self.line(&format!(
                    " * {}: {:.2}% free",
                    display(&entry.branch),
                    entry.free_fraction * 100.0
                ))?;
            }
        }
        Ok(())
    }

    fn move_lines(&mut self, plan: &MovePlan) -> io::Result<()> {
        self.line(&format!("file: {}", display(&plan.file.relative_path).bold()))?;
        self.line(&format!("from: {}", display(&plan.source)))?;
        self.line(&format!("to:   {}", display(&plan.dest)))
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{text}")?;
        self.out.flush()
    }

    fn json(&mut self, payload: &Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, payload)?;
        writeln!(self.out)?;
        self.out.flush()
    }

    fn emit(&mut self, result: io::Result<()>) {
        if let Err(err) = result {
            let _ = writeln!(io::stderr(), "bbal: failed to write output: {err}");
        }
    }
}

impl<W: Write> BalanceReporter for Console<W> {
    fn sampled(&mut self, sample: &BranchSample) {
        if self.mode == OutputMode::Json && self.verbosity == Verbosity::Verbose {
            let result = self.json(&json!({ "event": "sample", "branches": sample_json(sample) }));
            self.emit(result);
        }
    }

    fn move_planned(&mut self, plan: &MovePlan) {
        let result = match self.mode {
            OutputMode::Json => {
                let mut payload = plan_json(plan);
                payload["event"] = json!("move_planned");
                self.json(&payload)
            }
            OutputMode::Human if self.verbosity == Verbosity::Quiet => Ok(()),
            OutputMode::Human => self.move_lines(plan),
        };
        self.emit(result);
    }

    fn command(&mut self, line: &str) {
        if self.verbosity != Verbosity::Verbose {
            return;
        }
        let result = match self.mode {
            OutputMode::Json => self.json(&json!({ "event": "command", "line": line })),
            OutputMode::Human => self.line(&line.dimmed().to_string()),
        };
        self.emit(result);
    }

    fn move_completed(&mut self, plan: &MovePlan) {
        let result = match self.mode {
            OutputMode::Json => self.json(&json!({
                "event": "move_completed",
                "file": display(&plan.file.relative_path),
                "size": plan.file.size,
            })),
            OutputMode::Human => Ok(()),
        };
        self.emit(result);
    }

    fn warning(&mut self, message: &str) {
        if self.verbosity == Verbosity::Quiet {
            return;
        }
        let result = match self.mode {
            OutputMode::Json => self.json(&json!({ "event": "warning", "message": message })),
            OutputMode::Human => writeln!(io::stderr(), "{} {message}", "warning:".yellow()),
        };
        self.emit(result);
    }
}

fn plan_json(plan: &MovePlan) -> Value {
    json!({
        "file": display(&plan.file.relative_path),
        "from": display(&plan.source),
        "to": display(&plan.dest),
        "size": plan.file.size,
    })
}

fn outcome_json(outcome: &Outcome) -> Value {
    let mut value = json!({ "state": outcome.label() });
    match outcome {
        Outcome::SameBranch { branch } => value["branch"] = json!(display(branch)),
        Outcome::MoveFailed { code, plan } => {
            value["code"] = json!(code);
            value["plan"] = plan_json(plan);
        }
        Outcome::Planned { plan } => value["plan"] = plan_json(plan),
        Outcome::Converged | Outcome::NoFileFound | Outcome::Interrupted => {}
    }
    value
}

fn sample_json(sample: &BranchSample) -> Value {
    Value::Array(
        sample
            .entries()
            .iter()
            .map(|entry| {
                json!({
                    "branch": display(&entry.branch),
                    "available_bytes": entry.available_bytes,
                    "total_bytes": entry.total_bytes,
                    "free_fraction": entry.free_fraction,
                })
            })
            .collect(),
    )
}

/// Render `path` as UTF-8, escaping undecodable bytes as `\xNN`.
pub fn display(path: &Path) -> String {
    #[cfg(unix)]
    {
        use std::fmt::Write as _;
        use std::os::unix::ffi::OsStrExt;

        let mut out = String::new();
        for chunk in path.as_os_str().as_bytes().utf8_chunks() {
            out.push_str(chunk.valid());
            for byte in chunk.invalid() {
                let _ = write!(out, "\\x{byte:02x}");
            }
        }
        out
    }
    #[cfg(not(unix))]
    {
        path.to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use branch_balancer::monitor::fs_stats::BranchFree;
    use branch_balancer::scanner::locator::FileCandidate;
    use std::path::PathBuf;

    fn sample() -> BranchSample {
        BranchSample::from_entries(vec![
            BranchFree {
                branch: PathBuf::from("/mnt/b"),
                available_bytes: 50,
                total_bytes: 100,
                free_fraction: 0.5,
            },
            BranchFree {
                branch: PathBuf::from("/mnt/a"),
                available_bytes: 49,
                total_bytes: 100,
                free_fraction: 0.49,
            },
        ])
    }

    fn plan() -> MovePlan {
        MovePlan {
            source: PathBuf::from("/mnt/a"),
            dest: PathBuf::from("/mnt/b"),
            file: FileCandidate {
                relative_path: PathBuf::from("media/x.mkv"),
                size: 2048,
                link_count: 1,
            },
        }
    }

    fn report(outcome: Outcome) -> BalanceReport {
        BalanceReport {
            outcome,
            moves: 0,
            bytes_moved: 0,
            final_sample: Some(sample()),
        }
    }

    fn human(verbosity: Verbosity) -> Console<Vec<u8>> {
        colored::control::set_override(false);
        Console::new(Vec::new(), OutputMode::Human, verbosity)
    }

    fn text(console: Console<Vec<u8>>) -> String {
        String::from_utf8(console.into_inner()).unwrap()
    }

    #[test]
    fn converged_table_lists_branches_fullest_first() {
        let mut console = human(Verbosity::Normal);
        console.finish(&report(Outcome::Converged), 2.0).unwrap();
        let out = text(console);
        assert!(out.contains("Branches within 2% range:"));
        let a = out.find(" * /mnt/a: 49.00% free").unwrap();
        let b = out.find(" * /mnt/b: 50.00% free").unwrap();
        assert!(a < b);
    }

    #[test]
    fn move_failure_reports_exit_code() {
        let mut console = human(Verbosity::Normal);
        console
            .finish(&report(Outcome::MoveFailed { code: 23, plan: plan() }), 2.0)
            .unwrap();
        let out = text(console);
        assert!(out.contains("ERROR - exited with exit code: 23"));
        assert!(!out.contains("within"));
    }

    #[test]
    fn terminal_messages_match_states() {
        for (outcome, expected) in [
            (Outcome::NoFileFound, "Could not find file to transfer: exiting..."),
            (
                Outcome::SameBranch {
                    branch: PathBuf::from("/mnt/b"),
                },
                "Source drive == target drive: exiting...",
            ),
            (Outcome::Interrupted, "exiting: CTRL-C pressed"),
        ] {
            let mut console = human(Verbosity::Normal);
            console.finish(&report(outcome), 2.0).unwrap();
            assert!(text(console).contains(expected));
        }
    }

    #[test]
    fn interrupted_prints_no_table() {
        let mut console = human(Verbosity::Normal);
        console.finish(&report(Outcome::Interrupted), 2.0).unwrap();
        assert!(!text(console).contains(" * "));
    }

    #[test]
    fn move_report_shows_file_and_branches() {
        let mut console = human(Verbosity::Normal);
        console.move_planned(&plan());
        console.command("rsync --archive ...");
        let out = text(console);
        assert!(out.contains("file: media/x.mkv"));
        assert!(out.contains("from: /mnt/a"));
        assert!(out.contains("to:   /mnt/b"));
        assert!(!out.contains("rsync"));
    }

    #[test]
    fn verbose_prints_command() {
        let mut console = human(Verbosity::Verbose);
        console.command("rsync --archive x y");
        assert!(text(console).contains("rsync --archive x y"));
    }

    #[test]
    fn json_mode_emits_one_object_per_line() {
        let mut console = Console::new(Vec::new(), OutputMode::Json, Verbosity::Normal);
        console.move_planned(&plan());
        console.move_completed(&plan());
        console.finish(&report(Outcome::Converged), 2.0).unwrap();
        let out = text(console);
        let events: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0]["event"], "move_planned");
        assert_eq!(events[0]["size"], 2048);
        assert_eq!(events[2]["event"], "finished");
        assert_eq!(events[2]["outcome"]["state"], "converged");
        assert_eq!(events[2]["converged"], true);
        assert_eq!(events[2]["branches"][0]["branch"], "/mnt/a");
    }

    #[cfg(unix)]
    #[test]
    fn undecodable_bytes_are_backslash_escaped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let path = Path::new(OsStr::from_bytes(b"/mnt/a/bad\xffname"));
        assert_eq!(display(path), "/mnt/a/bad\\xffname");
    }
}
