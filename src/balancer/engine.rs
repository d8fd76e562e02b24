//! Balancer state machine.
//!
//! ```text
//! Sampling ─┬─> Converged
//!           └─> Selecting ─> Locating ─┬─> NoFileFound
//!                                      ├─> SameBranch
//!                                      └─> Moving ─┬─> MoveFailed
//!                                                  └─> Sampling …
//! ```
//!
//! Interrupted can end the run at any step; Planned ends a dry run in place of
//! Moving. The loop is greedy: each pass moves one file from the fullest branch
//! holding an eligible file to the emptiest branch.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::balancer::report::BalanceReporter;
use crate::balancer::signals::InterruptFlag;
use crate::core::errors::{BalanceError, Result};
use crate::logger::jsonl::{EventType, JsonlWriter, LogEntry, Severity};
use crate::monitor::fs_stats::{BranchSample, FreeSpaceProber};
use crate::mover::MoveExecutor;
use crate::platform::pal::Platform;
use crate::scanner::locator::{FileCandidate, Locator};

/// What to balance.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceTarget {
    pub branches: Vec<PathBuf>,
    /// Subpath, relative to every branch root, that files are taken from.
    pub relative: PathBuf,
    /// Maximum free-fraction spread, as a fraction (0.02 = 2%).
    pub tolerance: f64,
    /// Stop after the first selection without moving anything.
    pub dry_run: bool,
}

/// One selected move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovePlan {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub file: FileCandidate,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Outcome {
    Converged,
    NoFileFound,
    SameBranch { branch: PathBuf },
    MoveFailed { code: i32, plan: MovePlan },
    Interrupted,
    Planned { plan: MovePlan },
}

impl Outcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::NoFileFound => "no_file_found",
            Self::SameBranch { .. } => "same_branch",
            Self::MoveFailed { .. } => "move_failed",
            Self::Interrupted => "interrupted",
            Self::Planned { .. } => "planned",
        }
    }

    const fn event(&self) -> (EventType, Severity) {
        match self {
            Self::Converged => (EventType::Converged, Severity::Info),
            Self::NoFileFound => (EventType::NoCandidate, Severity::Warning),
            Self::SameBranch { .. } => (EventType::SameBranch, Severity::Warning),
            Self::MoveFailed { .. } => (EventType::MoveFailed, Severity::Error),
            Self::Interrupted => (EventType::Interrupted, Severity::Warning),
            Self::Planned { .. } => (EventType::Planned, Severity::Info),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub outcome: Outcome,
    pub moves: u64,
    pub bytes_moved: u64,
    /// The most recent full sample, if one was taken.
    pub final_sample: Option<BranchSample>,
}

impl BalanceReport {
    /// Report for a run stopped before the loop took its first sample.
    #[must_use]
    pub const fn interrupted() -> Self {
        Self {
            outcome: Outcome::Interrupted,
            moves: 0,
            bytes_moved: 0,
            final_sample: None,
        }
    }
}

/// Runs the loop against a platform and a move executor.
pub struct Balancer<E: MoveExecutor> {
    prober: FreeSpaceProber,
    locator: Locator,
    executor: E,
    interrupt: InterruptFlag,
    activity: Option<JsonlWriter>,
}

impl<E: MoveExecutor> Balancer<E> {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, locator: Locator, executor: E) -> Self {
        let interrupt = InterruptFlag::new();
        Self {
            prober: FreeSpaceProber::new(platform),
            locator: locator.with_interrupt(interrupt.clone()),
            executor,
            interrupt,
            activity: None,
        }
    }

    /// Share `flag` with the loop and the locator.
    #[must_use]
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.locator = self.locator.with_interrupt(flag.clone());
        self.interrupt = flag;
        self
    }

    #[must_use]
    pub fn with_activity_log(mut self, writer: JsonlWriter) -> Self {
        self.activity = Some(writer);
        self
    }

    #[must_use]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run until a terminal state. Errors are fatal conditions (capacity
    /// query failure, move tool spawn failure, I/O abort); every other ending
    /// is an [`Outcome`].
    pub fn run(
        &mut self,
        target: &BalanceTarget,
        reporter: &mut dyn BalanceReporter,
    ) -> Result<BalanceReport> {
        let started = Instant::now();
        let mut start = LogEntry::new(EventType::BalanceStart, Severity::Info);
        start.tolerance = Some(target.tolerance);
        start.path = Some(target.relative.display().to_string());
        start.details = Some(format!("{} branches", target.branches.len()));
        self.log(&start);

        let result = self.run_loop(target, reporter);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(report) => {
                let (event, severity) = report.outcome.event();
                let mut entry = LogEntry::new(event, severity);
                entry.moves = Some(report.moves);
                entry.bytes_moved = Some(report.bytes_moved);
                entry.spread = report.final_sample.as_ref().map(BranchSample::spread);
                entry.duration_ms = Some(elapsed_ms);
                match &report.outcome {
                    Outcome::SameBranch { branch } => {
                        entry.source_branch = Some(branch.display().to_string());
                    }
                    Outcome::Planned { plan } => {
                        entry = entry
                            .with_path(&plan.file.relative_path)
                            .with_branches(&plan.source, &plan.dest);
                    }
                    _ => {}
                }
                self.log(&entry);
            }
            Err(err) => {
                let mut entry = LogEntry::new(EventType::Error, Severity::Error).with_error(err);
                entry.duration_ms = Some(elapsed_ms);
                self.log(&entry);
            }
        }
        if let Some(writer) = self.activity.as_mut() {
            writer.flush();
        }
        result
    }

    fn run_loop(
        &mut self,
        target: &BalanceTarget,
        reporter: &mut dyn BalanceReporter,
    ) -> Result<BalanceReport> {
        let mut moves = 0u64;
        let mut bytes_moved = 0u64;
        let mut last_sample: Option<BranchSample> = None;

        loop {
            if self.interrupt.is_raised() {
                return finish(Outcome::Interrupted, moves, bytes_moved, last_sample);
            }

            // Sampling
            let sample = self.prober.sample(&target.branches)?;
            reporter.sampled(&sample);
            if sample.within_range(target.tolerance) {
                return finish(Outcome::Converged, moves, bytes_moved, Some(sample));
            }

            // Selecting: the emptiest branch receives, fullest-first sources are tried.
            let Some(dest) = sample.emptiest().map(|entry| entry.branch.clone()) else {
                return finish(Outcome::Converged, moves, bytes_moved, Some(sample));
            };

            // Locating
            let mut found: Option<(PathBuf, FileCandidate)> = None;
            let mut interrupted = false;
            for entry in sample.entries() {
                if self.interrupt.is_raised() {
                    interrupted = true;
                    break;
                }
                let located = self
                    .locator
                    .locate(&entry.branch, &target.relative, &mut |msg| reporter.warning(msg));
                match located {
                    Ok(Some(candidate)) => {
                        found = Some((entry.branch.clone(), candidate));
                        break;
                    }
                    Ok(None) => {}
                    Err(BalanceError::Interrupted) => {
                        interrupted = true;
                        break;
                    }
                    Err(err) => return Err(err),
                }
            }
            if interrupted {
                return finish(Outcome::Interrupted, moves, bytes_moved, Some(sample));
            }

            let Some((source, file)) = found else {
                return finish(Outcome::NoFileFound, moves, bytes_moved, Some(sample));
            };
            if source == dest {
                return finish(
                    Outcome::SameBranch { branch: source },
                    moves,
                    bytes_moved,
                    Some(sample),
                );
            }

            // Moving
            let plan = MovePlan { source, dest, file };
            reporter.move_planned(&plan);
            if let Some(line) =
                self.executor
                    .describe(&plan.source, &plan.dest, &plan.file.relative_path)
            {
                reporter.command(&line);
            }
            if target.dry_run {
                return finish(Outcome::Planned { plan }, moves, bytes_moved, Some(sample));
            }

            let code = self
                .executor
                .relocate(&plan.source, &plan.dest, &plan.file.relative_path)?;
            self.log_move(&plan, code);

            if code != 0 {
                if self.interrupt.is_raised() {
                    return finish(Outcome::Interrupted, moves, bytes_moved, Some(sample));
                }
                return finish(
                    Outcome::MoveFailed { code, plan },
                    moves,
                    bytes_moved,
                    Some(sample),
                );
            }

            moves += 1;
            bytes_moved = bytes_moved.saturating_add(plan.file.size);
            reporter.move_completed(&plan);
            last_sample = Some(sample);
        }
    }

    fn log_move(&mut self, plan: &MovePlan, code: i32) {
        let (event, severity) = if code == 0 {
            (EventType::FileMove, Severity::Info)
        } else {
            (EventType::MoveFailed, Severity::Error)
        };
        let mut entry = LogEntry::new(event, severity)
            .with_path(&plan.file.relative_path)
            .with_branches(&plan.source, &plan.dest);
        entry.size = Some(plan.file.size);
        entry.exit_code = Some(code);
        self.log(&entry);
    }

    fn log(&mut self, entry: &LogEntry) {
        if let Some(writer) = self.activity.as_mut() {
            writer.write_entry(entry);
        }
    }
}

fn finish(
    outcome: Outcome,
    moves: u64,
    bytes_moved: u64,
    final_sample: Option<BranchSample>,
) -> Result<BalanceReport> {
    Ok(BalanceReport {
        outcome,
        moves,
        bytes_moved,
        final_sample,
    })
}
