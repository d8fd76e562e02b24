//! Observation hooks for a balance run.

#![allow(missing_docs)]

use crate::balancer::engine::MovePlan;
use crate::monitor::fs_stats::BranchSample;

/// Receives progress from [`crate::balancer::engine::Balancer::run`].
///
/// Every method has a no-op default so callers implement only what they show.
pub trait BalanceReporter {
    /// A fresh sample was taken.
    fn sampled(&mut self, _sample: &BranchSample) {}

    /// A file was selected and is about to move (or would, in a dry run).
    fn move_planned(&mut self, _plan: &MovePlan) {}

    /// The exact command the executor will run.
    fn command(&mut self, _line: &str) {}

    /// A move finished with status zero.
    fn move_completed(&mut self, _plan: &MovePlan) {}

    /// A non-fatal problem, such as an unreadable file under the Warn policy.
    fn warning(&mut self, _message: &str) {}
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl BalanceReporter for SilentReporter {}

/// Reporter that keeps every event, for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingReporter {
    pub samples: Vec<BranchSample>,
    pub planned: Vec<MovePlan>,
    pub commands: Vec<String>,
    pub completed: Vec<MovePlan>,
    pub warnings: Vec<String>,
}

impl BalanceReporter for RecordingReporter {
    fn sampled(&mut self, sample: &BranchSample) {
        self.samples.push(sample.clone());
    }

    fn move_planned(&mut self, plan: &MovePlan) {
        self.planned.push(plan.clone());
    }

    fn command(&mut self, line: &str) {
        self.commands.push(line.to_string());
    }

    fn move_completed(&mut self, plan: &MovePlan) {
        self.completed.push(plan.clone());
    }

    fn warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}
