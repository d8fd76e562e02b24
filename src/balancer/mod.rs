//! The balancing loop: sample, test convergence, pick a file, move it, repeat.

pub mod engine;
pub mod report;
pub mod signals;
