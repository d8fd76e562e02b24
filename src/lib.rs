#![forbid(unsafe_code)]

//! Branch balancer (bbal): evens out free space across the branches of a
//! mergerfs union mount.
//!
//! One run repeatedly:
//! 1. **Samples** free space on every branch of the mount
//! 2. **Stops** once the fullest and emptiest branches are within tolerance
//! 3. **Locates** an eligible file on the fullest branch and hands it to
//!    `rsync` for a relocation onto the emptiest branch
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use branch_balancer::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use branch_balancer::core::config::Config;
//! use branch_balancer::scanner::locator::{FileCandidate, Locator};
//! ```

pub mod prelude;

pub mod balancer;
pub mod core;
pub mod logger;
pub mod monitor;
pub mod mount;
pub mod mover;
pub mod platform;
pub mod scanner;
