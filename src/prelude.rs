//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use branch_balancer::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{BalanceError, Result};

// Platform
pub use crate::platform::pal::{AttributeReader, FsStats, Platform, detect_platform};

// Mount
pub use crate::mount::discovery::{MountInfo, discover};

// Monitor
pub use crate::monitor::fs_stats::{BranchFree, BranchSample, FreeSpaceProber};

// Scanner
pub use crate::scanner::filters::{FilterCriteria, MetadataErrorPolicy};
pub use crate::scanner::locator::{FileCandidate, Locator};
pub use crate::scanner::patterns::IncludeExclude;

// Mover
pub use crate::mover::MoveExecutor;
pub use crate::mover::options::MoveOptions;
pub use crate::mover::rsync::RsyncExecutor;

// Balancer
pub use crate::balancer::engine::{BalanceReport, BalanceTarget, Balancer, MovePlan, Outcome};
pub use crate::balancer::report::{BalanceReporter, SilentReporter};
pub use crate::balancer::signals::InterruptFlag;
