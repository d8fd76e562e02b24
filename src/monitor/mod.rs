//! Branch monitoring: free-space sampling and the convergence test.

pub mod fs_stats;
