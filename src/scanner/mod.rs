//! Branch scanner: glob patterns, eligibility filters, and the file locator.

pub mod filters;
pub mod locator;
pub mod patterns;
