//! Union-mount discovery via the control file and its extended attributes.

pub mod discovery;
