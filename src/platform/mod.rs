//! Platform abstraction: filesystem capacity and extended attributes.

pub mod pal;
