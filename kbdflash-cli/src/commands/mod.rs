//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod device;
pub(crate) mod dump;
pub(crate) mod list;
pub(crate) mod write;
