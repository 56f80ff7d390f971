//! Device-level operation sequencing.
//!
//! [`KeyboardFlasher`] turns logical operations (bump, read a region, dump
//! the whole flash) into frame exchanges over a [`Transport`](crate::transport::Transport).

pub mod flasher;

pub use flasher::{KeyboardFlasher, ProgressFn};
