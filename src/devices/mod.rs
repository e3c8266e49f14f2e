//! Device access.
//!
//! The allocator only needs one device: the serial port that backs the
//! logger and the default misuse reporter.

pub mod serial;
