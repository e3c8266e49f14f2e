//! Bitmap-based physical frame allocator for early-boot kernel use.
//!
//! The allocator bootstraps itself from a firmware memory map and a known
//! kernel-image footprint, places its own bitmap in physical memory it is
//! about to manage, and then serves single-frame and contiguous allocations
//! with exact accounting. It assumes single-threaded early-boot context; the
//! process-wide entry points in [`memory`] wrap the instance in a spinlock as
//! the one integration point for later SMP work.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

pub mod constants;
pub mod devices;
pub mod logging;
pub mod memory;

pub use devices::serial;

pub mod prelude {
    pub use crate::serial_print;
    pub use crate::serial_println;
}
