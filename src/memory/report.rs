//! Misuse detection side channel.
//!
//! Contract violations on the free path, and resource exhaustion, become
//! structured events routed to a pluggable sink instead of strings in the
//! hot path. Reporting is diagnostic only; nothing here aborts.

use core::fmt;
use x86_64::PhysAddr;

/// A caller action that violated the API contract, or a resource failure
/// worth surfacing out-of-band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisuseEvent {
    /// The freed address maps to no releasable tracked frame.
    InvalidFree(PhysAddr),
    /// The frame behind the freed address is already free.
    DoubleFree(PhysAddr),
    /// No usable region could hold the frame bitmap at init.
    NoPlacement,
    /// The firmware map was empty or described no memory.
    InvalidRegionList,
    /// An allocation request could not be satisfied.
    OutOfMemory,
}

impl fmt::Display for MisuseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MisuseEvent::InvalidFree(addr) => {
                write!(f, "invalid free at {:#x}", addr.as_u64())
            }
            MisuseEvent::DoubleFree(addr) => {
                write!(f, "double free at {:#x}", addr.as_u64())
            }
            MisuseEvent::NoPlacement => write!(f, "no placement for frame bitmap"),
            MisuseEvent::InvalidRegionList => write!(f, "invalid memory region list"),
            MisuseEvent::OutOfMemory => write!(f, "out of physical frames"),
        }
    }
}

/// Sink for misuse events. Implementations must tolerate being called with
/// interrupts disabled and must not allocate.
pub trait MisuseReporter: Sync {
    fn report(&self, event: MisuseEvent);
}

/// Default sink: one tagged line per event on the serial console.
pub struct SerialReporter;

pub static SERIAL_REPORTER: SerialReporter = SerialReporter;

impl MisuseReporter for SerialReporter {
    fn report(&self, event: MisuseEvent) {
        crate::serial_println!("[PMM] {}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_render_with_addresses() {
        let event = MisuseEvent::InvalidFree(PhysAddr::new(0xDEAD_B000));
        assert_eq!(format!("{event}"), "invalid free at 0xdeadb000");
        assert_eq!(format!("{}", MisuseEvent::OutOfMemory), "out of physical frames");
    }
}
