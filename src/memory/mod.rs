//! Physical memory management.
//!
//! Data flows firmware map → [`region::RegionMap`] → [`placement`] →
//! [`frame_allocator::BitmapFrameAllocator`]. The allocator is an explicit
//! instance; the statics and functions here are the conventional entry point
//! for early-boot code that has no way to thread a parameter, and the single
//! critical-section boundary to wrap when a host kernel grows SMP.

pub mod bitmap;
pub mod error;
pub mod frame_allocator;
pub mod placement;
pub mod region;
pub mod report;

pub use error::FrameError;

use frame_allocator::BitmapFrameAllocator;
use region::MemoryRegion;
use report::MisuseReporter;
use spin::Mutex;
use x86_64::{PhysAddr, VirtAddr};

/// Process-wide allocator instance. `None` until [`init`] succeeds.
pub static FRAME_ALLOCATOR: Mutex<Option<BitmapFrameAllocator>> = Mutex::new(None);

/// Builds the process-wide allocator from the firmware map. Called once
/// after firmware hand-off; on failure the allocator stays uninitialized.
///
/// # Safety
/// Same contract as [`BitmapFrameAllocator::init`].
pub unsafe fn init(
    regions: &[MemoryRegion],
    kernel_start: PhysAddr,
    kernel_end: PhysAddr,
    phys_offset: VirtAddr,
    reporter: Option<&'static dyn MisuseReporter>,
) -> Result<(), FrameError> {
    let allocator = unsafe {
        BitmapFrameAllocator::init(regions, kernel_start, kernel_end, phys_offset, reporter)?
    };
    *FRAME_ALLOCATOR.lock() = Some(allocator);
    Ok(())
}

/// Runs `f` against the process-wide allocator, or fails with
/// `NotInitialized`.
pub fn with_frame_allocator<F, R>(f: F) -> Result<R, FrameError>
where
    F: FnOnce(&mut BitmapFrameAllocator) -> R,
{
    let mut guard = FRAME_ALLOCATOR.lock();
    match guard.as_mut() {
        Some(allocator) => Ok(f(allocator)),
        None => Err(FrameError::NotInitialized),
    }
}

/// Allocates one frame from the process-wide allocator.
pub fn alloc_frame() -> Result<PhysAddr, FrameError> {
    with_frame_allocator(|allocator| allocator.allocate_one())?
}

/// Allocates `count` contiguous frames from the process-wide allocator.
pub fn alloc_frames(count: usize) -> Result<PhysAddr, FrameError> {
    with_frame_allocator(|allocator| allocator.allocate_contiguous(count))?
}

/// Frees one frame. The only returnable error is `NotInitialized`; misuse
/// goes to the reporter.
pub fn dealloc_frame(addr: PhysAddr) -> Result<(), FrameError> {
    with_frame_allocator(|allocator| allocator.free_one(addr))
}

/// Frees `count` successive frames starting at `addr`.
pub fn dealloc_frames(addr: PhysAddr, count: usize) -> Result<(), FrameError> {
    with_frame_allocator(|allocator| allocator.free_contiguous(addr, count))
}

pub fn total_bytes() -> Result<u64, FrameError> {
    with_frame_allocator(|allocator| allocator.total_bytes())
}

pub fn used_bytes() -> Result<u64, FrameError> {
    with_frame_allocator(|allocator| allocator.used_bytes())
}

pub fn free_bytes() -> Result<u64, FrameError> {
    with_frame_allocator(|allocator| allocator.free_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::memory::FRAME_SIZE;
    use super::region::RegionKind;
    use std::alloc::{alloc_zeroed, Layout};

    // The process-wide allocator is shared state; this is the only test
    // that touches it, covering the whole Uninitialized → Initialized
    // transition in order.
    #[test]
    fn global_entry_points_require_init() {
        assert_eq!(alloc_frame().err(), Some(FrameError::NotInitialized));
        assert_eq!(
            dealloc_frame(PhysAddr::new(0x2000)).err(),
            Some(FrameError::NotInitialized)
        );
        assert_eq!(free_bytes().err(), Some(FrameError::NotInitialized));

        let layout = Layout::from_size_align(16 * FRAME_SIZE, FRAME_SIZE).unwrap();
        let arena = unsafe { alloc_zeroed(layout) };
        assert!(!arena.is_null());
        let regions = [MemoryRegion::new(0, 64 * 1024, RegionKind::Usable)];
        unsafe {
            init(
                &regions,
                PhysAddr::new(0),
                PhysAddr::new(0x1000),
                VirtAddr::new(arena as u64),
                None,
            )
        }
        .unwrap();

        assert_eq!(alloc_frame(), Ok(PhysAddr::new(0x2000)));
        assert_eq!(alloc_frames(2), Ok(PhysAddr::new(0x3000)));
        assert_eq!(used_bytes(), Ok(5 * FRAME_SIZE as u64));
        assert_eq!(free_bytes(), Ok(11 * FRAME_SIZE as u64));
        assert_eq!(total_bytes(), Ok(16 * FRAME_SIZE as u64));

        dealloc_frames(PhysAddr::new(0x3000), 2).unwrap();
        dealloc_frame(PhysAddr::new(0x2000)).unwrap();
        assert_eq!(used_bytes(), Ok(2 * FRAME_SIZE as u64));
        assert!(with_frame_allocator(|a| a.accounting_consistent()).unwrap());
    }
}
