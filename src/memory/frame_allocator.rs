//! The public allocation surface over the frame bitmap.
//!
//! Initialization follows a fixed protocol: start with every frame marked
//! allocated, release the frames the firmware declared fully usable, then
//! re-reserve everything up to the kernel image's end and the bitmap's own
//! backing span. After that the allocator serves lowest-index-first single
//! and contiguous allocations with exact accounting.

use crate::constants::memory::FRAME_SIZE;
use crate::memory::bitmap::FrameBitmap;
use crate::memory::placement;
use crate::memory::region::{MemoryRegion, RegionMap};
use crate::memory::report::{MisuseEvent, MisuseReporter, SERIAL_REPORTER};
use crate::memory::FrameError;
use log::{debug, info};
use x86_64::{
    structures::paging::{FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB},
    PhysAddr, VirtAddr,
};

fn frame_address(index: usize) -> PhysAddr {
    PhysAddr::new((index * FRAME_SIZE) as u64)
}

pub struct BitmapFrameAllocator {
    bitmap: FrameBitmap,
    total_frames: usize,
    used_frames: usize,
    kernel_start: PhysAddr,
    kernel_end: PhysAddr,
    bitmap_base: PhysAddr,
    bitmap_frames: usize,
    reporter: &'static dyn MisuseReporter,
}

impl BitmapFrameAllocator {
    /// Builds an allocator from the firmware map and the kernel image bounds.
    ///
    /// `phys_offset` is the direct-map offset through which physical memory
    /// is reachable; the bitmap's backing frames are written through it.
    /// `reporter` replaces the default serial misuse sink when given.
    ///
    /// Frame 0 is reserved by convention and never allocatable, so address
    /// zero stays available as a sentinel.
    ///
    /// # Safety
    /// The region list must describe physical memory truthfully, every frame
    /// it declares usable must actually be free for the allocator to own,
    /// and `phys_offset` must map all of it read-write.
    pub unsafe fn init(
        regions: &[MemoryRegion],
        kernel_start: PhysAddr,
        kernel_end: PhysAddr,
        phys_offset: VirtAddr,
        reporter: Option<&'static dyn MisuseReporter>,
    ) -> Result<Self, FrameError> {
        let reporter = reporter.unwrap_or(&SERIAL_REPORTER);

        let map = match RegionMap::new(regions) {
            Ok(map) => map,
            Err(err) => {
                reporter.report(MisuseEvent::InvalidRegionList);
                return Err(err);
            }
        };
        let total_frames = map.total_frames();
        if total_frames == 0 {
            reporter.report(MisuseEvent::InvalidRegionList);
            return Err(FrameError::InvalidRegionList);
        }
        for region in map.regions() {
            debug!(
                "region {:#x}..{:#x} {:?}",
                region.base.as_u64(),
                region.base.as_u64() + region.length,
                region.kind
            );
        }

        let bitmap_base = match placement::place_bitmap(&map, kernel_end) {
            Ok(base) => base,
            Err(err) => {
                reporter.report(MisuseEvent::NoPlacement);
                return Err(err);
            }
        };
        let bitmap_frames = FrameBitmap::bytes_for(total_frames).div_ceil(FRAME_SIZE);

        let backing = (phys_offset + bitmap_base.as_u64()).as_mut_ptr::<u64>();
        // All-ones start: anything the firmware did not declare usable
        // stays unavailable.
        let mut bitmap = unsafe { FrameBitmap::from_raw(backing, total_frames) };

        for index in 0..total_frames {
            if map.frame_is_usable(index) {
                bitmap.clear(index);
            }
        }

        // Everything below the kernel image's end stays reserved.
        let kernel_frames = kernel_frame_count(kernel_end).min(total_frames);
        for index in 0..kernel_frames {
            bitmap.set(index);
        }
        bitmap.set(0);

        // The bitmap must never hand out its own backing.
        let first = bitmap_base.as_u64() as usize / FRAME_SIZE;
        for index in first..(first + bitmap_frames).min(total_frames) {
            bitmap.set(index);
        }

        let used_frames = bitmap.count_set();
        info!(
            "tracking {} frames, {} free, bitmap at {:#x} ({} frame(s))",
            total_frames,
            total_frames - used_frames,
            bitmap_base.as_u64(),
            bitmap_frames
        );

        Ok(Self {
            bitmap,
            total_frames,
            used_frames,
            kernel_start,
            kernel_end,
            bitmap_base,
            bitmap_frames,
            reporter,
        })
    }

    /// Hands out the lowest-index free frame.
    pub fn allocate_one(&mut self) -> Result<PhysAddr, FrameError> {
        match self.bitmap.first_clear() {
            Some(index) => {
                self.bitmap.set(index);
                self.used_frames += 1;
                Ok(frame_address(index))
            }
            None => {
                self.reporter.report(MisuseEvent::OutOfMemory);
                Err(FrameError::OutOfMemory)
            }
        }
    }

    /// Hands out the lowest-index window of `count` consecutive free frames.
    ///
    /// `count == 0` succeeds with address zero and no side effects; frame 0
    /// is permanently reserved, so the sentinel can never collide with a
    /// real allocation.
    pub fn allocate_contiguous(&mut self, count: usize) -> Result<PhysAddr, FrameError> {
        if count == 0 {
            return Ok(PhysAddr::new(0));
        }
        if count == 1 {
            return self.allocate_one();
        }
        match self.bitmap.first_clear_run(count) {
            Some(start) => {
                for index in start..start + count {
                    self.bitmap.set(index);
                }
                self.used_frames += count;
                Ok(frame_address(start))
            }
            None => {
                self.reporter.report(MisuseEvent::OutOfMemory);
                Err(FrameError::OutOfMemory)
            }
        }
    }

    /// Returns one frame to the free pool.
    ///
    /// Misuse never aborts and never changes state: addresses outside the
    /// tracked range and frames reserved at init (kernel image, bitmap
    /// backing, frame 0) report `InvalidFree`; frames already free report
    /// `DoubleFree`.
    pub fn free_one(&mut self, addr: PhysAddr) {
        let index = addr.as_u64() as usize / FRAME_SIZE;
        if index >= self.total_frames || !self.releasable(index) {
            self.reporter.report(MisuseEvent::InvalidFree(addr));
            return;
        }
        if !self.bitmap.is_set(index) {
            self.reporter.report(MisuseEvent::DoubleFree(addr));
            return;
        }
        self.bitmap.clear(index);
        self.used_frames -= 1;
    }

    /// Frees `count` successive frames starting at `addr`.
    ///
    /// Each index is validated on its own; a bad index mid-range reports and
    /// moves on to the rest.
    pub fn free_contiguous(&mut self, addr: PhysAddr, count: usize) {
        for offset in 0..count {
            self.free_one(addr + (offset * FRAME_SIZE) as u64);
        }
    }

    fn releasable(&self, index: usize) -> bool {
        if index == 0 || index < kernel_frame_count(self.kernel_end) {
            return false;
        }
        let first = self.bitmap_base.as_u64() as usize / FRAME_SIZE;
        !(first..first + self.bitmap_frames).contains(&index)
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    pub fn used_frames(&self) -> usize {
        self.used_frames
    }

    pub fn free_frames(&self) -> usize {
        self.total_frames - self.used_frames
    }

    pub fn total_bytes(&self) -> u64 {
        (self.total_frames * FRAME_SIZE) as u64
    }

    pub fn used_bytes(&self) -> u64 {
        (self.used_frames * FRAME_SIZE) as u64
    }

    pub fn free_bytes(&self) -> u64 {
        (self.free_frames() * FRAME_SIZE) as u64
    }

    /// Physical bounds of the kernel image recorded at init.
    pub fn kernel_footprint(&self) -> (PhysAddr, PhysAddr) {
        (self.kernel_start, self.kernel_end)
    }

    /// Base address and frame count of the bitmap's own backing.
    pub fn bitmap_span(&self) -> (PhysAddr, usize) {
        (self.bitmap_base, self.bitmap_frames)
    }

    /// Whether `addr` falls on a tracked frame that is currently marked
    /// allocated. `None` when the address lies outside tracked memory.
    pub fn frame_is_allocated(&self, addr: PhysAddr) -> Option<bool> {
        let index = addr.as_u64() as usize / FRAME_SIZE;
        (index < self.total_frames).then(|| self.bitmap.is_set(index))
    }

    /// Corruption indicator: the running count must equal the bitmap's
    /// population count at every quiescent point.
    pub fn accounting_consistent(&self) -> bool {
        self.used_frames == self.bitmap.count_set()
    }
}

fn kernel_frame_count(kernel_end: PhysAddr) -> usize {
    (kernel_end.as_u64() as usize).div_ceil(FRAME_SIZE)
}

unsafe impl FrameAllocator<Size4KiB> for BitmapFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame> {
        self.allocate_one()
            .ok()
            .map(PhysFrame::containing_address)
    }
}

impl FrameDeallocator<Size4KiB> for BitmapFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        self.free_one(frame.start_address());
    }
}
