//! Bootstrap placement of the bitmap's own backing storage.
//!
//! The bitmap has to live somewhere in the very memory it is about to
//! manage, before any allocator exists. The placer puts it at the first
//! frame-aligned address at or above the kernel image's end whose whole span
//! lies on usable frames, advancing to later usable regions as needed.

use crate::constants::memory::FRAME_SIZE;
use crate::memory::bitmap::FrameBitmap;
use crate::memory::region::{RegionKind, RegionMap};
use crate::memory::FrameError;
use x86_64::PhysAddr;

const fn align_up(addr: u64, align: u64) -> u64 {
    (addr + align - 1) & !(align - 1)
}

/// Chooses the bitmap's base address for the given map and kernel bound.
///
/// Every frame overlapped by the span `[base, base + bitmap_bytes)` must
/// classify as usable; a region whose candidate span fails that check is
/// skipped. Fails with `NoPlacement` when no usable region qualifies.
pub fn place_bitmap(map: &RegionMap, kernel_end: PhysAddr) -> Result<PhysAddr, FrameError> {
    let bytes = FrameBitmap::bytes_for(map.total_frames()) as u64;
    debug_assert!(bytes > 0);
    let floor = align_up(kernel_end.as_u64(), FRAME_SIZE as u64);

    let mut best: Option<u64> = None;
    for region in map.regions() {
        if region.kind != RegionKind::Usable {
            continue;
        }
        let start = align_up(region.base.as_u64(), FRAME_SIZE as u64).max(floor);
        if start + bytes > region.end() {
            continue;
        }
        let first_frame = (start / FRAME_SIZE as u64) as usize;
        let last_frame = ((start + bytes - 1) / FRAME_SIZE as u64) as usize;
        if !(first_frame..=last_frame).all(|frame| map.frame_is_usable(frame)) {
            continue;
        }
        best = Some(match best {
            Some(current) => current.min(start),
            None => start,
        });
    }

    best.map(PhysAddr::new).ok_or(FrameError::NoPlacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::region::MemoryRegion;

    #[test]
    fn lands_right_after_the_kernel() {
        let regions = [MemoryRegion::new(0, 64 * 1024, RegionKind::Usable)];
        let map = RegionMap::new(&regions).unwrap();
        let base = place_bitmap(&map, PhysAddr::new(0x1000)).unwrap();
        assert_eq!(base.as_u64(), 0x1000);
    }

    #[test]
    fn unaligned_kernel_end_rounds_up() {
        let regions = [MemoryRegion::new(0, 64 * 1024, RegionKind::Usable)];
        let map = RegionMap::new(&regions).unwrap();
        let base = place_bitmap(&map, PhysAddr::new(0x1234)).unwrap();
        assert_eq!(base.as_u64(), 0x2000);
    }

    #[test]
    fn skips_regions_too_small_for_the_bitmap() {
        let regions = [
            MemoryRegion::new(0, 0x1000, RegionKind::Usable),
            MemoryRegion::new(0x100000, 0x10000, RegionKind::Usable),
        ];
        let map = RegionMap::new(&regions).unwrap();
        let base = place_bitmap(&map, PhysAddr::new(0x1000)).unwrap();
        assert_eq!(base.as_u64(), 0x100000);
    }

    #[test]
    fn skips_spans_poisoned_by_overlapping_claims() {
        let regions = [
            MemoryRegion::new(0, 0x10000, RegionKind::Usable),
            MemoryRegion::new(0x1000, 0x1000, RegionKind::Reserved),
            MemoryRegion::new(0x10000, 0x10000, RegionKind::Usable),
        ];
        let map = RegionMap::new(&regions).unwrap();
        let base = place_bitmap(&map, PhysAddr::new(0x1000)).unwrap();
        assert_eq!(base.as_u64(), 0x10000);
    }

    #[test]
    fn fails_when_nothing_fits() {
        let regions = [MemoryRegion::new(0, 64 * 1024, RegionKind::Usable)];
        let map = RegionMap::new(&regions).unwrap();
        assert_eq!(
            place_bitmap(&map, PhysAddr::new(0x20000)).err(),
            Some(FrameError::NoPlacement)
        );
    }
}
