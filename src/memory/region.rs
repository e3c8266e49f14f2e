//! Firmware memory map ingestion.
//!
//! The map arrives as a pre-extracted sequence of regions; the allocator is
//! agnostic to whether the firmware behind it was UEFI, a boot protocol, or
//! a test harness. Regions are neither merged nor reordered, and they need
//! not be sorted, disjoint, or frame-aligned.

use crate::constants::memory::FRAME_SIZE;
use crate::memory::FrameError;
use x86_64::PhysAddr;

/// Classification of a firmware-reported region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Available for general allocation.
    Usable,
    /// Firmware-reserved; never allocatable.
    Reserved,
    /// Boot-services memory that a host kernel may reclaim later.
    BootReclaimable,
    /// Defective or otherwise unavailable memory.
    Unusable,
}

/// One firmware-reported span of physical memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub base: PhysAddr,
    pub length: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    pub fn new(base: u64, length: u64, kind: RegionKind) -> Self {
        Self {
            base: PhysAddr::new(base),
            length,
            kind,
        }
    }

    pub(crate) fn end(&self) -> u64 {
        self.base.as_u64() + self.length
    }
}

/// View over the firmware map answering the two questions init needs:
/// how far physical memory reaches, and whether a frame may be handed out.
pub struct RegionMap<'a> {
    regions: &'a [MemoryRegion],
}

impl<'a> RegionMap<'a> {
    pub fn new(regions: &'a [MemoryRegion]) -> Result<Self, FrameError> {
        if regions.is_empty() {
            return Err(FrameError::InvalidRegionList);
        }
        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[MemoryRegion] {
        self.regions
    }

    /// Largest `base + length` over all regions, regardless of kind.
    pub fn max_address(&self) -> u64 {
        self.regions.iter().map(MemoryRegion::end).max().unwrap_or(0)
    }

    /// Number of frames needed to cover every observed address.
    pub fn total_frames(&self) -> usize {
        (self.max_address() as usize).div_ceil(FRAME_SIZE)
    }

    /// Whether frame `index` may enter the free pool: fully contained in
    /// some `Usable` region while touching no non-`Usable` claim.
    ///
    /// Usable bases round up and ends round down to frame boundaries, so a
    /// partially covered frame never qualifies. Overlapping declarations
    /// resolve conservatively against the frame.
    pub fn frame_is_usable(&self, index: usize) -> bool {
        let frame_start = (index * FRAME_SIZE) as u64;
        let frame_end = frame_start + FRAME_SIZE as u64;

        let mut contained = false;
        for region in self.regions {
            let base = region.base.as_u64();
            match region.kind {
                RegionKind::Usable => {
                    if base <= frame_start && frame_end <= region.end() {
                        contained = true;
                    }
                }
                _ => {
                    if base < frame_end && frame_start < region.end() {
                        return false;
                    }
                }
            }
        }
        contained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_map_is_rejected() {
        assert_eq!(
            RegionMap::new(&[]).err(),
            Some(FrameError::InvalidRegionList)
        );
    }

    #[test]
    fn max_address_spans_all_kinds() {
        let regions = [
            MemoryRegion::new(0, 64 * 1024, RegionKind::Usable),
            MemoryRegion::new(0x100000, 0x4000, RegionKind::Reserved),
        ];
        let map = RegionMap::new(&regions).unwrap();
        assert_eq!(map.max_address(), 0x104000);
        assert_eq!(map.total_frames(), 0x104);
    }

    #[test]
    fn unaligned_usable_region_keeps_only_full_frames() {
        // [0x800, 0x3000): frames 1 and 2 are fully covered, 0 is not.
        let regions = [MemoryRegion::new(0x800, 0x2800, RegionKind::Usable)];
        let map = RegionMap::new(&regions).unwrap();
        assert!(!map.frame_is_usable(0));
        assert!(map.frame_is_usable(1));
        assert!(map.frame_is_usable(2));
    }

    #[test]
    fn overlapping_reserved_claim_wins() {
        let regions = [
            MemoryRegion::new(0, 64 * 1024, RegionKind::Usable),
            // Unaligned reserved sliver inside frame 2.
            MemoryRegion::new(0x2800, 0x100, RegionKind::Reserved),
        ];
        let map = RegionMap::new(&regions).unwrap();
        assert!(map.frame_is_usable(1));
        assert!(!map.frame_is_usable(2));
        assert!(map.frame_is_usable(3));
    }

    #[test]
    fn boot_reclaimable_is_not_handed_out() {
        let regions = [
            MemoryRegion::new(0, 0x4000, RegionKind::BootReclaimable),
            MemoryRegion::new(0x4000, 0x4000, RegionKind::Usable),
        ];
        let map = RegionMap::new(&regions).unwrap();
        assert!(!map.frame_is_usable(0));
        assert!(map.frame_is_usable(4));
    }

    #[test]
    fn frames_past_every_region_are_unusable() {
        let regions = [MemoryRegion::new(0, 0x4000, RegionKind::Usable)];
        let map = RegionMap::new(&regions).unwrap();
        assert!(!map.frame_is_usable(4));
        assert!(!map.frame_is_usable(1000));
    }
}
