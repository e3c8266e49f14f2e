/// Size of a physical frame in bytes. Frames are naturally aligned.
pub const FRAME_SIZE: usize = 4096;

/// Bits per bitmap word.
pub const BITMAP_WORD_BITS: usize = 64;

/// A bitmap word with every frame marked allocated.
pub const FULL_BITMAP_WORD: u64 = u64::MAX;
