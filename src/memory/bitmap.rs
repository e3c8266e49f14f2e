//! Dense bit array backing the allocator, one bit per physical frame.
//!
//! Bit `i` set means frame `i` is allocated or unusable. The store sits in
//! manually placed physical memory chosen by the bootstrap placer, so no
//! heap is involved.

use crate::constants::memory::{BITMAP_WORD_BITS, FULL_BITMAP_WORD};

pub struct FrameBitmap {
    words: &'static mut [u64],
    frames: usize,
}

impl FrameBitmap {
    /// Number of words needed to track `frames` bits.
    pub const fn words_for(frames: usize) -> usize {
        frames.div_ceil(BITMAP_WORD_BITS)
    }

    /// Bytes of backing storage needed to track `frames` bits.
    pub const fn bytes_for(frames: usize) -> usize {
        Self::words_for(frames) * core::mem::size_of::<u64>()
    }

    /// Builds the store over raw backing memory with every bit set, the
    /// conservative init default. Padding bits past `frames` stay set for
    /// the store's lifetime.
    ///
    /// # Safety
    /// `base` must point to `words_for(frames)` writable, exclusively owned
    /// words that outlive the returned store.
    pub unsafe fn from_raw(base: *mut u64, frames: usize) -> Self {
        let words = unsafe { core::slice::from_raw_parts_mut(base, Self::words_for(frames)) };
        words.fill(FULL_BITMAP_WORD);
        Self { words, frames }
    }

    /// Number of tracked frames.
    pub fn len(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn set(&mut self, index: usize) {
        assert!(index < self.frames);
        self.words[index / BITMAP_WORD_BITS] |= 1 << (index % BITMAP_WORD_BITS);
    }

    pub fn clear(&mut self, index: usize) {
        assert!(index < self.frames);
        self.words[index / BITMAP_WORD_BITS] &= !(1 << (index % BITMAP_WORD_BITS));
    }

    pub fn is_set(&self, index: usize) -> bool {
        assert!(index < self.frames);
        self.words[index / BITMAP_WORD_BITS] & (1 << (index % BITMAP_WORD_BITS)) != 0
    }

    /// Population count over the tracked bits.
    pub fn count_set(&self) -> usize {
        let padding = self.words.len() * BITMAP_WORD_BITS - self.frames;
        let ones: usize = self.words.iter().map(|word| word.count_ones() as usize).sum();
        ones - padding
    }

    /// Lowest clear bit, skipping fully set words.
    pub fn first_clear(&self) -> Option<usize> {
        for (word_index, &word) in self.words.iter().enumerate() {
            if word != FULL_BITMAP_WORD {
                let index = word_index * BITMAP_WORD_BITS + (!word).trailing_zeros() as usize;
                if index < self.frames {
                    return Some(index);
                }
            }
        }
        None
    }

    /// Lowest starting index of `length` consecutive clear bits.
    ///
    /// Runs may span word boundaries; full words are skipped only while no
    /// run is open, so the outcome matches a naive bit-by-bit scan.
    pub fn first_clear_run(&self, length: usize) -> Option<usize> {
        debug_assert!(length > 0);
        let mut run = 0;
        let mut index = 0;
        while index < self.frames {
            if run == 0 && index % BITMAP_WORD_BITS == 0 {
                while index + BITMAP_WORD_BITS <= self.frames
                    && self.words[index / BITMAP_WORD_BITS] == FULL_BITMAP_WORD
                {
                    index += BITMAP_WORD_BITS;
                }
                if index >= self.frames {
                    break;
                }
            }
            if self.is_set(index) {
                run = 0;
            } else {
                run += 1;
                if run == length {
                    return Some(index + 1 - length);
                }
            }
            index += 1;
        }
        None
    }
}
