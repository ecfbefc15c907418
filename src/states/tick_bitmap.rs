//! Packed tick initialization index.
//!
//! Although ticks are stored as i32, all usable values fit within 24 bits
//! once compressed by the tick spacing. The high 16 bits select a 256-bit
//! word and the low 8 bits a position inside it, so one word answers
//! "where is the next initialized tick" for a whole stretch of price space.

use std::collections::HashMap;

use bitmaps::Bitmap;

use crate::libraries::{big_num::U256, bit_math};

/// Mapping from word position to a 256-bit word of tick initialized flags.
/// Words are stored as two u128 limbs, least significant first; zeroed
/// words are dropped from the map.
#[derive(Debug, Clone, Default)]
pub struct TickBitmap {
    words: HashMap<i16, [u128; 2]>,
}

/// Splits a compressed tick into its word position and bit position.
fn position(compressed: i32) -> (i16, u8) {
    ((compressed >> 8) as i16, (compressed & 0xff) as u8)
}

/// Widens a stored word into a U256 for mask arithmetic.
fn word_to_u256(word: [u128; 2]) -> U256 {
    U256([
        word[0] as u64,
        (word[0] >> 64) as u64,
        word[1] as u64,
        (word[1] >> 64) as u64,
    ])
}

impl TickBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips the initialized state of `tick`, which must be a multiple of
    /// `tick_spacing`.
    pub fn flip_tick(&mut self, tick: i32, tick_spacing: i32) {
        assert_eq!(tick % tick_spacing, 0);
        let (word_pos, bit_pos) = position(tick / tick_spacing);

        let word = self.words.entry(word_pos).or_default();
        let mut bitmap = Bitmap::<256>::from_value(*word);
        bitmap.set(bit_pos as usize, !bitmap.get(bit_pos as usize));
        *word = bitmap.into_value();
        if *word == [0, 0] {
            self.words.remove(&word_pos);
        }
    }

    /// Whether `tick` is flagged initialized.
    pub fn is_initialized(&self, tick: i32, tick_spacing: i32) -> bool {
        if tick % tick_spacing != 0 {
            return false;
        }
        let (word_pos, bit_pos) = position(tick / tick_spacing);
        self.words
            .get(&word_pos)
            .map_or(false, |word| Bitmap::<256>::from_value(*word).get(bit_pos as usize))
    }

    /// Returns the next initialized tick within one word of `tick` in the
    /// given direction, and whether that tick is initialized. A false flag
    /// means the word was exhausted and the caller should continue from the
    /// returned tick in the next iteration.
    ///
    /// # Arguments
    ///
    /// * `tick` - The starting tick
    /// * `tick_spacing` - The spacing between usable ticks
    /// * `lte` - Whether to search at or below the starting tick (true), or
    ///   strictly above it (false)
    pub fn next_initialized_tick_within_one_word(
        &self,
        tick: i32,
        tick_spacing: i32,
        lte: bool,
    ) -> (i32, bool) {
        let mut compressed = tick / tick_spacing;
        // floor division toward negative infinity; engine callers always
        // pre-align ticks to the spacing
        if tick < 0 && tick % tick_spacing != 0 {
            compressed -= 1;
        }

        if lte {
            let (word_pos, bit_pos) = position(compressed);
            let word = word_to_u256(self.words.get(&word_pos).copied().unwrap_or_default());
            // all bits at or to the right of the current bit position
            let mask = ((U256::one() << bit_pos as usize) - 1) + (U256::one() << bit_pos as usize);
            let masked = word & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                (compressed - (bit_pos - bit_math::most_significant_bit(masked)) as i32)
                    * tick_spacing
            } else {
                (compressed - bit_pos as i32) * tick_spacing
            };
            (next, initialized)
        } else {
            // start from the tick just above
            let compressed = compressed + 1;
            let (word_pos, bit_pos) = position(compressed);
            let word = word_to_u256(self.words.get(&word_pos).copied().unwrap_or_default());
            // all bits at or to the left of the current bit position
            let mask = !((U256::one() << bit_pos as usize) - 1);
            let masked = word & mask;

            let initialized = !masked.is_zero();
            let next = if initialized {
                (compressed + (bit_math::least_significant_bit(masked) - bit_pos) as i32)
                    * tick_spacing
            } else {
                (compressed + (255 - bit_pos) as i32) * tick_spacing
            };
            (next, initialized)
        }
    }
}
