//! Per-tick state and the book of all referenced ticks.

use std::collections::HashMap;

use crate::error::{ErrorCode, Result};
use crate::libraries::{
    big_num::U256,
    full_math, liquidity_math,
    tick_math::{MAX_TICK, MIN_TICK},
};

/// State stored for a price tick while any position references it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickState {
    /// The total position liquidity that references this tick
    pub liquidity_gross: u128,

    /// Amount of net liquidity added (subtracted) when the tick is crossed
    /// from left to right (right to left)
    pub liquidity_net: i128,

    /// Fee growth per unit of liquidity on the _other_ side of this tick
    /// (relative to the current tick). Only has relative meaning, not
    /// absolute; the value depends on when the tick is initialized.
    pub fee_growth_outside_0_x128: U256,
    pub fee_growth_outside_1_x128: U256,

    /// The cumulative tick value on the other side of the tick
    pub tick_cumulative_outside: i64,

    /// The seconds per unit of liquidity on the _other_ side of this tick.
    /// Only has relative meaning, like the fee growth values.
    pub seconds_per_liquidity_outside_x128: U256,

    /// The seconds spent on the other side of the tick
    pub seconds_outside: u32,

    /// True iff `liquidity_gross != 0`
    pub initialized: bool,
}

/// Book of tick records, keyed by tick index. Records exist only while some
/// position uses the tick as a range endpoint.
#[derive(Debug, Clone, Default)]
pub struct TickBook {
    ticks: HashMap<i32, TickState>,
}

impl TickBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored state for `tick`, if the tick is referenced.
    pub fn get(&self, tick: i32) -> Option<&TickState> {
        self.ticks.get(&tick)
    }

    pub fn is_initialized(&self, tick: i32) -> bool {
        self.ticks.get(&tick).map_or(false, |t| t.initialized)
    }

    /// Number of referenced ticks; used by invariant checks in tests.
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Iterate over all referenced ticks.
    pub fn iter(&self) -> impl Iterator<Item = (&i32, &TickState)> {
        self.ticks.iter()
    }

    /// Updates a tick for a liquidity change at one of a position's
    /// endpoints and reports whether the tick flipped between initialized
    /// and uninitialized.
    ///
    /// On first initialization at or below the current tick, the outside
    /// accumulators are seeded with the current global values: by
    /// convention, all growth before initialization happened below the
    /// tick.
    ///
    /// # Arguments
    ///
    /// * `tick` - The tick being updated
    /// * `tick_current` - The pool's current tick
    /// * `liquidity_delta` - Liquidity to add to or remove from the tick
    /// * `fee_growth_global_0_x128` - All-time global fee growth in token_0
    /// * `fee_growth_global_1_x128` - All-time global fee growth in token_1
    /// * `seconds_per_liquidity_cumulative_x128` - Current cumulative
    ///   seconds per unit of liquidity
    /// * `tick_cumulative` - Current cumulative tick value
    /// * `time` - Current block timestamp
    /// * `upper` - Whether the position's upper or lower endpoint is updated
    /// * `max_liquidity` - Gross liquidity cap per tick
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        tick: i32,
        tick_current: i32,
        liquidity_delta: i128,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
        upper: bool,
        max_liquidity: u128,
    ) -> Result<bool> {
        let mut state = self.ticks.get(&tick).copied().unwrap_or_default();

        let liquidity_gross_before = state.liquidity_gross;
        let liquidity_gross_after =
            liquidity_math::add_delta(liquidity_gross_before, liquidity_delta)?;
        if liquidity_gross_after > max_liquidity {
            return Err(ErrorCode::LiquidityOverflow);
        }

        // the tick flips when liquidity is first referenced or fully removed
        let flipped = (liquidity_gross_after == 0) != (liquidity_gross_before == 0);

        if liquidity_gross_before == 0 {
            if tick <= tick_current {
                state.fee_growth_outside_0_x128 = fee_growth_global_0_x128;
                state.fee_growth_outside_1_x128 = fee_growth_global_1_x128;
                state.seconds_per_liquidity_outside_x128 =
                    seconds_per_liquidity_cumulative_x128;
                state.tick_cumulative_outside = tick_cumulative;
                state.seconds_outside = time;
            }
            state.initialized = true;
        }

        state.liquidity_gross = liquidity_gross_after;
        if flipped && liquidity_gross_after == 0 {
            state.initialized = false;
        }

        // when the lower (upper) tick is crossed left to right, liquidity
        // must be added (removed)
        state.liquidity_net = if upper {
            state
                .liquidity_net
                .checked_sub(liquidity_delta)
                .ok_or(ErrorCode::LiquidityOverflow)?
        } else {
            state
                .liquidity_net
                .checked_add(liquidity_delta)
                .ok_or(ErrorCode::LiquidityOverflow)?
        };

        self.ticks.insert(tick, state);
        Ok(flipped)
    }

    /// Deletes the record for `tick`. Called after an update flips it to
    /// uninitialized.
    pub fn clear(&mut self, tick: i32) {
        self.ticks.remove(&tick);
    }

    /// Transitions to `tick` during a swap: every outside accumulator flips
    /// to `global - outside`. Returns the tick's net liquidity, which the
    /// caller negates when traveling right to left.
    ///
    /// # Arguments
    ///
    /// * `tick` - The tick being crossed
    /// * `fee_growth_global_0_x128` - All-time global fee growth in token_0
    /// * `fee_growth_global_1_x128` - All-time global fee growth in token_1
    /// * `seconds_per_liquidity_cumulative_x128` - Current cumulative
    ///   seconds per unit of liquidity
    /// * `tick_cumulative` - Current cumulative tick value
    /// * `time` - Current block timestamp
    pub fn cross(
        &mut self,
        tick: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
        seconds_per_liquidity_cumulative_x128: U256,
        tick_cumulative: i64,
        time: u32,
    ) -> i128 {
        let state = self.ticks.entry(tick).or_default();
        state.fee_growth_outside_0_x128 =
            full_math::wrapping_sub(fee_growth_global_0_x128, state.fee_growth_outside_0_x128);
        state.fee_growth_outside_1_x128 =
            full_math::wrapping_sub(fee_growth_global_1_x128, state.fee_growth_outside_1_x128);
        state.seconds_per_liquidity_outside_x128 = full_math::wrapping_sub(
            seconds_per_liquidity_cumulative_x128,
            state.seconds_per_liquidity_outside_x128,
        );
        state.tick_cumulative_outside =
            tick_cumulative.wrapping_sub(state.tick_cumulative_outside);
        state.seconds_outside = time.wrapping_sub(state.seconds_outside);
        state.liquidity_net
    }

    /// All-time fee growth in token_0 and token_1, per unit of liquidity,
    /// inside a position's tick boundaries.
    ///
    /// Decomposes the global accumulator as
    /// `inside = global - below(lower) - above(upper)`, picking each piece
    /// from the stored outside value or its complement depending on where
    /// the current tick sits. All arithmetic is modulo 2^256.
    ///
    /// # Arguments
    ///
    /// * `tick_lower` - The lower tick boundary of the position
    /// * `tick_upper` - The upper tick boundary of the position
    /// * `tick_current` - The current tick
    /// * `fee_growth_global_0_x128` - All-time global fee growth in token_0
    /// * `fee_growth_global_1_x128` - All-time global fee growth in token_1
    pub fn get_fee_growth_inside(
        &self,
        tick_lower: i32,
        tick_upper: i32,
        tick_current: i32,
        fee_growth_global_0_x128: U256,
        fee_growth_global_1_x128: U256,
    ) -> (U256, U256) {
        let lower = self.ticks.get(&tick_lower).copied().unwrap_or_default();
        let upper = self.ticks.get(&tick_upper).copied().unwrap_or_default();

        let (fee_growth_below_0_x128, fee_growth_below_1_x128) = if tick_current >= tick_lower {
            (
                lower.fee_growth_outside_0_x128,
                lower.fee_growth_outside_1_x128,
            )
        } else {
            (
                full_math::wrapping_sub(fee_growth_global_0_x128, lower.fee_growth_outside_0_x128),
                full_math::wrapping_sub(fee_growth_global_1_x128, lower.fee_growth_outside_1_x128),
            )
        };

        let (fee_growth_above_0_x128, fee_growth_above_1_x128) = if tick_current < tick_upper {
            (
                upper.fee_growth_outside_0_x128,
                upper.fee_growth_outside_1_x128,
            )
        } else {
            (
                full_math::wrapping_sub(fee_growth_global_0_x128, upper.fee_growth_outside_0_x128),
                full_math::wrapping_sub(fee_growth_global_1_x128, upper.fee_growth_outside_1_x128),
            )
        };

        (
            full_math::wrapping_sub(
                full_math::wrapping_sub(fee_growth_global_0_x128, fee_growth_below_0_x128),
                fee_growth_above_0_x128,
            ),
            full_math::wrapping_sub(
                full_math::wrapping_sub(fee_growth_global_1_x128, fee_growth_below_1_x128),
                fee_growth_above_1_x128,
            ),
        )
    }
}

/// Gross liquidity cap per tick for a given spacing: wider spacings admit
/// fewer usable ticks, so each may carry more.
///
/// # Arguments
///
/// * `tick_spacing` - The configured spacing between usable ticks
pub fn tick_spacing_to_max_liquidity_per_tick(tick_spacing: i32) -> u128 {
    let min_tick = (MIN_TICK / tick_spacing) * tick_spacing;
    let max_tick = (MAX_TICK / tick_spacing) * tick_spacing;
    let num_ticks = ((max_tick - min_tick) / tick_spacing) as u128 + 1;
    u128::MAX / num_ticks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_simple(book: &mut TickBook, tick: i32, current: i32, delta: i128, upper: bool) -> Result<bool> {
        book.update(
            tick,
            current,
            delta,
            U256::zero(),
            U256::zero(),
            U256::zero(),
            0,
            0,
            upper,
            u128::MAX,
        )
    }

    #[test]
    fn flips_on_first_reference_and_removal() {
        let mut book = TickBook::new();
        assert!(update_simple(&mut book, 60, 0, 100, false).unwrap());
        assert!(book.is_initialized(60));
        assert!(!update_simple(&mut book, 60, 0, 50, false).unwrap());
        assert!(!update_simple(&mut book, 60, 0, -50, false).unwrap());
        assert!(update_simple(&mut book, 60, 0, -100, false).unwrap());
        assert!(!book.is_initialized(60));
    }

    #[test]
    fn net_liquidity_tracks_endpoint_side() {
        let mut book = TickBook::new();
        update_simple(&mut book, -60, 0, 1000, false).unwrap();
        update_simple(&mut book, 60, 0, 1000, true).unwrap();
        assert_eq!(book.get(-60).unwrap().liquidity_net, 1000);
        assert_eq!(book.get(60).unwrap().liquidity_net, -1000);
        // a second position sharing one endpoint as the opposite side
        update_simple(&mut book, 60, 0, 400, false).unwrap();
        assert_eq!(book.get(60).unwrap().liquidity_net, -600);
        assert_eq!(book.get(60).unwrap().liquidity_gross, 1400);
    }

    #[test]
    fn gross_liquidity_cap_is_enforced() {
        let mut book = TickBook::new();
        let err = book.update(
            0,
            0,
            10,
            U256::zero(),
            U256::zero(),
            U256::zero(),
            0,
            0,
            false,
            9,
        );
        assert_eq!(err, Err(ErrorCode::LiquidityOverflow));
        assert!(!book.is_initialized(0));
    }

    #[test]
    fn outside_seeding_follows_current_tick() {
        let mut book = TickBook::new();
        let growth = U256::from(777u64);
        // at or below the current tick: seeded with the global value
        book.update(-60, 0, 10, growth, growth, U256::zero(), 0, 0, false, u128::MAX)
            .unwrap();
        assert_eq!(book.get(-60).unwrap().fee_growth_outside_0_x128, growth);
        // above the current tick: seeded to zero
        book.update(60, 0, 10, growth, growth, U256::zero(), 0, 0, true, u128::MAX)
            .unwrap();
        assert_eq!(book.get(60).unwrap().fee_growth_outside_0_x128, U256::zero());
    }

    #[test]
    fn cross_flips_outside_accumulators() {
        let mut book = TickBook::new();
        update_simple(&mut book, -60, 0, 1000, false).unwrap();
        let net = book.cross(-60, U256::from(500u64), U256::from(700u64), U256::zero(), 0, 10);
        assert_eq!(net, 1000);
        assert_eq!(book.get(-60).unwrap().fee_growth_outside_0_x128, U256::from(500u64));
        // crossing back restores the original complement
        let net = book.cross(-60, U256::from(600u64), U256::from(900u64), U256::zero(), 0, 25);
        assert_eq!(net, 1000);
        assert_eq!(book.get(-60).unwrap().fee_growth_outside_0_x128, U256::from(100u64));
    }

    #[test]
    fn fee_growth_inside_decomposition() {
        let mut book = TickBook::new();
        let global = U256::from(1000u64);
        // both ticks below current seeded with globals at init time
        book.update(-120, 0, 10, U256::from(100u64), U256::zero(), U256::zero(), 0, 0, false, u128::MAX)
            .unwrap();
        book.update(120, 0, 10, U256::zero(), U256::zero(), U256::zero(), 0, 0, true, u128::MAX)
            .unwrap();
        // inside = global - below(lower) - above(upper) = 1000 - 100 - 0
        let (inside_0, _) = book.get_fee_growth_inside(-120, 120, 0, global, global);
        assert_eq!(inside_0, U256::from(900u64));
    }

    #[test]
    fn fee_growth_inside_wraps_modulo_2_256() {
        let book = TickBook::new();
        // missing ticks read as zero; a current tick below the range makes
        // below = global - 0, so inside = global - global - 0 = 0
        let global = U256::MAX - 3;
        let (inside_0, inside_1) = book.get_fee_growth_inside(-60, 60, -120, global, global);
        assert_eq!(inside_0, U256::zero());
        assert_eq!(inside_1, U256::zero());
    }

    #[test]
    fn max_liquidity_per_tick_for_common_spacings() {
        // spacing 1: every tick usable
        assert_eq!(
            tick_spacing_to_max_liquidity_per_tick(1),
            u128::MAX / (887_272u128 * 2 + 1)
        );
        // wider spacing admits more liquidity per tick
        assert!(
            tick_spacing_to_max_liquidity_per_tick(60)
                > tick_spacing_to_max_liquidity_per_tick(10)
        );
        let spacing_60 = tick_spacing_to_max_liquidity_per_tick(60);
        let num_ticks = ((887_220 - (-887_220)) / 60 + 1) as u128;
        assert_eq!(spacing_60, u128::MAX / num_ticks);
    }

    #[test]
    fn clear_removes_the_record() {
        let mut book = TickBook::new();
        update_simple(&mut book, 60, 0, 100, false).unwrap();
        book.clear(60);
        assert!(book.get(60).is_none());
        assert!(book.is_empty());
    }
}
