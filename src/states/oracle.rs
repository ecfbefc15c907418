//! Price and liquidity oracle.
//!
//! Observations are collected in a dense ring buffer whose usable window
//! grows on demand, up to 65,535 slots. Every pool starts with a window of
//! one; anyone may pay to lengthen it. New slots start carrying data once
//! the write index wraps around to them.
//!
//! An observation samples `(tickCumulative, secondsPerLiquidityCumulative)`
//! so consumers can derive time-weighted averages by differencing any two
//! samples. The most recent observation is always available by asking for
//! zero seconds ago, independent of the window length.

use crate::error::{ErrorCode, Result};
use crate::libraries::{big_num::U256, full_math};

/// Hard capacity of the observation buffer.
pub const OBSERVATION_CARDINALITY_MAX: usize = 65_535;

/// One oracle sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Observation {
    /// The block timestamp of the observation
    pub block_timestamp: u32,

    /// The tick accumulator: tick * time elapsed since pool initialization
    pub tick_cumulative: i64,

    /// The seconds per in-range liquidity accumulator, Q128.128
    pub seconds_per_liquidity_cumulative_x128: U256,

    /// Whether the observation is initialized and safe to read
    pub initialized: bool,
}

/// Ring buffer of observations. The full capacity is allocated up front;
/// `cardinality` bounds the live window and is tracked by the pool's slot0.
#[derive(Clone)]
pub struct Oracle {
    observations: Vec<Observation>,
}

impl std::fmt::Debug for Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let initialized = self.observations.iter().filter(|o| o.initialized).count();
        f.debug_struct("Oracle")
            .field("initialized_slots", &initialized)
            .finish()
    }
}

impl Default for Oracle {
    fn default() -> Self {
        Self::new()
    }
}

impl Oracle {
    pub fn new() -> Self {
        Self {
            observations: vec![Observation::default(); OBSERVATION_CARDINALITY_MAX],
        }
    }

    /// Read one slot; used by tests and snapshot consumers.
    pub fn observation(&self, index: u16) -> &Observation {
        &self.observations[index as usize]
    }

    /// Writes the first observation and returns the initial
    /// `(cardinality, cardinality_next)`.
    ///
    /// # Arguments
    ///
    /// * `time` - The timestamp of pool initialization
    pub fn initialize(&mut self, time: u32) -> (u16, u16) {
        self.observations[0] = Observation {
            block_timestamp: time,
            tick_cumulative: 0,
            seconds_per_liquidity_cumulative_x128: U256::zero(),
            initialized: true,
        };
        (1, 1)
    }

    /// Extends `last` to `block_timestamp` by accumulating the time spent
    /// at the current tick and liquidity.
    fn transform(last: &Observation, block_timestamp: u32, tick: i32, liquidity: u128) -> Observation {
        let delta = block_timestamp.wrapping_sub(last.block_timestamp);
        Observation {
            block_timestamp,
            tick_cumulative: last
                .tick_cumulative
                .wrapping_add(tick as i64 * delta as i64),
            seconds_per_liquidity_cumulative_x128: full_math::wrapping_add(
                last.seconds_per_liquidity_cumulative_x128,
                (U256::from(delta) << 128) / U256::from(liquidity.max(1)),
            ),
            initialized: true,
        }
    }

    /// Writes an observation, at most once per timestamp. The live window
    /// grows to `cardinality_next` when the write would wrap the buffer.
    /// Returns the updated `(index, cardinality)`.
    ///
    /// # Arguments
    ///
    /// * `index` - Index of the most recently written observation
    /// * `block_timestamp` - Timestamp of the new observation
    /// * `tick` - Tick at the time of the new observation
    /// * `liquidity` - In-range liquidity at the time of the new observation
    /// * `cardinality` - Current live window length
    /// * `cardinality_next` - Window length to grow into on wrap
    pub fn write(
        &mut self,
        index: u16,
        block_timestamp: u32,
        tick: i32,
        liquidity: u128,
        cardinality: u16,
        cardinality_next: u16,
    ) -> (u16, u16) {
        let last = self.observations[index as usize];

        // at most one observation per timestamp
        if last.block_timestamp == block_timestamp {
            return (index, cardinality);
        }

        let cardinality_updated = if cardinality_next > cardinality && index == cardinality - 1 {
            cardinality_next
        } else {
            cardinality
        };
        let index_updated = (index + 1) % cardinality_updated;
        self.observations[index_updated as usize] =
            Self::transform(&last, block_timestamp, tick, liquidity);
        (index_updated, cardinality_updated)
    }

    /// Prepares slots `[current, next)` so the window can later grow to
    /// `next`. Returns the new `cardinality_next`, ignoring shrink requests.
    ///
    /// # Arguments
    ///
    /// * `current` - The current `cardinality_next`
    /// * `next` - The requested `cardinality_next`
    pub fn grow(&mut self, current: u16, next: u16) -> u16 {
        if next <= current {
            return current;
        }
        // stamp a sentinel timestamp so the slot is distinguishable from
        // one that was never touched; the data is unused while initialized
        // remains false
        for i in current..next {
            self.observations[i as usize].block_timestamp = 1;
        }
        next
    }

    /// Comparator for 32-bit timestamps that may have wrapped. Orders `a`
    /// and `b` relative to `time`, treating timestamps logically after
    /// `time` as belonging to the previous epoch.
    fn lte(time: u32, a: u32, b: u32) -> bool {
        if a <= time && b <= time {
            return a <= b;
        }
        let a_adjusted = if a > time { a as u64 } else { a as u64 + (1 << 32) };
        let b_adjusted = if b > time { b as u64 } else { b as u64 + (1 << 32) };
        a_adjusted <= b_adjusted
    }

    /// Binary-searches the live window for the observations bracketing
    /// `target`. Requires the target to be within the stored history.
    fn binary_search(
        &self,
        time: u32,
        target: u32,
        index: u16,
        cardinality: u16,
    ) -> (Observation, Observation) {
        let mut l = (index as usize + 1) % cardinality as usize; // oldest
        let mut r = l + cardinality as usize - 1; // newest

        loop {
            let i = (l + r) / 2;
            let before_or_at = self.observations[i % cardinality as usize];

            // hit an uninitialized slot: the valid range is to the right
            if !before_or_at.initialized {
                l = i + 1;
                continue;
            }

            let at_or_after = self.observations[(i + 1) % cardinality as usize];
            let target_at_or_after = Self::lte(time, before_or_at.block_timestamp, target);

            if target_at_or_after && Self::lte(time, target, at_or_after.block_timestamp) {
                return (before_or_at, at_or_after);
            }

            if !target_at_or_after {
                r = i - 1;
            } else {
                l = i + 1;
            }
        }
    }

    /// Finds the observations bracketing `target`, materializing the
    /// at-or-after side from current state when the target is newer than
    /// the last write. Fails `OracleOld` when the target predates the
    /// oldest stored observation.
    #[allow(clippy::too_many_arguments)]
    fn get_surrounding_observations(
        &self,
        time: u32,
        target: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Observation, Observation)> {
        let mut before_or_at = self.observations[index as usize];

        if Self::lte(time, before_or_at.block_timestamp, target) {
            if before_or_at.block_timestamp == target {
                // exact hit on the newest observation; the second value is
                // never read
                return Ok((before_or_at, Observation::default()));
            }
            return Ok((
                before_or_at,
                Self::transform(&before_or_at, target, tick, liquidity),
            ));
        }

        // move to the oldest observation in the window
        before_or_at = self.observations[(index as usize + 1) % cardinality as usize];
        if !before_or_at.initialized {
            before_or_at = self.observations[0];
        }

        if !Self::lte(time, before_or_at.block_timestamp, target) {
            return Err(ErrorCode::OracleOld);
        }

        Ok(self.binary_search(time, target, index, cardinality))
    }

    /// Cumulative values as of `seconds_ago` before `time`.
    ///
    /// Zero seconds ago extrapolates from the newest observation using the
    /// current tick and liquidity. Older targets are reconstructed by
    /// piecewise-linear interpolation between the bracketing observations.
    ///
    /// # Arguments
    ///
    /// * `time` - The current block timestamp
    /// * `seconds_ago` - How far back to read the cumulatives
    /// * `tick` - The current tick
    /// * `index` - Index of the most recently written observation
    /// * `liquidity` - Current in-range liquidity
    /// * `cardinality` - Live window length
    pub fn observe_single(
        &self,
        time: u32,
        seconds_ago: u32,
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(i64, U256)> {
        if seconds_ago == 0 {
            let mut last = self.observations[index as usize];
            if last.block_timestamp != time {
                last = Self::transform(&last, time, tick, liquidity);
            }
            return Ok((
                last.tick_cumulative,
                last.seconds_per_liquidity_cumulative_x128,
            ));
        }

        let target = time.wrapping_sub(seconds_ago);
        let (before_or_at, at_or_after) =
            self.get_surrounding_observations(time, target, tick, index, liquidity, cardinality)?;

        if target == before_or_at.block_timestamp {
            Ok((
                before_or_at.tick_cumulative,
                before_or_at.seconds_per_liquidity_cumulative_x128,
            ))
        } else if target == at_or_after.block_timestamp {
            Ok((
                at_or_after.tick_cumulative,
                at_or_after.seconds_per_liquidity_cumulative_x128,
            ))
        } else {
            // interpolate between the bracketing observations
            let observation_time_delta = at_or_after
                .block_timestamp
                .wrapping_sub(before_or_at.block_timestamp) as i64;
            let target_delta = target.wrapping_sub(before_or_at.block_timestamp) as i64;
            let tick_cumulative = before_or_at.tick_cumulative.wrapping_add(
                at_or_after
                    .tick_cumulative
                    .wrapping_sub(before_or_at.tick_cumulative)
                    / observation_time_delta
                    * target_delta,
            );
            let seconds_per_liquidity = full_math::wrapping_add(
                before_or_at.seconds_per_liquidity_cumulative_x128,
                full_math::wrapping_sub(
                    at_or_after.seconds_per_liquidity_cumulative_x128,
                    before_or_at.seconds_per_liquidity_cumulative_x128,
                )
                .overflowing_mul(U256::from(target_delta as u64))
                .0 / U256::from(observation_time_delta as u64),
            );
            Ok((tick_cumulative, seconds_per_liquidity))
        }
    }

    /// Vectorized [`Self::observe_single`] over a list of `seconds_agos`.
    #[allow(clippy::too_many_arguments)]
    pub fn observe(
        &self,
        time: u32,
        seconds_agos: &[u32],
        tick: i32,
        index: u16,
        liquidity: u128,
        cardinality: u16,
    ) -> Result<(Vec<i64>, Vec<U256>)> {
        let mut tick_cumulatives = Vec::with_capacity(seconds_agos.len());
        let mut seconds_per_liquidity_cumulatives = Vec::with_capacity(seconds_agos.len());
        for seconds_ago in seconds_agos {
            let (tick_cumulative, seconds_per_liquidity) =
                self.observe_single(time, *seconds_ago, tick, index, liquidity, cardinality)?;
            tick_cumulatives.push(tick_cumulative);
            seconds_per_liquidity_cumulatives.push(seconds_per_liquidity);
        }
        Ok((tick_cumulatives, seconds_per_liquidity_cumulatives))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle_with_history() -> (Oracle, u16, u16) {
        // observations at t = 1, 11, 31 with ticks 0 then 100 in between
        let mut oracle = Oracle::new();
        let (cardinality, mut cardinality_next) = oracle.initialize(1);
        cardinality_next = oracle.grow(cardinality_next, 10);
        let (index, cardinality) = oracle.write(0, 11, 0, 1, cardinality, cardinality_next);
        let (index, cardinality) = oracle.write(index, 31, 100, 1, cardinality, cardinality_next);
        (oracle, index, cardinality)
    }

    #[test]
    fn initialize_writes_slot_zero() {
        let mut oracle = Oracle::new();
        let (cardinality, cardinality_next) = oracle.initialize(7);
        assert_eq!((cardinality, cardinality_next), (1, 1));
        assert!(oracle.observation(0).initialized);
        assert_eq!(oracle.observation(0).block_timestamp, 7);
    }

    #[test]
    fn write_is_deduplicated_per_timestamp() {
        let mut oracle = Oracle::new();
        let (cardinality, cardinality_next) = oracle.initialize(5);
        let (index, cardinality) = oracle.write(0, 5, 50, 10, cardinality, cardinality_next);
        assert_eq!((index, cardinality), (0, 1));
    }

    #[test]
    fn write_accumulates_prior_tick_over_elapsed_time() {
        let (oracle, index, _) = oracle_with_history();
        // index advanced 0 -> 1 -> 2 as cardinality grew
        assert_eq!(index, 2);
        assert_eq!(oracle.observation(1).tick_cumulative, 0);
        // 20 seconds at tick 100
        assert_eq!(oracle.observation(2).tick_cumulative, 2000);
        assert_eq!(
            oracle.observation(2).seconds_per_liquidity_cumulative_x128,
            U256::from(30u64) << 128
        );
    }

    #[test]
    fn cardinality_stays_until_buffer_wraps() {
        let mut oracle = Oracle::new();
        let (cardinality, _) = oracle.initialize(1);
        let next = oracle.grow(1, 3);
        // index 0 is the last slot of a window of 1, so the write wraps and
        // the window grows immediately
        let (index, cardinality) = oracle.write(0, 10, 0, 1, cardinality, next);
        assert_eq!((index, cardinality), (1, 3));
        let (index, cardinality) = oracle.write(index, 20, 0, 1, cardinality, next);
        assert_eq!((index, cardinality), (2, 3));
        // full: wraps back to slot 0
        let (index, cardinality) = oracle.write(index, 30, 0, 1, cardinality, next);
        assert_eq!((index, cardinality), (0, 3));
    }

    #[test]
    fn grow_is_idempotent_and_never_shrinks() {
        let mut oracle = Oracle::new();
        oracle.initialize(1);
        assert_eq!(oracle.grow(1, 10), 10);
        let snapshot: Vec<_> = (0u16..12).map(|i| *oracle.observation(i)).collect();
        assert_eq!(oracle.grow(10, 10), 10);
        assert_eq!(oracle.grow(10, 4), 10);
        let after: Vec<_> = (0u16..12).map(|i| *oracle.observation(i)).collect();
        assert_eq!(snapshot, after);
        // sentinel timestamps mark the grown slots without initializing them
        assert_eq!(oracle.observation(5).block_timestamp, 1);
        assert!(!oracle.observation(5).initialized);
    }

    #[test]
    fn observe_zero_seconds_ago_extrapolates() {
        let (oracle, index, cardinality) = oracle_with_history();
        // 5 more seconds at tick 50
        let (tick_cumulative, _) = oracle
            .observe_single(36, 0, 50, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 2000 + 50 * 5);
    }

    #[test]
    fn observe_exact_and_interpolated_targets() {
        let (oracle, index, cardinality) = oracle_with_history();
        // exact hit on the middle observation
        let (tick_cumulative, _) = oracle
            .observe_single(31, 20, 0, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 0);
        // interpolated inside [11, 31]: 9 seconds at tick 100
        let (tick_cumulative, _) = oracle
            .observe_single(31, 11, 0, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 900);
    }

    #[test]
    fn twap_reconstruction_matches_piecewise_average() {
        let (oracle, index, cardinality) = oracle_with_history();
        // last 25 seconds as of t=31: 5s at tick 0, 20s at tick 100
        let (cumulatives, _) = oracle
            .observe(31, &[25, 0], 50, index, 1, cardinality)
            .unwrap();
        let twap = (cumulatives[1] - cumulatives[0]) / 25;
        assert_eq!(twap, 80);
    }

    #[test]
    fn requests_before_history_fail() {
        let (oracle, index, cardinality) = oracle_with_history();
        assert_eq!(
            oracle.observe_single(31, 31, 0, index, 1, cardinality),
            Err(ErrorCode::OracleOld)
        );
    }

    #[test]
    fn seconds_per_liquidity_uses_max_of_liquidity_and_one() {
        let mut oracle = Oracle::new();
        let (cardinality, cardinality_next) = oracle.initialize(0);
        let (index, _) = oracle.write(0, 8, 0, 0, cardinality, cardinality_next);
        assert_eq!(
            oracle.observation(index).seconds_per_liquidity_cumulative_x128,
            U256::from(8u64) << 128
        );
    }

    #[test]
    fn timestamp_wraparound_is_ordered_relative_to_now() {
        // newest observation written before the u32 clock wrapped
        let mut oracle = Oracle::new();
        let (cardinality, mut cardinality_next) = oracle.initialize(u32::MAX - 9);
        cardinality_next = oracle.grow(cardinality_next, 4);
        let (index, cardinality) =
            oracle.write(0, u32::MAX - 4, 10, 1, cardinality, cardinality_next);
        // clock wrapped: now is 6, i.e. 11 seconds after the last write
        let (index, cardinality) = oracle.write(index, 6, 20, 1, cardinality, cardinality_next);
        // 11 seconds ago lands exactly on the pre-wrap middle observation,
        // which accumulated 5 seconds at tick 10
        let (tick_cumulative, _) = oracle
            .observe_single(6, 11, 20, index, 1, cardinality)
            .unwrap();
        assert_eq!(tick_cumulative, 50);
    }
}
